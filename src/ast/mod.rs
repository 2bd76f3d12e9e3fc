//! Abstract Syntax Tree (AST) module
//!
//! This module turns instruction ranges into the nested statement tree. It is
//! organized into sub-modules by functionality:
//!
//! - `nodes`: statement and expression nodes of the reconstructed tree
//! - `simulator/`: evaluation stack simulation over one block
//! - `control_flow/`: pattern recognizers for branches, loops, handlers and
//!   comprehensions

pub mod control_flow;
pub mod nodes;
pub mod simulator;

// Re-export the main types for public API
pub use control_flow::PatternFamily;
pub use nodes::{
    Alias, Arguments, BinaryOperator, BoolOperator, ClassDef, Comprehension, ComprehensionKind,
    ExceptHandler, Expr, FunctionDef, Generator, Keyword, Stmt, UnaryOperator,
};
pub use simulator::{BlockOutput, Frame, FrameContext};
