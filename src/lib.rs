//! pyc-dec-rs: structured control-flow reconstruction for block-stack bytecode
//!
//! This library rebuilds the nested statement tree of a routine from its flat
//! instruction listing by simulating the evaluation stack and recognizing the
//! block shapes the compiler emits for each high-level construct.

pub mod ast;
pub mod bytecode;
pub mod cfg;
pub mod cli;
pub mod decompiler;
pub mod error;

pub use decompiler::{
    DecompileOptions, Decompiler, LoggingObserver, PatternStats, ReconstructionObserver,
};
pub use error::{Error, Result};

// Re-export commonly used types
pub use ast::{Expr, PatternFamily, Stmt};
pub use bytecode::{CodeObject, Instruction, InstructionBuilder, OperationKind};
pub use cfg::{Block, JumpGraph};
