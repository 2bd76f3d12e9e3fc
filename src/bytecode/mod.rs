//! Instruction model
//!
//! Immutable records supplied by the external disassembler, the operation
//! table they are drawn from, and a builder for writing listings by hand.

pub mod builder;
pub mod code_object;
pub mod instruction;
pub mod opcodes;

pub use builder::InstructionBuilder;
pub use code_object::{CodeFlags, CodeObject};
pub use instruction::{CompareOp, Constant, Instruction, Operand};
pub use opcodes::{OperationCategory, OperationKind};
