//! Control Flow Graph (CFG) module
//!
//! Block segmentation for the simulator and recognizers, plus a whole-routine
//! jump graph for inspection.

pub mod block;
pub mod jump_graph;

// Re-export main types for convenience
pub use block::{Block, Boundary, InstructionStream};
pub use jump_graph::{BasicBlock, EdgeKind, JumpGraph};
