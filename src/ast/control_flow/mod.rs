//! Control-flow pattern recognition
//!
//! Recognizers are entered from the simulator when it meets a branch, a block
//! setup or an iterator operation. Each one carves the span it owns out of the
//! frame's stream, recurses on the pieces, and hands back a statement or a
//! value. All jump targets are read through the frame's jump map first.
//!
//! - `boolean`: short-circuit `and`/`or` chains
//! - `conditional`: `if`/`else` statements and conditional expressions
//! - `loops`: `for` and `while` loops with optional `else`
//! - `exceptions`: `try`/`except`/`else` and `try`/`finally`
//! - `with_block`: `with` statements
//! - `comprehensions`: list, set, dict and generator comprehensions

pub mod boolean;
pub mod comprehensions;
pub mod conditional;
pub mod exceptions;
pub mod loops;
pub mod with_block;

pub use boolean::BooleanRecognizer;
pub use comprehensions::ComprehensionRecognizer;
pub use conditional::ConditionalRecognizer;
pub use exceptions::ExceptionRecognizer;
pub use loops::LoopRecognizer;
pub use with_block::WithRecognizer;

use serde::Serialize;
use std::fmt;

/// Construct families reported to a [`ReconstructionObserver`](crate::decompiler::ReconstructionObserver)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PatternFamily {
    Conditional,
    Loop,
    Boolean,
    Exception,
    With,
    Comprehension,
}

impl PatternFamily {
    pub const ALL: [PatternFamily; 6] = [
        PatternFamily::Conditional,
        PatternFamily::Loop,
        PatternFamily::Boolean,
        PatternFamily::Exception,
        PatternFamily::With,
        PatternFamily::Comprehension,
    ];
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternFamily::Conditional => "conditional",
            PatternFamily::Loop => "loop",
            PatternFamily::Boolean => "boolean",
            PatternFamily::Exception => "exception",
            PatternFamily::With => "with",
            PatternFamily::Comprehension => "comprehension",
        };
        f.write_str(name)
    }
}
