use miette::Diagnostic;
use thiserror::Error;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading listings or reconstructing control flow.
///
/// Every reconstruction error is fatal for the routine being rebuilt; the
/// engine never returns a partial tree.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum Error {
    #[error("I/O error: {0}")]
    #[diagnostic(code(pyc_dec::io_error))]
    Io(String),

    #[error("Invalid instruction listing: {message}")]
    #[diagnostic(code(pyc_dec::listing_error))]
    Listing { message: String },

    #[error("Block boundary at position {boundary} not found in remaining range (starting at {from:?})")]
    #[diagnostic(
        code(pyc_dec::boundary_not_found),
        help("a jump target points outside the range being carved; the listing is truncated or malformed")
    )]
    BoundaryNotFound { boundary: u32, from: Option<u32> },

    #[error("Unrecognized control-flow pattern at position {position}: {message}")]
    #[diagnostic(code(pyc_dec::unrecognized_pattern))]
    UnrecognizedPattern { position: u32, message: String },

    #[error("Stack invariant violated: {message}")]
    #[diagnostic(code(pyc_dec::stack_invariant))]
    StackInvariantViolation { message: String },

    #[error("Exception handlers resume at different positions: expected {expected}, handler at {position} resumes at {found}")]
    #[diagnostic(code(pyc_dec::divergent_handlers))]
    DivergentHandlerResumption {
        expected: u32,
        found: u32,
        position: u32,
    },

    #[error("Unsupported operation {opname} at position {position}")]
    #[diagnostic(code(pyc_dec::unsupported_operation))]
    UnsupportedOperation { opname: String, position: u32 },

    #[error(
        "Instruction accounting failed: {} position(s) never consumed {:?}, {} consumed more than once {:?}",
        .missing.len(), .missing, .duplicated.len(), .duplicated
    )]
    #[diagnostic(code(pyc_dec::instruction_accounting))]
    InstructionAccounting {
        missing: Vec<u32>,
        duplicated: Vec<u32>,
    },

    #[error("Internal error: {message}")]
    #[diagnostic(code(pyc_dec::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create an unrecognized-pattern error anchored at an instruction position
    pub fn pattern(position: u32, message: impl Into<String>) -> Self {
        Error::UnrecognizedPattern {
            position,
            message: message.into(),
        }
    }

    /// Create a stack invariant error
    pub fn stack(message: impl Into<String>) -> Self {
        Error::StackInvariantViolation {
            message: message.into(),
        }
    }

    /// Create a listing error
    pub fn listing(message: impl Into<String>) -> Self {
        Error::Listing {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Listing {
            message: err.to_string(),
        }
    }
}
