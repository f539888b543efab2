//! Error types for bridge construction and invocation

use scriptblock_sdk::{MarshalError, ScriptError};

/// Construction-time failure: the encoding cannot be turned into a trampoline.
///
/// These are the only errors that abort an operation; they surface
/// synchronously to whoever called the construction API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Empty encoding, or an encoding with no return type
    #[error("Empty signature encoding")]
    Empty,

    /// Character that does not start any known type
    #[error("Unknown type token '{token}' at position {position}")]
    UnknownToken {
        /// Offending character
        token: char,
        /// Byte offset into the encoding
        position: usize,
    },

    /// Aggregate group opened but not closed, or closed without being opened
    #[error("Malformed aggregate at position {position}: {detail}")]
    Unbalanced {
        /// What was expected
        detail: String,
        /// Byte offset into the encoding
        position: usize,
    },

    /// Recognized but deliberately unsupported construct
    #[error("Unsupported type encoding: {detail}")]
    Unsupported {
        /// Which construct
        detail: String,
    },

    /// Variadic signatures cannot be given a fixed trampoline layout
    #[error("Variadic signatures are not supported")]
    Variadic,

    /// More arguments than a trampoline may take
    #[error("Too many arguments: {count} (limit {limit})")]
    TooManyArguments {
        /// Declared argument count
        count: usize,
        /// Effective limit
        limit: usize,
    },

    /// The native ABI runtime refused to prepare the closure
    #[error("Failed to prepare native closure: {detail}")]
    Closure {
        /// Error reported by libffi
        detail: String,
    },
}

/// Invocation-time failure.
///
/// Never propagated to the native caller: the trampoline writes a default
/// value into the return slot and publishes the error on the reporter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Value conversion failed
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The script function raised (or panicked)
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl InvocationError {
    /// Short category name, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::Marshal(_) => "marshal",
            InvocationError::Script(_) => "script",
        }
    }
}

/// Result type alias for construction
pub type SignatureResult<T> = std::result::Result<T, SignatureError>;
