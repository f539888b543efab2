//! Error types shared by the engine side of the bridge

/// Result type for script-side calls
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Result type for value conversions
pub type MarshalResult<T> = Result<T, MarshalError>;

/// A value could not be converted across the native/script boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    /// The script produced a value the declared native kind cannot hold
    #[error("Incompatible return value: expected {expected}, got {got}")]
    IncompatibleReturn {
        /// Native kind that was declared
        expected: String,
        /// Script value kind that was produced
        got: String,
    },

    /// A handle id that the handle table never issued (or already released)
    #[error("Unknown native handle: {0}")]
    UnknownHandle(u64),

    /// A string returned for a C string contains an interior NUL byte
    #[error("String contains an interior NUL byte")]
    InteriorNul,

    /// Aggregate value has the wrong number of elements
    #[error("Arity mismatch: expected {expected} elements, got {got}")]
    ArityMismatch {
        /// Number of fields or elements the native layout declares
        expected: usize,
        /// Number of elements the script produced
        got: usize,
    },

    /// A number that cannot be represented in the native kind (NaN, infinity)
    #[error("Value {value} out of range for {expected}")]
    OutOfRange {
        /// Native kind that was declared
        expected: String,
        /// Offending value, formatted
        value: String,
    },
}

/// The invoked script function failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// The script raised an exception
    #[error("Script raised: {message}")]
    Raised {
        /// Exception message as reported by the engine
        message: String,
    },

    /// The host-side function implementation panicked
    #[error("Script function panicked: {0}")]
    Panicked(String),
}

impl ScriptError {
    /// Shorthand for a raised script exception
    pub fn raised(message: impl Into<String>) -> Self {
        ScriptError::Raised {
            message: message.into(),
        }
    }
}

impl From<String> for ScriptError {
    fn from(s: String) -> Self {
        ScriptError::Raised { message: s }
    }
}

impl From<&str> for ScriptError {
    fn from(s: &str) -> Self {
        ScriptError::Raised {
            message: s.to_string(),
        }
    }
}
