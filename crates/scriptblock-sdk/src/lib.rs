//! Scriptblock SDK - the script-engine side of the bridge
//!
//! This crate provides the types a scripting engine implements or produces
//! so that its functions can be wrapped as native callables by
//! `scriptblock-core`, without depending on the trampoline machinery.
//!
//! # Example
//!
//! ```ignore
//! use scriptblock_sdk::{ScriptFunctionHandle, ScriptValue};
//!
//! let double = ScriptFunctionHandle::from_fn(|args| {
//!     let n = args[0].as_number().unwrap_or(0.0);
//!     Ok(ScriptValue::Number(n * 2.0))
//! });
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod function;
pub mod value;

pub use convert::{FromScript, ToScript};
pub use error::{MarshalError, MarshalResult, ScriptError, ScriptResult};
pub use function::{FunctionId, IdentityKey, ScriptFunction, ScriptFunctionHandle};
pub use value::{HandleKind, NativeHandle, ObjectRef, ScriptValue};
