//! Scriptblock core
//!
//! Exposes script functions as native callables. Given a type-signature
//! encoding, this crate:
//! - parses it into a `TypeSignature` (cached per encoding string)
//! - builds a libffi trampoline with exactly that calling convention
//! - marshals arguments and return values on every native invocation
//!
//! Invocation-time failures never reach native code: the caller gets a zero
//! value and the error is published on the runtime's `Reporter`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod block;
pub mod bridge;
pub mod cache;
pub mod encoding;
pub mod error;
pub mod globals;
pub mod handles;
pub mod layout;
pub mod logging;
pub mod marshal;
pub mod options;
pub mod report;
pub mod runtime;
pub mod trampoline;

pub use block::{signature_for_block, BlockDescriptor, BlockLiteral};
pub use bridge::Bridge;
pub use cache::SignatureCache;
pub use encoding::{
    parse, ObjectKind, TypeDescriptor, TypeSignature, MAX_NESTING_DEPTH, MAX_TYPE_SIZE,
};
pub use error::{InvocationError, SignatureError, SignatureResult};
pub use globals::NativeClassRegistry;
pub use handles::HandleTable;
pub use layout::{checked_struct_layout, struct_layout, Layout, StructLayout};
pub use logging::init_logging;
pub use marshal::InvocationTarget;
pub use options::{BridgeOptions, MAX_ARGUMENTS};
pub use report::{InvocationReport, Reporter};
pub use runtime::{make_bridge, BridgeRuntime, RuntimeBuilder};
pub use trampoline::Trampoline;

pub use scriptblock_sdk::{
    FromScript, FunctionId, HandleKind, MarshalError, NativeHandle, ScriptError, ScriptFunction,
    ScriptFunctionHandle, ScriptValue, ToScript,
};
