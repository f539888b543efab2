//! Bridge: a script function paired with a native-callable trampoline
//!
//! Bridges are immutable. Cloning shares the same signature, function and
//! trampoline; equality is by encoding string plus function identity.

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use scriptblock_sdk::{ScriptError, ScriptFunctionHandle, ScriptValue};

use crate::block::BlockLiteral;
use crate::encoding::TypeSignature;
use crate::error::SignatureResult;
use crate::marshal::InvocationTarget;
use crate::options::BridgeOptions;
use crate::trampoline::Trampoline;

/// A script function exposed as a native callable
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Trampoline>,
}

impl Bridge {
    /// Build a bridge around an invocation target
    pub fn new(target: InvocationTarget, options: &BridgeOptions) -> SignatureResult<Self> {
        let trampoline = Trampoline::build(Arc::new(target), options)?;
        Ok(Self {
            inner: Arc::new(trampoline),
        })
    }

    /// Parsed signature
    pub fn signature(&self) -> &Arc<TypeSignature> {
        self.inner.target().signature()
    }

    /// The encoding string this bridge was built from
    pub fn encoding(&self) -> &str {
        self.signature().encoding()
    }

    /// The wrapped script function
    pub fn function(&self) -> &ScriptFunctionHandle {
        self.inner.target().function()
    }

    /// Underlying trampoline
    pub fn trampoline(&self) -> &Trampoline {
        &self.inner
    }

    /// Native entry point. Valid while any clone of this bridge is alive.
    pub fn code_ptr(&self) -> *const c_void {
        self.inner.code_ptr()
    }

    /// Typed native entry point.
    ///
    /// # Safety
    ///
    /// See `Trampoline::as_fn`.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        self.inner.as_fn()
    }

    /// Block literal, when the first argument is the block itself
    pub fn block(&self) -> Option<&BlockLiteral> {
        self.inner.block()
    }

    /// Call through the native trampoline with raw argument pointers.
    ///
    /// # Safety
    ///
    /// See `Trampoline::call_raw`.
    pub unsafe fn invoke_raw(&self, args: &mut [*mut c_void], ret: *mut c_void) {
        self.inner.call_raw(args, ret)
    }

    /// Call the script function directly with script arguments.
    ///
    /// Skips native marshalling; panics are still contained.
    pub fn call(&self, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        self.inner.target().call_script(args)
    }

    /// Whether `other` is a clone of this bridge (same trampoline)
    pub fn ptr_eq(&self, other: &Bridge) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Bridge {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.encoding() == other.encoding() && self.function().same_function(other.function()))
    }
}

impl Eq for Bridge {}

impl Hash for Bridge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoding().hash(state);
        self.function().identity_key().hash(state);
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("encoding", &self.encoding())
            .field("function", self.function())
            .field("code", &self.code_ptr())
            .finish()
    }
}
