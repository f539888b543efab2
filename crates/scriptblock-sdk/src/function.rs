//! ScriptFunction trait: the callable the engine hands to the bridge
//!
//! The engine implements `ScriptFunction` for its own function values. The
//! bridge only ever holds a `ScriptFunctionHandle`, a cheap reference-counted
//! wrapper that keeps the engine function alive for as long as any bridge
//! built from it exists.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::ScriptResult;
use crate::value::ScriptValue;

/// Engine-assigned function identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u64);

/// A function value owned by the scripting engine.
pub trait ScriptFunction: Send + Sync {
    /// Invoke the function synchronously with arguments in call order.
    ///
    /// An exception raised by the script is returned as `ScriptError::Raised`.
    fn call(&self, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;

    /// The engine's identity for this function, if it has one.
    ///
    /// Engines that wrap one underlying function in several host objects
    /// should return the same id from each; otherwise handle identity is used.
    fn identity(&self) -> Option<FunctionId> {
        None
    }

    /// Function name, for diagnostics
    fn name(&self) -> Option<&str> {
        None
    }
}

/// Identity key used for bridge equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Identity reported by the engine
    Engine(FunctionId),
    /// Address of the shared handle allocation
    Handle(usize),
}

/// Retaining reference to a script function.
#[derive(Clone)]
pub struct ScriptFunctionHandle {
    inner: Arc<dyn ScriptFunction>,
}

impl ScriptFunctionHandle {
    /// Wrap an engine function
    pub fn new(function: impl ScriptFunction + 'static) -> Self {
        Self {
            inner: Arc::new(function),
        }
    }

    /// Wrap an already shared engine function
    pub fn from_arc(inner: Arc<dyn ScriptFunction>) -> Self {
        Self { inner }
    }

    /// Wrap a Rust closure (useful for embedders and tests)
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[ScriptValue]) -> ScriptResult<ScriptValue> + Send + Sync + 'static,
    {
        Self::new(FnFunction { f })
    }

    /// Call the wrapped function
    pub fn call(&self, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        self.inner.call(args)
    }

    /// Function name, if the engine reports one
    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Identity key for equality
    pub fn identity_key(&self) -> IdentityKey {
        match self.inner.identity() {
            Some(id) => IdentityKey::Engine(id),
            None => IdentityKey::Handle(Arc::as_ptr(&self.inner) as *const () as usize),
        }
    }

    /// Check whether two handles refer to the same script function
    pub fn same_function(&self, other: &ScriptFunctionHandle) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl PartialEq for ScriptFunctionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_function(other)
    }
}

impl Eq for ScriptFunctionHandle {}

impl Hash for ScriptFunctionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_key().hash(state);
    }
}

impl fmt::Debug for ScriptFunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunctionHandle")
            .field("name", &self.name())
            .field("identity", &self.identity_key())
            .finish()
    }
}

struct FnFunction<F> {
    f: F,
}

impl<F> ScriptFunction for FnFunction<F>
where
    F: Fn(&[ScriptValue]) -> ScriptResult<ScriptValue> + Send + Sync,
{
    fn call(&self, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        (self.f)(args)
    }
}
