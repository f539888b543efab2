//! Native class globals
//!
//! An engine's global-object lookup hook can fall back to this registry so
//! that unknown global names resolve to native classes by name. `Object` is
//! never resolved here; the engine's own `Object` always wins.
//!
//! Registered classes stay pinned in the handle table, so their handles
//! keep resolving however many other pointers cross the bridge.

use std::ffi::c_void;
use std::sync::Arc;

use dashmap::DashMap;
use scriptblock_sdk::{HandleKind, NativeHandle, ScriptValue};
use tracing::debug;

use crate::handles::HandleTable;

/// Global name the engine always keeps for itself
pub const RESERVED_GLOBAL: &str = "Object";

/// Name → native class pointer registry
#[derive(Debug)]
pub struct NativeClassRegistry {
    classes: DashMap<String, usize>,
    handles: Arc<HandleTable>,
}

impl NativeClassRegistry {
    /// Create an empty registry issuing handles from `handles`
    pub fn new(handles: Arc<HandleTable>) -> Self {
        Self {
            classes: DashMap::new(),
            handles,
        }
    }

    /// Register (or replace) a native class under `name`.
    ///
    /// Returns the previously registered address, if any.
    pub fn register(&self, name: impl Into<String>, class: *const c_void) -> Option<usize> {
        let name = name.into();
        let address = class as usize;
        if address != 0 {
            let handle = self.handles.intern(address, HandleKind::Class);
            // Just interned, so it resolves
            let _ = self.handles.pin(handle);
        }
        debug!(target: "scriptblock::globals", name = %name, "registered native class");
        let previous = self.classes.insert(name, address);
        if let Some(previous) = previous {
            self.unpin(previous);
        }
        previous
    }

    /// Remove a class registration
    pub fn unregister(&self, name: &str) -> bool {
        match self.classes.remove(name) {
            Some((_, address)) => {
                self.unpin(address);
                true
            }
            None => false,
        }
    }

    fn unpin(&self, address: usize) {
        if address != 0 {
            self.handles
                .unpin(NativeHandle::new(address as u64, HandleKind::Class));
        }
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolve a global name the engine does not know.
    ///
    /// Returns a class handle for registered names, `None` for unknown names
    /// and for `Object`.
    pub fn resolve_global(&self, name: &str) -> Option<ScriptValue> {
        if name == RESERVED_GLOBAL {
            return None;
        }
        let address = *self.classes.get(name)?;
        if address == 0 {
            return None;
        }
        Some(ScriptValue::Handle(self.handles.intern(address, HandleKind::Class)))
    }
}
