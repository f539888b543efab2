//! Native pointer handles
//!
//! A handle's id is the native address itself, so the same pointer always
//! yields an equal handle whatever type it was declared with, and resolving a
//! handle gives back the original address.
//!
//! The table only records which addresses have crossed into script, so that
//! a script cannot hand native code an address it never received. It is
//! bounded: once it holds more than `capacity` addresses, those not seen in
//! the most recent `capacity / 2` crossings are forgotten unless pinned.
//! A forgotten handle still compares equal to a fresh one for the same
//! pointer, but resolves with `MarshalError::UnknownHandle` until the pointer
//! crosses again.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use scriptblock_sdk::{HandleKind, MarshalError, MarshalResult, NativeHandle};
use tracing::debug;

use crate::options::DEFAULT_HANDLE_CAPACITY;

#[derive(Debug)]
struct Entry {
    last_seen: u64,
    pins: usize,
}

/// Bounded table of addresses known to script
#[derive(Debug)]
pub struct HandleTable {
    entries: DashMap<usize, Entry>,
    capacity: usize,
    clock: AtomicU64,
}

impl HandleTable {
    /// Create an empty table with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HANDLE_CAPACITY)
    }

    /// Create an empty table that sweeps once it exceeds `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    /// Handle for a native address crossing into script
    pub fn intern(&self, address: usize, kind: HandleKind) -> NativeHandle {
        let now = self.tick();
        self.entries
            .entry(address)
            .and_modify(|entry| entry.last_seen = now)
            .or_insert(Entry {
                last_seen: now,
                pins: 0,
            });

        if self.entries.len() > self.capacity {
            self.sweep(now);
        }
        NativeHandle::new(address as u64, kind)
    }

    /// Resolve a handle back to its native address
    pub fn resolve(&self, handle: NativeHandle) -> MarshalResult<usize> {
        let unknown = MarshalError::UnknownHandle(handle.id());
        let address = usize::try_from(handle.id()).map_err(|_| unknown.clone())?;
        let now = self.tick();
        match self.entries.get_mut(&address) {
            Some(mut entry) => {
                entry.last_seen = now;
                Ok(address)
            }
            None => Err(unknown),
        }
    }

    /// Keep a handle resolvable across sweeps until a matching `unpin`
    pub fn pin(&self, handle: NativeHandle) -> MarshalResult<()> {
        let address = self.resolve(handle)?;
        if let Some(mut entry) = self.entries.get_mut(&address) {
            entry.pins += 1;
        }
        Ok(())
    }

    /// Undo one `pin`. Returns false if the handle was not pinned.
    pub fn unpin(&self, handle: NativeHandle) -> bool {
        let Ok(address) = usize::try_from(handle.id()) else {
            return false;
        };
        match self.entries.get_mut(&address) {
            Some(mut entry) if entry.pins > 0 => {
                entry.pins -= 1;
                true
            }
            _ => false,
        }
    }

    /// Forget an address now, pinned or not; later lookups of its handle fail
    pub fn release(&self, address: usize) -> bool {
        self.entries.remove(&address).is_some()
    }

    /// Number of addresses currently resolvable
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no addresses are resolvable
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry count above which the table sweeps
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn sweep(&self, now: u64) {
        let window = (self.capacity / 2).max(1) as u64;
        let horizon = now.saturating_sub(window);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.pins > 0 || entry.last_seen > horizon);
        debug!(
            target: "scriptblock::handles",
            before,
            after = self.entries.len(),
            "swept handle table"
        );
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
