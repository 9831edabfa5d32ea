/*!
 * Socket Handle Table
 * Process-wide registry mapping opaque handles to backend socket state
 */

use super::address::Address;
use super::state::SocketState;
use crate::core::limits::{DEFAULT_MAX_OPEN_HANDLES, EMFILE, FIRST_SOCKET_HANDLE};
use crate::core::{Handle, SocketError, SocketResult};
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Mutable per-handle bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketMeta {
    pub state: SocketState,
    pub local: Option<Address>,
    pub peer: Option<Address>,
}

impl SocketMeta {
    pub fn closed() -> Self {
        Self {
            state: SocketState::Closed,
            local: None,
            peer: None,
        }
    }

    pub fn connected(local: Option<Address>, peer: Address) -> Self {
        Self {
            state: SocketState::Connected,
            local,
            peer: Some(peer),
        }
    }
}

/// One open socket: the backend's socket plus its lifecycle metadata
///
/// The metadata lock is only held for state checks and updates, never across
/// a backend call.
pub struct SocketEntry<S> {
    handle: Handle,
    socket: S,
    meta: Mutex<SocketMeta>,
}

impl<S> SocketEntry<S> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn meta(&self) -> SocketMeta {
        *self.meta.lock()
    }

    pub fn state(&self) -> SocketState {
        self.meta.lock().state
    }

    /// Apply `f` to the metadata under its lock
    pub fn update<R>(&self, f: impl FnOnce(&mut SocketMeta) -> R) -> R {
        f(&mut self.meta.lock())
    }
}

/// Open-handle counts by lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub closed: usize,
    pub bound: usize,
    pub listening: usize,
    pub connected: usize,
    pub allocated_total: u64,
}

impl TableStats {
    pub fn open_handles(&self) -> usize {
        self.closed + self.bound + self.listening + self.connected
    }
}

struct Slots<S> {
    next_handle: Handle,
    allocated_total: u64,
    entries: HashMap<Handle, Arc<SocketEntry<S>>, RandomState>,
}

/// Handle table guarded by a single table-wide lock
///
/// Handles are allocated monotonically and never recycled, so a released
/// handle stays invalid for the lifetime of the process.
pub struct HandleTable<S> {
    slots: Mutex<Slots<S>>,
    max_open: usize,
}

impl<S> HandleTable<S> {
    pub fn new() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_OPEN_HANDLES)
    }

    pub fn with_capacity_limit(max_open: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                next_handle: FIRST_SOCKET_HANDLE,
                allocated_total: 0,
                entries: HashMap::with_hasher(RandomState::new()),
            }),
            max_open,
        }
    }

    /// Register a backend socket and hand out a fresh handle
    pub fn insert(&self, socket: S, meta: SocketMeta) -> SocketResult<Handle> {
        let mut slots = self.slots.lock();
        if slots.entries.len() >= self.max_open || slots.next_handle == Handle::MAX {
            return Err(SocketError::CreateFailed { code: EMFILE });
        }

        let handle = slots.next_handle;
        slots.next_handle += 1;
        slots.allocated_total += 1;
        slots.entries.insert(
            handle,
            Arc::new(SocketEntry {
                handle,
                socket,
                meta: Mutex::new(meta),
            }),
        );
        trace!(handle, open = slots.entries.len(), "allocated socket handle");
        Ok(handle)
    }

    pub fn lookup(&self, handle: Handle) -> SocketResult<Arc<SocketEntry<S>>> {
        self.slots
            .lock()
            .entries
            .get(&handle)
            .cloned()
            .ok_or(SocketError::InvalidHandle { handle })
    }

    /// Remove a handle, making it permanently invalid
    pub fn release(&self, handle: Handle) -> SocketResult<Arc<SocketEntry<S>>> {
        let mut slots = self.slots.lock();
        let entry = slots
            .entries
            .remove(&handle)
            .ok_or(SocketError::InvalidHandle { handle })?;
        trace!(handle, open = slots.entries.len(), "released socket handle");
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.lock().entries.contains_key(&handle)
    }

    pub fn stats(&self) -> TableStats {
        let slots = self.slots.lock();
        let mut stats = TableStats {
            allocated_total: slots.allocated_total,
            ..TableStats::default()
        };
        for entry in slots.entries.values() {
            match entry.state() {
                SocketState::Closed => stats.closed += 1,
                SocketState::Bound => stats.bound += 1,
                SocketState::Listening => stats.listening += 1,
                SocketState::Connected => stats.connected += 1,
                SocketState::Shutdown => {}
            }
        }
        stats
    }
}

impl<S> Default for HandleTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
