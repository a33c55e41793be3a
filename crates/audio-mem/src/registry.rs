//! Per-fd mapping registry.
//!
//! Every successfully imported buffer is registered under its fd so later
//! ioctls (address lookup, ownership grants, unmap) can resolve it. One entry
//! per fd; importing the same fd again is rejected without touching the
//! existing entry.

use alloc::vec::Vec;

use hashbrown::HashMap;
use spin::Mutex;

use crate::map::MappedBuffer;

/// A registered buffer together with its grant state.
pub struct FdEntry {
    pub mapping: MappedBuffer,
    /// GPR domain mask of the last subsystem grant, zero when none.
    pub ss_masks: u64,
    /// Whether the buffer is currently granted away from the HLOS.
    pub hyp_assigned: bool,
}

/// Resolved addresses of a registered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufAddr {
    pub device_addr: u64,
    pub kernel_addr: Option<u64>,
    pub len: usize,
}

#[derive(Default)]
pub struct FdRegistry {
    entries: Mutex<HashMap<i32, FdEntry>>,
}

impl FdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh mapping under `fd`. If the fd is already registered
    /// the existing entry is left untouched and the rejected mapping is
    /// handed back so the caller can unwind it.
    pub fn insert(&self, fd: i32, mapping: MappedBuffer) -> Result<(), MappedBuffer> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&fd) {
            log::error!("[AUDIO-MEM] fd {fd} already registered");
            return Err(mapping);
        }
        entries.insert(
            fd,
            FdEntry {
                mapping,
                ss_masks: 0,
                hyp_assigned: false,
            },
        );
        Ok(())
    }

    pub fn remove(&self, fd: i32) -> Option<FdEntry> {
        self.entries.lock().remove(&fd)
    }

    /// Device/kernel addresses and length of the buffer registered for `fd`.
    pub fn addr(&self, fd: i32) -> Option<BufAddr> {
        self.entries.lock().get(&fd).map(|e| BufAddr {
            device_addr: e.mapping.device_addr,
            kernel_addr: e.mapping.kernel_addr,
            len: e.mapping.len,
        })
    }

    /// Run `f` on the entry for `fd` while the registry lock is held.
    pub fn with_entry_mut<R>(&self, fd: i32, f: impl FnOnce(&mut FdEntry) -> R) -> Option<R> {
        self.entries.lock().get_mut(&fd).map(f)
    }

    /// Remove and return every entry. Used by the crash sweep.
    pub fn drain(&self) -> Vec<(i32, FdEntry)> {
        self.entries.lock().drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
