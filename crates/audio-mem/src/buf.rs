//! Exported DMA buffer seam.
//!
//! The platform exposes shared buffers as kernel objects behind file
//! descriptors. The driver never owns the pages; it attaches to the exporter,
//! asks for the scatter-gather mapping, and optionally maps the buffer into
//! the kernel address space for CPU access. Those exporter operations are a
//! trait here so the registry and grant logic can be exercised without a
//! platform underneath.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::AudioMemError;

/// One physically contiguous run of a mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgEntry {
    pub addr: u64,
    pub len: usize,
}

/// Scatter-gather mapping of an attached buffer, as seen by the audio
/// context bank.
#[derive(Debug, Clone, Default)]
pub struct SgTable {
    pub entries: Vec<SgEntry>,
}

impl SgTable {
    pub fn contiguous(addr: u64, len: usize) -> Self {
        Self {
            entries: alloc::vec![SgEntry { addr, len }],
        }
    }

    /// Device address of the first entry. Audio buffers are mapped
    /// contiguously in device address space, so this is the buffer base.
    pub fn base_addr(&self) -> Option<u64> {
        self.entries.first().map(|e| e.addr)
    }

    pub fn total_len(&self) -> usize {
        self.entries.iter().map(|e| e.len).sum()
    }
}

/// An exported DMA buffer resolved from an fd.
///
/// Call order is fixed: `attach`, then `map_attachment`; for CPU access,
/// `begin_cpu_access` then `vmap`. Teardown runs the same steps in reverse.
/// All transfers are bidirectional since the same buffer carries both
/// playback and capture data.
pub trait DmaBuf: Send + Sync {
    /// Size of the buffer in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attach the buffer to the audio context bank device.
    fn attach(&self) -> Result<(), AudioMemError>;

    /// Map the attachment and return the scatter-gather table.
    fn map_attachment(&self) -> Result<SgTable, AudioMemError>;

    fn unmap_attachment(&self);

    fn detach(&self);

    /// Invalidate caches ahead of CPU access.
    fn begin_cpu_access(&self) -> Result<(), AudioMemError>;

    fn end_cpu_access(&self);

    /// Map the buffer into the kernel address space, returning the kernel
    /// virtual address.
    fn vmap(&self) -> Result<u64, AudioMemError>;

    fn vunmap(&self);
}

/// Resolves fds to exported buffers.
pub trait DmaBufProvider: Send + Sync {
    fn get(&self, fd: i32) -> Result<Arc<dyn DmaBuf>, AudioMemError>;
}
