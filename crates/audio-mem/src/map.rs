//! Buffer attach/map sequencing.
//!
//! Mapping walks the exporter protocol in order and unwinds every completed
//! step on failure, so a failed import leaves the exporter exactly as it was
//! found.

use alloc::sync::Arc;

use crate::buf::{DmaBuf, SgTable};
use crate::config::AudioMemConfig;
use crate::AudioMemError;

/// A buffer attached to the audio context bank.
pub struct MappedBuffer {
    pub buf: Arc<dyn DmaBuf>,
    pub sg: SgTable,
    /// Device address handed to the DSP. Includes the SMMU stream ID bits on
    /// translated targets.
    pub device_addr: u64,
    /// Kernel virtual address when CPU access was requested.
    pub kernel_addr: Option<u64>,
    pub len: usize,
}

impl core::fmt::Debug for MappedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedBuffer")
            .field("device_addr", &self.device_addr)
            .field("kernel_addr", &self.kernel_addr)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Attach and map `buf`, optionally mapping it for CPU access as well.
///
/// On SMMU targets the stream ID bits are folded into the returned device
/// address, so the DSP can route the access through the right context bank.
pub fn map_buffer(
    cfg: &AudioMemConfig,
    buf: Arc<dyn DmaBuf>,
    cpu_access: bool,
) -> Result<MappedBuffer, AudioMemError> {
    buf.attach()?;

    let sg = match buf.map_attachment() {
        Ok(sg) => sg,
        Err(e) => {
            buf.detach();
            return Err(e);
        }
    };
    let Some(base) = sg.base_addr() else {
        buf.unmap_attachment();
        buf.detach();
        return Err(AudioMemError::MapFailed);
    };

    let mut device_addr = base;
    if cfg.smmu_enabled() {
        device_addr |= cfg.sid_bits();
    }

    let kernel_addr = if cpu_access {
        match map_cpu(buf.as_ref()) {
            Ok(vaddr) => Some(vaddr),
            Err(e) => {
                buf.unmap_attachment();
                buf.detach();
                return Err(e);
            }
        }
    } else {
        None
    };

    let len = buf.len();
    log::debug!(
        "[AUDIO-MEM] mapped buffer device_addr=0x{device_addr:x} len={len} cpu={cpu_access}"
    );
    Ok(MappedBuffer {
        buf,
        sg,
        device_addr,
        kernel_addr,
        len,
    })
}

fn map_cpu(buf: &dyn DmaBuf) -> Result<u64, AudioMemError> {
    buf.begin_cpu_access()?;
    match buf.vmap() {
        Ok(vaddr) => Ok(vaddr),
        Err(e) => {
            buf.end_cpu_access();
            Err(e)
        }
    }
}

/// Release a mapping, reversing every step `map_buffer` performed.
pub fn unmap_buffer(mapping: &MappedBuffer) {
    if mapping.kernel_addr.is_some() {
        mapping.buf.vunmap();
        mapping.buf.end_cpu_access();
    }
    mapping.buf.unmap_attachment();
    mapping.buf.detach();
}
