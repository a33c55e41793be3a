//! Privileged physical-memory ownership transfer.
//!
//! On Marlin-class SoCs, physical pages are owned by exactly one set of
//! execution domains at a time. Handing a buffer to a co-processor (audio
//! DSP, modem, sensor DSP) means a hypervisor call that re-assigns the pages
//! from the current owners to the new ones. The call is one-shot: a negative
//! result means nothing changed, and there is no retry or timeout at this
//! layer.

use bitflags::bitflags;

use crate::HalError;

/// Virtual machine identifiers understood by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Vmid {
    /// No valid owner; used for unmapped lookups.
    Invalid = 0x0,
    /// The high-level OS itself.
    Hlos = 0x3,
    /// Sensor DSP Q6 core.
    SscQ6 = 0x5,
    /// Audio DSP Q6 core.
    AdspQ6 = 0x6,
    /// Modem subsystem (MSA partition).
    MssMsa = 0xF,
    /// Low-power audio subsystem.
    Lpass = 0x16,
    /// Audio DSP heap carve-out.
    AdspHeap = 0x19,
}

bitflags! {
    /// Access permissions granted to a destination domain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemPerm: u32 {
        const EXEC = 0x1;
        const WRITE = 0x2;
        const READ = 0x4;
    }
}

impl MemPerm {
    /// Read + write, the grant used for shared data buffers.
    pub const RW: Self = Self::READ.union(Self::WRITE);
    /// Read + write + execute, the grant used when handing pages back to the
    /// high-level OS.
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXEC);
}

/// A destination domain together with the permissions it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmPerm {
    pub vmid: Vmid,
    pub perm: MemPerm,
}

impl VmPerm {
    pub const fn new(vmid: Vmid, perm: MemPerm) -> Self {
        Self { vmid, perm }
    }
}

/// The privileged ownership-transfer service.
///
/// One call covers the whole transfer: every domain in `src` gives up the
/// region, every entry in `dst` receives it with the listed permissions.
/// Implementations must not retry; a failure leaves ownership untouched and
/// is reported as [`HalError::HypCallFailed`].
pub trait Hypervisor: Send + Sync {
    fn assign_phys(
        &self,
        paddr: u64,
        len: usize,
        src: &[Vmid],
        dst: &[VmPerm],
    ) -> Result<(), HalError>;
}
