//! Ownership grant plumbing.
//!
//! Builds the source/destination domain lists for each grant shape and issues
//! the privileged transfer. State bookkeeping (grant flags, masks) lives with
//! the registry in [`crate::driver`]; this module only talks to the
//! hypervisor.

use alloc::vec::Vec;

use mln_hal::{Hypervisor, MemPerm, VmPerm, Vmid};

use crate::config::CarveoutRegion;
use crate::AudioMemError;

/// Subsystem mask whose grants cannot be reclaimed: memory handed to the
/// modem, ADSP and sensor DSP together stays with them until reboot, a known
/// limitation of the trusted firmware. Reclaim requests carrying exactly this
/// mask are accepted and skipped.
pub const UNRECLAIMABLE_SS_MASK: u64 =
    GprDomain::Modem.bit() | GprDomain::Adsp.bit() | GprDomain::Sdsp.bit();

/// GPR routing domains addressable by a subsystem grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GprDomain {
    Modem = 1,
    Adsp = 2,
    Apps = 3,
    Sdsp = 4,
}

impl GprDomain {
    pub const ALL: [Self; 4] = [Self::Modem, Self::Adsp, Self::Apps, Self::Sdsp];

    /// Position of this domain in a subsystem mask.
    pub const fn bit(self) -> u64 {
        1 << (self as u64 - 1)
    }

    /// The hypervisor domain that receives grants for this GPR domain.
    pub const fn vmid(self) -> Vmid {
        match self {
            Self::Modem => Vmid::MssMsa,
            Self::Adsp => Vmid::AdspQ6,
            Self::Apps => Vmid::Hlos,
            Self::Sdsp => Vmid::SscQ6,
        }
    }
}

fn subsystem_vmids(ss_masks: u64) -> Vec<Vmid> {
    GprDomain::ALL
        .into_iter()
        .filter(|d| ss_masks & d.bit() != 0)
        .map(GprDomain::vmid)
        .collect()
}

/// Grant a buffer to the audio DSP domains (classic grant shape).
pub(crate) fn grant_to_dsp(
    hyp: &dyn Hypervisor,
    paddr: u64,
    len: usize,
) -> Result<(), AudioMemError> {
    hyp.assign_phys(
        paddr,
        len,
        &[Vmid::Hlos],
        &[
            VmPerm::new(Vmid::Lpass, MemPerm::RW),
            VmPerm::new(Vmid::AdspHeap, MemPerm::RW),
        ],
    )?;
    log::debug!("[AUDIO-MEM] granted 0x{paddr:x}+{len} to audio DSP");
    Ok(())
}

/// Reclaim a classic grant back to the HLOS.
pub(crate) fn reclaim_from_dsp(
    hyp: &dyn Hypervisor,
    paddr: u64,
    len: usize,
) -> Result<(), AudioMemError> {
    hyp.assign_phys(
        paddr,
        len,
        &[Vmid::Lpass, Vmid::AdspHeap],
        &[VmPerm::new(Vmid::Hlos, MemPerm::RWX)],
    )?;
    log::debug!("[AUDIO-MEM] reclaimed 0x{paddr:x}+{len} from audio DSP");
    Ok(())
}

/// Grant a buffer to every subsystem named in `ss_masks`.
pub(crate) fn grant_to_subsystems(
    hyp: &dyn Hypervisor,
    paddr: u64,
    len: usize,
    ss_masks: u64,
) -> Result<(), AudioMemError> {
    let dst: Vec<VmPerm> = subsystem_vmids(ss_masks)
        .into_iter()
        .map(|vmid| VmPerm::new(vmid, MemPerm::RWX))
        .collect();
    if dst.is_empty() {
        log::error!("[AUDIO-MEM] subsystem grant with empty mask 0x{ss_masks:x}");
        return Err(AudioMemError::InvalidArgument);
    }
    hyp.assign_phys(paddr, len, &[Vmid::Hlos], &dst)?;
    log::debug!("[AUDIO-MEM] granted 0x{paddr:x}+{len} to subsystems 0x{ss_masks:x}");
    Ok(())
}

/// Reclaim a subsystem grant back to the HLOS.
///
/// Callers must filter out [`UNRECLAIMABLE_SS_MASK`] before getting here.
pub(crate) fn reclaim_from_subsystems(
    hyp: &dyn Hypervisor,
    paddr: u64,
    len: usize,
    ss_masks: u64,
) -> Result<(), AudioMemError> {
    let src = subsystem_vmids(ss_masks);
    if src.is_empty() {
        log::error!("[AUDIO-MEM] subsystem reclaim with empty mask 0x{ss_masks:x}");
        return Err(AudioMemError::InvalidArgument);
    }
    hyp.assign_phys(paddr, len, &src, &[VmPerm::new(Vmid::Hlos, MemPerm::RWX)])?;
    log::debug!("[AUDIO-MEM] reclaimed 0x{paddr:x}+{len} from subsystems 0x{ss_masks:x}");
    Ok(())
}

/// Probe-time grant of the reserved carve-out to the audio subsystems.
pub(crate) fn grant_carveout(
    hyp: &dyn Hypervisor,
    region: &CarveoutRegion,
) -> Result<(), AudioMemError> {
    hyp.assign_phys(
        region.base,
        region.len,
        &[Vmid::Hlos],
        &[
            VmPerm::new(Vmid::MssMsa, MemPerm::RW),
            VmPerm::new(Vmid::Lpass, MemPerm::RW),
            VmPerm::new(Vmid::AdspHeap, MemPerm::RW),
            VmPerm::new(Vmid::Hlos, MemPerm::RW),
        ],
    )?;
    log::info!(
        "[AUDIO-MEM] carve-out 0x{:x}+{} granted to audio subsystems",
        region.base,
        region.len
    );
    Ok(())
}

/// Return the carve-out to exclusive HLOS ownership at remove.
pub(crate) fn reclaim_carveout(
    hyp: &dyn Hypervisor,
    region: &CarveoutRegion,
) -> Result<(), AudioMemError> {
    hyp.assign_phys(
        region.base,
        region.len,
        &[Vmid::MssMsa, Vmid::Lpass, Vmid::AdspHeap, Vmid::Hlos],
        &[VmPerm::new(Vmid::Hlos, MemPerm::RWX)],
    )?;
    log::info!(
        "[AUDIO-MEM] carve-out 0x{:x}+{} reclaimed",
        region.base,
        region.len
    );
    Ok(())
}
