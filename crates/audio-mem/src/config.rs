//! Probe-time configuration.
//!
//! Mirrors the platform description the driver is instantiated from: whether
//! the audio context bank sits behind an SMMU (and with which stream ID), and
//! whether a reserved carve-out region must be granted to the audio
//! subsystems at probe.

/// Bit position of the SMMU stream ID inside a 64-bit device address.
pub const SMMU_SID_OFFSET: u32 = 32;

/// SMMU parameters for the audio context bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmmuConfig {
    pub version: u32,
    /// Stream ID from the IOMMU specifier.
    pub sid: u64,
    /// Mask applied to the stream ID before it is folded into device
    /// addresses. All-ones when the platform does not narrow it.
    pub sid_mask: u64,
}

impl SmmuConfig {
    pub const fn new(version: u32, sid: u64) -> Self {
        Self {
            version,
            sid,
            sid_mask: u64::MAX,
        }
    }

    /// The stream ID bits folded into every IOVA handed to the DSP.
    pub const fn sid_bits(&self) -> u64 {
        (self.sid & self.sid_mask) << SMMU_SID_OFFSET
    }
}

/// A reserved physical region granted to the audio subsystems for the
/// lifetime of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarveoutRegion {
    pub base: u64,
    pub len: usize,
}

/// Full probe-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioMemConfig {
    /// Present when the context bank is SMMU-translated. Buffers then map to
    /// IOVAs with the stream ID folded in.
    pub smmu: Option<SmmuConfig>,
    /// Whether the platform supports memory-protection calls. Required for
    /// the probe-time carve-out grant on non-SMMU targets.
    pub scm_mp_enabled: bool,
    /// Platform performs no ownership transfers; grant and reclaim requests
    /// become logged no-ops.
    pub non_hyp_assign: bool,
    /// Reserved region to grant at probe on non-SMMU targets.
    pub carveout: Option<CarveoutRegion>,
}

impl AudioMemConfig {
    pub const fn smmu_enabled(&self) -> bool {
        self.smmu.is_some()
    }

    /// Stream ID bits to fold into device addresses; zero without an SMMU.
    pub fn sid_bits(&self) -> u64 {
        self.smmu.map_or(0, |s| s.sid_bits())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sid_bits_fold_masked_sid_into_high_word() {
        let smmu = SmmuConfig {
            version: 2,
            sid: 0x1234_5678,
            sid_mask: 0xFF,
        };
        assert_eq!(smmu.sid_bits(), 0x78 << 32);
    }

    #[test]
    fn default_mask_keeps_full_sid() {
        let smmu = SmmuConfig::new(2, 0x5);
        assert_eq!(smmu.sid_bits(), 0x5 << 32);
    }

    #[test]
    fn config_without_smmu_has_no_sid_bits() {
        let cfg = AudioMemConfig::default();
        assert!(!cfg.smmu_enabled());
        assert_eq!(cfg.sid_bits(), 0);
    }
}
