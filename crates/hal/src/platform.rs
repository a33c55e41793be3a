//! Platform services surrounding hardware programming.
//!
//! The camera PHY cannot touch its registers without first voting for
//! interconnect bandwidth and enabling its platform resources; secure
//! streaming additionally requires a fuse-gated notification to the security
//! controller. These are external collaborators, modeled as traits so the
//! drivers stay testable.

use crate::HalError;

/// Absolute AHB clock vote levels, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AhbLevel {
    Suspend,
    LowSvs,
    Svs,
    Nominal,
    Turbo,
}

/// AXI bandwidth request for one traffic path, in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiVote {
    pub camnoc_bw: u64,
    pub mnoc_ab_bw: u64,
    pub mnoc_ib_bw: u64,
}

/// Default AXI bandwidth used while a PHY is streaming.
pub const DEFAULT_AXI_BW: u64 = 1024;

impl AxiVote {
    /// The vote issued on every PHY start.
    pub const fn default_camera() -> Self {
        Self {
            camnoc_bw: DEFAULT_AXI_BW,
            mnoc_ab_bw: DEFAULT_AXI_BW,
            mnoc_ib_bw: DEFAULT_AXI_BW,
        }
    }
}

/// Interconnect bandwidth arbiter.
///
/// `start` and `stop` bracket hardware use; every successful `start` must be
/// matched by a `stop`, including on error paths.
pub trait BandwidthVoter: Send + Sync {
    fn start(&self, ahb: AhbLevel, axi: &AxiVote) -> Result<(), HalError>;
    fn stop(&self) -> Result<(), HalError>;
}

/// Secure-camera capability and secure-mode notification.
pub trait SecurityController: Send + Sync {
    /// Whether the secure-camera fuse is blown on this part. Secure-mode
    /// streaming must be refused when it is not.
    fn secure_camera_supported(&self) -> bool;

    /// Tell the security controller that the lanes covered by
    /// `protection_mask` enter (`secure == true`) or leave secure mode.
    fn notify_secure_mode(&self, secure: bool, protection_mask: u64) -> Result<(), HalError>;
}

/// Clock/regulator sequencing for one hardware instance.
pub trait PlatformPower: Send + Sync {
    fn enable(&self) -> Result<(), HalError>;
    fn disable(&self) -> Result<(), HalError>;
}
