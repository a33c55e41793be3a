//! Hardware abstraction seams for the Marlin SoC driver crates.
//!
//! Driver logic never touches platform services directly; it goes through the
//! traits defined here:
//! - [`MmioRegion`] - ordered register access with post-write settle delays
//! - [`Hypervisor`] - privileged physical-memory ownership transfer between
//!   execution domains
//! - [`BandwidthVoter`] - interconnect bandwidth voting around hardware use
//! - [`SecurityController`] - secure-camera capability query and secure-mode
//!   notification
//! - [`PlatformPower`] - platform resource (clock/regulator) sequencing
//!
//! The `mock` feature provides recording fakes for all of these so driver
//! state machines can be tested on the host.

#![no_std]

extern crate alloc;

pub mod hyp;
pub mod mmio;
pub mod platform;

#[cfg(feature = "mock")]
pub mod mock;

pub use hyp::{Hypervisor, MemPerm, VmPerm, Vmid};
pub use mmio::MmioRegion;
pub use platform::{AhbLevel, AxiVote, BandwidthVoter, PlatformPower, SecurityController};

use mln_error::define_driver_error;

define_driver_error! {
    /// Failures reported by platform services behind the HAL traits.
    pub enum HalError(0x01) {
        /// The privileged ownership-transfer call returned a failure.
        HypCallFailed = 0x01 => "Privileged assign call failed",
        /// The bandwidth arbiter rejected the vote.
        VoteFailed = 0x02 => "Bandwidth vote rejected",
        /// Platform resource enable/disable failed.
        PowerFailed = 0x03 => "Platform resource toggle failed",
        /// The secure-mode notification was refused.
        SecureNotifyFailed = 0x04 => "Secure mode notification failed",
    }
}
