//! MIPI CSI PHY lane configuration driver.
//!
//! A CSI PHY instance terminates the serial link from one or two camera
//! sensors and hands pixel data to the CSID. This crate owns the instance
//! lifecycle: userspace acquires the PHY (standalone or in combo mode for two
//! sensors), accumulates a lane configuration, and starts streaming, which
//! votes for interconnect bandwidth, powers the block, and programs the
//! per-lane register tables. Secure streams additionally gate on the secure
//! camera fuse and notify the security controller with a per-PHY lane
//! protection mask.
//!
//! Register programming is table driven and versioned per PHY revision; see
//! [`regs`]. The pure lane-mask arithmetic (enable bitmaps, secure repack,
//! settle counts) lives in [`lane`].

#![no_std]

extern crate alloc;

pub mod device;
pub mod ioctl;
pub mod lane;
pub mod regs;

pub use device::{AcquireParams, CsiphyConfig, CsiphyDevice, CsiphyQueryCap, CsiphyState};
pub use regs::{CsiphyCtrlRegs, HwVersion};

use mln_error::define_driver_error;
use mln_hal::HalError;

define_driver_error! {
    /// Failures reported by the CSI PHY driver.
    pub enum CsiphyError(0x03) {
        /// Operation not allowed in the current state.
        InvalidState = 0x01 => "Operation not allowed in current state",
        /// Both acquisition slots are in use or the requested slot is taken.
        SlotsExhausted = 0x02 => "Acquisition slot unavailable",
        /// The device handle does not name a held slot.
        InvalidHandle = 0x03 => "Invalid device handle",
        /// The accumulated lane configuration is unusable.
        InvalidLaneConfig = 0x04 => "Invalid lane configuration",
        /// Secure mode requested but the secure camera fuse is not blown.
        SecureUnsupported = 0x05 => "Secure camera not supported",
        /// An ioctl payload was too short for its command.
        CopyFault = 0x06 => "Ioctl payload truncated",
        /// Unrecognized ioctl command.
        UnknownCommand = 0x07 => "Unknown ioctl command",
        /// A platform service call failed.
        Hal(HalError) = 0x08 => "Platform service failed",
    }
}
