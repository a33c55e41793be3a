//! Shared DMA buffer management for the Marlin audio DSP.
//!
//! Userspace allocates audio buffers through the platform DMA heap and hands
//! the exporting fd to this driver, which attaches the buffer to the audio
//! context bank, resolves its device address (IOVA behind the SMMU, raw
//! physical otherwise), optionally grants the pages to remote subsystems via
//! the hypervisor, and keeps a per-fd registry so later calls can resolve the
//! same buffer.
//!
//! Ownership grants come in two shapes:
//! - the classic grant, which shares a buffer with the low-power audio
//!   subsystem and the ADSP heap domain
//! - the subsystem grant, which shares a buffer with an arbitrary set of GPR
//!   domains (modem, ADSP, sensor DSP, apps) for multi-DSP framework use
//!
//! A userspace crash is cleaned up by [`AudioMemDriver::crash_handler`],
//! which reclaims and releases every registered buffer.

#![no_std]

extern crate alloc;

pub mod buf;
pub mod config;
pub mod driver;
pub mod hyp;
pub mod ioctl;
pub mod map;
pub mod registry;

pub use buf::{DmaBuf, DmaBufProvider, SgEntry, SgTable};
pub use config::{AudioMemConfig, CarveoutRegion, SmmuConfig};
pub use driver::AudioMemDriver;
pub use hyp::{GprDomain, UNRECLAIMABLE_SS_MASK};

use mln_error::define_driver_error;
use mln_hal::HalError;

define_driver_error! {
    /// Failures reported by the audio memory driver.
    pub enum AudioMemError(0x02) {
        /// A parameter was rejected, including re-importing an fd that is
        /// already registered.
        InvalidArgument = 0x01 => "Invalid argument",
        /// No registered buffer for the given fd.
        NotFound = 0x02 => "No buffer registered for fd",
        /// The driver is not ready; the caller should retry after the audio
        /// DSP comes up.
        ProbeDeferred = 0x03 => "Driver not ready, retry later",
        /// Attaching or mapping the DMA buffer failed.
        MapFailed = 0x04 => "DMA buffer mapping failed",
        /// An ioctl payload was too short for its command.
        CopyFault = 0x05 => "Ioctl payload truncated",
        /// Unrecognized ioctl command.
        UnknownCommand = 0x06 => "Unknown ioctl command",
        /// The privileged ownership-transfer call failed.
        Hyp(HalError) = 0x07 => "Ownership transfer failed",
    }
}

#[cfg(test)]
pub(crate) mod testutil;
