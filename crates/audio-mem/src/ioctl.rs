//! Userspace command surface.
//!
//! Commands arrive as an opcode plus a raw payload. Payloads are fixed-layout
//! little-endian structs validated with zerocopy; a payload shorter than its
//! command's struct is a copy fault. The map command writes the resolved
//! addresses back into its payload.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::driver::AudioMemDriver;
use crate::AudioMemError;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IoctlCmd {
    MapPhysAddr = 1,
    UnmapPhysAddr = 2,
    MapHypAssign = 3,
    UnmapHypAssign = 4,
    MapHypAssignV2 = 5,
    UnmapHypAssignV2 = 6,
}

impl IoctlCmd {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::MapPhysAddr),
            2 => Some(Self::UnmapPhysAddr),
            3 => Some(Self::MapHypAssign),
            4 => Some(Self::UnmapHypAssign),
            5 => Some(Self::MapHypAssignV2),
            6 => Some(Self::UnmapHypAssignV2),
            _ => None,
        }
    }
}

/// Payload of [`IoctlCmd::MapPhysAddr`]. `fd` in, addresses out.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct MapCmd {
    pub fd: i32,
    _reserved: u32,
    pub device_addr: u64,
    pub len: u64,
}

impl MapCmd {
    pub fn new(fd: i32) -> Self {
        Self {
            fd,
            _reserved: 0,
            device_addr: 0,
            len: 0,
        }
    }
}

/// Payload of the fd-only commands.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct FdCmd {
    pub fd: i32,
}

/// Payload of the subsystem grant commands.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct SubsystemCmd {
    pub fd: i32,
    _reserved: u32,
    pub ss_masks: u64,
}

impl SubsystemCmd {
    pub fn new(fd: i32, ss_masks: u64) -> Self {
        Self {
            fd,
            _reserved: 0,
            ss_masks,
        }
    }
}

fn read_cmd<T: FromBytes>(payload: &[u8]) -> Result<T, AudioMemError> {
    T::read_from_prefix(payload).ok_or(AudioMemError::CopyFault)
}

/// Decode and execute one command against `driver`.
pub fn dispatch(
    driver: &AudioMemDriver,
    raw_cmd: u32,
    payload: &mut [u8],
) -> Result<(), AudioMemError> {
    let Some(cmd) = IoctlCmd::from_raw(raw_cmd) else {
        log::error!("[AUDIO-MEM] unknown ioctl {raw_cmd}");
        return Err(AudioMemError::UnknownCommand);
    };
    log::debug!("[AUDIO-MEM] ioctl {cmd:?}");
    match cmd {
        IoctlCmd::MapPhysAddr => {
            let mut req: MapCmd = read_cmd(payload)?;
            let addr = driver.map_fd(req.fd)?;
            req.device_addr = addr.device_addr;
            req.len = addr.len as u64;
            req.write_to_prefix(payload)
                .ok_or(AudioMemError::CopyFault)?;
            Ok(())
        }
        IoctlCmd::UnmapPhysAddr => {
            let req: FdCmd = read_cmd(payload)?;
            driver.unmap_fd(req.fd)
        }
        IoctlCmd::MapHypAssign => {
            let req: FdCmd = read_cmd(payload)?;
            driver.grant_dsp(req.fd)
        }
        IoctlCmd::UnmapHypAssign => {
            let req: FdCmd = read_cmd(payload)?;
            driver.reclaim_dsp(req.fd)
        }
        IoctlCmd::MapHypAssignV2 => {
            let req: SubsystemCmd = read_cmd(payload)?;
            driver.grant_subsystems(req.fd, req.ss_masks)
        }
        IoctlCmd::UnmapHypAssignV2 => {
            let req: SubsystemCmd = read_cmd(payload)?;
            driver.reclaim_subsystems(req.fd, req.ss_masks)
        }
    }
}
