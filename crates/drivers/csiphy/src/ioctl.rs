//! Userspace command surface.
//!
//! Commands are an opcode plus a fixed-layout little-endian payload validated
//! with zerocopy. Query-cap and acquire write their results back into the
//! payload.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::device::{AcquireParams, CsiphyConfig, CsiphyDevice};
use crate::CsiphyError;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IoctlCmd {
    QueryCap = 1,
    Acquire = 2,
    Start = 3,
    Stop = 4,
    Config = 5,
    Release = 6,
    ConfigExternal = 7,
}

impl IoctlCmd {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::QueryCap),
            2 => Some(Self::Acquire),
            3 => Some(Self::Start),
            4 => Some(Self::Stop),
            5 => Some(Self::Config),
            6 => Some(Self::Release),
            7 => Some(Self::ConfigExternal),
            _ => None,
        }
    }
}

/// Reply payload of [`IoctlCmd::QueryCap`].
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct QueryCapCmd {
    pub phy_idx: u32,
    pub version: u32,
    pub clock_lane: u32,
    _reserved: u32,
}

/// Payload of [`IoctlCmd::Acquire`]. `combo_mode` in, `handle` out.
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct AcquireCmd {
    pub combo_mode: u32,
    pub handle: u32,
}

/// Payload of the handle-only commands.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct HandleCmd {
    pub handle: u32,
}

/// Payload of [`IoctlCmd::Config`] and [`IoctlCmd::ConfigExternal`].
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct ConfigCmd {
    pub handle: u32,
    pub lane_cnt: u32,
    pub lane_mask: u32,
    pub three_phase: u32,
    pub combo_mode: u32,
    pub secure_mode: u32,
    pub settle_time: u64,
    pub data_rate: u64,
}

impl From<&ConfigCmd> for CsiphyConfig {
    fn from(cmd: &ConfigCmd) -> Self {
        Self {
            lane_cnt: cmd.lane_cnt,
            lane_mask: cmd.lane_mask,
            three_phase: cmd.three_phase != 0,
            combo_mode: cmd.combo_mode != 0,
            secure_mode: cmd.secure_mode != 0,
            settle_time: cmd.settle_time,
            data_rate: cmd.data_rate,
        }
    }
}

fn read_cmd<T: FromBytes>(payload: &[u8]) -> Result<T, CsiphyError> {
    T::read_from_prefix(payload).ok_or(CsiphyError::CopyFault)
}

fn write_reply<T: AsBytes>(reply: &T, payload: &mut [u8]) -> Result<(), CsiphyError> {
    reply.write_to_prefix(payload).ok_or(CsiphyError::CopyFault)
}

/// Decode and execute one command against `dev`.
pub fn dispatch(
    dev: &CsiphyDevice,
    raw_cmd: u32,
    payload: &mut [u8],
) -> Result<(), CsiphyError> {
    let Some(cmd) = IoctlCmd::from_raw(raw_cmd) else {
        log::error!("[CSIPHY] unknown ioctl {raw_cmd}");
        return Err(CsiphyError::UnknownCommand);
    };
    log::debug!("[CSIPHY] ioctl {cmd:?}");
    match cmd {
        IoctlCmd::QueryCap => {
            let cap = dev.query_cap();
            let reply = QueryCapCmd {
                phy_idx: cap.phy_idx,
                version: cap.version,
                clock_lane: cap.clock_lane,
                _reserved: 0,
            };
            write_reply(&reply, payload)
        }
        IoctlCmd::Acquire => {
            let mut req: AcquireCmd = read_cmd(payload)?;
            req.handle = dev.acquire(AcquireParams {
                combo_mode: req.combo_mode != 0,
            })?;
            write_reply(&req, payload)
        }
        IoctlCmd::Start => {
            let req: HandleCmd = read_cmd(payload)?;
            dev.start(req.handle)
        }
        IoctlCmd::Stop => {
            let req: HandleCmd = read_cmd(payload)?;
            dev.stop(req.handle)
        }
        IoctlCmd::Config => {
            let req: ConfigCmd = read_cmd(payload)?;
            dev.config(req.handle, CsiphyConfig::from(&req))
        }
        IoctlCmd::Release => {
            let req: HandleCmd = read_cmd(payload)?;
            dev.release(req.handle)
        }
        IoctlCmd::ConfigExternal => {
            let req: ConfigCmd = read_cmd(payload)?;
            dev.external_config(req.handle, CsiphyConfig::from(&req))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::CsiphyState;
    use crate::regs::CSIPHY_V121_REGS;
    use alloc::sync::Arc;
    use mln_hal::mock::{MockMmio, MockPower, MockSecurity, MockVoter};

    fn device() -> (CsiphyDevice, Arc<MockMmio>) {
        let mmio = Arc::new(MockMmio::new());
        let dev = CsiphyDevice::new(
            0,
            &CSIPHY_V121_REGS,
            mmio.clone(),
            Arc::new(MockVoter::new()),
            Arc::new(MockSecurity::new(true)),
            Arc::new(MockPower::new()),
        );
        (dev, mmio)
    }

    fn acquire(dev: &CsiphyDevice) -> u32 {
        let mut payload = [0u8; 8];
        dispatch(dev, IoctlCmd::Acquire as u32, &mut payload).unwrap();
        AcquireCmd::read_from_prefix(&payload[..]).unwrap().handle
    }

    #[test]
    fn query_cap_writes_the_reply_back() {
        let (dev, _) = device();
        let mut payload = [0u8; 16];
        dispatch(&dev, IoctlCmd::QueryCap as u32, &mut payload).unwrap();
        let reply = QueryCapCmd::read_from_prefix(&payload[..]).unwrap();
        assert_eq!(reply.version, 0x0121);
        assert_eq!(reply.clock_lane, 1);
    }

    #[test]
    fn full_session_through_the_command_surface() {
        let (dev, mmio) = device();
        let handle = acquire(&dev);
        assert_ne!(handle, 0);

        let cfg = ConfigCmd {
            handle,
            lane_cnt: 1,
            lane_mask: 0b0_0011,
            settle_time: 3_000_000_000,
            ..ConfigCmd::default()
        };
        let mut payload = [0u8; 40];
        payload.copy_from_slice(cfg.as_bytes());
        dispatch(&dev, IoctlCmd::Config as u32, &mut payload).unwrap();

        let mut handle_cmd = [0u8; 4];
        handle_cmd.copy_from_slice(HandleCmd { handle }.as_bytes());
        dispatch(&dev, IoctlCmd::Start as u32, &mut handle_cmd).unwrap();
        assert_eq!(mmio.writes_to(0x0814), [0x81]);

        dispatch(&dev, IoctlCmd::Stop as u32, &mut handle_cmd).unwrap();
        dispatch(&dev, IoctlCmd::Release as u32, &mut handle_cmd).unwrap();
        assert_eq!(dev.state(), CsiphyState::Init);
    }

    #[test]
    fn truncated_config_is_a_copy_fault() {
        let (dev, _) = device();
        let handle = acquire(&dev);
        let mut short = [0u8; 24];
        short[..4].copy_from_slice(&handle.to_le_bytes());
        assert_eq!(
            dispatch(&dev, IoctlCmd::Config as u32, &mut short),
            Err(CsiphyError::CopyFault)
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let (dev, _) = device();
        let mut payload = [0u8; 8];
        assert_eq!(
            dispatch(&dev, 0x99, &mut payload),
            Err(CsiphyError::UnknownCommand)
        );
    }

    #[test]
    fn external_config_replaces_accumulated_state() {
        let (dev, mmio) = device();
        let handle = acquire(&dev);

        let first = ConfigCmd {
            handle,
            lane_cnt: 4,
            lane_mask: 0b1_1111,
            settle_time: 3_000_000_000,
            ..ConfigCmd::default()
        };
        let mut payload = [0u8; 40];
        payload.copy_from_slice(first.as_bytes());
        dispatch(&dev, IoctlCmd::Config as u32, &mut payload).unwrap();

        let replacement = ConfigCmd {
            lane_cnt: 1,
            lane_mask: 0b0_0011,
            ..first
        };
        payload.copy_from_slice(replacement.as_bytes());
        dispatch(&dev, IoctlCmd::ConfigExternal as u32, &mut payload).unwrap();

        let mut handle_cmd = [0u8; 4];
        handle_cmd.copy_from_slice(HandleCmd { handle }.as_bytes());
        dispatch(&dev, IoctlCmd::Start as u32, &mut handle_cmd).unwrap();
        // Only the replacement lanes are enabled.
        assert_eq!(mmio.writes_to(0x0814), [0x81]);
    }
}
