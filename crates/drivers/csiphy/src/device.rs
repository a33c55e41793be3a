//! PHY instance state machine.
//!
//! One [`CsiphyDevice`] owns one hardware instance. Userspace acquires it
//! into one of two slots (standalone, or combo for a second sensor sharing
//! the PHY), accumulates a lane configuration, and starts streaming. Start is
//! reference counted: a second start on an already streaming PHY must not
//! reprogram the hardware.

use alloc::sync::Arc;

use spin::Mutex;

use mln_hal::{
    AhbLevel, AxiVote, BandwidthVoter, MmioRegion, PlatformPower, SecurityController,
};

use crate::lane::{
    lane_enable_2ph, lane_enable_3ph, repacked_lane_mask_2ph, secure_protection_mask,
    settle_count, CLOCK_LANE_2PH, CLOCK_LANE_COMBO, LANE_MASK_2PH, LANE_MASK_3PH,
};
use crate::regs::{CsiphyCtrlRegs, RegParam, RegSetting};
use crate::CsiphyError;

/// Acquisition slots per PHY: one standalone, one combo.
pub const MAX_ACQUIRE_SLOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsiphyState {
    Init,
    Acquire,
    Start,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireParams {
    /// Acquire the combo slot for a second sensor sharing this PHY.
    pub combo_mode: bool,
}

/// One lane configuration submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsiphyConfig {
    pub lane_cnt: u32,
    /// Wire-format lane mask; see [`crate::lane`].
    pub lane_mask: u32,
    pub three_phase: bool,
    pub combo_mode: bool,
    pub secure_mode: bool,
    /// Sensor settle time in the units divided by
    /// [`crate::lane::SETTLE_TIME_DIVISOR`].
    pub settle_time: u64,
    /// Link data rate in bits per second; selects C-PHY overrides.
    pub data_rate: u64,
}

/// Capabilities reported to userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsiphyQueryCap {
    pub phy_idx: u32,
    pub version: u32,
    /// Clock lane position in the wire mask.
    pub clock_lane: u32,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    handle: u32,
    configured: bool,
    secure: bool,
    /// Secure lane protection mask contributed by this slot.
    cp_reg_mask: u64,
    settle_time: u64,
}

struct Inner {
    state: CsiphyState,
    slots: [Option<Slot>; MAX_ACQUIRE_SLOTS],
    next_handle: u32,
    start_count: u32,
    config_count: u32,
    combo_mode: bool,
    lane_cnt: u32,
    lane_mask: u32,
    three_phase: bool,
    settle_time: u64,
    combo_settle_time: u64,
    data_rate: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CsiphyState::Init,
            slots: [None; MAX_ACQUIRE_SLOTS],
            next_handle: 1,
            start_count: 0,
            config_count: 0,
            combo_mode: false,
            lane_cnt: 0,
            lane_mask: 0,
            three_phase: false,
            settle_time: 0,
            combo_settle_time: 0,
            data_rate: 0,
        }
    }

    fn slot_of(&self, handle: u32) -> Result<usize, CsiphyError> {
        self.slots
            .iter()
            .position(|s| s.map(|s| s.handle) == Some(handle))
            .ok_or(CsiphyError::InvalidHandle)
    }

    fn reset_pending_config(&mut self) {
        self.lane_cnt = 0;
        self.lane_mask = 0;
        self.three_phase = false;
        self.settle_time = 0;
        self.combo_settle_time = 0;
        self.data_rate = 0;
    }

    fn any_secure(&self) -> bool {
        self.slots.iter().flatten().any(|s| s.secure)
    }
}

pub struct CsiphyDevice {
    regs: Arc<dyn MmioRegion>,
    voter: Arc<dyn BandwidthVoter>,
    security: Arc<dyn SecurityController>,
    power: Arc<dyn PlatformPower>,
    hw: &'static CsiphyCtrlRegs,
    phy_idx: u32,
    inner: Mutex<Inner>,
}

impl CsiphyDevice {
    pub fn new(
        phy_idx: u32,
        hw: &'static CsiphyCtrlRegs,
        regs: Arc<dyn MmioRegion>,
        voter: Arc<dyn BandwidthVoter>,
        security: Arc<dyn SecurityController>,
        power: Arc<dyn PlatformPower>,
    ) -> Self {
        Self {
            regs,
            voter,
            security,
            power,
            hw,
            phy_idx,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn query_cap(&self) -> CsiphyQueryCap {
        CsiphyQueryCap {
            phy_idx: self.phy_idx,
            version: self.hw.version.code(),
            clock_lane: 1,
        }
    }

    pub fn state(&self) -> CsiphyState {
        self.inner.lock().state
    }

    /// Acquire a slot on this PHY, returning the device handle.
    pub fn acquire(&self, params: AcquireParams) -> Result<u32, CsiphyError> {
        let mut inner = self.inner.lock();
        if inner.state == CsiphyState::Start {
            log::error!("[CSIPHY{}] acquire while streaming", self.phy_idx);
            return Err(CsiphyError::InvalidState);
        }
        let slot_idx = usize::from(params.combo_mode);
        if inner.slots[slot_idx].is_some() {
            log::error!(
                "[CSIPHY{}] slot {slot_idx} already held (combo={})",
                self.phy_idx,
                params.combo_mode
            );
            return Err(CsiphyError::SlotsExhausted);
        }
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.slots[slot_idx] = Some(Slot {
            handle,
            configured: false,
            secure: false,
            cp_reg_mask: 0,
            settle_time: 0,
        });
        if params.combo_mode {
            inner.combo_mode = true;
        }
        inner.state = CsiphyState::Acquire;
        log::debug!("[CSIPHY{}] acquired slot {slot_idx}, handle {handle}", self.phy_idx);
        Ok(handle)
    }

    /// Submit a lane configuration. Submissions accumulate: lane counts add
    /// up and lane masks merge, so both combo sensors contribute to one
    /// programming pass.
    pub fn config(&self, handle: u32, cfg: CsiphyConfig) -> Result<(), CsiphyError> {
        let mut inner = self.inner.lock();
        let slot_idx = inner.slot_of(handle)?;
        let masked = self.validated_mask(&cfg)?;

        inner.lane_cnt += cfg.lane_cnt;
        inner.lane_mask |= masked;
        inner.combo_mode |= cfg.combo_mode;
        inner.three_phase = cfg.three_phase;
        inner.data_rate = cfg.data_rate;
        if slot_idx == 1 {
            inner.combo_settle_time = cfg.settle_time;
        } else {
            inner.settle_time = cfg.settle_time;
        }
        self.update_slot(&mut inner, slot_idx, &cfg, masked);
        inner.config_count += 1;
        Ok(())
    }

    /// Submit a configuration from an external controller, replacing any
    /// accumulated state instead of merging with it.
    pub fn external_config(&self, handle: u32, cfg: CsiphyConfig) -> Result<(), CsiphyError> {
        let mut inner = self.inner.lock();
        let slot_idx = inner.slot_of(handle)?;
        let masked = self.validated_mask(&cfg)?;

        inner.lane_cnt = cfg.lane_cnt;
        inner.lane_mask = masked;
        inner.combo_mode = cfg.combo_mode;
        inner.three_phase = cfg.three_phase;
        inner.data_rate = cfg.data_rate;
        inner.settle_time = cfg.settle_time;
        inner.combo_settle_time = cfg.settle_time;
        self.update_slot(&mut inner, slot_idx, &cfg, masked);
        inner.config_count = 1;
        Ok(())
    }

    fn validated_mask(&self, cfg: &CsiphyConfig) -> Result<u32, CsiphyError> {
        let valid = if cfg.three_phase {
            LANE_MASK_3PH
        } else {
            LANE_MASK_2PH
        };
        let masked = cfg.lane_mask & valid;
        if masked == 0 {
            log::error!(
                "[CSIPHY{}] lane mask 0x{:x} has no usable lanes",
                self.phy_idx,
                cfg.lane_mask
            );
            return Err(CsiphyError::InvalidLaneConfig);
        }
        Ok(masked)
    }

    fn update_slot(&self, inner: &mut Inner, slot_idx: usize, cfg: &CsiphyConfig, masked: u32) {
        let cp_reg_mask = if cfg.secure_mode {
            let repacked = if cfg.three_phase {
                masked
            } else {
                let clock = if slot_idx == 1 {
                    CLOCK_LANE_COMBO
                } else {
                    CLOCK_LANE_2PH
                };
                repacked_lane_mask_2ph(masked, clock)
            };
            secure_protection_mask(self.hw.version, self.phy_idx, cfg.three_phase, repacked)
        } else {
            0
        };
        if let Some(slot) = &mut inner.slots[slot_idx] {
            slot.configured = true;
            slot.secure = cfg.secure_mode;
            slot.cp_reg_mask = cp_reg_mask;
            slot.settle_time = cfg.settle_time;
        }
    }

    /// Start streaming. On an already streaming PHY this only takes another
    /// reference; otherwise it votes for bandwidth, handles secure mode,
    /// powers the block and programs the register tables.
    pub fn start(&self, handle: u32) -> Result<(), CsiphyError> {
        let mut inner = self.inner.lock();
        inner.slot_of(handle)?;
        if inner.state == CsiphyState::Start {
            inner.start_count += 1;
            log::debug!(
                "[CSIPHY{}] already streaming, ref {}",
                self.phy_idx,
                inner.start_count
            );
            return Ok(());
        }
        if inner.config_count == 0 {
            return Err(CsiphyError::InvalidState);
        }

        self.voter
            .start(AhbLevel::LowSvs, &AxiVote::default_camera())?;

        if inner.any_secure() {
            if !self.security.secure_camera_supported() {
                log::error!("[CSIPHY{}] secure fuse not blown", self.phy_idx);
                self.unvote();
                return Err(CsiphyError::SecureUnsupported);
            }
            if let Err(e) = self.enter_secure(&mut inner) {
                self.unvote();
                return Err(e);
            }
        }

        if let Err(e) = self.power.enable() {
            self.unvote();
            return Err(e.into());
        }

        if let Err(e) = self.program_registers(&inner) {
            self.power_off();
            self.unvote();
            return Err(e);
        }

        inner.state = CsiphyState::Start;
        inner.start_count = 1;
        log::info!(
            "[CSIPHY{}] streaming, lanes 0x{:x} {}",
            self.phy_idx,
            inner.lane_mask,
            if inner.three_phase { "cphy" } else { "dphy" }
        );
        Ok(())
    }

    /// Stop streaming. While other holders keep the PHY running only the
    /// stopping slot's secure grant is dropped; the last stop resets the
    /// hardware and releases power and bandwidth.
    pub fn stop(&self, handle: u32) -> Result<(), CsiphyError> {
        let mut inner = self.inner.lock();
        let slot_idx = inner.slot_of(handle)?;
        if inner.state != CsiphyState::Start {
            return Err(CsiphyError::InvalidState);
        }

        if inner.start_count > 1 {
            inner.start_count -= 1;
            if let Some(slot) = &mut inner.slots[slot_idx] {
                if slot.secure {
                    self.drop_secure(slot.cp_reg_mask);
                    slot.secure = false;
                }
            }
            return Ok(());
        }

        for slot in inner.slots.iter_mut().flatten() {
            if slot.secure {
                self.drop_secure(slot.cp_reg_mask);
                slot.secure = false;
            }
        }
        self.program_table(self.hw.reset);
        self.power_off();
        self.unvote();
        inner.start_count = 0;
        inner.state = CsiphyState::Acquire;
        log::info!("[CSIPHY{}] stopped", self.phy_idx);
        Ok(())
    }

    /// Release a held slot. Releasing the combo slot clears combo mode; when
    /// no configuration submissions remain the pending lane configuration is
    /// discarded. The PHY must be stopped first.
    pub fn release(&self, handle: u32) -> Result<(), CsiphyError> {
        let mut inner = self.inner.lock();
        let slot_idx = inner.slot_of(handle)?;
        if inner.state == CsiphyState::Start {
            return Err(CsiphyError::InvalidState);
        }
        inner.slots[slot_idx] = None;
        if slot_idx == 1 {
            inner.combo_mode = false;
        }
        inner.config_count = inner.config_count.saturating_sub(1);
        if inner.config_count == 0 {
            inner.reset_pending_config();
        }
        if inner.slots.iter().all(Option::is_none) {
            inner.state = CsiphyState::Init;
        }
        log::debug!("[CSIPHY{}] released slot {slot_idx}", self.phy_idx);
        Ok(())
    }

    /// Force the PHY to a quiescent state, regardless of holders. Used on
    /// driver teardown and fatal session errors.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CsiphyState::Init {
            return;
        }
        if inner.state == CsiphyState::Start {
            for slot in inner.slots.iter_mut().flatten() {
                if slot.secure {
                    self.drop_secure(slot.cp_reg_mask);
                    slot.secure = false;
                }
            }
            self.program_table(self.hw.reset);
            self.power_off();
            self.unvote();
        }
        inner.slots = [None; MAX_ACQUIRE_SLOTS];
        inner.start_count = 0;
        inner.config_count = 0;
        inner.combo_mode = false;
        inner.reset_pending_config();
        inner.state = CsiphyState::Init;
        log::info!("[CSIPHY{}] shutdown", self.phy_idx);
    }

    /// Acknowledge and clear every pending interrupt.
    pub fn irq_handler(&self) {
        let irq = &self.hw.irq;
        for i in 0..irq.num_registers {
            let status = self.regs.read(irq.status0_offset + 4 * i);
            self.regs.write(irq.clear0_offset + 4 * i, status);
            self.regs.write(irq.clear0_offset + 4 * i, 0);
            if status != 0 {
                log::debug!("[CSIPHY{}] irq status{i} = 0x{status:x}", self.phy_idx);
            }
        }
        self.regs.write(irq.glbl_irq_cmd_offset, 0x1);
        self.regs.write(irq.glbl_irq_cmd_offset, 0x0);
    }

    /// Notify the security controller for every secure slot. A refused
    /// notification drops only the refusing slot's request; slots already
    /// notified in this pass are backed out again.
    fn enter_secure(&self, inner: &mut Inner) -> Result<(), CsiphyError> {
        let mut notified = [false; MAX_ACQUIRE_SLOTS];
        let mut result = Ok(());
        for (idx, slot) in inner.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            if !slot.secure {
                continue;
            }
            match self.security.notify_secure_mode(true, slot.cp_reg_mask) {
                Ok(()) => notified[idx] = true,
                Err(e) => {
                    slot.secure = false;
                    result = Err(e.into());
                    break;
                }
            }
        }
        if result.is_err() {
            for (slot, notified) in inner.slots.iter().zip(notified) {
                if let (Some(slot), true) = (slot, notified) {
                    self.drop_secure(slot.cp_reg_mask);
                }
            }
        }
        result
    }

    fn drop_secure(&self, mask: u64) {
        if let Err(e) = self.security.notify_secure_mode(false, mask) {
            log::error!("[CSIPHY{}] secure exit notification failed: {e}", self.phy_idx);
        }
    }

    fn unvote(&self) {
        if let Err(e) = self.voter.stop() {
            log::error!("[CSIPHY{}] bandwidth unvote failed: {e}", self.phy_idx);
        }
    }

    fn power_off(&self) {
        if let Err(e) = self.power.disable() {
            log::error!("[CSIPHY{}] power off failed: {e}", self.phy_idx);
        }
    }

    fn program_registers(&self, inner: &Inner) -> Result<(), CsiphyError> {
        let enable = if inner.three_phase {
            lane_enable_3ph(inner.lane_mask)
        } else {
            lane_enable_2ph(inner.lane_mask)
        };
        self.program_common(enable, inner.three_phase);

        if inner.three_phase {
            if inner.combo_mode {
                // No dedicated combo C-PHY tables on current revisions.
                log::error!(
                    "[CSIPHY{}] no combo 3-phase tables, using 3-phase set",
                    self.phy_idx
                );
            }
            self.program_3ph_lanes(inner)?;
            self.program_data_rate(inner.data_rate);
        } else {
            self.program_2ph_lanes(inner)?;
        }
        Ok(())
    }

    fn program_common(&self, lane_enable: u32, three_phase: bool) {
        for entry in self.hw.common {
            let skip = matches!(
                (entry.param, three_phase),
                (RegParam::DoNotProgram, _)
                    | (RegParam::TwoPhaseOnly, true)
                    | (RegParam::ThreePhaseOnly, false)
            );
            if skip {
                continue;
            }
            let value = if entry.param == RegParam::LaneEnable {
                lane_enable
            } else {
                entry.value
            };
            self.regs.write_settled(entry.offset, value, entry.delay_ms);
        }
    }

    fn program_2ph_lanes(&self, inner: &Inner) -> Result<(), CsiphyError> {
        // Wire bit -> per-lane table index: data lanes fill 0..=3 in wire
        // order, the clock lane uses the last table.
        let mut table_idx = 0;
        for bit in 0..5 {
            if inner.lane_mask & (1 << bit) == 0 {
                if (1 << bit) != CLOCK_LANE_2PH {
                    table_idx += 1;
                }
                continue;
            }
            let idx = if (1 << bit) == CLOCK_LANE_2PH {
                self.hw.lanes_2ph.len() - 1
            } else {
                let i = table_idx;
                table_idx += 1;
                i
            };
            let table = self
                .hw
                .lanes_2ph
                .get(idx)
                .ok_or(CsiphyError::InvalidLaneConfig)?;
            // Wire positions 3 and up belong to the combo sensor and settle
            // on its timing.
            let settle_time = if inner.combo_mode && bit >= 3 {
                inner.combo_settle_time
            } else {
                inner.settle_time
            };
            self.program_lane(table, settle_count(settle_time));
        }
        Ok(())
    }

    fn program_3ph_lanes(&self, inner: &Inner) -> Result<(), CsiphyError> {
        for trio in 0..3 {
            if inner.lane_mask & (1 << trio) == 0 {
                continue;
            }
            let table = self
                .hw
                .lanes_3ph
                .get(trio)
                .ok_or(CsiphyError::InvalidLaneConfig)?;
            self.program_lane(table, settle_count(inner.settle_time));
        }
        Ok(())
    }

    fn program_lane(&self, table: &[RegSetting], settle: u64) {
        for entry in table {
            let value = match entry.param {
                RegParam::SettleCntLower => (settle & 0xFF) as u32,
                RegParam::SettleCntUpper => ((settle >> 8) & 0xFF) as u32,
                RegParam::DoNotProgram => continue,
                _ => entry.value,
            };
            self.regs.write_settled(entry.offset, value, entry.delay_ms);
        }
    }

    fn program_data_rate(&self, data_rate: u64) {
        if data_rate == 0 {
            return;
        }
        for row in self.hw.data_rates {
            if row.bandwidth >= data_rate {
                self.program_table(row.settings);
                return;
            }
        }
        log::warn!(
            "[CSIPHY{}] no data rate settings cover {data_rate} bps",
            self.phy_idx
        );
    }

    fn program_table(&self, table: &[RegSetting]) {
        for entry in table {
            if entry.param == RegParam::DoNotProgram {
                continue;
            }
            self.regs
                .write_settled(entry.offset, entry.value, entry.delay_ms);
        }
    }
}
