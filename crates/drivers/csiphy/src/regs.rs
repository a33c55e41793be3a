//! Versioned register tables.
//!
//! Each PHY revision ships a table set: common bring-up registers, a reset
//! sequence, per-lane configuration tables, and (for C-PHY) data-rate
//! dependent overrides. Entries carry a parameter tag telling the programmer
//! which values to substitute at runtime and which entries to skip.

/// Supported PHY hardware revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwVersion {
    V120,
    V121,
    V201,
}

impl HwVersion {
    /// Revision code reported through query-cap.
    pub const fn code(self) -> u32 {
        match self {
            Self::V120 => 0x0120,
            Self::V121 => 0x0121,
            Self::V201 => 0x0201,
        }
    }
}

/// Runtime substitution applied to a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegParam {
    /// Program the table value as-is.
    Default,
    /// Substitute the computed lane-enable bitmap.
    LaneEnable,
    /// Substitute the low byte of the settle count.
    SettleCntLower,
    /// Substitute the second byte of the settle count.
    SettleCntUpper,
    /// Placeholder entry, never programmed.
    DoNotProgram,
    /// Program only for D-PHY configurations.
    TwoPhaseOnly,
    /// Program only for C-PHY configurations.
    ThreePhaseOnly,
}

/// One register write in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSetting {
    pub offset: u32,
    pub value: u32,
    pub delay_ms: u32,
    pub param: RegParam,
}

const fn reg(offset: u32, value: u32, delay_ms: u32, param: RegParam) -> RegSetting {
    RegSetting {
        offset,
        value,
        delay_ms,
        param,
    }
}

/// C-PHY override set active up to `bandwidth` bits per second.
#[derive(Debug, Clone, Copy)]
pub struct DataRateSettings {
    pub bandwidth: u64,
    pub settings: &'static [RegSetting],
}

/// Interrupt register block layout.
#[derive(Debug, Clone, Copy)]
pub struct IrqRegs {
    pub status0_offset: u32,
    pub clear0_offset: u32,
    pub glbl_irq_cmd_offset: u32,
    pub num_registers: u32,
}

/// Complete table set for one PHY revision.
pub struct CsiphyCtrlRegs {
    pub version: HwVersion,
    pub common: &'static [RegSetting],
    pub reset: &'static [RegSetting],
    /// Per-lane D-PHY tables: indices 0..=3 are data lanes, 4 the clock lane.
    pub lanes_2ph: &'static [&'static [RegSetting]],
    /// Per-trio C-PHY tables.
    pub lanes_3ph: &'static [&'static [RegSetting]],
    pub data_rates: &'static [DataRateSettings],
    pub irq: IrqRegs,
}

use RegParam::{
    Default, DoNotProgram, LaneEnable, SettleCntLower, SettleCntUpper, ThreePhaseOnly,
    TwoPhaseOnly,
};

static COMMON_V121: [RegSetting; 6] = [
    reg(0x0814, 0x00, 1, LaneEnable),
    reg(0x0818, 0x01, 0, Default),
    reg(0x081C, 0x02, 0, TwoPhaseOnly),
    reg(0x081C, 0x52, 0, ThreePhaseOnly),
    reg(0x0824, 0x00, 0, DoNotProgram),
    reg(0x0800, 0x0E, 1, Default),
];

static RESET_V121: [RegSetting; 4] = [
    reg(0x0814, 0x00, 1, Default),
    reg(0x081C, 0x00, 0, Default),
    reg(0x0800, 0x02, 1, Default),
    reg(0x0800, 0x00, 0, Default),
];

static LANE_2PH_D0_V121: [RegSetting; 5] = [
    reg(0x0030, 0x00, 0, SettleCntLower),
    reg(0x0034, 0x07, 0, SettleCntUpper),
    reg(0x0028, 0x00, 0, DoNotProgram),
    reg(0x0000, 0x8E, 0, Default),
    reg(0x000C, 0xFF, 0, Default),
];

static LANE_2PH_D1_V121: [RegSetting; 5] = [
    reg(0x0230, 0x00, 0, SettleCntLower),
    reg(0x0234, 0x07, 0, SettleCntUpper),
    reg(0x0228, 0x00, 0, DoNotProgram),
    reg(0x0200, 0x8E, 0, Default),
    reg(0x020C, 0xFF, 0, Default),
];

static LANE_2PH_D2_V121: [RegSetting; 5] = [
    reg(0x0430, 0x00, 0, SettleCntLower),
    reg(0x0434, 0x07, 0, SettleCntUpper),
    reg(0x0428, 0x00, 0, DoNotProgram),
    reg(0x0400, 0x8E, 0, Default),
    reg(0x040C, 0xFF, 0, Default),
];

static LANE_2PH_D3_V121: [RegSetting; 5] = [
    reg(0x0630, 0x00, 0, SettleCntLower),
    reg(0x0634, 0x07, 0, SettleCntUpper),
    reg(0x0628, 0x00, 0, DoNotProgram),
    reg(0x0600, 0x8E, 0, Default),
    reg(0x060C, 0xFF, 0, Default),
];

static LANE_2PH_CLK_V121: [RegSetting; 5] = [
    reg(0x0730, 0x00, 0, SettleCntLower),
    reg(0x0734, 0x00, 0, DoNotProgram),
    reg(0x0728, 0x04, 0, Default),
    reg(0x0700, 0x80, 0, Default),
    reg(0x070C, 0xFF, 0, Default),
];

static LANE_3PH_L0_V121: [RegSetting; 4] = [
    reg(0x00A0, 0x00, 0, SettleCntLower),
    reg(0x00A4, 0x00, 0, DoNotProgram),
    reg(0x0090, 0x0F, 0, Default),
    reg(0x0098, 0x1F, 0, Default),
];

static LANE_3PH_L1_V121: [RegSetting; 4] = [
    reg(0x02A0, 0x00, 0, SettleCntLower),
    reg(0x02A4, 0x00, 0, DoNotProgram),
    reg(0x0290, 0x0F, 0, Default),
    reg(0x0298, 0x1F, 0, Default),
];

static LANE_3PH_L2_V121: [RegSetting; 4] = [
    reg(0x04A0, 0x00, 0, SettleCntLower),
    reg(0x04A4, 0x00, 0, DoNotProgram),
    reg(0x0490, 0x0F, 0, Default),
    reg(0x0498, 0x1F, 0, Default),
];

static DATA_RATE_1G5_V121: [RegSetting; 2] = [
    reg(0x09B4, 0x03, 0, Default),
    reg(0x09B8, 0x0A, 0, Default),
];

static DATA_RATE_2G5_V121: [RegSetting; 2] = [
    reg(0x09B4, 0x02, 0, Default),
    reg(0x09B8, 0x14, 0, Default),
];

static DATA_RATE_4G5_V121: [RegSetting; 2] = [
    reg(0x09B4, 0x00, 0, Default),
    reg(0x09B8, 0x28, 0, Default),
];

/// Table set for PHY revision 1.2.1.
pub static CSIPHY_V121_REGS: CsiphyCtrlRegs = CsiphyCtrlRegs {
    version: HwVersion::V121,
    common: &COMMON_V121,
    reset: &RESET_V121,
    lanes_2ph: &[
        &LANE_2PH_D0_V121,
        &LANE_2PH_D1_V121,
        &LANE_2PH_D2_V121,
        &LANE_2PH_D3_V121,
        &LANE_2PH_CLK_V121,
    ],
    lanes_3ph: &[&LANE_3PH_L0_V121, &LANE_3PH_L1_V121, &LANE_3PH_L2_V121],
    data_rates: &[
        DataRateSettings {
            bandwidth: 1_500_000_000,
            settings: &DATA_RATE_1G5_V121,
        },
        DataRateSettings {
            bandwidth: 2_500_000_000,
            settings: &DATA_RATE_2G5_V121,
        },
        DataRateSettings {
            bandwidth: 4_500_000_000,
            settings: &DATA_RATE_4G5_V121,
        },
    ],
    irq: IrqRegs {
        status0_offset: 0x08B0,
        clear0_offset: 0x0858,
        glbl_irq_cmd_offset: 0x0828,
        num_registers: 11,
    },
};
