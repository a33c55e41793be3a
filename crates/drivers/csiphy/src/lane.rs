//! Lane mask arithmetic.
//!
//! Pure helpers shared by register programming and secure-mode bookkeeping.
//! Lane masks arrive from userspace in wire format: for D-PHY bit 1 is the
//! clock lane and bits 0,2,3,4 are data lanes 0..3; for C-PHY the low three
//! bits are the three trios and there is no separate clock lane.

use crate::regs::HwVersion;

/// Valid D-PHY lane mask bits (clock + four data lanes).
pub const LANE_MASK_2PH: u32 = 0x1F;
/// Valid C-PHY lane mask bits (three trios).
pub const LANE_MASK_3PH: u32 = 0x7;

/// Clock lane position in a D-PHY wire mask.
pub const CLOCK_LANE_2PH: u32 = 0x2;
/// Clock lane position of the second sensor in a combo wire mask.
pub const CLOCK_LANE_COMBO: u32 = 0x10;

/// Settle time is supplied in picoseconds-scaled units and programmed in
/// 200 MHz cycles.
pub const SETTLE_TIME_DIVISOR: u64 = 200_000_000;

/// Width of one secure lane-control register, in mask bits.
pub const SEC_LANE_CP_REG_LEN: u32 = 32;
/// PHY instances covered by the first secure lane-control register.
pub const MAX_PHY_MASKS_PER_REG: u32 = 4;

/// Hardware lane-enable bitmap for a D-PHY configuration.
///
/// Data lanes occupy the even bits in wire order (skipping the clock
/// position), the clock lane sits at bit 7.
pub fn lane_enable_2ph(lane_mask: u32) -> u32 {
    let mut enable = 0;
    let mut data_pos = 0;
    for bit in 0..5 {
        let mask = 1 << bit;
        if mask == CLOCK_LANE_2PH {
            if lane_mask & mask != 0 {
                enable |= 0x80;
            }
        } else {
            if lane_mask & mask != 0 {
                enable |= 1 << (data_pos << 1);
            }
            data_pos += 1;
        }
    }
    enable
}

/// Hardware lane-enable bitmap for a C-PHY configuration: each enabled trio
/// sets the odd bit above its position.
pub fn lane_enable_3ph(lane_mask: u32) -> u32 {
    let mut enable = 0;
    for trio in 0..3 {
        if lane_mask & (1 << trio) != 0 {
            enable |= 1 << (2 * trio + 1);
        }
    }
    enable
}

/// Compact a D-PHY wire mask into the secure lane mask format.
///
/// The clock lane carries no secure attribute, so it is dropped and the data
/// lanes above it close the gap.
pub fn repacked_lane_mask_2ph(lane_mask: u32, clock_lane: u32) -> u32 {
    let adjusted = lane_mask & LANE_MASK_2PH & !clock_lane;
    let below_clock = adjusted & (clock_lane - 1);
    ((adjusted & !(clock_lane - 1)) >> 1) | below_clock
}

/// Settle count programmed into the PHY, in 200 MHz cycles.
pub fn settle_count(settle_time: u64) -> u64 {
    settle_time / SETTLE_TIME_DIVISOR
}

/// Bits of secure lane mask each PHY occupies in the lane-control registers.
pub fn secure_mask_width(version: HwVersion, phy_idx: u32) -> u32 {
    match version {
        // Four D-PHY lanes, three C-PHY trios, one spare.
        HwVersion::V201 => 8,
        HwVersion::V121 => {
            if phy_idx < MAX_PHY_MASKS_PER_REG {
                7
            } else {
                8
            }
        }
        HwVersion::V120 => 7,
    }
}

/// Place a repacked lane mask at this PHY's position in the 64-bit secure
/// lane-control view.
///
/// The first four PHYs pack into the low register, later ones into the high
/// one. D-PHY masks sit three bits above the C-PHY masks of the same PHY.
pub fn secure_protection_mask(
    version: HwVersion,
    phy_idx: u32,
    three_phase: bool,
    repacked_mask: u32,
) -> u64 {
    let width = secure_mask_width(version, phy_idx);
    let dphy_offset = if three_phase { 0 } else { 3 };
    let shift = if phy_idx < MAX_PHY_MASKS_PER_REG {
        phy_idx * width + dphy_offset
    } else {
        (phy_idx - MAX_PHY_MASKS_PER_REG) * width + SEC_LANE_CP_REG_LEN + dphy_offset
    };
    u64::from(repacked_mask) << shift
}
