//! CAN bit timing.
//!
//! The baud rate prescaler is derived from the oscillator and the nominal
//! rate; segment lengths come from a fixed table keyed by the nominal rate.

use core::convert::TryFrom;

use crate::regs::{Cnf1, Cnf2, Cnf3, SyncJumpWidth};

/// Speed the CAN bus is operating at.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum CanSpeed {
    Kbps20,
    Kbps25,
    Kbps50,
    Kbps100,
    Kbps125,
    Kbps250,
    Kbps500,
    Kbps1000,
}

impl CanSpeed {
    /// Nominal rate in bits per second.
    pub const fn bps(self) -> u32 {
        match self {
            CanSpeed::Kbps20 => 20_000,
            CanSpeed::Kbps25 => 25_000,
            CanSpeed::Kbps50 => 50_000,
            CanSpeed::Kbps100 => 100_000,
            CanSpeed::Kbps125 => 125_000,
            CanSpeed::Kbps250 => 250_000,
            CanSpeed::Kbps500 => 500_000,
            CanSpeed::Kbps1000 => 1_000_000,
        }
    }

    /// Segment lengths used for this rate.
    const fn segments(self) -> Segments {
        match self {
            CanSpeed::Kbps1000 => Segments::FAST,
            _ => Segments::STANDARD,
        }
    }
}

/// A nominal bit rate outside the supported set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnknownBitRate(pub u32);

impl TryFrom<u32> for CanSpeed {
    type Error = UnknownBitRate;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Ok(match bps {
            20_000 => CanSpeed::Kbps20,
            25_000 => CanSpeed::Kbps25,
            50_000 => CanSpeed::Kbps50,
            100_000 => CanSpeed::Kbps100,
            125_000 => CanSpeed::Kbps125,
            250_000 => CanSpeed::Kbps250,
            500_000 => CanSpeed::Kbps500,
            1_000_000 => CanSpeed::Kbps1000,
            _ => return Err(UnknownBitRate(bps)),
        })
    }
}

/// Speed the MCP2515 is operating at. Should match the crystal frequency
/// onboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum McpSpeed {
    MHz8,
    MHz16,
}

impl McpSpeed {
    pub const fn hz(self) -> u32 {
        match self {
            McpSpeed::MHz8 => 8_000_000,
            McpSpeed::MHz16 => 16_000_000,
        }
    }
}

/// Segment lengths of one bit, in time quanta. The sync segment is always a
/// single quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segments {
    prop: u8,
    phase1: u8,
    phase2: u8,
    sjw: SyncJumpWidth,
}

impl Segments {
    /// 16 quanta, sampling at 75%.
    const STANDARD: Self = Self {
        prop: 5,
        phase1: 6,
        phase2: 4,
        sjw: SyncJumpWidth::Tq2,
    };

    /// 8 quanta for 1 Mbps, sampling at 75%.
    const FAST: Self = Self {
        prop: 2,
        phase1: 3,
        phase2: 2,
        sjw: SyncJumpWidth::Tq1,
    };

    const fn quanta(self) -> u32 {
        1 + self.prop as u32 + self.phase1 as u32 + self.phase2 as u32
    }
}

/// Values of `CNF1`, `CNF2` and `CNF3` for one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    pub cnf1: Cnf1,
    pub cnf2: Cnf2,
    pub cnf3: Cnf3,
}

impl BitTiming {
    /// Computes the bit timing registers for `can_speed` on a controller
    /// clocked at `mcp_speed`.
    ///
    /// Returns `None` when the oscillator cannot be divided down to the
    /// requested rate exactly.
    pub fn new(can_speed: CanSpeed, mcp_speed: McpSpeed) -> Option<Self> {
        let seg = can_speed.segments();
        let divisor = 2 * seg.quanta() * can_speed.bps();
        let osc = mcp_speed.hz();
        if osc % divisor != 0 {
            return None;
        }
        let brp = (osc / divisor).checked_sub(1)?;
        if brp > 0x3F {
            return None;
        }

        Some(BitTiming {
            cnf1: Cnf1::new().with_brp(brp as u8).with_sjw(seg.sjw),
            cnf2: Cnf2::new()
                .with_btlmode(true)
                .with_sam(false)
                .with_phseg1(seg.phase1 - 1)
                .with_prseg(seg.prop - 1),
            cnf3: Cnf3::new().with_phseg2(seg.phase2 - 1).with_sof(true),
        })
    }

    /// Baud rate prescaler.
    pub fn prescaler(&self) -> u8 {
        self.cnf1.brp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(t: BitTiming) -> (u8, u8, u8) {
        (
            t.cnf1.into_bytes()[0],
            t.cnf2.into_bytes()[0],
            t.cnf3.into_bytes()[0],
        )
    }

    #[test]
    fn prescaler_at_500k_16mhz() {
        let timing = BitTiming::new(CanSpeed::Kbps500, McpSpeed::MHz16).unwrap();
        assert_eq!(timing.prescaler(), 0);
        assert_eq!(bytes(timing), (0x40, 0xAC, 0x83));
    }

    #[test]
    fn table_16mhz() {
        let expected = [
            (CanSpeed::Kbps20, 0x58),
            (CanSpeed::Kbps25, 0x53),
            (CanSpeed::Kbps50, 0x49),
            (CanSpeed::Kbps100, 0x44),
            (CanSpeed::Kbps125, 0x43),
            (CanSpeed::Kbps250, 0x41),
            (CanSpeed::Kbps500, 0x40),
        ];
        for (speed, cnf1) in expected.iter().copied() {
            let timing = BitTiming::new(speed, McpSpeed::MHz16).unwrap();
            assert_eq!(bytes(timing), (cnf1, 0xAC, 0x83), "{:?}", speed);
        }

        let fast = BitTiming::new(CanSpeed::Kbps1000, McpSpeed::MHz16).unwrap();
        assert_eq!(bytes(fast), (0x00, 0x91, 0x81));
    }

    #[test]
    fn unreachable_rates() {
        assert!(BitTiming::new(CanSpeed::Kbps500, McpSpeed::MHz8).is_none());
        assert!(BitTiming::new(CanSpeed::Kbps1000, McpSpeed::MHz8).is_none());
        assert!(BitTiming::new(CanSpeed::Kbps250, McpSpeed::MHz8).is_some());
    }

    #[test]
    fn raw_rates() {
        assert_eq!(CanSpeed::try_from(125_000), Ok(CanSpeed::Kbps125));
        assert_eq!(CanSpeed::try_from(33_333), Err(UnknownBitRate(33_333)));
        for speed in [CanSpeed::Kbps20, CanSpeed::Kbps1000].iter() {
            assert_eq!(CanSpeed::try_from(speed.bps()), Ok(*speed));
        }
    }
}
