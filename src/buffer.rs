//! Transmit/receive buffer slots and the buffer wire layout.
//!
//! A hardware buffer starts at `SIDH` and is laid out as
//! `SIDH, SIDL, EID8, EID0, DLC, D0..D7`, 13 bytes in total.

use embedded_hal::can::{ExtendedId, Frame, Id, StandardId};
use modular_bitfield::prelude::*;

use crate::{
    frame::{CanFrame, MAX_DLC},
    regs::{CanIntf, Instruction, Register},
};

/// Length of the identifier part of a buffer (`SIDH` to `EID0`).
pub const ID_LEN: usize = 4;
/// Length of the buffer header (identifier plus `DLC`).
pub const HEADER_LEN: usize = ID_LEN + 1;
/// Length of a complete buffer.
pub const BUFFER_LEN: usize = HEADER_LEN + MAX_DLC;

/// `SIDL` register of a buffer, mask or filter.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sidl {
    /// Extended identifier bits 17:16.
    eid_hi: B2,
    #[skip]
    __: B1,
    /// Extended identifier enable.
    exide: bool,
    /// Standard frame remote transmit request (receive buffers only).
    srr: bool,
    /// Standard identifier bits 2:0.
    sid_lo: B3,
}

/// `DLC` register of a buffer.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dlc {
    dlc: B4,
    #[skip]
    __: B2,
    /// Remote transmission request.
    rtr: bool,
    #[skip]
    __: B1,
}

/// Packs an identifier into `SIDH, SIDL, EID8, EID0`.
///
/// Standard identifiers only occupy the `SID` bits; `EID8`/`EID0` are zero.
pub fn encode_id(id: Id) -> [u8; ID_LEN] {
    match id {
        Id::Standard(id) => {
            let raw = id.as_raw();
            let sidl = Sidl::new().with_sid_lo((raw & 0x07) as u8);
            [(raw >> 3) as u8, sidl.into_bytes()[0], 0, 0]
        }
        Id::Extended(id) => {
            // Upper 11 bits go into SID, the lower 18 into EID.
            let raw = id.as_raw();
            let sidl = Sidl::new()
                .with_sid_lo(((raw >> 18) & 0x07) as u8)
                .with_exide(true)
                .with_eid_hi(((raw >> 16) & 0x03) as u8);
            [
                (raw >> 21) as u8,
                sidl.into_bytes()[0],
                (raw >> 8) as u8,
                raw as u8,
            ]
        }
    }
}

/// Unpacks an identifier from `SIDH, SIDL, EID8, EID0`.
pub fn decode_id(bytes: &[u8; ID_LEN]) -> Id {
    let sidl = Sidl::from_bytes([bytes[1]]);
    if sidl.exide() {
        let raw = (bytes[0] as u32) << 21
            | (sidl.sid_lo() as u32) << 18
            | (sidl.eid_hi() as u32) << 16
            | (bytes[2] as u32) << 8
            | bytes[3] as u32;
        // Assembled from 29 bits, never out of range.
        Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::MAX))
    } else {
        let raw = (bytes[0] as u16) << 3 | sidl.sid_lo() as u16;
        Id::Standard(StandardId::new(raw).unwrap_or(StandardId::MAX))
    }
}

/// Encodes `frame` into the transmit buffer layout.
///
/// Returns the number of bytes to load: the header plus the payload, which
/// is omitted entirely for remote frames.
pub fn encode_frame(frame: &CanFrame, out: &mut [u8; BUFFER_LEN]) -> usize {
    out[..ID_LEN].copy_from_slice(&encode_id(frame.id));
    out[ID_LEN] = Dlc::new()
        .with_dlc(frame.dlc)
        .with_rtr(frame.rtr)
        .into_bytes()[0];

    if frame.rtr {
        return HEADER_LEN;
    }
    let data = frame.data();
    out[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
    HEADER_LEN + data.len()
}

/// Decodes a receive (or transmit) buffer into a frame.
///
/// Data length codes above 8 are clamped to 8.
pub fn decode_frame(raw: &[u8; BUFFER_LEN]) -> CanFrame {
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&raw[..ID_LEN]);
    let id = decode_id(&id);

    let sidl = Sidl::from_bytes([raw[1]]);
    let dlc = Dlc::from_bytes([raw[ID_LEN]]);
    // Standard remote frames are flagged in SIDL.SRR, extended ones in DLC.RTR.
    let rtr = dlc.rtr() || (!sidl.exide() && sidl.srr());
    let len = (dlc.dlc() as usize).min(MAX_DLC);

    let mut frame = CanFrame {
        id,
        rtr,
        dlc: len as u8,
        data: [0; MAX_DLC],
    };
    if !rtr {
        frame.data[..len].copy_from_slice(&raw[HEADER_LEN..HEADER_LEN + len]);
    }
    frame
}

/// Instructions and registers addressing one transmit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxSlot {
    pub load: Instruction,
    pub rts: Instruction,
    pub ctrl: Register,
}

/// Instruction and interrupt flag addressing one receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RxSlot {
    pub read: Instruction,
    pub intf: CanIntf,
}

crate::slot_def! {
    /// Transmit buffer.
    pub(crate) TxBuf => TxSlot {
        /// Tx buffer 0.
        B0 => TxSlot { load: Instruction::LoadTx0, rts: Instruction::RtsTx0, ctrl: Register::TXB0CTRL },
        /// Tx buffer 1.
        B1 => TxSlot { load: Instruction::LoadTx1, rts: Instruction::RtsTx1, ctrl: Register::TXB1CTRL },
        /// Tx buffer 2.
        B2 => TxSlot { load: Instruction::LoadTx2, rts: Instruction::RtsTx2, ctrl: Register::TXB2CTRL }
    }
}

crate::slot_def! {
    /// Receive buffer.
    pub(crate) RxBuf => RxSlot {
        /// Rx buffer 0.
        B0 => RxSlot { read: Instruction::ReadRx0, intf: CanIntf::MASK_RX0IF },
        /// Rx buffer 1.
        B1 => RxSlot { read: Instruction::ReadRx1, intf: CanIntf::MASK_RX1IF }
    }
}

impl TxBuf {
    /// Returns the `CTRL` register for the selected Tx buffer.
    pub const fn ctrl(self) -> Register {
        self.entry().ctrl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std_id(raw: u16) -> Id {
        Id::Standard(StandardId::new(raw).unwrap())
    }

    fn ext_id(raw: u32) -> Id {
        Id::Extended(ExtendedId::new(raw).unwrap())
    }

    #[test]
    fn encodes_standard_data_frame() {
        let frame = CanFrame::new(std_id(0x123), &[0xAA, 0xBB]).unwrap();
        let mut out = [0u8; BUFFER_LEN];
        let n = encode_frame(&frame, &mut out);
        assert_eq!(&out[..n], &[0x24, 0x60, 0x00, 0x00, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn encodes_extended_data_frame() {
        let frame = CanFrame::new(ext_id(0x1234_5678), &[1, 2, 3]).unwrap();
        let mut out = [0u8; BUFFER_LEN];
        let n = encode_frame(&frame, &mut out);
        assert_eq!(&out[..n], &[0x91, 0xA8, 0x56, 0x78, 0x03, 1, 2, 3]);
    }

    #[test]
    fn remote_frame_carries_no_payload() {
        let frame = CanFrame::new_remote(ext_id(0x1234_5678), 2).unwrap();
        let mut out = [0xFFu8; BUFFER_LEN];
        let n = encode_frame(&frame, &mut out);
        assert_eq!(&out[..n], &[0x91, 0xA8, 0x56, 0x78, 0x42]);
    }

    #[test]
    fn standard_ids_use_eleven_bits() {
        let bytes = encode_id(std_id(0x7FF));
        assert_eq!(bytes, [0xFF, 0xE0, 0x00, 0x00]);
        let bytes = encode_id(std_id(0x000));
        assert_eq!(bytes, [0x00; 4]);
    }

    #[test]
    fn extended_ids_use_twenty_nine_bits() {
        let bytes = encode_id(ext_id(0x1FFF_FFFF));
        // SIDL bit 4 (SRR) and bit 2 stay clear.
        assert_eq!(bytes, [0xFF, 0xEB, 0xFF, 0xFF]);
    }

    #[test]
    fn decodes_standard_remote_from_srr() {
        let mut raw = [0u8; BUFFER_LEN];
        raw[0] = 0x24;
        raw[1] = 0x70; // SID 2:0 = 0b011, SRR set
        raw[4] = 0x01;
        let frame = decode_frame(&raw);
        assert_eq!(frame.id(), std_id(0x123));
        assert!(frame.is_remote_frame());
        assert_eq!(frame.dlc(), 1);
    }

    #[test]
    fn decode_clamps_dlc() {
        let mut raw = [0x5Au8; BUFFER_LEN];
        raw[1] = 0x00;
        raw[4] = 0x0F;
        let frame = decode_frame(&raw);
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data(), &[0x5A; 8]);
    }

    #[test]
    fn round_trip() {
        let ids = [
            std_id(0x000),
            std_id(0x123),
            std_id(0x7FF),
            ext_id(0x0000_0000),
            ext_id(0x0003_FFFF),
            ext_id(0x1234_5678),
            ext_id(0x1FFF_FFFF),
        ];
        let payload = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];

        for id in ids.iter().copied() {
            for len in 0..=MAX_DLC {
                for frame in [
                    CanFrame::new(id, &payload[..len]).unwrap(),
                    CanFrame::new_remote(id, len).unwrap(),
                ]
                .iter()
                {
                    let mut raw = [0u8; BUFFER_LEN];
                    encode_frame(frame, &mut raw);
                    assert_eq!(decode_frame(&raw), *frame);
                }
            }
        }
    }

    #[test]
    fn slot_tables() {
        assert_eq!(TxBuf::ALL, [TxBuf::B0, TxBuf::B1, TxBuf::B2]);
        assert_eq!(TxBuf::B1.entry().load as u8, 0x42);
        assert_eq!(TxBuf::B2.entry().rts as u8, 0x84);
        assert_eq!(TxBuf::B2.ctrl(), Register::TXB2CTRL);
        assert_eq!(RxBuf::B1.entry().read as u8, 0x94);
        assert_eq!(RxBuf::B0.entry().intf, CanIntf::MASK_RX0IF);
    }
}
