//! Quick status bytes returned by `READ STATUS` and `RX STATUS`.

use modular_bitfield::prelude::*;

use crate::buffer::{RxBuf, TxBuf};

/// Response to the `READ STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    #[skip(setters)]
    pub rx0if: bool,
    #[skip(setters)]
    pub rx1if: bool,
    #[skip(setters)]
    pub tx0req: bool,
    #[skip(setters)]
    pub tx0if: bool,
    #[skip(setters)]
    pub tx1req: bool,
    #[skip(setters)]
    pub tx1if: bool,
    #[skip(setters)]
    pub tx2req: bool,
    #[skip(setters)]
    pub tx2if: bool,
}

impl Status {
    /// Whether a transmission request is still pending on `buf`.
    pub fn tx_pending(self, buf: TxBuf) -> bool {
        match buf {
            TxBuf::B0 => self.tx0req(),
            TxBuf::B1 => self.tx1req(),
            TxBuf::B2 => self.tx2req(),
        }
    }

    /// Whether `buf` holds a received message.
    pub fn rx_full(self, buf: RxBuf) -> bool {
        match buf {
            RxBuf::B0 => self.rx0if(),
            RxBuf::B1 => self.rx1if(),
        }
    }
}

/// Kind of the last received message, as reported by `RX STATUS`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 2]
pub enum MessageType {
    StandardData,
    StandardRemote,
    ExtendedData,
    ExtendedRemote,
}

/// Response to the `RX STATUS` instruction.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus {
    /// Matching filter. 0-5 are RXF0-RXF5, 6 and 7 are RXF0 and RXF1
    /// rolled over into RXB1.
    #[skip(setters)]
    pub filter_match: B3,
    #[skip(setters)]
    pub msg_type: MessageType,
    #[skip]
    __: B1,
    /// Message in RXB0.
    #[skip(setters)]
    pub rx0: bool,
    /// Message in RXB1.
    #[skip(setters)]
    pub rx1: bool,
}
