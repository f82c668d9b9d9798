//! MCP2515 registers and SPI instruction set.

use bitflags::bitflags;
use modular_bitfield::prelude::*;

/// SPI instruction opcodes understood by the MCP2515.
///
/// The per-buffer instructions (`LoadTx*`, `RtsTx*`, `ReadRx*`) encode the
/// buffer in the opcode itself. They are only reachable through
/// [`TxBuf`](crate::buffer::TxBuf) and [`RxBuf`](crate::buffer::RxBuf).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instruction {
    Write = 0x02,
    Read = 0x03,
    Bitmod = 0x05,
    /// Load Tx buffer 0, starting at `TXB0SIDH`.
    LoadTx0 = 0x40,
    /// Load Tx buffer 1, starting at `TXB1SIDH`.
    LoadTx1 = 0x42,
    /// Load Tx buffer 2, starting at `TXB2SIDH`.
    LoadTx2 = 0x44,
    RtsTx0 = 0x81,
    RtsTx1 = 0x82,
    RtsTx2 = 0x84,
    /// Read Rx buffer 0, starting at `RXB0SIDH`.
    ReadRx0 = 0x90,
    /// Read Rx buffer 1, starting at `RXB1SIDH`.
    ReadRx1 = 0x94,
    ReadStatus = 0xA0,
    RxStatus = 0xB0,
    Reset = 0xC0,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    RXF0SIDH = 0x00,
    RXF1SIDH = 0x04,
    RXF2SIDH = 0x08,
    BFPCTRL = 0x0C,
    TXRTSCTRL = 0x0D,
    CANSTAT = 0x0E,
    CANCTRL = 0x0F,
    RXF3SIDH = 0x10,
    RXF4SIDH = 0x14,
    RXF5SIDH = 0x18,
    TEC = 0x1C,
    REC = 0x1D,
    RXM0SIDH = 0x20,
    RXM1SIDH = 0x24,
    CNF3 = 0x28,
    CNF2 = 0x29,
    CNF1 = 0x2A,
    CANINTE = 0x2B,
    CANINTF = 0x2C,
    TXB0CTRL = 0x30,
    TXB1CTRL = 0x40,
    TXB2CTRL = 0x50,
    RXB0CTRL = 0x60,
    RXB1CTRL = 0x70,
}

/// A single byte register with a fixed address.
pub trait Reg: Copy {
    /// Address of the register.
    const ADDRESS: Register;

    /// Interprets the raw register content.
    fn read(content: u8) -> Self;

    /// Raw register content.
    fn write(self) -> u8;
}

/// Marker trait implemented on registers which support the `BIT MODIFY`
/// instruction.
pub trait BitModifiable: Reg {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanCtrl {
    /// CLKOUT prescaler.
    pub clkpre: B2,
    /// CLKOUT enable.
    pub clken: bool,
    /// One-shot mode.
    pub osm: bool,
    /// Abort all pending transmissions.
    pub abat: bool,
    /// Request operation mode.
    pub reqop: OpMode,
}

impl CanCtrl {
    /// Mask to modify the `reqop` bits.
    pub const MASK_REQOP: Self = Self::from_bytes([0b1110_0000]);
    /// Mask to modify the `clken` bit.
    pub const MASK_CLKEN: Self = Self::from_bytes([0b0000_0100]);
}

impl BitModifiable for CanCtrl {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanStat {
    #[skip]
    __: B1,
    /// Interrupt flag code.
    #[skip(setters)]
    pub icod: B3,
    #[skip]
    __: B1,
    /// Current operation mode.
    #[skip(setters)]
    pub opmod: OpMode,
}

impl CanStat {
    /// Raw `OPMOD` bits, valid or not.
    pub fn opmod_bits(self) -> u8 {
        self.into_bytes()[0] >> 5
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanIntf {
    pub rx0if: bool,
    pub rx1if: bool,
    pub tx0if: bool,
    pub tx1if: bool,
    pub tx2if: bool,
    pub errif: bool,
    pub wakif: bool,
    pub merrf: bool,
}

impl CanIntf {
    pub const MASK_RX0IF: Self = Self::from_bytes([0b0000_0001]);
    pub const MASK_RX1IF: Self = Self::from_bytes([0b0000_0010]);
}

impl BitModifiable for CanIntf {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanInte {
    pub rx0ie: bool,
    pub rx1ie: bool,
    pub tx0ie: bool,
    pub tx1ie: bool,
    pub tx2ie: bool,
    pub errie: bool,
    pub wakie: bool,
    pub merre: bool,
}

impl BitModifiable for CanInte {}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf1 {
    /// Baud rate prescaler.
    pub brp: B6,
    pub sjw: SyncJumpWidth,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf2 {
    /// Propagation segment length, minus one.
    pub prseg: B3,
    /// Phase segment 1 length, minus one.
    pub phseg1: B3,
    /// Sample three times at the sample point.
    pub sam: bool,
    /// Phase segment 2 length taken from `CNF3`.
    pub btlmode: bool,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cnf3 {
    /// Phase segment 2 length, minus one.
    pub phseg2: B3,
    #[skip]
    __: B3,
    pub wakfil: bool,
    /// Start-of-frame signal on the CLKOUT pin.
    pub sof: bool,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rxb0Ctrl {
    /// Filter hit.
    #[skip(setters)]
    pub filhit0: bool,
    /// Read-only copy of BUKT bit (used internally by MCP2515).
    #[skip(setters)]
    pub bukt1: bool,
    /// Rollover into RXB1 when RXB0 is full.
    pub bukt: bool,
    /// Received remote transfer request.
    #[skip(setters)]
    pub rxrtr: bool,
    #[skip]
    __: B1,
    /// Receive buffer operating mode.
    pub rxm: RecvBufOpMode,
    #[skip]
    __: B1,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rxb1Ctrl {
    /// Filter hit.
    #[skip(setters)]
    pub filhit: B3,
    /// Received remote transfer request.
    #[skip(setters)]
    pub rxrtr: bool,
    #[skip]
    __: B1,
    /// Receive buffer operating mode.
    pub rxm: RecvBufOpMode,
    #[skip]
    __: B1,
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxbCtrl {
    /// Transmit priority.
    pub txp: B2,
    #[skip]
    __: B1,
    pub txreq: bool,
    #[skip(setters)]
    pub txerr: bool,
    #[skip(setters)]
    pub mloa: bool,
    #[skip(setters)]
    pub abtf: bool,
    #[skip]
    __: B1,
}

impl TxbCtrl {
    pub const MASK_TXREQ: Self = Self::from_bytes([0b0000_1000]);

    /// Whether the hardware gave up on the transmission.
    ///
    /// Lost arbitration and bus errors are retried by the controller while
    /// `TXREQ` stays set, so they only count once the request is cleared.
    pub fn failed(self) -> bool {
        self.abtf() || (!self.txreq() && self.txerr())
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxRtsCtrl {
    /// `TX0RTS` pin requests transmission of TXB0.
    pub b0rtsm: bool,
    pub b1rtsm: bool,
    pub b2rtsm: bool,
    #[skip(setters)]
    pub b0rts: bool,
    #[skip(setters)]
    pub b1rts: bool,
    #[skip(setters)]
    pub b2rts: bool,
    #[skip]
    __: B2,
}

impl TxRtsCtrl {
    /// Mask covering the three pin mode bits.
    pub const MASK_RTSM: Self = Self::from_bytes([0b0000_0111]);
}

impl BitModifiable for TxRtsCtrl {}

bitflags! {
    /// `BFPCTRL`: configuration of the `RX0BF` / `RX1BF` pins.
    pub struct BfpCtrl: u8 {
        /// `RX0BF` signals RXB0 full (interrupt mode).
        const B0BFM = 0b0000_0001;
        /// `RX1BF` signals RXB1 full (interrupt mode).
        const B1BFM = 0b0000_0010;
        /// `RX0BF` pin enabled.
        const B0BFE = 0b0000_0100;
        /// `RX1BF` pin enabled.
        const B1BFE = 0b0000_1000;
        /// `RX0BF` level in digital output mode.
        const B0BFS = 0b0001_0000;
        /// `RX1BF` level in digital output mode.
        const B1BFS = 0b0010_0000;
    }
}

impl BfpCtrl {
    /// Both receive buffer full pins enabled as interrupt outputs.
    pub const RX_INTERRUPTS: Self = Self::from_bits_truncate(
        Self::B0BFM.bits() | Self::B1BFM.bits() | Self::B0BFE.bits() | Self::B1BFE.bits(),
    );
}

///////////////////
/// Enums
///////////////////

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bits = 2]
pub enum RecvBufOpMode {
    /// Receives all valid messages that meet the filter criteria.
    FilterOn = 0x0,
    /// Turns masks/filters off; receives any message.
    FilterOff = 0x3,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[bits = 2]
pub enum SyncJumpWidth {
    Tq1,
    Tq2,
    Tq3,
    Tq4,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
#[bits = 3]
pub enum OpMode {
    Normal,
    Sleep,
    Loopback,
    ListenOnly,
    Configuration,
}

macro_rules! reg {
    ($($s:ty => $reg:expr),*) => {
        $(
            impl Reg for $s {
                const ADDRESS: Register = $reg;

                #[inline]
                fn read(content: u8) -> Self {
                    Self::from_bytes([content])
                }

                #[inline]
                fn write(self) -> u8 {
                    self.into_bytes()[0]
                }
            }
        )*
    };
}

reg! {
    CanCtrl => Register::CANCTRL,
    CanStat => Register::CANSTAT,
    CanIntf => Register::CANINTF,
    CanInte => Register::CANINTE,
    Cnf1 => Register::CNF1,
    Cnf2 => Register::CNF2,
    Cnf3 => Register::CNF3,
    Rxb0Ctrl => Register::RXB0CTRL,
    Rxb1Ctrl => Register::RXB1CTRL,
    TxRtsCtrl => Register::TXRTSCTRL
}
