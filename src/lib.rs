#![cfg_attr(not(test), no_std)]

//! CAN bus node transport for the MCP2515 CAN controller.
//!
//! The driver talks to the MCP2515 over SPI, programs it once at start-up
//! and then moves frames through its three transmit and two receive
//! buffers without ever blocking:
//!
//! * [`MCP2515::send_message`] picks the first free Tx buffer, or fails with
//!   [`Error::TxBusy`].
//! * [`MCP2515::read_message`] drains RXB0 before RXB1, or fails with
//!   [`Error::NoMessage`].
//!
//! Retrying is left to the caller's main loop.

pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub(crate) mod macros;
pub mod regs;
pub mod stat;
pub mod timing;

#[cfg(test)]
pub(crate) mod mocks;
#[cfg(test)]
mod tests;

use core::fmt::Debug;

use buffer::{RxBuf, TxBuf, BUFFER_LEN};
use embedded_hal::{
    blocking::{delay::DelayMs, spi::Transfer},
    can::Id,
    digital::v2::OutputPin,
};
use embedded_time::{duration::Milliseconds, Clock};
use filter::{RxFilter, RxMask};
use frame::CanFrame;
use log::{debug, warn};
use regs::{OpMode, Register};
use stat::{RxStatus, Status};

pub use crate::{
    config::{Filtering, Settings},
    error::{Error, Result},
    timing::{CanSpeed, McpSpeed},
};
use crate::{
    regs::{
        BfpCtrl, CanCtrl, CanInte, CanIntf, CanStat, Instruction, RecvBufOpMode, Rxb0Ctrl,
        Rxb1Ctrl, TxRtsCtrl, TxbCtrl,
    },
    timing::BitTiming,
};

/// Largest number of register bytes moved in one transaction.
const MAX_PAYLOAD: usize = 14;
/// Instruction, address and payload.
const MAX_TRANSACTION: usize = 2 + MAX_PAYLOAD;
/// Settling time after a reset, in milliseconds.
const RESET_DELAY_MS: u8 = 10;
/// Reads of `CANSTAT` before a mode change is considered failed.
const MODE_POLL_ATTEMPTS: usize = 20;

/// Registers cleared at start-up, 14 bytes each starting at the buffer's
/// `CTRL` register so stale `TXREQ` and `RXM` bits are zeroed along with the
/// header and data.
const BUFFER_CTRL_REGISTERS: [Register; 5] = [
    Register::TXB0CTRL,
    Register::TXB1CTRL,
    Register::TXB2CTRL,
    Register::RXB0CTRL,
    Register::RXB1CTRL,
];

/// MCP2515 driver.
pub struct MCP2515<SPI, CS> {
    /// SPI interface to interact with the MCP2515.
    spi: SPI,
    /// Chip select pin to select the MCP2515.
    cs: CS,
}

impl<SPI, CS, SPIE, CSE> MCP2515<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    /// Creates a new MCP2515 driver. The chip is not touched until
    /// [`init`](Self::init) is called.
    ///
    /// # Configuration
    ///
    /// As this driver only takes ownership of the SPI interface, it is up to
    /// the user to create and configure the SPI interface. Namely, the MCP2515
    /// requires the following options:
    ///
    /// * **Data Order**: MSB first.
    /// * **Clock**: at most 10 MHz.
    /// * **Mode**: Mode 0.
    ///
    /// # Parameters
    ///
    /// * `spi` - SPI interface.
    /// * `cs` - Chip-select pin for the MCP2515.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Releases the SPI interface and chip select pin.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Initializes the MCP2515. This should be called once at the start of
    /// the program.
    ///
    /// Every step must succeed; the first failure aborts the sequence and
    /// leaves the controller unusable until the next `init`. Check
    /// [`Error::is_fatal`] to decide whether the node should restart.
    ///
    /// # Parameters
    ///
    /// * `delay` - Delay interface from downstream HAL.
    /// * `settings` - Settings for MCP2515. See [`Settings`].
    pub fn init(
        &mut self,
        delay: &mut impl DelayMs<u8>,
        settings: Settings,
    ) -> Result<(), SPIE, CSE> {
        self.cs.set_high().map_err(Error::Hal)?;
        self.reset(delay)?;

        // Bit timing, buffers, masks and filters may only be written in
        // configuration mode.
        self.set_mode(OpMode::Configuration)?;
        self.set_bitrate(settings.can_speed, settings.mcp_speed, settings.clkout_en)?;
        self.set_clken(settings.clkout_en)?;
        self.clear_buffers()?;

        for (mask, id) in RxMask::ALL.iter().zip(settings.masks.iter()) {
            self.set_mask(*mask, *id)?;
        }
        for (filter, id) in RxFilter::ALL.iter().zip(settings.filters.iter()) {
            self.set_filter(*filter, *id)?;
        }

        self.configure_pins()?;
        self.write_register(CanInte::new().with_rx0ie(true).with_rx1ie(true))?;
        self.configure_rx_buffers(settings.filtering)?;

        self.set_mode(settings.mode)?;
        debug!(
            "MCP2515 running at {:?} ({:?} oscillator), filtering {:?}",
            settings.can_speed, settings.mcp_speed, settings.filtering
        );
        Ok(())
    }

    /// Sets a receive filter. Only valid in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `filter` - The filter to action on.
    /// * `id` - The actual ID filter to apply to `filter`.
    pub fn set_filter(&mut self, filter: RxFilter, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(filter.entry(), &filter::encode_filter(id))?;
        Ok(())
    }

    /// Sets a receive mask. Only valid in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `mask` - The mask to action on.
    /// * `id` - The actual ID mask to apply to `mask`.
    pub fn set_mask(&mut self, mask: RxMask, id: Id) -> Result<(), SPIE, CSE> {
        self.write_registers(mask.entry(), &filter::encode_filter(id))?;
        Ok(())
    }

    /// Configures the MCP2515 to operate at a certain CAN bitrate. Only valid
    /// in configuration mode.
    ///
    /// # Parameters
    ///
    /// * `can_speed` - CAN speed to operate at.
    /// * `mcp_speed` - Clock speed of the MCP2515.
    /// * `clkout_en` - Whether the `CLKOUT` pin outputs the clock rather than
    ///   the start-of-frame signal.
    pub fn set_bitrate(
        &mut self,
        can_speed: CanSpeed,
        mcp_speed: McpSpeed,
        clkout_en: bool,
    ) -> Result<(), SPIE, CSE> {
        let timing = match BitTiming::new(can_speed, mcp_speed) {
            Some(timing) => timing,
            None => {
                warn!("{:?} is not reachable from a {:?} oscillator", can_speed, mcp_speed);
                return Err(Error::UnsupportedBitRate(can_speed, mcp_speed));
            }
        };
        let mut cnf3 = timing.cnf3;
        if clkout_en {
            cnf3 = cnf3.with_sof(false);
        }
        self.write_register(timing.cnf1)?;
        self.write_register(timing.cnf2)?;
        self.write_register(cnf3)?;
        Ok(())
    }

    /// Requests a new operation mode and checks the controller entered it.
    ///
    /// # Returns
    ///
    /// Nothing on success, [`Error::ModeChange`] if `CANSTAT` never reported
    /// the requested mode.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_reqop(mode), CanCtrl::MASK_REQOP)?;

        // CANSTAT only follows REQOP once pending transmissions finish.
        let mut actual = 0;
        for _ in 0..MODE_POLL_ATTEMPTS {
            let canstat: CanStat = self.read_register()?;
            if canstat.opmod_or_err().ok() == Some(mode) {
                return Ok(());
            }
            actual = canstat.opmod_bits();
        }

        warn!("Requested {:?}, controller reports mode bits {:#05b}", mode, actual);
        Err(Error::ModeChange {
            requested: mode,
            actual,
        })
    }

    /// Enables/disables the `CLKOUT` pin on the MCP2515.
    fn set_clken(&mut self, clken: bool) -> Result<(), SPIE, CSE> {
        self.modify_register(CanCtrl::new().with_clken(clken), CanCtrl::MASK_CLKEN)
    }

    /// Zeroes all Tx and Rx buffers, including their control registers.
    fn clear_buffers(&mut self) -> Result<(), SPIE, CSE> {
        let zeros = [0u8; MAX_PAYLOAD];
        for reg in BUFFER_CTRL_REGISTERS.iter() {
            self.write_registers(*reg, &zeros)?;
        }
        Ok(())
    }

    /// `RX0BF`/`RX1BF` signal a full receive buffer; the `TXnRTS` pins are
    /// ignored since transmissions are requested over SPI.
    fn configure_pins(&mut self) -> Result<(), SPIE, CSE> {
        self.write_register_raw(Register::BFPCTRL, BfpCtrl::RX_INTERRUPTS.bits())?;
        self.modify_register(TxRtsCtrl::new(), TxRtsCtrl::MASK_RTSM)
    }

    fn configure_rx_buffers(&mut self, filtering: Filtering) -> Result<(), SPIE, CSE> {
        let (rxb0, rxb1) = match filtering {
            Filtering::Enabled => (
                Rxb0Ctrl::new().with_rxm(RecvBufOpMode::FilterOn),
                Rxb1Ctrl::new().with_rxm(RecvBufOpMode::FilterOn),
            ),
            Filtering::Disabled => (
                Rxb0Ctrl::new()
                    .with_rxm(RecvBufOpMode::FilterOff)
                    .with_bukt(true),
                Rxb1Ctrl::new().with_rxm(RecvBufOpMode::FilterOff),
            ),
        };
        self.write_register(rxb0)?;
        self.write_register(rxb1)
    }

    /// Sends a CAN frame over the CAN bus via the first free Tx buffer.
    ///
    /// This never waits: success means the frame was handed to the
    /// controller, not that it was delivered. Use
    /// [`transmit_status`](Self::transmit_status) or
    /// [`await_transmit`](Self::await_transmit) with the returned buffer to
    /// follow up.
    ///
    /// # Returns
    ///
    /// The Tx buffer holding the frame, or [`Error::TxBusy`] if all three are
    /// pending.
    pub fn send_message(&mut self, frame: &CanFrame) -> Result<TxBuf, SPIE, CSE> {
        let buf = self.find_free_tx_buf()?;

        let mut data = [0u8; BUFFER_LEN];
        let len = buffer::encode_frame(frame, &mut data);
        self.load_tx_buffer(buf, &data[..len])?;
        self.request_to_send(buf)?;

        debug!("Frame {:#X} queued in {:?}", frame.raw_id(), buf);
        Ok(buf)
    }

    /// Attempts to find a free Tx buffer, preferring TXB0, then TXB1, then
    /// TXB2.
    ///
    /// # Returns
    ///
    /// An available Tx buffer on success, error if all Tx buffers were busy.
    pub fn find_free_tx_buf(&mut self) -> Result<TxBuf, SPIE, CSE> {
        let status = self.read_status()?;
        TxBuf::ALL
            .iter()
            .copied()
            .find(|buf| !status.tx_pending(*buf))
            .ok_or(Error::TxBusy)
    }

    /// Checks on a transmission started by [`send_message`](Self::send_message).
    ///
    /// # Returns
    ///
    /// `WouldBlock` while the request is pending, including while the
    /// controller retries after lost arbitration or a bus error.
    /// [`Error::TxFailed`] if the transmission was aborted, or the request was
    /// cleared with a bus error flagged.
    pub fn transmit_status(&mut self, buf: TxBuf) -> nb::Result<(), Error<SPIE, CSE>> {
        let ctrl = TxbCtrl::from_bytes([self.read_register_raw(buf.ctrl())?]);
        if ctrl.failed() {
            Err(nb::Error::Other(Error::TxFailed))
        } else if ctrl.txreq() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Cancels a pending transmission.
    pub fn abort_transmit(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        self.bit_modify(buf.ctrl(), TxbCtrl::MASK_TXREQ.into_bytes()[0], 0)
    }

    /// Waits at most `timeout` for a transmission to complete, aborting it
    /// if it does not.
    pub fn await_transmit<C: Clock>(
        &mut self,
        buf: TxBuf,
        clock: &C,
        timeout: Milliseconds,
    ) -> Result<(), SPIE, CSE> {
        let deadline = clock
            .try_now()?
            .checked_add(timeout)
            .ok_or(Error::Clock)?;

        loop {
            match self.transmit_status(buf) {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            if clock.try_now()? > deadline {
                warn!("Transmission in {:?} timed out, aborting", buf);
                self.abort_transmit(buf)?;
                return Err(Error::TxTimeout);
            }
        }
    }

    /// Reads a message from the MCP2515 Rx buffers, RXB0 first.
    ///
    /// # Returns
    ///
    /// The received frame, or [`Error::NoMessage`] if neither buffer is full.
    /// Buffer contents are only read when a buffer reports a message.
    pub fn read_message(&mut self) -> Result<CanFrame, SPIE, CSE> {
        let status = self.read_status()?;
        let buf = RxBuf::ALL
            .iter()
            .copied()
            .find(|buf| status.rx_full(*buf))
            .ok_or(Error::NoMessage)?;
        self.read_message_from_buf(buf)
    }

    /// Reads a message from a specific Rx buffer and releases the buffer.
    ///
    /// # Parameters
    ///
    /// * `buf` - Rx buffer to read from.
    pub fn read_message_from_buf(&mut self, buf: RxBuf) -> Result<CanFrame, SPIE, CSE> {
        let raw = self.read_rx_buffer(buf)?;
        let frame = buffer::decode_frame(&raw);
        self.modify_register(CanIntf::new(), buf.entry().intf)?;
        Ok(frame)
    }

    /// Resets the MCP2515 and waits for it to settle. No other command may be
    /// sent before this returns.
    pub fn reset(&mut self, delay: &mut impl DelayMs<u8>) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Reset as u8])?;
        delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    /// Reads the status register via `READ STATUS`.
    pub fn read_status(&mut self) -> Result<Status, SPIE, CSE> {
        self.quick_status(Instruction::ReadStatus)
            .map(|b| Status::from_bytes([b]))
    }

    /// Reads the receive status via `RX STATUS`.
    pub fn read_rx_status(&mut self) -> Result<RxStatus, SPIE, CSE> {
        self.quick_status(Instruction::RxStatus)
            .map(|b| RxStatus::from_bytes([b]))
    }

    fn quick_status(&mut self, instruction: Instruction) -> Result<u8, SPIE, CSE> {
        let mut data = [instruction as u8, 0];
        self.transfer(&mut data).map(last_byte)
    }

    /// Requests transmission of a loaded Tx buffer.
    pub fn request_to_send(&mut self, buf: TxBuf) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [buf.entry().rts as u8])?;
        Ok(())
    }

    /// Loads a Tx buffer starting at its `SIDH` register. `data` is the
    /// output of [`buffer::encode_frame`]. Bytes past the 13-byte buffer
    /// image are not sent.
    pub fn load_tx_buffer(&mut self, buf: TxBuf, data: &[u8]) -> Result<(), SPIE, CSE> {
        let n = data.len().min(BUFFER_LEN);
        let mut cmd = [0u8; 1 + BUFFER_LEN];
        cmd[0] = buf.entry().load as u8;
        cmd[1..=n].copy_from_slice(&data[..n]);
        self.transfer(&mut cmd[..=n])?;
        Ok(())
    }

    /// Reads a complete Rx buffer starting at its `SIDH` register.
    pub fn read_rx_buffer(&mut self, buf: RxBuf) -> Result<[u8; BUFFER_LEN], SPIE, CSE> {
        let mut cmd = [0u8; 1 + BUFFER_LEN];
        cmd[0] = buf.entry().read as u8;
        let received = self.transfer(&mut cmd)?;

        let mut ret = [0u8; BUFFER_LEN];
        for (out, byte) in ret.iter_mut().zip(received.iter().skip(1)) {
            *out = *byte;
        }
        Ok(ret)
    }

    /// Read a register via a register object.
    #[inline]
    pub fn read_register<R: regs::Reg>(&mut self) -> Result<R, SPIE, CSE> {
        self.read_register_raw(R::ADDRESS).map(R::read)
    }

    /// Reads a single register.
    pub fn read_register_raw(&mut self, reg: Register) -> Result<u8, SPIE, CSE> {
        let mut data = [Instruction::Read as u8, reg as u8, 0];
        self.transfer(&mut data).map(last_byte)
    }

    /// Reads registers starting from `reg` sequentially, relying on the
    /// controller's address auto-increment, until `ret` is full.
    ///
    /// Every 14 registers start a new transaction at the next address.
    ///
    /// # Returns
    ///
    /// The number of registers read.
    pub fn read_registers(&mut self, reg: Register, ret: &mut [u8]) -> Result<usize, SPIE, CSE> {
        let mut address = reg as u8;
        for chunk in ret.chunks_mut(MAX_PAYLOAD) {
            let mut cmd = [0u8; MAX_TRANSACTION];
            cmd[0] = Instruction::Read as u8;
            cmd[1] = address;
            let received = self.transfer(&mut cmd[..2 + chunk.len()])?;

            for (out, byte) in chunk.iter_mut().zip(received.iter().skip(2)) {
                *out = *byte;
            }
            address = address.wrapping_add(chunk.len() as u8);
        }
        Ok(ret.len())
    }

    /// Write to a register using a register object.
    #[inline]
    pub fn write_register<R: regs::Reg>(&mut self, reg: R) -> Result<(), SPIE, CSE> {
        self.write_register_raw(R::ADDRESS, reg.write())
    }

    /// Writes a single register.
    pub fn write_register_raw(&mut self, reg: Register, value: u8) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Write as u8, reg as u8, value])?;
        Ok(())
    }

    /// Writes to sequential registers. Writing will start at `reg` and
    /// continue sequentially until `data` is empty.
    ///
    /// Every 14 registers start a new transaction at the next address.
    ///
    /// # Returns
    ///
    /// The number of registers written.
    pub fn write_registers(&mut self, reg: Register, data: &[u8]) -> Result<usize, SPIE, CSE> {
        let mut address = reg as u8;
        for chunk in data.chunks(MAX_PAYLOAD) {
            let n = chunk.len();
            let mut cmd = [0u8; MAX_TRANSACTION];
            cmd[0] = Instruction::Write as u8;
            cmd[1] = address;
            cmd[2..2 + n].copy_from_slice(chunk);
            self.transfer(&mut cmd[..2 + n])?;
            address = address.wrapping_add(n as u8);
        }
        Ok(data.len())
    }

    /// Modifies a register.
    ///
    /// # Parameters
    ///
    /// * `reg` - New register content.
    /// * `mask` - Mask register. The bits must be 1 in the positions you want
    ///   to modify.
    #[inline]
    pub fn modify_register<R: regs::BitModifiable>(
        &mut self,
        reg: R,
        mask: R,
    ) -> Result<(), SPIE, CSE> {
        self.bit_modify(R::ADDRESS, mask.write(), reg.write())
    }

    /// Sets the bits of `reg` selected by `mask` to those in `data` in a
    /// single `BIT MODIFY` instruction.
    pub fn bit_modify(&mut self, reg: Register, mask: u8, data: u8) -> Result<(), SPIE, CSE> {
        self.transfer(&mut [Instruction::Bitmod as u8, reg as u8, mask, data])?;
        Ok(())
    }

    /// Transfers an array of bytes via SPI in one chip select cycle.
    ///
    /// # Returns
    ///
    /// The bytes clocked in from the MCP2515, one per byte sent.
    fn transfer<'b>(&mut self, bytes: &'b mut [u8]) -> Result<&'b [u8], SPIE, CSE> {
        self.with_cs(move |spi| spi.transfer(bytes))?
            .map_err(Error::Spi)
    }

    /// Calls a function `f` after bringing the chip select pin low, restoring
    /// it to high after the function has finished.
    fn with_cs<T>(&mut self, f: impl FnOnce(&mut SPI) -> T) -> Result<T, SPIE, CSE> {
        self.cs.set_low().map_err(Error::Hal)?;
        let result = f(&mut self.spi);
        self.cs.set_high().map_err(Error::Hal)?;
        Ok(result)
    }
}

/// Last byte clocked in, which carries the response to single byte reads.
fn last_byte(received: &[u8]) -> u8 {
    if let [.., data] = received {
        *data
    } else {
        0
    }
}

impl<SPI, CS, SPIE, CSE> embedded_hal::can::nb::Can for MCP2515<SPI, CS>
where
    SPI: Transfer<u8, Error = SPIE>,
    CS: OutputPin<Error = CSE>,
    SPIE: Debug,
    CSE: Debug,
{
    type Frame = CanFrame;
    type Error = Error<SPIE, CSE>;

    /// Never replaces a pending frame; a full set of Tx buffers is reported as
    /// `WouldBlock`.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        match self.send_message(frame) {
            Ok(_) => Ok(None),
            Err(Error::TxBusy) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.read_message() {
            Ok(frame) => Ok(frame),
            Err(Error::NoMessage) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }
}
