use core::fmt::Debug;

use embedded_hal::can::ErrorKind;

use crate::{
    regs::OpMode,
    timing::{CanSpeed, McpSpeed, UnknownBitRate},
};

pub type Result<T, SPIE, CSE> = core::result::Result<T, Error<SPIE, CSE>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SPIE, CSE> {
    /// SPI transfer failed.
    Spi(SPIE),
    /// Chip select pin could not be driven.
    Hal(CSE),
    /// The controller did not report the requested operation mode.
    ModeChange {
        requested: OpMode,
        /// Raw `OPMOD` bits last read from `CANSTAT`.
        actual: u8,
    },
    /// The oscillator cannot be divided down to the requested bus speed.
    UnsupportedBitRate(CanSpeed, McpSpeed),
    /// A raw nominal bit rate outside the supported set.
    UnknownBitRate(u32),
    /// All Tx buffers have a pending transmission.
    TxBusy,
    /// The controller aborted the transmission, or dropped the request after a
    /// bus error.
    TxFailed,
    /// Transmission did not complete in time and was aborted.
    TxTimeout,
    /// Neither Rx buffer holds a message.
    NoMessage,
    /// The timeout clock could not be read.
    Clock,
}

impl<SPIE, CSE> Error<SPIE, CSE> {
    /// Whether the node cannot keep running and should be restarted.
    ///
    /// Only failures during initialization are fatal; the transport errors
    /// are retried or dropped by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ModeChange { .. } | Error::UnsupportedBitRate(..) | Error::UnknownBitRate(_)
        )
    }
}

impl<SPIE, CSE> From<embedded_time::clock::Error> for Error<SPIE, CSE> {
    fn from(_: embedded_time::clock::Error) -> Self {
        Error::Clock
    }
}

impl<SPIE, CSE> From<UnknownBitRate> for Error<SPIE, CSE> {
    fn from(UnknownBitRate(bps): UnknownBitRate) -> Self {
        Error::UnknownBitRate(bps)
    }
}

impl<SPIE: Debug, CSE: Debug> embedded_hal::can::Error for Error<SPIE, CSE> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;

    use super::*;

    fn speed_from_bps(bps: u32) -> Result<CanSpeed, u32, u32> {
        Ok(CanSpeed::try_from(bps)?)
    }

    #[test]
    fn unknown_bit_rate_is_fatal() {
        assert_eq!(speed_from_bps(250_000), Ok(CanSpeed::Kbps250));

        let err = speed_from_bps(33_333).unwrap_err();
        assert_eq!(err, Error::UnknownBitRate(33_333));
        assert!(err.is_fatal());
    }

    #[test]
    fn transport_errors_are_not_fatal() {
        let errors: [Error<u32, u32>; 6] = [
            Error::TxBusy,
            Error::TxFailed,
            Error::TxTimeout,
            Error::NoMessage,
            Error::Spi(1),
            Error::Clock,
        ];
        assert!(errors.iter().all(|e| !e.is_fatal()));
    }
}
