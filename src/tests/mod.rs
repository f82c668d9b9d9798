use mockall::predicate::eq;
use mockall::Sequence;

use crate::mocks::{MockDelay, MockPin, MockSPIBus};
use crate::regs::Register;
use crate::MCP2515;


pub(crate) type TestDriver = MCP2515<MockSPIBus, MockPin>;

/// SPI bus, chip select and delay mocks expecting transactions in order.
pub(crate) struct Mocks {
    pub bus: MockSPIBus,
    pub pin_cs: MockPin,
    pub delay: MockDelay,
    pub seq: Sequence,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            bus: MockSPIBus::new(),
            pin_cs: MockPin::new(),
            delay: MockDelay::new(),
            seq: Sequence::new(),
        }
    }

    pub fn into_driver(self) -> TestDriver {
        MCP2515::new(self.bus, self.pin_cs)
    }

    /// Driver plus the delay mock `init` needs.
    pub fn into_parts(self) -> (TestDriver, MockDelay) {
        (MCP2515::new(self.bus, self.pin_cs), self.delay)
    }

    /// Expects one chip select cycle sending `sent` and clocking in
    /// `received`.
    pub fn expect_transaction(&mut self, sent: &[u8], received: &[u8]) {
        let sent = sent.to_vec();
        let received: &'static [u8] = Box::leak(received.to_vec().into_boxed_slice());

        self.pin_cs
            .expect_set_low()
            .times(1)
            .return_const(Ok(()))
            .in_sequence(&mut self.seq);
        self.bus
            .expect_transfer()
            .times(1)
            .returning(move |data| {
                assert_eq!(sent, data.to_vec());
                Ok(received)
            })
            .in_sequence(&mut self.seq);
        self.pin_cs
            .expect_set_high()
            .times(1)
            .return_const(Ok(()))
            .in_sequence(&mut self.seq);
    }

    /// Expects a transaction whose response is ignored.
    pub fn expect_write(&mut self, sent: &[u8]) {
        let zeros = vec![0u8; sent.len()];
        self.expect_transaction(sent, &zeros);
    }

    /// Expects a `READ` of a single register.
    pub fn expect_read(&mut self, reg: Register, value: u8) {
        self.expect_transaction(&[0x03, reg as u8, 0x00], &[0x00, 0x00, value]);
    }

    /// Expects a `READ STATUS`.
    pub fn expect_status(&mut self, status: u8) {
        self.expect_transaction(&[0xA0, 0x00], &[0x00, status]);
    }

    /// Expects chip select to be driven high without a transfer.
    pub fn expect_deselect(&mut self) {
        self.pin_cs
            .expect_set_high()
            .times(1)
            .return_const(Ok(()))
            .in_sequence(&mut self.seq);
    }

    /// Expects the reset instruction followed by the settling delay.
    pub fn expect_reset(&mut self) {
        self.expect_write(&[0xC0]);
        self.delay
            .expect_delay_ms()
            .with(eq(10))
            .times(1)
            .return_const(())
            .in_sequence(&mut self.seq);
    }
}
