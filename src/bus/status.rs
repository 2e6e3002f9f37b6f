//! TWI slave status codes and the actions the handler asks the peripheral
//! to take in response.

/// Status observed in the upper five bits of the TWI status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwiStatus {
    /// Own SLA+W received, ACK returned.
    AddressedForWrite,
    /// Data byte received, ACK returned.
    DataReceived,
    /// Data byte received, NACK returned. Never expected, since the slave
    /// acknowledges every byte; handled as a desync.
    DataReceivedNack,
    /// STOP or repeated START while addressed.
    StopReceived,
    /// Own SLA+R received, ACK returned.
    AddressedForRead,
    /// Data byte transmitted, ACK received.
    ByteSentAck,
    /// Data byte transmitted, NACK received.
    ByteSentNack,
    Unknown(u8),
}

impl TwiStatus {
    pub const STATUS_MASK: u8 = 0xF8;

    pub fn from_register(twsr: u8) -> Self {
        match twsr & Self::STATUS_MASK {
            0x60 => TwiStatus::AddressedForWrite,
            0x80 => TwiStatus::DataReceived,
            0x88 => TwiStatus::DataReceivedNack,
            0xA0 => TwiStatus::StopReceived,
            0xA8 => TwiStatus::AddressedForRead,
            0xB8 => TwiStatus::ByteSentAck,
            0xC0 => TwiStatus::ByteSentNack,
            other => TwiStatus::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TwiStatus::AddressedForWrite => 0x60,
            TwiStatus::DataReceived => 0x80,
            TwiStatus::DataReceivedNack => 0x88,
            TwiStatus::StopReceived => 0xA0,
            TwiStatus::AddressedForRead => 0xA8,
            TwiStatus::ByteSentAck => 0xB8,
            TwiStatus::ByteSentNack => 0xC0,
            TwiStatus::Unknown(code) => code,
        }
    }
}

/// What the interrupt handler wants done before the bus is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAction {
    /// Clear the interrupt flag and keep acknowledging.
    Ack,
    /// Clear the interrupt flag without acknowledging further bytes.
    Release,
    /// Load `byte` into the data register. With `expect_ack` false the byte
    /// is sent as the last one of the transaction.
    Transmit { byte: u8, expect_ack: bool },
    /// Reinitialise the peripheral to the listening configuration.
    Reset,
}

/// Diagnostic flags recorded by the handler. Never cleared by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics(u8);

impl Diagnostics {
    pub const UNKNOWN_STATUS: u8 = 0x01;
    pub const UNEXPECTED_ACK: u8 = 0x02;
    pub const UNEXPECTED_NACK: u8 = 0x04;
    pub const OVERFLOW: u8 = 0x08;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn raise(&mut self, flag: u8) {
        self.0 |= flag;
    }
}
