//! I2C (TWI) slave engine exchanging name/value batches with the bus master.
//!
//! The master reads a frame in two transactions: first a single length
//! byte (or [`NOT_READY`]), then the announced number of payload bytes.
//! Writes from the master land in the incoming buffer until the control loop
//! drains them with `unpack`.
//!
//! ```
//! use roverlink::bus::{MessagePair, SharedBusSlave};
//!
//! static BUS: SharedBusSlave = SharedBusSlave::new();
//!
//! let batch = [MessagePair::new(0xFFF1, 120), MessagePair::new(0xFFF2, 45)];
//! assert!(BUS.pack(&batch).is_ok());
//! // Previous frame not read yet.
//! assert!(matches!(BUS.pack(&batch), Err(nb::Error::WouldBlock)));
//! ```

pub mod message;
pub mod sim;
pub mod slave;
pub mod status;

pub use message::{
    decode_frame, is_name_tag, MessagePair, Packet, PairBatch, FRAME_CAPACITY, MAX_PAIRS,
    NOT_READY,
};
pub use slave::{BusSlave, TxPhase};
pub use status::{BusAction, Diagnostics, TwiStatus};

use core::cell::RefCell;
use critical_section::Mutex;

use crate::config::BusConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("batch of {requested} pairs exceeds frame capacity of {max}")]
    Capacity { requested: usize, max: usize },
    #[error("previous frame still pending")]
    Busy,
}

/// Register-level access to a TWI peripheral.
pub trait TwiRegisters {
    /// Sets the slave address and enables the peripheral in listening mode
    /// with its interrupt armed.
    fn init(&mut self, address: u8);

    /// Raw status register.
    fn status(&mut self) -> u8;

    fn read_data(&mut self) -> u8;

    fn write_data(&mut self, byte: u8);

    /// Clears the interrupt flag with or without the acknowledge bit set.
    fn release(&mut self, ack: bool);
}

/// Applies a handler decision to the peripheral.
pub fn apply_action<R: TwiRegisters>(regs: &mut R, action: BusAction, address: u8) {
    match action {
        BusAction::Ack => regs.release(true),
        BusAction::Release => regs.release(false),
        BusAction::Transmit { byte, expect_ack } => {
            regs.write_data(byte);
            regs.release(expect_ack);
        }
        BusAction::Reset => {
            regs.init(address);
            regs.write_data(0x00);
        }
    }
}

/// A [`BusSlave`] shared between foreground code and the TWI interrupt.
///
/// Every method runs inside a critical section, so the handler can never
/// observe a half-written frame.
pub struct SharedBusSlave {
    inner: Mutex<RefCell<BusSlave>>,
}

impl Default for SharedBusSlave {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBusSlave {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(BusSlave::new())),
        }
    }

    /// Resets the engine and brings the peripheral up in listening mode.
    pub fn init<R: TwiRegisters>(&self, regs: &mut R, config: &BusConfig) {
        critical_section::with(|cs| {
            let mut slave = self.inner.borrow_ref_mut(cs);
            *slave = BusSlave::new();
            slave.set_address(config.slave_address);
            apply_action(regs, BusAction::Reset, config.slave_address);
        });
    }

    pub fn pack(&self, pairs: &[MessagePair]) -> nb::Result<(), BusError> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pack(pairs))
    }

    pub fn pack_arrays(&self, names: &[u16], values: &[u16]) -> nb::Result<(), BusError> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pack_arrays(names, values))
    }

    pub fn unpack(&self, names: &mut [u16], values: &mut [u16]) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).unpack(names, values))
    }

    pub fn unpack_pairs(&self) -> PairBatch {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).unpack_pairs())
    }

    pub fn has_new_data(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).has_new_data())
    }

    pub fn is_frame_ready(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_frame_ready())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        critical_section::with(|cs| self.inner.borrow_ref(cs).diagnostics())
    }

    /// Body of the TWI interrupt service routine.
    pub fn on_interrupt<R: TwiRegisters>(&self, regs: &mut R) -> BusAction {
        critical_section::with(|cs| {
            let mut slave = self.inner.borrow_ref_mut(cs);
            let status = TwiStatus::from_register(regs.status());
            let data = regs.read_data();
            let action = slave.handle(status, data);
            apply_action(regs, action, slave.address());
            action
        })
    }
}
