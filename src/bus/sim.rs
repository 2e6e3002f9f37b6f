//! Register-level stand-in for the bus master, for host runs and tests.
//!
//! `SimulatedTwi` plays the peripheral: the master sets a status code and
//! the data byte, fires the interrupt, and reads back whatever the handler
//! loaded. Transactions follow the same sequences a real master produces.

use heapless::Vec;

use super::message::{decode_frame, MessagePair, PairBatch, FRAME_CAPACITY, NOT_READY};
use super::status::BusAction;
use super::{BusError, SharedBusSlave, TwiRegisters};
use crate::config::BusConfig;

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTwi {
    pub status: u8,
    pub data: u8,
    pub ack: bool,
    pub address: u8,
    pub resets: u32,
}

impl TwiRegisters for SimulatedTwi {
    fn init(&mut self, address: u8) {
        self.address = address;
        self.ack = true;
        self.resets += 1;
    }

    fn status(&mut self) -> u8 {
        self.status
    }

    fn read_data(&mut self) -> u8 {
        self.data
    }

    fn write_data(&mut self, byte: u8) {
        self.data = byte;
    }

    fn release(&mut self, ack: bool) {
        self.ack = ack;
    }
}

pub struct SimulatedMaster<'a> {
    bus: &'a SharedBusSlave,
    twi: SimulatedTwi,
}

impl<'a> SimulatedMaster<'a> {
    pub fn new(bus: &'a SharedBusSlave) -> Self {
        Self {
            bus,
            twi: SimulatedTwi::default(),
        }
    }

    /// Brings the slave up through the simulated peripheral.
    pub fn init(&mut self, config: &BusConfig) {
        self.bus.init(&mut self.twi, config);
    }

    pub fn registers(&self) -> &SimulatedTwi {
        &self.twi
    }

    /// Raises one interrupt with the given status and data register.
    pub fn fire(&mut self, status: u8, data: u8) -> BusAction {
        self.twi.status = status;
        self.twi.data = data;
        self.bus.on_interrupt(&mut self.twi)
    }

    /// Reads the header byte, NACKing it as the handshake requires.
    pub fn read_header(&mut self) -> u8 {
        self.fire(0xA8, 0);
        let header = self.twi.data;
        self.fire(0xC0, header);
        header
    }

    /// Full two-transaction read. `None` when the slave had nothing ready.
    pub fn read_frame(&mut self) -> Option<PairBatch> {
        let header = self.read_header();
        if header == NOT_READY {
            return None;
        }
        let len = usize::from(header).min(FRAME_CAPACITY);
        if len == 0 {
            return Some(PairBatch::new());
        }
        let mut payload: Vec<u8, FRAME_CAPACITY> = Vec::new();

        self.fire(0xA8, 0);
        let _ = payload.push(self.twi.data);
        while payload.len() < len {
            let last = self.twi.data;
            self.fire(0xB8, last);
            let _ = payload.push(self.twi.data);
        }
        let last = self.twi.data;
        self.fire(0xC0, last);

        decode_frame(header, &payload)
    }

    /// Packs `pairs`, first reading out any frame still waiting so the new
    /// one is never dropped. Returns the frame that was read out.
    pub fn pack_after_drain(&mut self, pairs: &[MessagePair]) -> Result<Option<PairBatch>, BusError> {
        match self.bus.pack(pairs) {
            Ok(()) => Ok(None),
            Err(nb::Error::Other(e)) => Err(e),
            Err(nb::Error::WouldBlock) => {
                let drained = self.read_frame();
                match self.bus.pack(pairs) {
                    Ok(()) => Ok(drained),
                    Err(nb::Error::Other(e)) => Err(e),
                    Err(nb::Error::WouldBlock) => Err(BusError::Busy),
                }
            }
        }
    }

    /// Writes raw bytes to the slave followed by a STOP.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.fire(0x60, 0);
        for &byte in bytes {
            self.fire(0x80, byte);
        }
        self.fire(0xA0, 0);
    }

    pub fn write_pairs(&mut self, pairs: &[MessagePair]) {
        self.fire(0x60, 0);
        for pair in pairs {
            for byte in pair.to_bytes() {
                self.fire(0x80, byte);
            }
        }
        self.fire(0xA0, 0);
    }
}
