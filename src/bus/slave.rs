//! Interrupt-driven TWI slave state machine.
//!
//! `BusSlave` owns both frame buffers. It does no locking itself; the
//! foreground side must reach it through [`SharedBusSlave`](super::SharedBusSlave)
//! so every access happens with interrupts masked.

use super::message::{self, MessagePair, PairBatch, FRAME_CAPACITY, MAX_PAIRS, NOT_READY};
use super::status::{BusAction, Diagnostics, TwiStatus};
use super::BusError;

/// Transmit-side handshake phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Next read transaction gets the length header.
    Header,
    /// Header acknowledged; next read transaction gets the payload.
    Payload,
}

#[derive(Debug)]
struct OutgoingFrame {
    buffer: [u8; FRAME_CAPACITY],
    length: usize,
    cursor: usize,
    ready: bool,
    phase: TxPhase,
    /// A real length byte, not the sentinel, went out in the current
    /// header transaction.
    length_sent: bool,
}

impl OutgoingFrame {
    const fn new() -> Self {
        Self {
            buffer: [0; FRAME_CAPACITY],
            length: 0,
            cursor: 0,
            ready: false,
            phase: TxPhase::Header,
            length_sent: false,
        }
    }

    fn finish(&mut self) {
        self.ready = false;
        self.phase = TxPhase::Header;
        self.cursor = 0;
        self.length_sent = false;
    }

    /// Loads the byte at the cursor, marking it as last when nothing follows.
    fn next_byte(&mut self) -> BusAction {
        let byte = self.buffer[self.cursor];
        self.cursor += 1;
        BusAction::Transmit {
            byte,
            expect_ack: self.cursor < self.length,
        }
    }
}

#[derive(Debug)]
struct IncomingFrame {
    buffer: [u8; FRAME_CAPACITY],
    cursor: usize,
    new_data: bool,
}

impl IncomingFrame {
    const fn new() -> Self {
        Self {
            buffer: [0; FRAME_CAPACITY],
            cursor: 0,
            new_data: false,
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.buffer[..self.cursor]
    }

    fn drain(&mut self) {
        self.cursor = 0;
        self.new_data = false;
    }
}

#[derive(Debug)]
pub struct BusSlave {
    outgoing: OutgoingFrame,
    incoming: IncomingFrame,
    diagnostics: Diagnostics,
    address: u8,
}

impl Default for BusSlave {
    fn default() -> Self {
        Self::new()
    }
}

impl BusSlave {
    pub const fn new() -> Self {
        Self {
            outgoing: OutgoingFrame::new(),
            incoming: IncomingFrame::new(),
            diagnostics: Diagnostics::empty(),
            address: 0,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// Serialises `pairs` into the outgoing buffer and marks it ready.
    ///
    /// Returns `WouldBlock` without touching the buffer while the previous
    /// frame is still waiting to be read. An empty batch is accepted and
    /// leaves nothing to send.
    pub fn pack(&mut self, pairs: &[MessagePair]) -> nb::Result<(), BusError> {
        if self.outgoing.ready {
            return Err(nb::Error::WouldBlock);
        }
        if pairs.len() > MAX_PAIRS {
            return Err(nb::Error::Other(BusError::Capacity {
                requested: pairs.len(),
                max: MAX_PAIRS,
            }));
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let mut length = 0;
        for pair in pairs {
            self.outgoing.buffer[length..length + message::PAIR_LEN]
                .copy_from_slice(&pair.to_bytes());
            length += message::PAIR_LEN;
        }
        self.outgoing.length = length;
        self.outgoing.cursor = 0;
        self.outgoing.phase = TxPhase::Header;
        self.outgoing.length_sent = false;
        self.outgoing.ready = true;
        Ok(())
    }

    /// Same as [`pack`](Self::pack) with names and values in separate arrays.
    /// Only the first `min(names.len(), values.len())` entries are used.
    pub fn pack_arrays(&mut self, names: &[u16], values: &[u16]) -> nb::Result<(), BusError> {
        let mut batch = PairBatch::new();
        for (&name, &value) in names.iter().zip(values) {
            batch.push(MessagePair::new(name, value)).map_err(|_| {
                nb::Error::Other(BusError::Capacity {
                    requested: names.len().min(values.len()),
                    max: MAX_PAIRS,
                })
            })?;
        }
        self.pack(&batch)
    }

    /// Decodes the incoming buffer into `names` and `values`, then drains it.
    /// Returns the number of values decoded.
    pub fn unpack(&mut self, names: &mut [u16], values: &mut [u16]) -> usize {
        let count = message::decode_into(self.incoming.bytes(), names, values);
        self.incoming.drain();
        count
    }

    /// Decodes the incoming buffer into owned pairs, then drains it.
    pub fn unpack_pairs(&mut self) -> PairBatch {
        let batch = message::decode_pairs(self.incoming.bytes());
        self.incoming.drain();
        batch
    }

    pub fn has_new_data(&self) -> bool {
        self.incoming.new_data
    }

    pub fn is_frame_ready(&self) -> bool {
        self.outgoing.ready
    }

    pub fn tx_phase(&self) -> TxPhase {
        self.outgoing.phase
    }

    pub fn outgoing(&self) -> &[u8] {
        &self.outgoing.buffer[..self.outgoing.length]
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.cursor
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Advances the state machine for one interrupt.
    ///
    /// `data` is the content of the data register at the time of the
    /// interrupt; it is only consumed on the receive path.
    pub fn handle(&mut self, status: TwiStatus, data: u8) -> BusAction {
        match status {
            TwiStatus::AddressedForWrite => BusAction::Ack,
            TwiStatus::DataReceived => {
                self.receive(data);
                BusAction::Ack
            }
            TwiStatus::StopReceived => {
                self.incoming.new_data = true;
                BusAction::Release
            }
            TwiStatus::AddressedForRead => self.start_transmit(),
            TwiStatus::ByteSentAck => self.continue_transmit(),
            TwiStatus::ByteSentNack => self.end_transmit(),
            // The slave always ACKs incoming bytes, so a NACKed one means
            // the transfer is out of step.
            TwiStatus::DataReceivedNack | TwiStatus::Unknown(_) => {
                self.desync(Diagnostics::UNKNOWN_STATUS)
            }
        }
    }

    /// Drops any frame in flight and returns the peripheral to listening.
    fn desync(&mut self, flag: u8) -> BusAction {
        self.diagnostics.raise(flag);
        self.outgoing.finish();
        BusAction::Reset
    }

    fn receive(&mut self, byte: u8) {
        match self.incoming.buffer.get_mut(self.incoming.cursor) {
            Some(slot) => {
                *slot = byte;
                self.incoming.cursor += 1;
            }
            None => self.diagnostics.raise(Diagnostics::OVERFLOW),
        }
    }

    fn start_transmit(&mut self) -> BusAction {
        match self.outgoing.phase {
            TxPhase::Header => {
                self.outgoing.length_sent = self.outgoing.ready;
                let byte = if self.outgoing.ready {
                    self.outgoing.length as u8
                } else {
                    NOT_READY
                };
                BusAction::Transmit {
                    byte,
                    expect_ack: false,
                }
            }
            TxPhase::Payload => {
                self.outgoing.cursor = 0;
                self.outgoing.next_byte()
            }
        }
    }

    fn continue_transmit(&mut self) -> BusAction {
        if self.outgoing.phase == TxPhase::Payload && self.outgoing.cursor < self.outgoing.length {
            self.outgoing.next_byte()
        } else {
            self.desync(Diagnostics::UNEXPECTED_ACK)
        }
    }

    fn end_transmit(&mut self) -> BusAction {
        match self.outgoing.phase {
            // Reader has the length and is coming back for the payload.
            TxPhase::Header if self.outgoing.length_sent => {
                self.outgoing.length_sent = false;
                self.outgoing.phase = TxPhase::Payload;
                BusAction::Ack
            }
            // Sentinel consumed. A frame packed while it was on the wire
            // waits for the next header transaction.
            TxPhase::Header => BusAction::Ack,
            TxPhase::Payload if self.outgoing.cursor == self.outgoing.length => {
                self.outgoing.finish();
                BusAction::Ack
            }
            TxPhase::Payload => self.desync(Diagnostics::UNEXPECTED_NACK),
        }
    }
}
