//! Name/value packets exchanged over the bus.
//!
//! Every packet on the wire is a big-endian 16-bit word. Words whose top
//! 12 bits are all set are name tags; everything else is a value. A batch
//! is a sequence of `(name, value)` pairs, four bytes each.

use heapless::Vec;
use static_assertions::const_assert;

/// Capacity in bytes of each of the slave's frame buffers.
pub const FRAME_CAPACITY: usize = 32;

/// Bytes occupied by one encoded pair.
pub const PAIR_LEN: usize = 4;

/// Most pairs that fit in one frame.
pub const MAX_PAIRS: usize = FRAME_CAPACITY / PAIR_LEN;

/// Bits compared when classifying a packet.
pub const NAME_TAG_MASK: u16 = 0xFFF0;

/// Header byte transmitted when no outgoing frame is ready.
pub const NOT_READY: u8 = 0xFE;

// A valid length header must never be mistaken for the sentinel.
const_assert!(FRAME_CAPACITY < NOT_READY as usize);
const_assert!(MAX_PAIRS * PAIR_LEN <= FRAME_CAPACITY);

pub type PairBatch = Vec<MessagePair, MAX_PAIRS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessagePair {
    pub name: u16,
    pub value: u16,
}

impl MessagePair {
    pub const fn new(name: u16, value: u16) -> Self {
        Self { name, value }
    }

    /// Big-endian name followed by big-endian value.
    pub fn to_bytes(self) -> [u8; PAIR_LEN] {
        let [n0, n1] = self.name.to_be_bytes();
        let [v0, v1] = self.value.to_be_bytes();
        [n0, n1, v0, v1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Name(u16),
    Value(u16),
}

impl Packet {
    pub fn classify(word: u16) -> Self {
        if is_name_tag(word) {
            Packet::Name(word)
        } else {
            Packet::Value(word)
        }
    }

    pub fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self::classify(u16::from_be_bytes(bytes))
    }
}

#[inline]
pub const fn is_name_tag(word: u16) -> bool {
    word & NAME_TAG_MASK == NAME_TAG_MASK
}

/// Decodes `bytes` two at a time into the caller's arrays.
///
/// A name packet is written at the current index; a value packet is written
/// at the current index and advances it, so a name always pairs with the
/// value that follows it. Returns the number of values decoded. Writes that
/// fall outside `names` or `values` are dropped, and a trailing odd byte is
/// ignored.
pub fn decode_into(bytes: &[u8], names: &mut [u16], values: &mut [u16]) -> usize {
    let mut index = 0;
    for chunk in bytes.chunks_exact(2) {
        match Packet::from_be_bytes([chunk[0], chunk[1]]) {
            Packet::Name(name) => {
                if let Some(slot) = names.get_mut(index) {
                    *slot = name;
                }
            }
            Packet::Value(value) => {
                if let Some(slot) = values.get_mut(index) {
                    *slot = value;
                }
                index += 1;
            }
        }
    }
    index
}

/// Decodes `bytes` into owned pairs. A value without a preceding name keeps
/// the name seen last (zero if none).
pub fn decode_pairs(bytes: &[u8]) -> PairBatch {
    let mut batch = PairBatch::new();
    let mut name = 0;
    for chunk in bytes.chunks_exact(2) {
        match Packet::from_be_bytes([chunk[0], chunk[1]]) {
            Packet::Name(tag) => name = tag,
            Packet::Value(value) => {
                if batch.push(MessagePair::new(name, value)).is_err() {
                    break;
                }
            }
        }
    }
    batch
}

/// Interprets a frame as seen by the reading side of the bus: the header
/// byte followed by the payload bytes it announced.
///
/// Returns `None` when the header is the not-ready sentinel.
pub fn decode_frame(header: u8, payload: &[u8]) -> Option<PairBatch> {
    if header == NOT_READY {
        return None;
    }
    let len = (header as usize).min(payload.len());
    Some(decode_pairs(&payload[..len]))
}
