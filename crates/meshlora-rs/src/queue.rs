use crate::hal::MeshError;
use crate::types::{Address, MAX_FRAME_LEN, OUTGOING_QUEUE_CAPACITY, RELAY_QUEUE_CAPACITY};
use alloc::vec;
use alloc::vec::Vec;

/// One queued frame and the node it originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
    /// Originating node, recorded at enqueue time for relay accounting.
    pub origin: Address,
}

impl QueueEntry {
    const EMPTY: QueueEntry = QueueEntry {
        bytes: [0; MAX_FRAME_LEN],
        len: 0,
        origin: Address(0),
    };

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bounded FIFO of frames awaiting transmission.
///
/// Implemented as a ring with one spare slot, so `head == tail` means empty and
/// a queue of capacity N holds exactly N frames. The head only advances after
/// the radio confirms the frame went out.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    slots: Vec<QueueEntry>,
    head: usize,
    tail: usize,
    lost: u32,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![QueueEntry::EMPTY; capacity + 1],
            head: 0,
            tail: 0,
            lost: 0,
        }
    }

    /// Appends a frame. On a full queue the new frame is dropped and counted.
    pub fn enqueue(&mut self, frame: &[u8], origin: Address) -> Result<(), MeshError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(MeshError::FrameTooLarge);
        }
        if self.is_full() {
            self.lost = self.lost.saturating_add(1);
            return Err(MeshError::QueueFull);
        }
        let slot = &mut self.slots[self.tail];
        slot.bytes[..frame.len()].copy_from_slice(frame);
        slot.len = frame.len();
        slot.origin = origin;
        self.tail = (self.tail + 1) % self.slots.len();
        Ok(())
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.head])
        }
    }

    /// Drops the head entry. Returns false if the queue was already empty.
    pub fn advance(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.head = (self.head + 1) % self.slots.len();
        true
    }

    pub fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.tail + 1) % self.slots.len() == self.head
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of frames dropped because the queue was full.
    pub fn lost(&self) -> u32 {
        self.lost
    }
}

/// The node's two transmit queues: own sensor data and frames relayed for others.
#[derive(Debug, Clone)]
pub struct TransmitQueues {
    pub outgoing: FrameQueue,
    pub relay: FrameQueue,
}

impl Default for TransmitQueues {
    fn default() -> Self {
        Self::new(OUTGOING_QUEUE_CAPACITY, RELAY_QUEUE_CAPACITY)
    }
}

impl TransmitQueues {
    pub fn new(outgoing_capacity: usize, relay_capacity: usize) -> Self {
        Self {
            outgoing: FrameQueue::new(outgoing_capacity),
            relay: FrameQueue::new(relay_capacity),
        }
    }

    pub fn enqueue_outgoing(&mut self, frame: &[u8], origin: Address) -> Result<(), MeshError> {
        self.outgoing.enqueue(frame, origin)
    }

    pub fn enqueue_relay(&mut self, frame: &[u8], origin: Address) -> Result<(), MeshError> {
        self.relay.enqueue(frame, origin)
    }
}
