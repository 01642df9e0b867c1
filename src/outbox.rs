//! Ordered queue of encoded packets waiting for the transport.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::handlers::CompletionCallback;
use crate::packet::PacketType;

/// What to report once a frame has been written.
pub enum OnWritten {
    Nothing,
    /// A QoS 0 publish finished.
    Callback(CompletionCallback),
    /// An acknowledgement or release packet went out.
    ResponseSent(PacketType, u16),
}

pub struct Frame {
    pub bytes: Vec<u8>,
    pub packet_type: PacketType,
    pub on_written: OnWritten,
}

/// Frames are written strictly in the order they were queued, one at a time.
#[derive(Default)]
pub struct Outbox {
    frames: VecDeque<Frame>,
    in_flight: bool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: Vec<u8>, packet_type: PacketType, on_written: OnWritten) {
        trace!("queued {:?} ({} bytes)", packet_type, bytes.len());
        self.frames.push_back(Frame {
            bytes,
            packet_type,
            on_written,
        });
    }

    /// The next frame to write, or `None` if the queue is empty or a write is
    /// already in progress. Marks the frame as in flight.
    pub fn next(&mut self) -> Option<&[u8]> {
        if self.in_flight {
            return None;
        }
        let frame = self.frames.front()?;
        self.in_flight = true;
        Some(&frame.bytes)
    }

    /// Retires the frame handed out by [`Outbox::next`].
    pub fn complete(&mut self) -> Option<Frame> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        self.frames.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every queued frame without reporting anything.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.in_flight = false;
    }
}

impl core::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Outbox")
            .field("frames", &self.frames.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
