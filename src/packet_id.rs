//! Packet identifier allocation.

use alloc::boxed::Box;
use alloc::vec;

use crate::error::UsageError;

const WORDS: usize = 65536 / 64;

/// Hands out the 16-bit identifiers that pair requests with acknowledgements.
///
/// Identifiers are issued round-robin: the search for a free value starts just
/// after the previously issued one, wraps from 65535 to 1 and never yields 0.
pub struct PacketIdAllocator {
    in_use: Box<[u64]>,
    last: u16,
    pending: usize,
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self {
            in_use: vec![0u64; WORDS].into_boxed_slice(),
            last: 0,
            pending: 0,
        }
    }

    /// Issues the next free identifier.
    pub fn allocate(&mut self) -> Result<u16, UsageError> {
        if self.pending == u16::MAX as usize {
            return Err(UsageError::PacketIdExhausted);
        }
        let mut candidate = self.last;
        loop {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.is_allocated(candidate) {
                self.mark(candidate);
                self.last = candidate;
                return Ok(candidate);
            }
        }
    }

    /// Reserves a caller-chosen identifier, failing if it is already pending.
    pub fn register(&mut self, id: u16) -> Result<(), UsageError> {
        if id == 0 {
            return Err(UsageError::InvalidPacketId);
        }
        if self.is_allocated(id) {
            return Err(UsageError::PacketIdInUse(id));
        }
        self.mark(id);
        Ok(())
    }

    /// Forces `id` into the allocated state whether or not it already was.
    ///
    /// Used when resending a message that must keep its original identifier.
    pub fn assign_explicit(&mut self, id: u16) -> Result<(), UsageError> {
        if id == 0 {
            return Err(UsageError::InvalidPacketId);
        }
        if !self.is_allocated(id) {
            self.mark(id);
        }
        Ok(())
    }

    /// Frees `id`. Releasing a free identifier does nothing.
    pub fn release(&mut self, id: u16) {
        if self.is_allocated(id) {
            let (word, bit) = Self::slot(id);
            self.in_use[word] &= !bit;
            self.pending -= 1;
        }
    }

    pub fn is_allocated(&self, id: u16) -> bool {
        let (word, bit) = Self::slot(id);
        self.in_use[word] & bit != 0
    }

    /// Number of identifiers currently pending.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Frees every identifier and restarts numbering from 1.
    pub fn clear(&mut self) {
        self.in_use.fill(0);
        self.last = 0;
        self.pending = 0;
    }

    fn mark(&mut self, id: u16) {
        let (word, bit) = Self::slot(id);
        self.in_use[word] |= bit;
        self.pending += 1;
    }

    fn slot(id: u16) -> (usize, u64) {
        (id as usize / 64, 1u64 << (id % 64))
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PacketIdAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketIdAllocator")
            .field("last", &self.last)
            .field("pending", &self.pending)
            .finish()
    }
}
