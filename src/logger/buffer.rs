//! Linear line buffer between `log()` and the card.
//!
//! Records are appended as already-formatted lines and written out in one
//! append on flush, so insertion order is the on-card order.  The buffer
//! is fixed-size: memory is bounded, and a card that stays unwritable long
//! enough will eventually cost records (counted in [`LogBuffer::dropped`]).

use heapless::Vec;

/// Buffer capacity in bytes.
pub const LOG_BUFFER_SIZE: usize = 4096;

pub struct LogBuffer {
    bytes: Vec<u8, LOG_BUFFER_SIZE>,
    records: usize,
    dropped: u32,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            records: 0,
            dropped: 0,
        }
    }

    /// Whether `len` more bytes fit without flushing.
    pub fn fits(&self, len: usize) -> bool {
        self.bytes.len() + len <= LOG_BUFFER_SIZE
    }

    /// Append one complete line.  All-or-nothing: returns `false` and
    /// leaves the buffer untouched if it does not fit.
    pub fn push_line(&mut self, line: &[u8]) -> bool {
        if !self.fits(line.len()) || self.bytes.extend_from_slice(line).is_err() {
            return false;
        }
        self.records += 1;
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Records currently held.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.records = 0;
    }

    /// Discard the first `n` bytes after a partial write.  The record
    /// count afterwards includes a partially written record.
    pub fn consume(&mut self, n: usize) {
        if n >= self.bytes.len() {
            self.clear();
            return;
        }
        self.bytes.copy_within(n.., 0);
        self.bytes.truncate(self.bytes.len() - n);
        self.records = self.bytes.iter().filter(|&&b| b == b'\n').count();
    }

    /// Count a record that was discarded because the buffer was full and
    /// could not be flushed.
    pub fn note_dropped(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }

    /// Records lost since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
