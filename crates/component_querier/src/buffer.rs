//! Reusable receive buffer.

use crate::wire::RecordStream;

/// Datagram buffer reused across polling attempts.
///
/// `wpos` marks how many bytes the last read produced, `rpos` how many of
/// those a decoder consumed. Only `data[rpos..wpos]` is ever visible.
pub struct PacketBuffer {
    data: Vec<u8>,
    rpos: usize,
    wpos: usize,
}

impl PacketBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            rpos: 0,
            wpos: 0,
        }
    }

    /// Forgets the previous datagram and sizes the storage for a new read.
    pub fn reset(&mut self, capacity: usize) {
        self.rpos = 0;
        self.wpos = 0;
        self.data.resize(capacity, 0);
    }

    /// Storage a socket read writes into.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Records that a read produced `len` bytes.
    pub fn set_written(&mut self, len: usize) {
        self.wpos = len.min(self.data.len());
        self.rpos = 0;
    }

    pub fn consume(&mut self, len: usize) {
        self.rpos = (self.rpos + len).min(self.wpos);
    }

    /// Unconsumed bytes of the current datagram.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.rpos..self.wpos]
    }

    pub fn len(&self) -> usize {
        self.wpos - self.rpos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stream(&self) -> RecordStream {
        RecordStream::new(self.unread())
    }

    #[cfg(test)]
    pub(crate) fn fill(&mut self, byte: u8) {
        for b in self.data.iter_mut() {
            *b = byte;
        }
    }
}
