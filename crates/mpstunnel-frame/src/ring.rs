use crate::error::{FrameError, Result};

/// Default downstream buffer capacity: 100 KiB.
pub const DEFAULT_RING_CAPACITY: usize = 100 * 1024;

/// Smallest capacity that can hold at least one byte.
const MIN_CAPACITY: usize = 3;

/// Fixed-capacity FIFO byte queue.
///
/// Two cursors walk a fixed array. The slot under the write cursor is never
/// filled, and a write is refused if it would bring the unread count up to
/// `capacity - 1`, so at most `capacity - 2` bytes are ever queued. A refused
/// write queues nothing. The queue never grows and never drops data.
pub struct RingBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

impl RingBuffer {
    /// Create a buffer of `capacity` slots (at least 3).
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(MIN_CAPACITY)].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.buf.len() - self.read_pos + self.write_pos
        }
    }

    /// Bytes that can still be written without overflowing.
    pub fn free(&self) -> usize {
        self.buf.len() - 2 - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Append `data`, or fail with `BufferOverflow` leaving the queue untouched.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let free = self.free();
        if data.len() > free {
            return Err(FrameError::BufferOverflow {
                capacity: self.buf.len(),
                requested: data.len(),
                free,
            });
        }

        let cap = self.buf.len();
        let first = data.len().min(cap - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        self.buf[..rest].copy_from_slice(&data[first..]);
        self.write_pos = (self.write_pos + data.len()) % cap;
        Ok(())
    }

    /// Pop the oldest byte, if any.
    pub fn read(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.buf.len();
        Some(byte)
    }

    /// Pop up to `dst.len()` bytes; returns how many were copied.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.available());
        let cap = self.buf.len();
        let first = n.min(cap - self.read_pos);
        dst[..first].copy_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        dst[first..n].copy_from_slice(&self.buf[..n - first]);
        self.read_pos = (self.read_pos + n) % cap;
        n
    }

    /// Discard all unread bytes.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.buf.len())
            .field("available", &self.available())
            .finish()
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}
