//! Byte Cursor
//!
//! A read position over one in-memory chunk. The cursor does no I/O; the
//! [`ChunkLoader`](crate::loader::ChunkLoader) swaps chunks in with
//! [`ByteCursor::set_data`].

use bytes::Bytes;

use crate::error::{Result, TagError};

/// Forward-only cursor over a byte buffer.
#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    data: Bytes,
    position: usize,
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer and rewinds to its start.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.position = 0;
    }

    /// Returns the byte at the current position and steps past it.
    pub fn get_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or(TagError::OutOfRange {
                offset: self.position as u64,
                needed: 1,
            })?;
        self.position += 1;
        Ok(byte)
    }

    /// Moves forward by at most `n` bytes.
    ///
    /// Returns the number of bytes actually skipped, which is smaller than
    /// `n` when the buffer runs out.
    pub fn advance(&mut self, n: usize) -> usize {
        let step = n.min(self.remaining());
        self.position += step;
        step
    }

    /// Returns up to `n` bytes from the current position and steps past them.
    pub fn take(&mut self, n: usize) -> &[u8] {
        let start = self.position;
        let step = self.advance(n);
        &self.data[start..start + step]
    }

    pub fn finished(&self) -> bool {
        self.position >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
