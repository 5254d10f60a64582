//! Chunk Loader
//!
//! Feeds a [`ByteCursor`] from an async reader in fixed-size chunks so that
//! at most one chunk of the file is held in memory.
//!
//! The loader tracks a logical end offset. It starts at the stream length
//! (or unbounded when unknown) and is narrowed to the end of the tag once
//! the header is parsed. Every read and skip is bounded by that end, and
//! positions are always derived from the cursor's own counts.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::cursor::ByteCursor;
use crate::error::{Result, TagError};

pub struct ChunkLoader<R> {
    reader: R,
    cursor: ByteCursor,
    chunk_size: usize,
    /// Stream offset of the cursor's first byte.
    chunk_start: u64,
    end: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> ChunkLoader<R> {
    /// Creates a loader. `stream_len` of `None` leaves the end open until
    /// the reader reports EOF.
    pub fn new(reader: R, stream_len: Option<u64>, chunk_size: usize) -> Self {
        Self {
            reader,
            cursor: ByteCursor::new(),
            chunk_size: chunk_size.max(1),
            chunk_start: 0,
            end: stream_len.unwrap_or(u64::MAX),
            exhausted: false,
        }
    }

    /// Current stream offset.
    pub fn position(&self) -> u64 {
        self.chunk_start + self.cursor.position() as u64
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Moves the logical end closer; never extends it.
    pub fn narrow_end(&mut self, end: u64) {
        self.end = self.end.min(end);
    }

    /// Bytes left before the logical end.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.position())
    }

    /// Makes sure the cursor holds unread bytes. Returns `false` when the
    /// logical end or EOF was reached.
    async fn refill(&mut self) -> Result<bool> {
        if !self.cursor.finished() {
            return Ok(true);
        }

        let want = self.remaining().min(self.chunk_size as u64) as usize;
        if want == 0 || self.exhausted {
            return Ok(false);
        }

        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        self.chunk_start += self.cursor.len() as u64;
        self.cursor.set_data(Bytes::from(buf));

        if self.exhausted {
            self.narrow_end(self.chunk_start + filled as u64);
        }

        trace!(offset = self.chunk_start, bytes = filled, "Loaded chunk");
        Ok(filled > 0)
    }

    fn out_of_range(&self, needed: u64) -> TagError {
        TagError::OutOfRange {
            offset: self.position(),
            needed,
        }
    }

    pub async fn read_byte(&mut self) -> Result<u8> {
        if self.remaining() == 0 || !self.refill().await? {
            return Err(self.out_of_range(1));
        }
        self.cursor.get_byte()
    }

    /// Reads exactly `n` bytes or fails with `OutOfRange`.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if n as u64 > self.remaining() {
            return Err(self.out_of_range(n as u64));
        }

        let mut out = Vec::with_capacity(n.min(self.chunk_size));
        while out.len() < n {
            if !self.refill().await? {
                return Err(self.out_of_range((n - out.len()) as u64));
            }
            out.extend_from_slice(self.cursor.take(n - out.len()));
        }
        Ok(out)
    }

    pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N).await?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Skips up to `n` bytes and returns how many were skipped. A short
    /// count means the logical end or EOF was hit.
    pub async fn skip(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            let budget = (n - skipped).min(self.remaining());
            if budget == 0 || !self.refill().await? {
                break;
            }
            let step = usize::try_from(budget).unwrap_or(usize::MAX);
            skipped += self.cursor.advance(step) as u64;
        }
        Ok(skipped)
    }
}
