//! Carry-over buffer between reads of the pull source.
//!
//! The scanners need one contiguous view of all unconsumed bytes, while
//! the source is only ever asked for `chunk_size` bytes at a time. The
//! buffer keeps whatever a scan step did not consume and appends the next
//! chunk behind it.

use crate::error::FormError;
use std::io::Read;

pub struct ChunkBuffer<R> {
    reader: R,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    exhausted: bool,
}

impl<R: Read> ChunkBuffer<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            scratch: vec![0u8; chunk_size],
            exhausted: false,
        }
    }

    /// The contiguous view of all unconsumed bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop `n` bytes from the front of the view.
    pub fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
    }

    /// Pull one more chunk from the source.
    ///
    /// Returns `false` once the source has signalled EOF; a zero-byte read
    /// marks the source exhausted for all subsequent calls.
    pub fn fill(&mut self) -> Result<bool, FormError> {
        if self.exhausted {
            return Ok(false);
        }

        match self.reader.read(&mut self.scratch) {
            Ok(0) => {
                self.exhausted = true;
                Ok(false)
            }
            Ok(n) => {
                self.buf.extend_from_slice(&self.scratch[..n]);
                Ok(true)
            }
            Err(err) => Err(FormError::Reader(err)),
        }
    }

    /// Like [`fill`](Self::fill), but EOF is a hard error: a terminator was
    /// still expected when the source ran dry.
    pub fn require(&mut self) -> Result<(), FormError> {
        if self.fill()? {
            Ok(())
        } else {
            Err(FormError::InsufficientData)
        }
    }

    /// Read and discard everything remaining in the source.
    pub fn drain_to_eof(&mut self) -> Result<(), FormError> {
        self.buf.clear();
        while self.fill()? {
            self.buf.clear();
        }
        Ok(())
    }
}
