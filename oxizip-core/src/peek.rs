//! Buffered input with look-ahead.
//!
//! Sequential readers hand buffered bytes to a decompressor and only consume
//! what it actually took. Whatever the decompressor leaves behind stays in
//! the buffer and is parsed next as a trailer or the following header, so no
//! explicit "unread" step is needed.

use crate::error::{OxiZipError, Result};
use std::io::{self, Read};

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

/// A reader that can guarantee a minimum number of buffered bytes.
#[derive(Debug)]
pub struct PeekReader<R> {
    inner: R,
    buffer: Vec<u8>,
    start: usize,
    end: usize,
    /// Bytes consumed from the front of the stream so far.
    position: u64,
    eof: bool,
}

impl<R: Read> PeekReader<R> {
    /// Wrap a reader with the default buffer capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, inner)
    }

    /// Wrap a reader with a specific buffer capacity (at least 64 bytes).
    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; capacity.max(64)],
            start: 0,
            end: 0,
            position: 0,
            eof: false,
        }
    }

    /// Currently buffered bytes.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.start..self.end]
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Try to buffer at least `min` bytes.
    ///
    /// Returns the number of buffered bytes, which is smaller than `min`
    /// only if the underlying reader hit end of input.
    pub fn fill(&mut self, min: usize) -> Result<usize> {
        let min = min.min(self.buffer.len());
        if self.end - self.start >= min {
            return Ok(self.end - self.start);
        }

        if self.start > 0 {
            self.buffer.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        while self.end < min && !self.eof {
            match self.inner.read(&mut self.buffer[self.end..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.end += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.end - self.start)
    }

    /// Buffer at least one byte if possible and return the buffered slice.
    ///
    /// An empty slice means end of input.
    pub fn fill_some(&mut self) -> Result<&[u8]> {
        if self.start == self.end {
            self.fill(1)?;
        }
        Ok(self.buffered())
    }

    /// Drop `n` buffered bytes from the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.end - self.start);
        self.start += n;
        self.position += n as u64;
    }

    /// Read exactly `buf.len()` bytes, failing with `UnexpectedEof` otherwise.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8], context: &str) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let available = self.fill_some()?;
            if available.is_empty() {
                return Err(OxiZipError::unexpected_eof(format!(
                    "{context}: needed {} more bytes",
                    buf.len() - filled
                )));
            }
            let n = available.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&available[..n]);
            self.consume(n);
            filled += n;
        }
        Ok(())
    }

    /// Consume the wrapper and return the underlying reader.
    ///
    /// Buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_some()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that returns at most three bytes per call.
    struct Trickle<R>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_fill_guarantees_minimum() {
        let mut reader = PeekReader::new(Trickle(Cursor::new((0u8..100).collect::<Vec<_>>())));
        assert!(reader.fill(10).unwrap() >= 10);
        assert_eq!(&reader.buffered()[..4], &[0, 1, 2, 3]);
        reader.consume(4);
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.buffered()[0], 4);
    }

    #[test]
    fn test_fill_short_at_eof() {
        let mut reader = PeekReader::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(reader.fill(8).unwrap(), 3);
        reader.consume(3);
        assert!(reader.fill_some().unwrap().is_empty());
    }

    #[test]
    fn test_read_exact_or_eof() {
        let mut reader = PeekReader::new(Trickle(Cursor::new(b"abcdefgh".to_vec())));
        let mut buf = [0u8; 5];
        reader.read_exact_or_eof(&mut buf, "test").unwrap();
        assert_eq!(&buf, b"abcde");

        let err = reader.read_exact_or_eof(&mut buf, "test").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unconsumed_bytes_survive_compaction() {
        let mut reader = PeekReader::with_capacity(64, Cursor::new((0u8..=200).collect::<Vec<_>>()));
        reader.fill(64).unwrap();
        reader.consume(60);
        assert!(reader.fill(10).unwrap() >= 10);
        assert_eq!(reader.buffered()[0], 60);
    }
}
