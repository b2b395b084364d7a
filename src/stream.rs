//! Position-safe access to caller-owned streams.
//!
//! Every component that peeks ahead (content sniffing in the detection
//! cascade, `accepts` checks in converters, the dispatch loop between
//! attempts) wraps the stream in a [`StreamGuard`]. The guard records the
//! read position on creation and seeks back to it when dropped, so the next
//! consumer always starts from the same offset, even when the peeking code
//! returns early through `?`.
//!
//! Streams are consumed through random access only; nothing here buffers
//! them into temporary files.

use std::io::{self, Read, Seek, SeekFrom};
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// Object-safe `Read + Seek`, the stream type converters receive.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Scoped read-position snapshot; restores the position on drop.
pub struct StreamGuard<'a, R: Seek + ?Sized> {
    inner: &'a mut R,
    start: u64,
}

impl<'a, R: Seek + ?Sized> StreamGuard<'a, R> {
    pub fn new(inner: &'a mut R) -> io::Result<Self> {
        let start = inner.stream_position()?;
        Ok(Self { inner, start })
    }

    /// Offset the stream will be returned to.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Seek back to the snapshot without releasing the guard.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.start)).map(|_| ())
    }
}

impl<R: Seek + ?Sized> Drop for StreamGuard<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.seek(SeekFrom::Start(self.start)) {
            warn!("Failed to restore stream position {}: {}", self.start, e);
        }
    }
}

impl<R: Seek + ?Sized> Deref for StreamGuard<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.inner
    }
}

impl<R: Seek + ?Sized> DerefMut for StreamGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.inner
    }
}

impl<R: Read + Seek + ?Sized> Read for StreamGuard<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Seek + ?Sized> Seek for StreamGuard<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Read up to `limit` bytes from the current position, leaving the position unchanged.
pub fn peek_bytes<R: Read + Seek + ?Sized>(stream: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut guard = StreamGuard::new(stream)?;
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    Read::take(&mut guard, limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// True when the next bytes of the stream equal `magic`; position unchanged.
pub fn starts_with<R: Read + Seek + ?Sized>(stream: &mut R, magic: &[u8]) -> bool {
    match peek_bytes(stream, magic.len()) {
        Ok(head) => head == magic,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn guard_restores_position_on_drop() {
        let mut cur = Cursor::new(b"hello world".to_vec());
        cur.set_position(3);
        {
            let mut g = StreamGuard::new(&mut cur).unwrap();
            let mut buf = [0u8; 4];
            g.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"lo w");
        }
        assert_eq!(cur.position(), 3);
    }

    #[test]
    fn guard_restores_after_early_return() {
        fn fails(stream: &mut Cursor<Vec<u8>>) -> io::Result<()> {
            let mut g = StreamGuard::new(stream)?;
            let mut buf = [0u8; 100];
            g.read_exact(&mut buf)?; // too short: returns Err
            Ok(())
        }
        let mut cur = Cursor::new(b"short".to_vec());
        assert!(fails(&mut cur).is_err());
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut cur = Cursor::new(b"%PDF-1.7 rest".to_vec());
        assert_eq!(peek_bytes(&mut cur, 4).unwrap(), b"%PDF");
        assert_eq!(cur.position(), 0);
        assert!(starts_with(&mut cur, b"%PDF"));
        assert!(!starts_with(&mut cur, b"PK"));
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn peek_past_end_returns_what_exists() {
        let mut cur = Cursor::new(b"ab".to_vec());
        assert_eq!(peek_bytes(&mut cur, 10).unwrap(), b"ab");
    }

    #[test]
    fn works_through_trait_object() {
        let mut cur = Cursor::new(b"xyz".to_vec());
        let dyn_stream: &mut dyn ReadSeek = &mut cur;
        assert_eq!(peek_bytes(dyn_stream, 2).unwrap(), b"xy");
        assert_eq!(dyn_stream.stream_position().unwrap(), 0);
    }
}
