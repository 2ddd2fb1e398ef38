//! Small shared I/O helpers used by the cache, archive, and job layers.

use std::io::{self, BufRead, Read};

/// Reads exactly `len` bytes, returning an error if the stream is short.
pub fn read_bytes(file: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// A lightweight wrapper that counts bytes read from the underlying reader.
/// Used by the archive producers (§4.H "Snapshot") to track the size of a
/// streamed tar/zip body without a second pass over the data.
pub struct CountingReader<R> {
    pub inner: R,
    pub bytes_read: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.bytes_read += amt as u64;
        self.inner.consume(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counting_reader_tracks_bytes() {
        let mut r = CountingReader::new(Cursor::new(b"hello world".to_vec()));
        let mut buf = [0u8; 5];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(r.bytes_read, 5);
    }

    #[test]
    fn read_bytes_exact() {
        let mut cur = Cursor::new(b"abcdef".to_vec());
        let b = read_bytes(&mut cur, 3).unwrap();
        assert_eq!(b, b"abc");
    }

    #[test]
    fn read_bytes_short_errors() {
        let mut cur = Cursor::new(b"ab".to_vec());
        assert!(read_bytes(&mut cur, 3).is_err());
    }
}
