use std::io;

use sha1::{Digest, Sha1};

/// A writable stream that keeps a running SHA-1 checksum of all bytes written
/// through it, and a count of those bytes.
///
/// The count is the byte offset of the next write relative to the start of the
/// stream, which is what the mzML index records for each `<spectrum>`.
#[derive(Clone)]
pub(crate) struct Sha1HashingStream<T: io::Write> {
    pub stream: T,
    context: Sha1,
    bytes_written: u64,
}

impl<T: io::Write> Sha1HashingStream<T> {
    pub fn new(file: T) -> Sha1HashingStream<T> {
        Self {
            stream: file,
            context: Sha1::new(),
            bytes_written: 0,
        }
    }

    /// The number of bytes accepted by the inner stream so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The lowercase hexadecimal digest of everything written so far
    pub fn compute(&self) -> String {
        let digest = self.context.clone().finalize();
        base16ct::lower::encode_string(&digest)
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for Sha1HashingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        // Only the prefix the inner stream accepted is part of the document
        self.context.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::prelude::*;

    /// A sink that accepts at most `limit` bytes per call
    struct Trickle {
        buffer: Vec<u8>,
        limit: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.buffer.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_checksum_and_count() -> io::Result<()> {
        let mut stream = Sha1HashingStream::new(Vec::new());
        stream.write_all(b"abc")?;
        assert_eq!(stream.bytes_written(), 3);
        assert_eq!(stream.compute(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(stream.into_inner(), b"abc");
        Ok(())
    }

    #[test]
    fn test_partial_writes() -> io::Result<()> {
        let mut stream = Sha1HashingStream::new(Trickle {
            buffer: Vec::new(),
            limit: 2,
        });
        stream.write_all(b"abc")?;
        assert_eq!(stream.bytes_written(), 3);
        assert_eq!(stream.compute(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(stream.get_mut().buffer, b"abc");
        Ok(())
    }
}
