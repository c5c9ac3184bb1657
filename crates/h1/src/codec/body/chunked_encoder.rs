use std::io::Write;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::header::write_header_lines;
use crate::protocol::{Headers, SendError};

/// Writes chunk sequences with their framing: one size line per non-empty chunk, the
/// zero-length terminator, any trailers and the closing empty line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkedEncoder;

impl<'a> Encoder<(&'a [Bytes], &'a Headers)> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&'a [Bytes], &'a Headers), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (chunks, trailers) = item;

        // an empty chunk would read as the terminator
        for chunk in chunks.iter().filter(|chunk| !chunk.is_empty()) {
            write!(helper::Writer(dst), "{:x}\r\n", chunk.len())?;
            dst.reserve(chunk.len() + 2);
            dst.extend_from_slice(chunk);
            dst.extend_from_slice(b"\r\n");
        }

        dst.extend_from_slice(b"0\r\n");
        write_header_lines(trailers, dst);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_chunk_boundaries() {
        let chunks = [Bytes::from_static(b"abc"), Bytes::from_static(b"de"), Bytes::new()];
        let mut dst = BytesMut::new();

        ChunkedEncoder.encode((&chunks[..], &Headers::new()), &mut dst).unwrap();

        assert_eq!(&dst[..], b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
    }

    #[test]
    fn writes_trailers_and_hex_sizes() {
        let chunks = [Bytes::from(vec![b'x'; 26])];
        let trailers: Headers = [("Expires", "never")].into_iter().collect();
        let mut dst = BytesMut::new();

        ChunkedEncoder.encode((&chunks[..], &trailers), &mut dst).unwrap();

        assert!(dst.starts_with(b"1a\r\n"));
        assert!(dst.ends_with(b"\r\n0\r\nExpires: never\r\n\r\n"));
    }
}
