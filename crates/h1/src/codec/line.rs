//! Bounded CRLF line scanning shared by the head and chunked decoders.

use bytes::Bytes;

use crate::protocol::{MessagePart, ParseError};

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Finds the CRLF terminated line at the start of `src`.
///
/// Returns the line length including its CRLF, or `None` when more bytes are needed.
/// A line may be at most `limit` bytes long including the terminator; once `limit` bytes
/// are buffered without a terminator the line is rejected and the scanned bytes are
/// attached to the error.
pub(crate) fn find_line(src: &[u8], limit: usize, part: MessagePart) -> Result<Option<usize>, ParseError> {
    let window = &src[..src.len().min(limit)];

    if let Some(pos) = window.windows(2).position(|w| w == CRLF) {
        return Ok(Some(pos + CRLF.len()));
    }

    if window.len() == limit {
        return Err(ParseError::too_large(part, limit, window.len(), Bytes::copy_from_slice(window)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_terminated_line() {
        assert_eq!(find_line(b"GET / HTTP/1.1\r\nHost", 100, MessagePart::StartLine).unwrap(), Some(16));
        assert_eq!(find_line(b"GET / HTT", 100, MessagePart::StartLine).unwrap(), None);
        assert_eq!(find_line(b"\r\n", 2, MessagePart::HeaderLine).unwrap(), Some(2));
    }

    #[test]
    fn limit_includes_terminator() {
        assert_eq!(find_line(b"abc\r\n", 5, MessagePart::HeaderLine).unwrap(), Some(5));

        match find_line(b"abcd\r\n", 5, MessagePart::HeaderLine) {
            Err(ParseError::TooLarge { part, limit, size, received }) => {
                assert_eq!(part, MessagePart::HeaderLine);
                assert_eq!(limit, 5);
                assert_eq!(size, 5);
                assert_eq!(&received[..], b"abcd\r");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn waits_below_limit() {
        assert_eq!(find_line(b"abcd", 5, MessagePart::HeaderLine).unwrap(), None);
        assert!(find_line(b"abcde", 5, MessagePart::HeaderLine).is_err());
    }
}
