//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP messages that use chunked transfer encoding
//! as specified in [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//!
//! Every chunk is checked against the size limits before its data is read. Chunk
//! extensions are refused, and the chunk size line may hold at most 16 hex digits.

use std::task::Poll;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::body::DecodedBody;
use crate::codec::header::parse_trailers;
use crate::codec::line::{CRLF, find_line};
use crate::ensure;
use crate::protocol::{Body, Headers, MessagePart, ParseError, SizeLimits};

/// Bytes every chunked body ends with once its last data chunk is read: `0\r\n\r\n`.
const MIN_TERMINATOR_SIZE: u64 = 5;

/// A decoder for chunked bodies.
///
/// Chunks are kept as they arrive, so the decoded body re-encodes with the same chunk
/// boundaries.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    limits: SizeLimits,
    disconnect_after_chunks: Option<usize>,
    /// A Content-Length sent alongside chunked encoding counts the raw chunked bytes.
    content_length: Option<u64>,
    chunks: Vec<Bytes>,
    body_size: usize,
    wire_size: u64,
    trailer_scanned: usize,
    trailer_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size line
    Size,
    /// Read chunk data of the given size and its CRLF
    Data(usize),
    /// Read trailer lines up to the closing empty line
    Trailers,
    /// Finished, either at the end of the body or by disconnecting early
    Done { disconnect: bool },
}

use ChunkedState::{Data, Done, Size, Trailers};

impl ChunkedDecoder {
    pub fn new(limits: SizeLimits, content_length: Option<u64>, disconnect_after_chunks: Option<usize>) -> Self {
        Self {
            state: Size,
            limits,
            disconnect_after_chunks,
            content_length,
            chunks: Vec::new(),
            body_size: 0,
            wire_size: 0,
            trailer_scanned: 0,
            trailer_lines: 0,
        }
    }

    fn step(&mut self, src: &mut BytesMut, trailers: &mut Headers) -> Poll<Result<ChunkedState, ParseError>> {
        match self.state {
            Size => self.read_size(src),
            Data(size) => self.read_data(src, size),
            Trailers => self.read_trailers(src, trailers),
            done @ Done { .. } => Poll::Ready(Ok(done)),
        }
    }

    /// Reads and checks a chunk size line.
    ///
    /// # State Transitions
    /// - On size 0: Move to Trailers
    /// - On any other size within the limits: Move to Data
    fn read_size(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let len = match find_line(src, SizeLimits::MAX_CHUNK_HEADER_SIZE, MessagePart::ChunkHeader) {
            Ok(Some(len)) => len,
            Ok(None) => return Poll::Pending,
            Err(e) => return Poll::Ready(Err(e)),
        };

        let line = src.split_to(len).freeze();
        self.wire_size += len as u64;
        Poll::Ready(self.check_size_line(&line))
    }

    fn check_size_line(&mut self, line: &Bytes) -> Result<ChunkedState, ParseError> {
        let digits = &line[..line.len() - CRLF.len()];

        ensure!(!digits.contains(&b';'), ParseError::invalid_bytes("chunk extensions are not supported", digits));
        ensure!(
            !digits.is_empty() && digits.iter().all(u8::is_ascii_hexdigit),
            ParseError::invalid_bytes("invalid chunk size", digits)
        );

        // at most 16 hex digits, so the value always fits
        let size = digits.iter().fold(0u64, |size, digit| (size << 4) | u64::from(hex_value(*digit)));

        if size == 0 {
            self.check_content_length(CRLF.len() as u64)?;
            return Ok(Trailers);
        }

        ensure!(
            self.chunks.len() < self.limits.max_number_of_chunks,
            ParseError::invalid_message(format!("more than {} chunks", self.limits.max_number_of_chunks))
        );

        let size = usize::try_from(size).unwrap_or(usize::MAX);
        ensure!(
            size <= self.limits.max_chunk_size,
            ParseError::too_large(MessagePart::Chunk, self.limits.max_chunk_size, size, line.clone())
        );

        let body_size = self.body_size.saturating_add(size);
        ensure!(
            body_size <= self.limits.max_body_size,
            ParseError::too_large(MessagePart::Body, self.limits.max_body_size, body_size, Body::Chunked(self.chunks.clone()).data())
        );

        self.check_content_length(size as u64 + CRLF.len() as u64 + MIN_TERMINATOR_SIZE)?;

        trace!(size, "read chunk size");
        Ok(Data(size))
    }

    /// Reads chunk data once the whole chunk and its CRLF are buffered.
    ///
    /// # State Transitions
    /// - When the disconnect threshold is reached: Move to Done
    /// - Otherwise: Move back to Size for the next chunk
    fn read_data(&mut self, src: &mut BytesMut, size: usize) -> Poll<Result<ChunkedState, ParseError>> {
        if src.len() < size + CRLF.len() {
            return Poll::Pending;
        }

        let data = src.split_to(size).freeze();
        let terminator = src.split_to(CRLF.len());
        if &terminator[..] != CRLF {
            return Poll::Ready(Err(ParseError::invalid_bytes("chunk data is not followed by CRLF", &terminator)));
        }

        self.wire_size += (size + CRLF.len()) as u64;
        self.body_size += size;
        self.chunks.push(data);

        if let Some(max) = self.disconnect_after_chunks
            && self.chunks.len() >= max
        {
            debug!(chunks = self.chunks.len(), "disconnecting after chunk limit");
            return Poll::Ready(Ok(Done { disconnect: true }));
        }

        Poll::Ready(Ok(Size))
    }

    /// Reads the trailer block, each line bounded like a header line.
    ///
    /// # State Transitions
    /// - On the closing empty line: Move to Done
    fn read_trailers(&mut self, src: &mut BytesMut, trailers: &mut Headers) -> Poll<Result<ChunkedState, ParseError>> {
        loop {
            let len = match find_line(&src[self.trailer_scanned..], self.limits.max_header_line_size, MessagePart::TrailerLine) {
                Ok(Some(len)) => len,
                Ok(None) => return Poll::Pending,
                Err(e) => return Poll::Ready(Err(e)),
            };
            self.trailer_scanned += len;

            if len == CRLF.len() {
                let block = src.split_to(self.trailer_scanned).freeze();
                self.wire_size += block.len() as u64;
                return Poll::Ready(self.finish_trailers(&block, trailers));
            }

            self.trailer_lines += 1;
            if self.trailer_lines > self.limits.max_number_of_headers {
                return Poll::Ready(Err(ParseError::invalid_message(format!(
                    "more than {} trailers",
                    self.limits.max_number_of_headers
                ))));
            }
        }
    }

    fn finish_trailers(&mut self, block: &Bytes, trailers: &mut Headers) -> Result<ChunkedState, ParseError> {
        if self.trailer_lines > 0 {
            *trailers = parse_trailers(block, self.trailer_lines)?;
        }

        if let Some(content_length) = self.content_length {
            ensure!(
                self.wire_size == content_length,
                ParseError::invalid_message(format!(
                    "chunked body is {} bytes on the wire but content-length is {content_length}",
                    self.wire_size
                ))
            );
        }

        trace!(chunks = self.chunks.len(), size = self.body_size, "finished reading chunked data");
        Ok(Done { disconnect: false })
    }

    /// Checks that `ahead` more bytes still fit in a declared Content-Length.
    fn check_content_length(&self, ahead: u64) -> Result<(), ParseError> {
        if let Some(content_length) = self.content_length {
            ensure!(
                self.wire_size + ahead <= content_length,
                ParseError::invalid_message(format!("chunked body exceeds content-length {content_length}"))
            );
        }
        Ok(())
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

impl Decoder for ChunkedDecoder {
    type Item = DecodedBody;
    type Error = ParseError;

    /// Decodes the whole chunked body.
    ///
    /// # Returns
    /// - `Ok(Some(body))` once the terminating chunk and trailers are read, or early when the
    ///   disconnect threshold is reached
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid or over a limit
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut trailers = Headers::new();
        loop {
            if let Done { disconnect } = self.state {
                let chunks = std::mem::take(&mut self.chunks);
                return Ok(Some(DecodedBody { body: Body::Chunked(chunks), trailers, disconnect }));
            }

            self.state = match self.step(src, &mut trailers) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(body) => Ok(Some(body)),
            None => Err(ParseError::invalid_message("stream ended inside a chunked body")),
        }
    }
}
