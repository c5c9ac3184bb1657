//! HTTP message decoder module
//!
//! [`MessageDecoder`] reads one complete message at a time: the head first, then the
//! body with the framing the head selects, then any trailers.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h1::codec::{DecoderOptions, MessageDecoder};
//! use micro_h1::protocol::Response;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = MessageDecoder::<Response>::new(DecoderOptions::default());
//! let mut buffer = BytesMut::from("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n");
//!
//! let decoded = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(&decoded.message.body().data()[..], b"Wiki");
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::{DecodedBody, PayloadDecoder};
use crate::codec::header::{DecodeMessage, HeadDecoder};
use crate::protocol::{ParseError, ReceiveOptions, SizeLimits};

/// Options a [`MessageDecoder`] is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    pub limits: SizeLimits,
    /// See [`ReceiveOptions::disconnect_after_chunks`].
    pub disconnect_after_chunks: Option<usize>,
    pub allow_close_delimited_requests: bool,
    /// `false` when the message cannot have a body, as for a response to HEAD.
    pub expect_body: bool,
}

impl DecoderOptions {
    /// Combines resolved limits with per call options.
    ///
    /// # Panics
    ///
    /// When `disconnect_after_chunks` is not below `limits.max_number_of_chunks`: the chunk
    /// limit would always trip first.
    pub fn new(limits: SizeLimits, options: &ReceiveOptions) -> Self {
        if let Some(chunks) = options.disconnect_after_chunks {
            assert!(
                chunks < limits.max_number_of_chunks,
                "disconnect_after_chunks ({chunks}) must be less than max_number_of_chunks ({})",
                limits.max_number_of_chunks
            );
        }
        Self {
            limits,
            disconnect_after_chunks: options.disconnect_after_chunks,
            allow_close_delimited_requests: options.allow_close_delimited_requests,
            expect_body: true,
        }
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::new(SizeLimits::default(), &ReceiveOptions::default())
    }
}

/// A decoded message.
#[derive(Debug)]
pub struct Decoded<M> {
    pub message: M,
    /// The body was cut short on purpose and the connection has to be dropped.
    pub disconnect: bool,
}

/// A decoder for complete HTTP messages.
///
/// # State Machine
///
/// The decoder maintains its state through the `state` field:
/// - `None`: Currently parsing the head
/// - `Some((message, decoder))`: Head parsed, currently reading the body
#[derive(Debug)]
pub struct MessageDecoder<M> {
    options: DecoderOptions,
    head_decoder: HeadDecoder,
    state: Option<(M, PayloadDecoder)>,
}

impl<M: DecodeMessage> MessageDecoder<M> {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options, head_decoder: HeadDecoder::new(), state: None }
    }

    /// Whether no byte of the next message has been consumed.
    pub fn is_idle(&self) -> bool {
        self.state.is_none() && self.head_decoder.is_idle()
    }

    fn finish(mut message: M, decoded: DecodedBody) -> Decoded<M> {
        message.attach(decoded.body, decoded.trailers);
        Decoded { message, disconnect: decoded.disconnect }
    }
}

impl<M: DecodeMessage> Decoder for MessageDecoder<M> {
    type Item = Decoded<M>;
    type Error = ParseError;

    /// Attempts to decode a complete message from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(decoded))`: a message with its whole body
    /// - `Ok(None)`: Need more data to proceed
    /// - `Err(_)`: Encountered a parsing error; the stream can no longer be trusted
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (message, mut payload_decoder) = match self.state.take() {
            Some(state) => state,
            None => {
                let Some((head, header_count)) = self.head_decoder.decode_head(src, &self.options.limits)? else {
                    return Ok(None);
                };
                let message = M::parse_head(&head, header_count)?;
                let payload_decoder = PayloadDecoder::for_message(&message, &self.options)?;
                (message, payload_decoder)
            }
        };

        match payload_decoder.decode(src)? {
            Some(decoded) => {
                trace!(body_size = decoded.body.len(), "decoded message");
                Ok(Some(Self::finish(message, decoded)))
            }
            None => {
                self.state = Some((message, payload_decoder));
                Ok(None)
            }
        }
    }

    /// Finishes the message at the end of the stream.
    ///
    /// A stream ending cleanly between messages yields `Ok(None)`. Ending anywhere inside
    /// a message is an error, except for close-delimited bodies, which end exactly there.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(decoded) = self.decode(src)? {
            return Ok(Some(decoded));
        }

        match self.state.take() {
            Some((message, mut payload_decoder)) => match payload_decoder.decode_eof(src)? {
                Some(decoded) => Ok(Some(Self::finish(message, decoded))),
                None => Err(ParseError::invalid_message("stream ended inside the message body")),
            },
            None if src.is_empty() && self.head_decoder.is_idle() => Ok(None),
            None => Err(ParseError::invalid_bytes("stream ended inside the message head", &src[..src.len().min(64)])),
        }
    }
}
