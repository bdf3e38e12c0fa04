//! Incremental request-head parsing on top of `httparse`.
//!
//! The decoder is a plain byte machine with no notion of the underlying
//! stream, so both the blocking and the cooperative driver can feed it the
//! same `BytesMut`. Limits: at most [`MAX_HEADER_NUM`] headers and
//! [`MAX_HEADER_BYTES`] of header block; an oversized partial block is
//! rejected without waiting for more input.

use bytes::BytesMut;
use http::HeaderValue;
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::error::ParseError;
use crate::protocol::message::PayloadSize;
use crate::protocol::request::RequestHead;
use crate::utils::ensure;

/// Maximum number of headers accepted in a request.
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of the whole header block.
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a request head plus the payload framing the headers announce.
#[derive(Debug, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Request::new(&mut headers);

        let status = parsed.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e),
        })?;

        match status {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed request head");
                ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(MAX_HEADER_BYTES));

                let head = RequestHead::try_from(&parsed)?;
                let payload_size = parse_payload(&head)?;
                let _ = src.split_to(head_size);
                Ok(Some((head, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Derives the payload framing from the parsed head.
///
/// `Transfer-Encoding` and `Content-Length` together are rejected, per RFC
/// 9112 §6; a non-chunked transfer coding means no readable body.
fn parse_payload(head: &RequestHead) -> Result<PayloadSize, ParseError> {
    if !head.need_body() {
        return Ok(PayloadSize::Empty);
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value
                .to_str()
                .map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;

            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            Ok(PayloadSize::Length(length))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length(
            "transfer-encoding and content-length are mutually exclusive",
        )),
    }
}

/// Chunked must be the final transfer coding to count.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(last) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return last.trim_ascii() == CHUNKED;
        }
    }
    false
}
