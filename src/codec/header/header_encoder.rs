//! Serializes a response head: status line, headers, payload framing.

use std::io::{self, ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::{header, HeaderValue, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::error::SendError;
use crate::protocol::message::PayloadSize;
use crate::protocol::response::ResponseHead;

/// Space reserved up front for a typical header block.
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encodes a [`ResponseHead`] plus its payload framing into raw bytes.
///
/// The `Content-Length` or `Transfer-Encoding` header is stamped from the
/// [`PayloadSize`], overriding whatever the handler may have set, so the
/// framing on the wire always matches the body that follows.
#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };
        write!(
            FastWrite(dst),
            "{} {} {}\r\n",
            version,
            head.status().as_str(),
            head.status().canonical_reason().unwrap_or("Unknown")
        )?;

        match payload_size {
            PayloadSize::Length(n) => match head.headers_mut().get_mut(header::CONTENT_LENGTH) {
                Some(value) => *value = n.into(),
                None => {
                    head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
                }
            },
            PayloadSize::Chunked => {
                const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
                match head.headers_mut().get_mut(header::TRANSFER_ENCODING) {
                    Some(value) => *value = CHUNKED,
                    None => {
                        head.headers_mut().insert(header::TRANSFER_ENCODING, CHUNKED);
                    }
                }
            }
            PayloadSize::Empty => match head.headers_mut().get_mut(header::CONTENT_LENGTH) {
                Some(value) => *value = 0.into(),
                None => {
                    const ZERO: HeaderValue = HeaderValue::from_static("0");
                    head.headers_mut().insert(header::CONTENT_LENGTH, ZERO);
                }
            },
        }

        for (name, value) in head.headers().iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` adapter over the already-reserved buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
