use std::io::{self, ErrorKind};

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::error::SendError;
use crate::protocol::message::{Message, PayloadItem, PayloadSize};
use crate::protocol::response::{Response, ResponseHead};

/// Encodes a response exchange: one head frame, then payload frames
/// terminated by EOF.
///
/// Frames must arrive in order. A head while a payload is still owed, or a
/// payload with no head before it, is a programming error in the caller and
/// is rejected.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Encodes a whole [`Response`] in one call: head, body chunks, EOF.
    pub fn encode_response(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), SendError> {
        let (parts, body) = response.into_parts();
        let payload_size = body.payload_size();
        let head = ResponseHead::from_parts(parts, ());

        self.encode(Message::Header((head, payload_size)), dst)?;
        for chunk in body.into_chunks() {
            self.encode(Message::Payload(PayloadItem::Chunk(chunk)), dst)?;
        }
        self.encode(Message::Payload(PayloadItem::Eof), dst)
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl Encoder<Message<(ResponseHead, PayloadSize)>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expected a payload item but received a response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(payload_size.into());
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expected a response head but received a payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                payload_encoder.encode(payload_item, dst)?;

                if is_eof && payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                Ok(())
            }
        }
    }
}
