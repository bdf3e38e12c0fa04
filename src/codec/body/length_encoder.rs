use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::error::SendError;
use crate::protocol::message::PayloadItem;
use crate::utils::ensure;

/// Encodes a `Content-Length` delimited payload, enforcing that the body
/// matches the declared length exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn is_finish(&self) -> bool {
        self.remaining == 0
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                if self.remaining == 0 {
                    warn!("received body bytes after the declared content-length was written");
                    return Ok(());
                }
                ensure!(
                    bytes.len() as u64 <= self.remaining,
                    SendError::invalid_body("body exceeds the declared content-length")
                );
                self.remaining -= bytes.len() as u64;
                dst.extend_from_slice(&bytes);
                Ok(())
            }
            PayloadItem::Eof => {
                ensure!(
                    self.remaining == 0,
                    SendError::invalid_body("body shorter than the declared content-length")
                );
                Ok(())
            }
        }
    }
}
