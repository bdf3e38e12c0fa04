use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::error::ParseError;
use crate::protocol::message::{Message, PayloadItem, PayloadSize};
use crate::protocol::request::RequestHead;

/// Decodes a whole request exchange: one head frame, then payload frames
/// until EOF.
///
/// The payload phase is tracked through `payload_decoder`: `None` means the
/// decoder is waiting for the next request head, `Some` means body frames
/// are still owed. The EOF frame clears the payload phase so the decoder is
/// ready for the next request on a kept-alive connection.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use indoc::indoc;

    use super::*;

    fn next(decoder: &mut RequestDecoder, buffer: &mut BytesMut) -> Message<(RequestHead, PayloadSize)> {
        decoder.decode(buffer).unwrap().unwrap()
    }

    #[test]
    fn head_then_body_then_eof() {
        let mut buffer = BytesMut::from(indoc! {"
            POST /upload HTTP/1.1\r
            Host: example.com\r
            Content-Length: 5\r
            \r
            hello"});
        let mut decoder = RequestDecoder::new();

        let (head, payload_size) = next(&mut decoder, &mut buffer).into_header().unwrap();
        assert_eq!(head.method(), Method::POST);
        assert_eq!(payload_size, PayloadSize::Length(5));

        let item = next(&mut decoder, &mut buffer).into_payload().unwrap();
        assert_eq!(item.into_bytes().unwrap(), &b"hello"[..]);

        let item = next(&mut decoder, &mut buffer).into_payload().unwrap();
        assert!(item.is_eof());
    }

    #[test]
    fn eof_resets_for_the_next_request() {
        let mut buffer = BytesMut::from(indoc! {"
            GET /a HTTP/1.1\r
            Host: example.com\r
            \r
            GET /b HTTP/1.1\r
            Host: example.com\r
            \r
        "});
        let mut decoder = RequestDecoder::new();

        let (head, _) = next(&mut decoder, &mut buffer).into_header().unwrap();
        assert_eq!(head.uri().path(), "/a");
        assert!(next(&mut decoder, &mut buffer).into_payload().unwrap().is_eof());

        let (head, _) = next(&mut decoder, &mut buffer).into_header().unwrap();
        assert_eq!(head.uri().path(), "/b");
        assert!(next(&mut decoder, &mut buffer).into_payload().unwrap().is_eof());
    }

    #[test]
    fn partial_head_waits_for_more_bytes() {
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: exa"[..]);
        let mut decoder = RequestDecoder::new();

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"mple.com\r\n\r\n");
        let (head, payload_size) = next(&mut decoder, &mut buffer).into_header().unwrap();
        assert_eq!(head.method(), Method::GET);
        assert_eq!(payload_size, PayloadSize::Empty);
    }
}
