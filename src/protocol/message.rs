use bytes::Bytes;

/// A frame produced by the request decoder or consumed by the response
/// encoder: either the message head or a piece of its payload.
///
/// `T` is the head type — `(RequestHead, PayloadSize)` on the way in,
/// `(ResponseHead, PayloadSize)` on the way out.
#[derive(Debug)]
pub enum Message<T> {
    /// The parsed (or to-be-serialized) head.
    Header(T),
    /// A payload chunk or the end-of-payload marker.
    Payload(PayloadItem),
}

/// One step of a payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of body data.
    Chunk(Bytes),
    /// End of the payload stream.
    Eof,
}

/// Payload framing derived from the message headers, deciding how the
/// body bytes are delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Exactly this many bytes follow (`Content-Length`).
    Length(u64),
    /// Chunked transfer encoding.
    Chunked,
    /// No body at all.
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns the head, or `None` for a payload frame.
    pub fn into_header(self) -> Option<T> {
        match self {
            Message::Header(head) => Some(head),
            Message::Payload(_) => None,
        }
    }

    /// Returns the payload item, or `None` for a head frame.
    pub fn into_payload(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(item) => Some(item),
        }
    }
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns the contained bytes, or `None` for the EOF marker.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
