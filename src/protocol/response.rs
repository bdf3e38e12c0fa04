//! Response types shared by endpoints, interceptors and error handlers.
//!
//! A [`Response`] is a plain `http::Response` carrying a [`RespBody`]; the
//! drivers split it into a [`ResponseHead`] plus payload frames when writing
//! it out.

use bytes::Bytes;
use http::HeaderValue;

use crate::protocol::message::PayloadSize;

/// A complete response, ready to be serialized.
pub type Response = http::Response<RespBody>;

/// The header portion of a response, with the body split off.
pub type ResponseHead = http::Response<()>;

/// Value stamped into the `server` header of responses that do not already
/// carry one.
pub(crate) const SERVER_TOKEN: HeaderValue =
    HeaderValue::from_static(concat!("tandem-http/", env!("CARGO_PKG_VERSION")));

/// Interim response for `Expect: 100-continue`, written raw by the drivers.
pub(crate) const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Body of an outgoing response.
///
/// `Empty` and `Full` are framed with `Content-Length`; `Chunked` is sent
/// with chunked transfer encoding, one transfer chunk per element.
#[derive(Debug, Clone, Default)]
pub enum RespBody {
    #[default]
    Empty,
    Full(Bytes),
    Chunked(Vec<Bytes>),
}

impl RespBody {
    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self::Full(data.into())
    }

    pub fn chunked(chunks: Vec<Bytes>) -> Self {
        Self::Chunked(chunks)
    }

    /// Payload framing this body needs on the wire.
    pub fn payload_size(&self) -> PayloadSize {
        match self {
            Self::Empty => PayloadSize::Empty,
            Self::Full(data) => PayloadSize::Length(data.len() as u64),
            Self::Chunked(_) => PayloadSize::Chunked,
        }
    }

    /// Body bytes in encoder order, without the end-of-payload marker.
    pub(crate) fn into_chunks(self) -> std::vec::IntoIter<Bytes> {
        match self {
            Self::Empty => Vec::new().into_iter(),
            Self::Full(data) => vec![data].into_iter(),
            Self::Chunked(chunks) => chunks.into_iter(),
        }
    }
}

impl From<()> for RespBody {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RespBody {
    fn from(data: Bytes) -> Self {
        Self::Full(data)
    }
}

impl From<&'static str> for RespBody {
    fn from(data: &'static str) -> Self {
        Self::Full(Bytes::from_static(data.as_bytes()))
    }
}

impl From<String> for RespBody {
    fn from(data: String) -> Self {
        Self::Full(Bytes::from(data))
    }
}

impl From<&'static [u8]> for RespBody {
    fn from(data: &'static [u8]) -> Self {
        Self::Full(Bytes::from_static(data))
    }
}

impl From<Vec<u8>> for RespBody {
    fn from(data: Vec<u8>) -> Self {
        Self::Full(Bytes::from(data))
    }
}

impl From<Vec<Bytes>> for RespBody {
    fn from(chunks: Vec<Bytes>) -> Self {
        Self::Chunked(chunks)
    }
}
