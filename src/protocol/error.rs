use http::{HeaderMap, StatusCode};
use std::io;
use thiserror::Error;

/// Boxed error type handlers and interceptors report failures with.
///
/// The engine downcasts it to [`HandlerError`] to recover a structured
/// status/message/headers triple; anything else becomes a 500 with the
/// error's display message.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Umbrella over the two transport-facing failure directions of a
/// connection: parsing the incoming request and sending the outgoing
/// response.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    Request {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Response {
        #[from]
        source: SendError,
    },
}

impl HttpError {
    /// True when the underlying failure means the peer is gone. Such
    /// failures are surfaced to the caller but never reported or
    /// logged.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Request { source } => source.is_disconnect(),
            Self::Response { source } => source.is_disconnect(),
        }
    }
}

/// Failures while reading and decoding a request.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header block exceeds the limit of {max_size} bytes")]
    TooLargeHeader { max_size: usize },

    #[error("header number exceeds the limit of {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(max_size: usize) -> Self {
        Self::TooLargeHeader { max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Status code an error response for this failure should carry.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLargeHeader { .. } | Self::TooManyHeaders { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            Self::InvalidVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io { source } if is_disconnect_kind(source))
    }

    /// True for transport-level failures, as opposed to malformed input.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Failures while encoding and writing a response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io { source } if is_disconnect_kind(source))
    }
}

pub(crate) fn is_disconnect_kind(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

/// Structured failure a handler or interceptor raises on purpose: the
/// status, message, and optional extra headers are forwarded to the
/// error handler verbatim.
#[derive(Error, Debug)]
#[error("{status}: {message}")]
pub struct HandlerError {
    status: StatusCode,
    message: String,
    headers: Option<HeaderMap>,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), headers: None }
    }

    /// Attaches headers to carry into the error response, e.g.
    /// `WWW-Authenticate` on a 401.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    pub(crate) fn into_parts(self) -> (StatusCode, String, Option<HeaderMap>) {
        (self.status, self.message, self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::WWW_AUTHENTICATE;
    use http::HeaderValue;

    #[test]
    fn parse_error_maps_to_report_status() {
        assert_eq!(ParseError::too_large_header(8192).status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(ParseError::too_many_headers(64).status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(ParseError::InvalidVersion(Some(2)).status(), StatusCode::HTTP_VERSION_NOT_SUPPORTED);
        assert_eq!(ParseError::InvalidMethod.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ParseError::invalid_header("bad name").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn disconnect_covers_peer_gone_kinds_only() {
        let broken = ParseError::io(io::Error::from(io::ErrorKind::BrokenPipe));
        let reset = SendError::io(io::Error::from(io::ErrorKind::ConnectionReset));
        let refused = SendError::io(io::Error::from(io::ErrorKind::ConnectionRefused));

        assert!(broken.is_disconnect());
        assert!(reset.is_disconnect());
        assert!(!refused.is_disconnect());
        assert!(!ParseError::InvalidMethod.is_disconnect());

        let wrapped = HttpError::from(SendError::io(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(wrapped.is_disconnect());
    }

    #[test]
    fn handler_error_round_trips_through_box_error() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        let error = HandlerError::new(StatusCode::UNAUTHORIZED, "credentials required")
            .with_headers(headers);

        let boxed: BoxError = Box::new(error);
        let recovered = boxed.downcast::<HandlerError>().expect("should downcast");
        let (status, message, headers) = recovered.into_parts();

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "credentials required");
        assert!(headers.is_some_and(|h| h.contains_key(WWW_AUTHENTICATE)));
    }
}
