//! Typed views of a parsed request.
//!
//! [`RequestHead`] wraps `http::Request<()>` and is produced by the header
//! decoder; the engine pairs it with the route's [`PathParams`] and a body
//! handle to form the [`Request`] given to an endpoint. Interceptors see the
//! same data through the borrowed [`RequestContext`].

use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};

use crate::protocol::error::ParseError;

/// The request line and headers of a received request, without its body.
#[derive(Debug)]
pub struct RequestHead {
    inner: http::Request<()>,
}

impl RequestHead {
    /// Consumes the head and returns the inner `http::Request<()>`.
    pub fn into_inner(self) -> http::Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// True for methods that may carry a request payload. Bodiless methods
    /// (GET, HEAD, DELETE, OPTIONS, CONNECT) never get a body decoder.
    pub fn need_body(&self) -> bool {
        !matches!(
            self.method(),
            &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT
        )
    }

    /// True when the client asked for an interim `100 Continue` before
    /// sending its body.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(http::header::EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }
}

impl AsRef<http::Request<()>> for RequestHead {
    fn as_ref(&self) -> &http::Request<()> {
        &self.inner
    }
}

impl From<http::Request<()>> for RequestHead {
    #[inline]
    fn from(inner: http::Request<()>) -> Self {
        Self { inner }
    }
}

/// Converts a complete `httparse` request into a typed head.
///
/// Every field is validated on the way in; only HTTP/1.0 and HTTP/1.1 are
/// accepted. Repeated headers are appended rather than collapsed so framing
/// checks still see duplicates.
impl TryFrom<&httparse::Request<'_, '_>> for RequestHead {
    type Error = ParseError;

    fn try_from(parsed: &httparse::Request<'_, '_>) -> Result<Self, Self::Error> {
        let method = parsed
            .method
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .ok_or(ParseError::InvalidMethod)?;

        let uri = parsed
            .path
            .and_then(|p| Uri::try_from(p).ok())
            .ok_or(ParseError::InvalidUri)?;

        let version = match parsed.version {
            Some(1) => Version::HTTP_11,
            Some(0) => Version::HTTP_10,
            other => return Err(ParseError::InvalidVersion(other)),
        };

        let mut inner = http::Request::new(());
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;
        *inner.version_mut() = version;

        let headers = inner.headers_mut();
        headers.reserve(parsed.headers.len());
        for header in parsed.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ParseError::invalid_header(format!("{e}: {:?}", header.name)))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| ParseError::invalid_header(format!("{e} for {name}")))?;
            headers.append(name, value);
        }

        Ok(Self { inner })
    }
}

/// Path parameters captured while matching the request path against the
/// route table, e.g. `{id}` in `/orders/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(Box<str>, Box<str>)>,
}

impl PathParams {
    /// Returns the value captured for `name`, if the matched route has such
    /// a parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| &**n == name).map(|(_, v)| &**v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (&**n, &**v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self { params: iter.into_iter().map(|(n, v)| (Box::from(n), Box::from(v))).collect() }
    }
}

/// A routed request as an endpoint receives it: the parsed head, the path
/// parameters of the matched route, and the body handle `B`.
#[derive(Debug)]
pub struct Request<B> {
    head: RequestHead,
    params: PathParams,
    body: B,
}

impl<B> Request<B> {
    pub(crate) fn new(head: RequestHead, params: PathParams, body: B) -> Self {
        Self { head, params, body }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    /// Consumes the request and returns its body handle.
    pub fn into_body(self) -> B {
        self.body
    }

    /// Splits the request into its head, path parameters and body.
    pub fn into_parts(self) -> (RequestHead, PathParams, B) {
        (self.head, self.params, self.body)
    }

    /// Borrowed, body-less view of this request.
    pub fn context(&self) -> RequestContext<'_> {
        RequestContext { head: &self.head, params: &self.params }
    }
}

/// What an interceptor gets to look at: the request head and path
/// parameters, but never the body.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'req> {
    head: &'req RequestHead,
    params: &'req PathParams,
}

impl<'req> RequestContext<'req> {
    pub(crate) fn new(head: &'req RequestHead, params: &'req PathParams) -> Self {
        Self { head, params }
    }

    pub fn head(&self) -> &'req RequestHead {
        self.head
    }

    pub fn method(&self) -> &'req Method {
        self.head.method()
    }

    pub fn uri(&self) -> &'req Uri {
        self.head.uri()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &'req HeaderMap {
        self.head.headers()
    }

    pub fn params(&self) -> &'req PathParams {
        self.params
    }
}
