//! Rendering of error responses.
//!
//! The engine never builds an error response directly; every parse error,
//! missing route, handler failure and panic is funneled through the
//! connection's [`ErrorHandler`], so installing a custom one changes the
//! look of every error the server emits.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::protocol::response::{RespBody, Response};

pub trait ErrorHandler: Send + Sync {
    /// Builds the response for an error with the given status and message.
    ///
    /// `headers` carries extra headers the error's origin insists on, e.g.
    /// `WWW-Authenticate` from an authentication failure.
    fn handle(&self, status: StatusCode, message: &str, headers: Option<HeaderMap>) -> Response;
}

/// Renders errors as plain text, the message verbatim as the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, status: StatusCode, message: &str, headers: Option<HeaderMap>) -> Response {
        let mut response = Response::new(RespBody::from(message.to_owned()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));

        if let Some(extra) = headers {
            for (name, value) in extra.iter() {
                response.headers_mut().insert(name, value.clone());
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use http::header::WWW_AUTHENTICATE;

    use crate::protocol::message::PayloadSize;

    use super::*;

    #[test]
    fn message_becomes_the_body() {
        let response =
            DefaultErrorHandler.handle(StatusCode::INTERNAL_SERVER_ERROR, "it broke", None);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().payload_size(), PayloadSize::Length(8));
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn origin_headers_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"api\""));

        let response = DefaultErrorHandler.handle(StatusCode::UNAUTHORIZED, "login first", Some(headers));

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Basic realm=\"api\"");
    }
}
