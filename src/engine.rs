//! The shared, scheduler-agnostic core of a server.
//!
//! An [`Engine`] bundles the route table, the interceptor chain and the
//! error handler behind an `Arc`, and owns every protocol decision that
//! must not differ between the blocking and the cooperative driver: how a
//! failure maps to a response, which errors force the connection closed,
//! and what happens to the connection after each response. The drivers call
//! these helpers instead of re-deriving the rules.

use std::fmt;

use http::StatusCode;
use tracing::error;

use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::interceptor::InterceptorChain;
use crate::protocol::connection_state::{self, ConnectionState};
use crate::protocol::error::{BoxError, HandlerError, ParseError};
use crate::protocol::response::{Response, SERVER_TOKEN};
use crate::router::Router;

/// Message used when a panic or failure carries nothing printable.
const UNKNOWN_ERROR: &str = "unknown internal error";

pub struct Engine<E> {
    router: Router<E>,
    interceptors: InterceptorChain,
    error_handler: Box<dyn ErrorHandler>,
}

impl<E> Engine<E> {
    pub fn builder(router: Router<E>) -> EngineBuilder<E> {
        EngineBuilder { router, interceptors: InterceptorChain::default(), error_handler: Box::new(DefaultErrorHandler) }
    }

    pub fn router(&self) -> &Router<E> {
        &self.router
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Response for a request whose head could not be parsed.
    pub(crate) fn parse_error_response(&self, error: &ParseError) -> Response {
        self.error_handler.handle(error.status(), &error.to_string(), None)
    }

    /// Response for a request no route claimed.
    pub(crate) fn no_route_response(&self) -> Response {
        self.error_handler.handle(StatusCode::NOT_FOUND, "no route matched the request path", None)
    }

    /// Maps a handler or interceptor failure to a response.
    ///
    /// A [`HandlerError`] passes its status, message and headers through
    /// verbatim; any other error becomes a 500 carrying its display
    /// message.
    pub(crate) fn failure_response(&self, error: BoxError) -> Response {
        match error.downcast::<HandlerError>() {
            Ok(handler_error) => {
                let (status, message, headers) = handler_error.into_parts();
                self.error_handler.handle(status, &message, headers)
            }
            Err(error) => {
                error!("handler failed: {error}");
                self.error_handler.handle(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string(), None)
            }
        }
    }

    /// Response for a handler that panicked. The panic payload is logged at
    /// the call site; the client only learns that something broke.
    pub(crate) fn panic_response(&self) -> Response {
        self.error_handler.handle(StatusCode::INTERNAL_SERVER_ERROR, UNKNOWN_ERROR, None)
    }

    /// Fallback response when sending a failure response itself failed
    /// before anything was written.
    pub(crate) fn recovery_response(&self, message: &str) -> Response {
        self.error_handler.handle(StatusCode::INTERNAL_SERVER_ERROR, message, None)
    }

    /// Stamps the server header and decides the connection's fate.
    pub(crate) fn finalize(&self, response: &mut Response, keeps_alive: bool) -> ConnectionState {
        stamp_server(response);
        connection_state::resolve(response, keeps_alive)
    }

    /// Like [`finalize`](Self::finalize), for responses that must be the
    /// last on the connection regardless of what the request asked for.
    pub(crate) fn finalize_forced_close(&self, response: &mut Response) -> ConnectionState {
        stamp_server(response);
        ConnectionState::Close
    }
}

impl<E> fmt::Debug for Engine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("interceptors", &self.interceptors).finish_non_exhaustive()
    }
}

fn stamp_server(response: &mut Response) {
    if !response.headers().contains_key(http::header::SERVER) {
        response.headers_mut().insert(http::header::SERVER, SERVER_TOKEN);
    }
}

pub struct EngineBuilder<E> {
    router: Router<E>,
    interceptors: InterceptorChain,
    error_handler: Box<dyn ErrorHandler>,
}

impl<E> EngineBuilder<E> {
    pub fn interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn error_handler<H: ErrorHandler + 'static>(mut self, error_handler: H) -> Self {
        self.error_handler = Box::new(error_handler);
        self
    }

    pub fn build(self) -> Engine<E> {
        Engine { router: self.router, interceptors: self.interceptors, error_handler: self.error_handler }
    }
}

impl<E> fmt::Debug for EngineBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::header::SERVER;

    use crate::protocol::response::RespBody;

    use super::*;

    fn engine() -> Engine<()> {
        Engine::builder(Router::builder().build().unwrap()).build()
    }

    #[test]
    fn handler_error_passes_through_verbatim() {
        let error = HandlerError::new(StatusCode::CONFLICT, "already exists");
        let response = engine().failure_response(Box::new(error));

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(!response.body().payload_size().is_empty());
    }

    #[test]
    fn unknown_failure_becomes_a_500() {
        let response = engine().failure_response("database unreachable".into());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn parse_error_status_is_forwarded() {
        let response = engine().parse_error_response(&ParseError::too_many_headers(64));
        assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
    }

    #[test]
    fn finalize_stamps_the_server_header_once() {
        let engine = engine();

        let mut response = Response::new(RespBody::empty());
        assert_eq!(engine.finalize(&mut response, true), ConnectionState::KeepAlive);
        assert!(response.headers().get(SERVER).unwrap().to_str().unwrap().starts_with("tandem-http/"));

        let mut custom = Response::new(RespBody::empty());
        custom.headers_mut().insert(SERVER, "custom/1".parse().unwrap());
        engine.finalize(&mut custom, false);
        assert_eq!(custom.headers().get(SERVER).unwrap(), "custom/1");
    }

    #[test]
    fn forced_close_ignores_keep_alive() {
        let mut response = Response::new(RespBody::empty());
        assert_eq!(engine().finalize_forced_close(&mut response), ConnectionState::Close);
    }
}
