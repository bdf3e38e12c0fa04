//! What happens to the connection once a response has been sent.
//!
//! The state is computed fresh after every response from the request's
//! version and `Connection` header plus the response's upgrade signal. It is
//! never persisted across requests and handlers cannot set it directly.

use http::{HeaderMap, StatusCode, Version};

use crate::protocol::request::RequestHead;
use crate::protocol::response::Response;

/// Fate of the connection after the current response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Tear the connection down.
    Close,
    /// Read the next request off the same connection.
    KeepAlive,
    /// Hand the raw stream over to an upgrade handler.
    Upgrade,
}

/// Combines the request-side keep-alive decision with the response's
/// upgrade signal. The upgrade signal wins.
pub(crate) fn resolve(response: &Response, keeps_alive: bool) -> ConnectionState {
    if response_upgrades(response) {
        ConnectionState::Upgrade
    } else if keeps_alive {
        ConnectionState::KeepAlive
    } else {
        ConnectionState::Close
    }
}

/// Request-side half of the rule: keep-alive by default on HTTP/1.1 unless
/// the client sent `Connection: close`, close by default on HTTP/1.0 unless
/// it sent `Connection: keep-alive`.
pub(crate) fn request_keeps_alive(head: &RequestHead) -> bool {
    if connection_has_token(head.headers(), "close") {
        return false;
    }
    if connection_has_token(head.headers(), "keep-alive") {
        return true;
    }
    head.version() != Version::HTTP_10
}

/// A response signals a protocol switch with status `101` or a
/// `Connection: upgrade` token.
pub(crate) fn response_upgrades(response: &Response) -> bool {
    response.status() == StatusCode::SWITCHING_PROTOCOLS
        || connection_has_token(response.headers(), "upgrade")
}

/// `Connection` is a comma-separated token list and tokens are
/// case-insensitive.
fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}
