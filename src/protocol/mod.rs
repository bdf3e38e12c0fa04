//! Wire-independent protocol types and pure rules.
//!
//! Everything in this module is scheduler-agnostic: the same types flow
//! through the blocking and the cooperative driver, so the two cannot drift
//! apart on HTTP semantics.

pub mod body;
pub mod connection_state;
pub mod error;
pub mod message;
pub mod request;
pub mod response;

pub use body::{BodyReader, ReqBody};
pub use connection_state::ConnectionState;
pub use error::{BoxError, HandlerError, HttpError, ParseError, SendError};
pub use message::{Message, PayloadItem, PayloadSize};
pub use request::{PathParams, Request, RequestContext, RequestHead};
pub use response::{RespBody, Response, ResponseHead};
