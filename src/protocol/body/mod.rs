//! Request-body plumbing for both execution disciplines.
//!
//! The wire framing itself lives in the codec layer; this module only adapts
//! decoded payload frames to the two handler-facing body shapes:
//!
//! - [`BodyReader`] gives blocking endpoints a plain `std::io::Read` view
//!   that pulls more bytes from the connection on demand.
//! - [`ReqBody`] gives asynchronous endpoints an `http_body::Body`, fed by a
//!   [`BodyPump`] that the cooperative driver runs next to the handler so
//!   body frames keep flowing while the handler is suspended.

pub(crate) mod channel;
pub(crate) mod reader;

pub use channel::{BodyPump, ReqBody};
pub use reader::BodyReader;
