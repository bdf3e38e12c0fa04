//! Request-head decoding and response-head encoding.
//!
//! [`HeaderDecoder`] turns raw bytes into a typed [`RequestHead`] plus the
//! payload framing the headers announce; [`HeaderEncoder`] writes a status
//! line and header block with the framing headers stamped from the body
//! shape.
//!
//! [`RequestHead`]: crate::protocol::request::RequestHead

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
