//! Scheduler-agnostic wire codecs.
//!
//! Everything here is a plain byte machine over `BytesMut`: the blocking
//! driver feeds the same decoders and encoders by hand that the cooperative
//! driver runs through `FramedRead`. No codec ever touches a socket.

pub mod body;
pub mod header;

mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
