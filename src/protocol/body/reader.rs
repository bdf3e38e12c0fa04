use std::cmp;
use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::protocol::error::ParseError;
use crate::protocol::message::PayloadItem;

/// How many bytes a single blocking read pulls off the connection.
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Blocking `Read` view over a request body.
///
/// Decoded chunks are served from the connection's read buffer first; when
/// the buffer runs dry, more bytes are pulled from the underlying stream.
/// The payload decoder is borrowed from the driver so that any part of the
/// body the handler leaves unread can still be drained afterwards.
pub struct BodyReader<'conn> {
    decoder: &'conn mut PayloadDecoder,
    buffer: &'conn mut BytesMut,
    stream: &'conn mut (dyn Read + Send),
    chunk: Bytes,
    eof: bool,
}

impl<'conn> BodyReader<'conn> {
    pub(crate) fn new(
        decoder: &'conn mut PayloadDecoder,
        buffer: &'conn mut BytesMut,
        stream: &'conn mut (dyn Read + Send),
    ) -> Self {
        Self { decoder, buffer, stream, chunk: Bytes::new(), eof: false }
    }

    /// True once the whole body has been read.
    pub fn is_eof(&self) -> bool {
        self.eof && !self.chunk.has_remaining()
    }
}

impl Read for BodyReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if self.chunk.has_remaining() {
                let len = cmp::min(out.len(), self.chunk.remaining());
                self.chunk.copy_to_slice(&mut out[..len]);
                return Ok(len);
            }

            if self.eof {
                return Ok(0);
            }

            match self.decoder.decode(self.buffer).map_err(into_io)? {
                Some(PayloadItem::Chunk(bytes)) => self.chunk = bytes,
                Some(PayloadItem::Eof) => {
                    self.eof = true;
                    return Ok(0);
                }
                None => {
                    if fill(self.stream, self.buffer)? == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed before the request body ended",
                        ));
                    }
                }
            }
        }
    }
}

impl fmt::Debug for BodyReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader")
            .field("buffered", &self.chunk.remaining())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

/// Reads once from `stream` and appends the bytes to `buffer`.
///
/// Returns the number of bytes read; `0` means the peer closed its side.
pub(crate) fn fill(stream: &mut (dyn Read + Send), buffer: &mut BytesMut) -> io::Result<usize> {
    let mut scratch = [0u8; READ_CHUNK_SIZE];
    let read = stream.read(&mut scratch)?;
    buffer.extend_from_slice(&scratch[..read]);
    Ok(read)
}

/// Discards whatever is left of the current request body so the next
/// keep-alive request starts at a frame boundary. Returns the number of
/// bytes thrown away.
pub(crate) fn drain(
    decoder: &mut PayloadDecoder,
    buffer: &mut BytesMut,
    stream: &mut (dyn Read + Send),
) -> Result<u64, ParseError> {
    let mut skipped = 0u64;
    loop {
        match decoder.decode(buffer)? {
            Some(PayloadItem::Chunk(bytes)) => skipped += bytes.len() as u64,
            Some(PayloadItem::Eof) => return Ok(skipped),
            None => {
                let read = fill(stream, buffer).map_err(ParseError::io)?;
                if read == 0 {
                    return Err(ParseError::invalid_body(
                        "connection closed before the request body ended",
                    ));
                }
            }
        }
    }
}

fn into_io(error: ParseError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}
