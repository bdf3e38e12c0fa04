//! Connection handoff after a protocol switch.
//!
//! An endpoint that answers with `101 Switching Protocols` (or a
//! `Connection: upgrade` token) attaches an [`Upgrade`] or [`AsyncUpgrade`]
//! capability to its response extensions. Once the response is on the wire
//! the driver stops speaking HTTP and hands the raw stream to the named
//! handler, together with any bytes that were already buffered past the
//! request. Those bytes are replayed before the socket is read again, so
//! the new protocol never loses its first frames.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Free-form parameters the endpoint passes along to the upgrade handler,
/// e.g. a negotiated subprotocol.
pub type UpgradeParams = HashMap<String, String>;

/// Takes over an upgraded connection on the blocking driver. The handler
/// owns the stream from the moment it is called.
pub trait UpgradeHandler: Send + Sync {
    fn handle_connection(&self, stream: Upgraded, params: &UpgradeParams);
}

/// Takes over an upgraded connection on the cooperative driver.
#[async_trait]
pub trait AsyncUpgradeHandler: Send + Sync {
    async fn handle_connection(&self, stream: UpgradedIo, params: &UpgradeParams);
}

/// Response extension naming the blocking handler that takes the
/// connection over.
#[derive(Clone)]
pub struct Upgrade {
    handler: Arc<dyn UpgradeHandler>,
    params: UpgradeParams,
}

impl Upgrade {
    pub fn new(handler: Arc<dyn UpgradeHandler>) -> Self {
        Self { handler, params: UpgradeParams::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub(crate) fn into_parts(self) -> (Arc<dyn UpgradeHandler>, UpgradeParams) {
        (self.handler, self.params)
    }
}

impl std::fmt::Debug for Upgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrade").field("params", &self.params).finish_non_exhaustive()
    }
}

/// Response extension naming the cooperative handler that takes the
/// connection over.
#[derive(Clone)]
pub struct AsyncUpgrade {
    handler: Arc<dyn AsyncUpgradeHandler>,
    params: UpgradeParams,
}

impl AsyncUpgrade {
    pub fn new(handler: Arc<dyn AsyncUpgradeHandler>) -> Self {
        Self { handler, params: UpgradeParams::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub(crate) fn into_parts(self) -> (Arc<dyn AsyncUpgradeHandler>, UpgradeParams) {
        (self.handler, self.params)
    }
}

impl std::fmt::Debug for AsyncUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncUpgrade").field("params", &self.params).finish_non_exhaustive()
    }
}

/// A blocking byte stream the server can hand over whole.
pub trait RawStream: Read + Write + Send {}

impl<S: Read + Write + Send> RawStream for S {}

/// An asynchronous byte stream the server can hand over whole.
pub trait AsyncRawStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> AsyncRawStream for S {}

/// An upgraded blocking connection: the raw stream plus whatever bytes the
/// server had already buffered past the upgrade request.
pub struct Upgraded {
    stream: Box<dyn RawStream>,
    read_buf: Bytes,
}

impl Upgraded {
    pub(crate) fn new(stream: Box<dyn RawStream>, read_buf: Bytes) -> Self {
        Self { stream, read_buf }
    }
}

impl Read for Upgraded {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.read_buf.is_empty() {
            let len = usize::min(self.read_buf.len(), buf.len());
            buf[..len].copy_from_slice(&self.read_buf[..len]);
            self.read_buf.advance(len);
            return Ok(len);
        }
        self.stream.read(buf)
    }
}

impl Write for Upgraded {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgraded").field("buffered", &self.read_buf.len()).finish_non_exhaustive()
    }
}

/// An upgraded cooperative connection, same replay rule as [`Upgraded`].
pub struct UpgradedIo {
    stream: Box<dyn AsyncRawStream>,
    read_buf: Bytes,
}

impl UpgradedIo {
    pub(crate) fn new(stream: Box<dyn AsyncRawStream>, read_buf: Bytes) -> Self {
        Self { stream, read_buf }
    }
}

impl AsyncRead for UpgradedIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.read_buf.is_empty() {
            let len = usize::min(self.read_buf.len(), buf.remaining());
            buf.put_slice(&self.read_buf[..len]);
            self.read_buf.advance(len);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for UpgradedIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for UpgradedIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradedIo").field("buffered", &self.read_buf.len()).finish_non_exhaustive()
    }
}
