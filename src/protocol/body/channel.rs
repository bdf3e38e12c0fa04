use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use http_body::{Body, Frame};
use tracing::{debug, error};

use crate::protocol::error::ParseError;
use crate::protocol::message::{Message, PayloadItem, PayloadSize};
use crate::protocol::request::RequestHead;

/// Depth of the demand channel between body and pump.
const DEMAND_QUEUE_SIZE: usize = 16;

/// Asynchronous request body handed to cooperative endpoints.
///
/// The body never touches the connection itself. Each `poll_frame` sends a
/// demand down a channel to the [`BodyPump`], which owns the framed read
/// half of the connection and answers with the next payload frame. This
/// split lets the driver keep pulling frames off the socket while the
/// handler is suspended, and lets it drain whatever the handler left unread
/// once the handler returns.
pub struct ReqBody {
    demand: mpsc::Sender<oneshot::Sender<PayloadItem>>,
    receiving: Option<oneshot::Receiver<PayloadItem>>,
}

impl ReqBody {
    /// Creates a body/pump pair over the connection's payload frames.
    pub(crate) fn channel<S>(stream: &mut S) -> (ReqBody, BodyPump<'_, S>)
    where
        S: Stream + Unpin,
    {
        let (demand, queue) = mpsc::channel(DEMAND_QUEUE_SIZE);
        (ReqBody { demand, receiving: None }, BodyPump { stream, queue, eof: false })
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        loop {
            if let Some(receiver) = &mut self.receiving {
                let item = ready!(receiver.poll_unpin(cx));
                self.receiving.take();
                return match item {
                    Ok(PayloadItem::Chunk(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Ok(PayloadItem::Eof) => Poll::Ready(None),
                    Err(_canceled) => {
                        Poll::Ready(Some(Err(ParseError::invalid_body("request body canceled"))))
                    }
                };
            }

            match ready!(self.demand.poll_ready_unpin(cx)) {
                Ok(()) => {
                    let (reply, receiver) = oneshot::channel();
                    match self.demand.start_send(reply) {
                        Ok(()) => self.receiving = Some(receiver),
                        Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
                    }
                }
                Err(e) => return Poll::Ready(Some(Err(ParseError::invalid_body(e)))),
            }
        }
    }
}

impl fmt::Debug for ReqBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqBody").finish_non_exhaustive()
    }
}

/// Producer half of a [`ReqBody`]: pulls payload frames off the connection
/// and answers the body's demands.
pub struct BodyPump<'conn, S>
where
    S: Stream + Unpin,
{
    stream: &'conn mut S,
    queue: mpsc::Receiver<oneshot::Sender<PayloadItem>>,
    eof: bool,
}

impl<S> BodyPump<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHead, PayloadSize)>, ParseError>> + Unpin,
{
    /// Serves body demands until the payload ends or the handler stops
    /// asking. Returns once there is nothing left to do; a returned error
    /// means the connection framing is no longer trustworthy.
    pub(crate) async fn run(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            let Some(waiting) = self.queue.next().await else {
                // handler dropped its body without reading it all
                return Ok(());
            };

            let item = self.pull_frame().await?;
            if item.is_eof() {
                self.eof = true;
            }
            // a closed receiver only means the handler stopped reading
            let _ = waiting.send(item);
        }
        Ok(())
    }

    /// Discards the rest of the payload so the next keep-alive request
    /// starts at a frame boundary. Returns the number of bytes thrown away.
    pub(crate) async fn finish(&mut self) -> Result<u64, ParseError> {
        let mut skipped = 0u64;
        while !self.eof {
            match self.pull_frame().await? {
                PayloadItem::Chunk(bytes) => skipped += bytes.len() as u64,
                PayloadItem::Eof => self.eof = true,
            }
        }
        if skipped > 0 {
            debug!(skipped, "discarded unread request body");
        }
        Ok(skipped)
    }

    async fn pull_frame(&mut self) -> Result<PayloadItem, ParseError> {
        match self.stream.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => {
                error!("received a header frame inside the request body");
                Err(ParseError::invalid_body("received a header frame inside the request body"))
            }
            Some(Err(e)) => Err(e),
            None => {
                Err(ParseError::invalid_body("connection closed before the request body ended"))
            }
        }
    }
}

impl<S> fmt::Debug for BodyPump<'_, S>
where
    S: Stream + Unpin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyPump").field("eof", &self.eof).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use http_body_util::BodyExt;

    use super::*;

    type PulledFrame = Result<Message<(RequestHead, PayloadSize)>, ParseError>;

    fn payload_frames(chunks: &[&'static [u8]]) -> Vec<PulledFrame> {
        let mut frames: Vec<PulledFrame> = chunks
            .iter()
            .map(|chunk| Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(chunk)))))
            .collect();
        frames.push(Ok(Message::Payload(PayloadItem::Eof)));
        frames
    }

    #[tokio::test]
    async fn body_collects_pumped_chunks() {
        let mut stream = stream::iter(payload_frames(&[b"hello", b", world"]));
        let (body, mut pump) = ReqBody::channel(&mut stream);

        let (collected, pumped) = tokio::join!(body.collect(), pump.run());
        pumped.unwrap();

        assert_eq!(collected.unwrap().to_bytes(), Bytes::from_static(b"hello, world"));
    }

    #[tokio::test]
    async fn finish_drains_unread_frames() {
        let mut stream = stream::iter(payload_frames(&[b"unread", b"bytes"]));
        let (body, mut pump) = ReqBody::channel(&mut stream);

        drop(body);
        pump.run().await.unwrap();
        assert_eq!(pump.finish().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn header_frame_inside_body_is_an_error() {
        let head = RequestHead::from(http::Request::new(()));
        let mut stream =
            stream::iter(vec![PulledFrame::Ok(Message::Header((head, PayloadSize::Empty)))]);
        let (body, mut pump) = ReqBody::channel(&mut stream);

        drop(body);
        let error = pump.finish().await.unwrap_err();
        assert!(matches!(error, ParseError::InvalidBody { .. }));
    }

    #[tokio::test]
    async fn exhausted_stream_is_an_error() {
        let mut stream = stream::iter(Vec::<PulledFrame>::new());
        let (body, mut pump) = ReqBody::channel(&mut stream);

        drop(body);
        let error = pump.finish().await.unwrap_err();
        assert!(matches!(error, ParseError::InvalidBody { .. }));
    }
}
