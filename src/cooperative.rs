//! Cooperative driver: an explicit state machine on the tokio scheduler.
//!
//! The same request cycle as the blocking driver, but every wait is a
//! suspension point: header bytes arrive through a `FramedRead`, the handler
//! and the body pump run concurrently under a `select!`, and response writes
//! are awaited. The machine is restartable at `ParseHeaders` for every
//! keep-alive iteration and carries no request state across iterations
//! beyond the connection itself and its reusable buffers.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::BytesMut;
use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::endpoint::AsyncEndpoint;
use crate::engine::Engine;
use crate::protocol::body::ReqBody;
use crate::protocol::connection_state::{request_keeps_alive, ConnectionState};
use crate::protocol::error::{HttpError, ParseError, SendError};
use crate::protocol::message::{Message, PayloadItem};
use crate::protocol::request::{PathParams, Request, RequestContext, RequestHead};
use crate::protocol::response::{Response, CONTINUE_LINE};
use crate::upgrade::{AsyncUpgrade, UpgradedIo};
use crate::utils::panic_message;

/// Initial capacity of the read and write buffers.
const INIT_BUF_SIZE: usize = 8 * 1024;

/// A cooperative connection over split read/write halves.
pub struct Connection<R, W, E> {
    framed_read: FramedRead<R, RequestDecoder>,
    writer: ResponseWriter<W>,
    engine: Arc<Engine<E>>,
}

/// The states of one request cycle. `ParseHeaders` is the restart point;
/// `Finish` releases the connection.
enum State<'engine, E> {
    ParseHeaders,
    OnHeadersParsed(RequestHead),
    RequestFormed {
        head: RequestHead,
        endpoint: &'engine E,
        params: PathParams,
        keeps_alive: bool,
    },
    OnResponse {
        response: Response,
        keeps_alive: bool,
    },
    SendResponse {
        response: Response,
        state: ConnectionState,
        upgrade: Option<AsyncUpgrade>,
    },
    RequestDone {
        state: ConnectionState,
        upgrade: Option<AsyncUpgrade>,
    },
    Finish,
}

impl<R, W, E> Connection<R, W, E>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    E: AsyncEndpoint,
{
    pub fn new(reader: R, writer: W, engine: Arc<Engine<E>>) -> Self {
        Self::with_capacity(reader, writer, engine, INIT_BUF_SIZE)
    }

    pub fn with_capacity(reader: R, writer: W, engine: Arc<Engine<E>>, capacity: usize) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), capacity),
            writer: ResponseWriter::with_capacity(writer, capacity),
            engine,
        }
    }

    /// Serves requests until the connection ends, with the same outcomes as
    /// the blocking driver's `process`.
    pub async fn process(mut self) -> Result<(), HttpError> {
        let engine = Arc::clone(&self.engine);
        let mut state = State::ParseHeaders;
        // whether a response has hit the send path in the current cycle
        let mut committed = false;

        loop {
            let step = match state {
                State::ParseHeaders => {
                    committed = false;
                    self.parse_headers(&engine).await
                }
                State::OnHeadersParsed(head) => self.on_headers_parsed(&engine, head).await,
                State::RequestFormed { head, endpoint, params, keeps_alive } => {
                    self.request_formed(&engine, head, endpoint, params, keeps_alive).await
                }
                State::OnResponse { mut response, keeps_alive } => {
                    let upgrade = response.extensions_mut().remove::<AsyncUpgrade>();
                    let state = engine.finalize(&mut response, keeps_alive);
                    Ok(State::SendResponse { response, state, upgrade })
                }
                State::SendResponse { response, state, upgrade } => {
                    committed = true;
                    match self.writer.send(response).await {
                        Ok(()) => Ok(State::RequestDone { state, upgrade }),
                        Err(e) => Err(e.into()),
                    }
                }
                State::RequestDone { state, upgrade } => match state {
                    ConnectionState::KeepAlive => Ok(State::ParseHeaders),
                    ConnectionState::Close => Ok(State::Finish),
                    ConnectionState::Upgrade => {
                        self.hand_off(upgrade).await;
                        return Ok(());
                    }
                },
                State::Finish => return Ok(()),
            };

            state = match step {
                Ok(next) => next,
                Err(failure) => handle_error(&engine, failure, committed)?,
            };
        }
    }

    async fn parse_headers<'e>(
        &mut self,
        engine: &'e Engine<E>,
    ) -> Result<State<'e, E>, HttpError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Header((head, _payload_size)))) => Ok(State::OnHeadersParsed(head)),
            Some(Ok(Message::Payload(_))) => {
                Err(ParseError::invalid_body("payload frame while expecting a request head").into())
            }
            Some(Err(e)) if e.is_io() => {
                // read failure or truncated head, nothing to answer
                debug!("connection exhausted before a request formed: {e}");
                Ok(State::Finish)
            }
            Some(Err(e)) => {
                let mut response = engine.parse_error_response(&e);
                let state = engine.finalize_forced_close(&mut response);
                Ok(State::SendResponse { response, state, upgrade: None })
            }
            None => Ok(State::Finish),
        }
    }

    async fn on_headers_parsed<'e>(
        &mut self,
        engine: &'e Engine<E>,
        head: RequestHead,
    ) -> Result<State<'e, E>, HttpError> {
        let keeps_alive = request_keeps_alive(&head);

        let Some(route) = engine.router().resolve(head.method(), head.uri().path()) else {
            let mut response = engine.no_route_response();
            let state = engine.finalize_forced_close(&mut response);
            return Ok(State::SendResponse { response, state, upgrade: None });
        };
        let (endpoint, params) = route.into_parts();

        if head.expects_continue() {
            self.writer.write_continue().await?;
        }

        let intercepted = catch_unwind(AssertUnwindSafe(|| {
            engine.interceptors().intercept(RequestContext::new(&head, &params))
        }));

        let response = match intercepted {
            Ok(Ok(None)) => {
                return Ok(State::RequestFormed { head, endpoint, params, keeps_alive });
            }
            Ok(Ok(Some(response))) => response,
            Ok(Err(error)) => engine.failure_response(error),
            Err(payload) => {
                error!("interceptor panicked: {}", panic_message(payload.as_ref()));
                engine.panic_response()
            }
        };

        // the endpoint will not run, so the request payload is still unread
        let drained = self.drain_payload().await;
        Ok(State::OnResponse { response, keeps_alive: keeps_alive && drained.is_ok() })
    }

    async fn request_formed<'e>(
        &mut self,
        engine: &'e Engine<E>,
        head: RequestHead,
        endpoint: &'e E,
        params: PathParams,
        keeps_alive: bool,
    ) -> Result<State<'e, E>, HttpError> {
        let (body, mut pump) = ReqBody::channel(&mut self.framed_read);
        let request = Request::new(head, params, body);

        // run the handler and the body pump concurrently: the handler may be
        // waiting for body bytes that only the pump can deliver
        let handled = {
            tokio::pin! {
                let handler = AssertUnwindSafe(endpoint.handle(request)).catch_unwind();
            }
            let mut pump_done = false;

            loop {
                select! {
                    biased;
                    handled = &mut handler => break handled,
                    pumped = pump.run(), if !pump_done => {
                        pumped?;
                        pump_done = true;
                    }
                }
            }
        };

        let response = match handled {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => engine.failure_response(error),
            Err(payload) => {
                error!("endpoint panicked: {}", panic_message(payload.as_ref()));
                engine.panic_response()
            }
        };

        let drained = pump.finish().await;
        Ok(State::OnResponse { response, keeps_alive: keeps_alive && drained.is_ok() })
    }

    /// Discards the rest of the current request payload so the decoder
    /// returns to header phase.
    async fn drain_payload(&mut self) -> Result<u64, ParseError> {
        let mut skipped = 0u64;
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    skipped += bytes.len() as u64;
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => {
                    if skipped > 0 {
                        debug!(skipped, "discarded unread request body");
                    }
                    return Ok(skipped);
                }
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body(
                        "received a header frame inside the request body",
                    ));
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(ParseError::invalid_body(
                        "connection closed before the request body ended",
                    ));
                }
            }
        }
    }

    async fn hand_off(self, upgrade: Option<AsyncUpgrade>) {
        let Some(upgrade) = upgrade else {
            warn!("upgrade signaled but no handler attached, closing the connection");
            return;
        };

        let (handler, params) = upgrade.into_parts();
        let mut framed_read = self.framed_read;
        let leftover = framed_read.read_buffer_mut().split().freeze();
        debug!(buffered = leftover.len(), "handing the connection to an upgrade handler");

        let io = tokio::io::join(framed_read.into_inner(), self.writer.into_inner());
        handler.handle_connection(UpgradedIo::new(Box::new(io), leftover), &params).await;
    }
}

impl<R, W, E> fmt::Debug for Connection<R, W, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("buffered", &self.framed_read.read_buffer().len())
            .finish_non_exhaustive()
    }
}

/// The error transition shared by every state.
///
/// Disconnects pass through silently; a failure after the cycle's response
/// was committed is logged and terminates the connection; a failure before
/// commit recovers into a final 500 response.
fn handle_error<'e, E>(
    engine: &'e Engine<E>,
    error: HttpError,
    committed: bool,
) -> Result<State<'e, E>, HttpError> {
    if error.is_disconnect() {
        return Err(error);
    }
    if committed {
        error!("connection failed after the response was committed: {error}");
        return Err(error);
    }

    let mut response = engine.recovery_response(&error.to_string());
    let state = engine.finalize_forced_close(&mut response);
    Ok(State::SendResponse { response, state, upgrade: None })
}

/// Owns the write half: responses are serialized into a reusable buffer and
/// written out in one go.
struct ResponseWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    fn with_capacity(writer: W, capacity: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(capacity), encoder: ResponseEncoder::new() }
    }

    async fn send(&mut self, response: Response) -> Result<(), SendError> {
        self.buffer.clear();
        self.encoder.encode_response(response, &mut self.buffer)?;
        self.writer.write_all(&self.buffer).await.map_err(SendError::io)?;
        self.writer.flush().await.map_err(SendError::io)
    }

    async fn write_continue(&mut self) -> Result<(), SendError> {
        self.writer.write_all(CONTINUE_LINE).await.map_err(SendError::io)?;
        self.writer.flush().await.map_err(SendError::io)
    }

    fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use http::{HeaderMap, StatusCode};
    use http_body_util::BodyExt;
    use indoc::indoc;
    use tokio::io::AsyncReadExt;

    use crate::endpoint::async_endpoint_fn;
    use crate::interceptor::InterceptorChain;
    use crate::protocol::error::{BoxError, HandlerError};
    use crate::protocol::response::RespBody;
    use crate::router::Router;
    use crate::upgrade::{AsyncUpgradeHandler, UpgradeParams};

    use super::*;

    type DynEndpoint = Box<dyn AsyncEndpoint>;

    fn ok_endpoint(body: &'static str) -> DynEndpoint {
        Box::new(async_endpoint_fn(move |_: Request<ReqBody>| async move {
            Ok(http::Response::builder().status(StatusCode::OK).body(RespBody::from(body)).unwrap())
        }))
    }

    fn echo_endpoint() -> DynEndpoint {
        Box::new(async_endpoint_fn(|request: Request<ReqBody>| async move {
            let collected = request.into_body().collect().await?;
            Ok(http::Response::builder()
                .status(StatusCode::OK)
                .body(RespBody::from(collected.to_bytes()))
                .unwrap())
        }))
    }

    fn default_engine() -> Engine<DynEndpoint> {
        let router = Router::builder().get("/", ok_endpoint("home")).build().unwrap();
        Engine::builder(router).build()
    }

    /// Writes `input`, shuts the client's write half, and collects the
    /// server's whole output.
    async fn serve(engine: Engine<DynEndpoint>, input: &str) -> (Result<(), HttpError>, String) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let connection = Connection::new(server_read, server_write, Arc::new(engine));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let input = input.as_bytes().to_vec();
        let client_task = tokio::spawn(async move {
            client_write.write_all(&input).await.unwrap();
            client_write.shutdown().await.unwrap();
            let mut output = Vec::new();
            client_read.read_to_end(&mut output).await.unwrap();
            String::from_utf8(output).unwrap()
        });

        let result = connection.process().await;
        let written = client_task.await.unwrap();
        (result, written)
    }

    #[tokio::test]
    async fn no_route_is_404_and_closes() {
        let input = indoc! {"
            GET /missing HTTP/1.1\r
            Host: example.com\r
            \r
            GET / HTTP/1.1\r
            Host: example.com\r
            \r
        "};
        let (result, written) = serve(default_engine(), input).await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(written.matches("HTTP/1.1").count(), 1);
    }

    #[tokio::test]
    async fn malformed_head_is_reported_and_closes() {
        let (result, written) = serve(default_engine(), "GET / HTTP/4.7\r\n\r\n").await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn exhausted_stream_is_a_silent_drop() {
        let (result, written) = serve(default_engine(), "GET / HT").await;

        result.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn keep_alive_serves_pipelined_requests() {
        let input = indoc! {"
            GET / HTTP/1.1\r
            Host: example.com\r
            \r
            GET / HTTP/1.1\r
            Host: example.com\r
            Connection: close\r
            \r
        "};
        let (result, written) = serve(default_engine(), input).await;

        result.unwrap();
        assert_eq!(written.matches("HTTP/1.1 200 OK\r\n").count(), 2);
    }

    #[tokio::test]
    async fn server_header_is_stamped_once() {
        let router = Router::builder()
            .get("/", ok_endpoint("home"))
            .get(
                "/custom",
                Box::new(async_endpoint_fn(|_: Request<ReqBody>| async {
                    Ok(http::Response::builder()
                        .status(StatusCode::OK)
                        .header(http::header::SERVER, "custom/1")
                        .body(RespBody::empty())
                        .unwrap())
                })) as DynEndpoint,
            )
            .build()
            .unwrap();
        let engine = Engine::builder(router).build();

        let input = indoc! {"
            GET / HTTP/1.1\r
            \r
            GET /custom HTTP/1.1\r
            \r
        "};
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert_eq!(written.matches("server: tandem-http/").count(), 1);
        assert_eq!(written.matches("server: custom/1").count(), 1);
    }

    #[tokio::test]
    async fn interceptor_short_circuit_skips_the_endpoint() {
        let router = Router::builder()
            .get(
                "/",
                Box::new(async_endpoint_fn(|_: Request<ReqBody>| async {
                    panic!("endpoint must not run")
                })) as DynEndpoint,
            )
            .build()
            .unwrap();
        let interceptors = InterceptorChain::builder()
            .add_last(|_: RequestContext<'_>| -> Result<Option<Response>, BoxError> {
                Ok(Some(
                    http::Response::builder().status(StatusCode::FORBIDDEN).body(RespBody::empty()).unwrap(),
                ))
            })
            .build();
        let engine = Engine::builder(router).interceptors(interceptors).build();

        let (result, written) = serve(engine, "GET / HTTP/1.1\r\n\r\n").await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(written.contains("server: tandem-http/"));
    }

    #[tokio::test]
    async fn handler_error_passes_status_and_headers() {
        let router = Router::builder()
            .get(
                "/",
                Box::new(async_endpoint_fn(|_: Request<ReqBody>| async {
                    let mut headers = HeaderMap::new();
                    headers.insert("x-reason", "policy".parse().unwrap());
                    Err(HandlerError::new(StatusCode::FORBIDDEN, "forbidden")
                        .with_headers(headers)
                        .into())
                })) as DynEndpoint,
            )
            .build()
            .unwrap();
        let engine = Engine::builder(router).build();

        let input = indoc! {"
            GET / HTTP/1.1\r
            \r
            GET / HTTP/1.1\r
            Connection: close\r
            \r
        "};
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert_eq!(written.matches("HTTP/1.1 403 Forbidden\r\n").count(), 2);
        assert!(written.contains("x-reason: policy"));
        assert!(written.contains("forbidden"));
    }

    #[tokio::test]
    async fn panicking_endpoint_becomes_a_500() {
        let router = Router::builder()
            .get(
                "/",
                Box::new(async_endpoint_fn(|_: Request<ReqBody>| async {
                    panic!("boom")
                })) as DynEndpoint,
            )
            .build()
            .unwrap();
        let engine = Engine::builder(router).build();

        let (result, written) = serve(engine, "GET / HTTP/1.1\r\n\r\n").await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(written.contains("unknown internal error"));
    }

    #[tokio::test]
    async fn request_body_reaches_the_endpoint() {
        let router = Router::builder().post("/echo", echo_endpoint()).build().unwrap();
        let engine = Engine::builder(router).build();

        let input = indoc! {"
            POST /echo HTTP/1.1\r
            Content-Length: 12\r
            \r
            hello, world"};
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert!(written.ends_with("\r\n\r\nhello, world"));
    }

    #[tokio::test]
    async fn chunked_body_reaches_the_endpoint() {
        let router = Router::builder().post("/echo", echo_endpoint()).build().unwrap();
        let engine = Engine::builder(router).build();

        let input = concat!(
            "POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
            "5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n",
        );
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert!(written.ends_with("\r\n\r\nhello, world"));
    }

    #[tokio::test]
    async fn unread_body_is_drained_before_the_next_request() {
        let router = Router::builder()
            .post("/ignore", ok_endpoint("ignored"))
            .get("/", ok_endpoint("home"))
            .build()
            .unwrap();
        let engine = Engine::builder(router).build();

        let input = concat!(
            "POST /ignore HTTP/1.1\r\nContent-Length: 7\r\n\r\nskipped",
            "GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
        );
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert_eq!(written.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(written.contains("home"));
    }

    #[tokio::test]
    async fn expect_continue_gets_an_interim_response() {
        let router = Router::builder().post("/echo", echo_endpoint()).build().unwrap();
        let engine = Engine::builder(router).build();

        let input = indoc! {"
            POST /echo HTTP/1.1\r
            Content-Length: 2\r
            Expect: 100-continue\r
            \r
            hi"};
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn expect_continue_precedes_an_interceptor_response() {
        let router = Router::builder().post("/echo", echo_endpoint()).build().unwrap();
        let interceptors = InterceptorChain::builder()
            .add_last(|_: RequestContext<'_>| -> Result<Option<Response>, BoxError> {
                Ok(Some(
                    http::Response::builder()
                        .status(StatusCode::FORBIDDEN)
                        .body(RespBody::empty())
                        .unwrap(),
                ))
            })
            .build();
        let engine = Engine::builder(router).interceptors(interceptors).build();

        // the client may be withholding the body until the interim response
        let input = indoc! {"
            POST /echo HTTP/1.1\r
            Content-Length: 2\r
            Expect: 100-continue\r
            \r
            hi"};
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 403 Forbidden\r\n"));
    }

    #[tokio::test]
    async fn upgrade_hands_the_stream_over_once() {
        struct Recorder {
            calls: AtomicUsize,
            seen: Mutex<String>,
        }

        #[async_trait::async_trait]
        impl AsyncUpgradeHandler for Recorder {
            async fn handle_connection(&self, mut stream: UpgradedIo, params: &UpgradeParams) {
                self.calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(params.get("protocol").map(String::as_str), Some("echo"));
                let mut first = String::new();
                stream.read_to_string(&mut first).await.unwrap();
                *self.seen.lock().unwrap() = first;
            }
        }

        let recorder =
            Arc::new(Recorder { calls: AtomicUsize::new(0), seen: Mutex::new(String::new()) });
        let handler = Arc::clone(&recorder);

        let router = Router::builder()
            .get(
                "/upgrade",
                Box::new(async_endpoint_fn(move |_: Request<ReqBody>| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let mut response = http::Response::builder()
                            .status(StatusCode::SWITCHING_PROTOCOLS)
                            .body(RespBody::empty())
                            .unwrap();
                        response.extensions_mut().insert(
                            AsyncUpgrade::new(handler as Arc<dyn AsyncUpgradeHandler>)
                                .with_param("protocol", "echo"),
                        );
                        Ok(response)
                    }
                })) as DynEndpoint,
            )
            .build()
            .unwrap();
        let engine = Engine::builder(router).build();

        let input = "GET /upgrade HTTP/1.1\r\n\r\nfirst-frame";
        let (result, written) = serve(engine, input).await;

        result.unwrap();
        assert!(written.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recorder.seen.lock().unwrap(), "first-frame");
    }

    #[tokio::test]
    async fn http10_without_keep_alive_closes() {
        let input = "GET / HTTP/1.0\r\n\r\nGET / HTTP/1.0\r\n\r\n";
        let (result, written) = serve(default_engine(), input).await;

        result.unwrap();
        assert_eq!(written.matches("HTTP/1.1 200 OK\r\n").count(), 1);
    }
}
