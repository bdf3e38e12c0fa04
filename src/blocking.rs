//! Thread-per-connection driver.
//!
//! One [`Connection`] owns one socket and runs the whole request cycle on
//! the calling thread with plain `std::io`. Every wait (header bytes, body
//! bytes, response write) blocks the thread; the protocol decisions are the
//! shared [`Engine`] helpers, so a request answered here is answered exactly
//! as the cooperative driver would.

use std::fmt;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, error, warn};

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::codec::ResponseEncoder;
use crate::endpoint::Endpoint;
use crate::engine::Engine;
use crate::protocol::body::reader::{self, BodyReader};
use crate::protocol::connection_state::{request_keeps_alive, ConnectionState};
use crate::protocol::error::{HttpError, ParseError, SendError};
use crate::protocol::message::PayloadSize;
use crate::protocol::request::{Request, RequestContext, RequestHead};
use crate::protocol::response::{Response, CONTINUE_LINE};
use crate::upgrade::{Upgrade, Upgraded};
use crate::utils::panic_message;

/// Initial capacity of the per-connection read and write buffers.
const INIT_BUF_SIZE: usize = 8 * 1024;

/// A blocking connection: one socket, one thread, requests served in
/// sequence until the peer leaves or the protocol says stop.
pub struct Connection<S, E> {
    stream: S,
    engine: Arc<Engine<E>>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    encoder: ResponseEncoder,
}

enum HeadOutcome {
    Parsed(RequestHead, PayloadSize),
    /// EOF or a read failure before a complete header block.
    Exhausted,
    Malformed(ParseError),
}

impl<S, E> Connection<S, E>
where
    S: Read + Write + Send + 'static,
    E: Endpoint,
{
    pub fn new(stream: S, engine: Arc<Engine<E>>) -> Self {
        Self::with_capacity(stream, engine, INIT_BUF_SIZE)
    }

    pub fn with_capacity(stream: S, engine: Arc<Engine<E>>, capacity: usize) -> Self {
        Self {
            stream,
            engine,
            read_buf: BytesMut::with_capacity(capacity),
            write_buf: BytesMut::with_capacity(capacity),
            encoder: ResponseEncoder::new(),
        }
    }

    /// Serves requests until the connection ends.
    ///
    /// Returns `Ok(())` for every orderly ending: peer gone before a
    /// request, explicit close, or upgrade handoff. An error means the
    /// transport failed mid-exchange; disconnect kinds are not logged here
    /// and the caller should drop the connection either way.
    pub fn process(mut self) -> Result<(), HttpError> {
        loop {
            let Some((mut response, state)) = self.process_one_request()? else {
                debug!("connection exhausted before a request formed");
                return Ok(());
            };

            // the capability must come off before the response hits the wire
            let upgrade = response.extensions_mut().remove::<Upgrade>();

            if let Err(e) = self.send(response) {
                if !e.is_disconnect() {
                    error!("failed to send response: {e}");
                }
                return Err(e.into());
            }

            match state {
                ConnectionState::KeepAlive => continue,
                ConnectionState::Close => return Ok(()),
                ConnectionState::Upgrade => return self.hand_off(upgrade),
            }
        }
    }

    /// One full request cycle: read, route, intercept, handle, classify.
    ///
    /// `Ok(None)` is the silent-drop outcome: nothing was parsed and
    /// nothing must be sent.
    fn process_one_request(&mut self) -> Result<Option<(Response, ConnectionState)>, HttpError> {
        let engine = Arc::clone(&self.engine);

        let (head, payload_size) = match self.read_head() {
            HeadOutcome::Parsed(head, payload_size) => (head, payload_size),
            HeadOutcome::Exhausted => return Ok(None),
            HeadOutcome::Malformed(error) => {
                let mut response = engine.parse_error_response(&error);
                let state = engine.finalize_forced_close(&mut response);
                return Ok(Some((response, state)));
            }
        };

        let keeps_alive = request_keeps_alive(&head);

        let Some(route) = engine.router().resolve(head.method(), head.uri().path()) else {
            let mut response = engine.no_route_response();
            let state = engine.finalize_forced_close(&mut response);
            return Ok(Some((response, state)));
        };
        let (endpoint, params) = route.into_parts();

        if head.expects_continue() {
            self.write_continue()?;
        }

        let mut payload_decoder = PayloadDecoder::from(payload_size);

        let intercepted = catch_unwind(AssertUnwindSafe(|| {
            engine.interceptors().intercept(RequestContext::new(&head, &params))
        }));

        let mut response = match intercepted {
            Ok(Ok(Some(response))) => response,
            Ok(Ok(None)) => {
                let handled = catch_unwind(AssertUnwindSafe(|| {
                    let body =
                        BodyReader::new(&mut payload_decoder, &mut self.read_buf, &mut self.stream);
                    endpoint.handle(Request::new(head, params, body))
                }));
                match handled {
                    Ok(Ok(response)) => response,
                    Ok(Err(error)) => engine.failure_response(error),
                    Err(payload) => {
                        error!("endpoint panicked: {}", panic_message(payload.as_ref()));
                        engine.panic_response()
                    }
                }
            }
            Ok(Err(error)) => engine.failure_response(error),
            Err(payload) => {
                error!("interceptor panicked: {}", panic_message(payload.as_ref()));
                engine.panic_response()
            }
        };

        let drained = reader::drain(&mut payload_decoder, &mut self.read_buf, &mut self.stream);
        let mut state = engine.finalize(&mut response, keeps_alive);
        if drained.is_err() && state == ConnectionState::KeepAlive {
            // cannot find the next frame boundary, so the response is the last
            state = ConnectionState::Close;
        }

        Ok(Some((response, state)))
    }

    fn read_head(&mut self) -> HeadOutcome {
        let mut decoder = HeaderDecoder;
        loop {
            match decoder.decode(&mut self.read_buf) {
                Ok(Some((head, payload_size))) => return HeadOutcome::Parsed(head, payload_size),
                Ok(None) => match reader::fill(&mut self.stream, &mut self.read_buf) {
                    Ok(0) | Err(_) => return HeadOutcome::Exhausted,
                    Ok(_) => continue,
                },
                Err(error) => return HeadOutcome::Malformed(error),
            }
        }
    }

    fn write_continue(&mut self) -> Result<(), SendError> {
        self.stream.write_all(CONTINUE_LINE).map_err(SendError::io)?;
        self.stream.flush().map_err(SendError::io)
    }

    fn send(&mut self, response: Response) -> Result<(), SendError> {
        self.write_buf.clear();
        self.encoder.encode_response(response, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).map_err(SendError::io)?;
        self.stream.flush().map_err(SendError::io)
    }

    fn hand_off(self, upgrade: Option<Upgrade>) -> Result<(), HttpError> {
        let Some(upgrade) = upgrade else {
            warn!("upgrade signaled but no handler attached, closing the connection");
            return Ok(());
        };

        let (handler, params) = upgrade.into_parts();
        let leftover = self.read_buf.freeze();
        debug!(buffered = leftover.len(), "handing the connection to an upgrade handler");
        handler.handle_connection(Upgraded::new(Box::new(self.stream), leftover), &params);
        Ok(())
    }
}

impl<S, E> fmt::Debug for Connection<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("buffered", &self.read_buf.len()).finish_non_exhaustive()
    }
}
