//! An HTTP/1.1 request-processing engine that runs the same protocol logic
//! under two scheduling disciplines.
//!
//! One [`Engine`] holds the route table, the interceptor chain and the error
//! handler; two drivers execute requests against it:
//!
//! - [`blocking::Connection`] serves a `Read + Write` stream on the calling
//!   thread, one request at a time (thread-per-connection).
//! - [`cooperative::Connection`] serves split `AsyncRead`/`AsyncWrite`
//!   halves as an explicit state machine on tokio, suspending at every I/O
//!   and handler boundary.
//!
//! Both drivers share the wire codecs, the connection-lifecycle rule
//! (keep-alive, close, upgrade), the error taxonomy and the server-header
//! stamping, so a client cannot tell from the wire which driver answered.
//!
//! # Features
//!
//! - Keep-alive connections with per-cycle state reset
//! - Streaming request bodies (`Content-Length` and chunked)
//! - Interceptors that may short-circuit routing
//! - Structured handler errors and caught panics, both rendered through a
//!   pluggable error handler
//! - Expect-continue
//! - Protocol upgrades with buffered-byte replay
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! use tandem_http::cooperative::Connection;
//! use tandem_http::endpoint::{async_endpoint_fn, AsyncEndpoint};
//! use tandem_http::protocol::{ReqBody, RespBody, Request, Response};
//! use tandem_http::{Engine, Router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     let router = Router::builder()
//!         .get("/hello/{name}", Box::new(async_endpoint_fn(hello)) as Box<dyn AsyncEndpoint>)
//!         .build()
//!         .expect("route table is valid");
//!     let engine = Arc::new(Engine::builder(router).build());
//!
//!     info!(port = 8080, "start listening");
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.expect("bind failed");
//!
//!     loop {
//!         let (stream, _remote_addr) = match listener.accept().await {
//!             Ok(accepted) => accepted,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let engine = Arc::clone(&engine);
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             if let Err(e) = Connection::new(reader, writer, engine).process().await {
//!                 if !e.is_disconnect() {
//!                     error!("connection failed: {e}");
//!                 }
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello(
//!     request: Request<ReqBody>,
//! ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
//!     let name = request.params().get("name").unwrap_or("world").to_owned();
//!     Ok(http::Response::builder()
//!         .status(StatusCode::OK)
//!         .body(RespBody::from(format!("hello, {name}!")))
//!         .unwrap())
//! }
//! ```
//!
//! The blocking driver mirrors the same setup over `std::net::TcpListener`,
//! one thread per accepted connection, with [`endpoint_fn`] handlers that
//! read their body through `std::io::Read`.
//!
//! [`endpoint_fn`]: endpoint::endpoint_fn

pub mod blocking;
pub mod codec;
pub mod cooperative;
pub mod endpoint;
pub mod engine;
pub mod error_handler;
pub mod interceptor;
pub mod protocol;
pub mod router;
pub mod upgrade;

mod utils;

pub use engine::{Engine, EngineBuilder};
pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use interceptor::{InterceptorChain, RequestInterceptor};
pub use protocol::error::{BoxError, HandlerError, HttpError};
pub use router::{Route, Router, RouterBuilder, RouterError};
