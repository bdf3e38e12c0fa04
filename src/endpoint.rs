//! The two endpoint traits, one per execution discipline.
//!
//! A blocking [`Endpoint`] reads its body through a borrowed [`BodyReader`]
//! on the caller's thread; an [`AsyncEndpoint`] awaits body frames through an
//! owned [`ReqBody`] handle. Both return the same [`Response`], so protocol
//! semantics cannot depend on which driver ran the handler.

use std::fmt;

use async_trait::async_trait;

use crate::protocol::body::{BodyReader, ReqBody};
use crate::protocol::error::BoxError;
use crate::protocol::request::Request;
use crate::protocol::response::Response;

/// A request handler for the blocking driver.
pub trait Endpoint: Send + Sync {
    fn handle(&self, request: Request<BodyReader<'_>>) -> Result<Response, BoxError>;
}

impl<T: Endpoint + ?Sized> Endpoint for Box<T> {
    fn handle(&self, request: Request<BodyReader<'_>>) -> Result<Response, BoxError> {
        (**self).handle(request)
    }
}

/// A request handler for the cooperative driver.
#[async_trait]
pub trait AsyncEndpoint: Send + Sync {
    async fn handle(&self, request: Request<ReqBody>) -> Result<Response, BoxError>;
}

#[async_trait]
impl<T: AsyncEndpoint + ?Sized> AsyncEndpoint for Box<T> {
    async fn handle(&self, request: Request<ReqBody>) -> Result<Response, BoxError> {
        (**self).handle(request).await
    }
}

/// Adapts a plain function or closure into an [`Endpoint`].
pub struct EndpointFn<F> {
    f: F,
}

/// See [`EndpointFn`].
pub fn endpoint_fn<F>(f: F) -> EndpointFn<F>
where
    F: for<'a> Fn(Request<BodyReader<'a>>) -> Result<Response, BoxError> + Send + Sync,
{
    EndpointFn { f }
}

impl<F> Endpoint for EndpointFn<F>
where
    F: for<'a> Fn(Request<BodyReader<'a>>) -> Result<Response, BoxError> + Send + Sync,
{
    fn handle(&self, request: Request<BodyReader<'_>>) -> Result<Response, BoxError> {
        (self.f)(request)
    }
}

impl<F> fmt::Debug for EndpointFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFn").finish_non_exhaustive()
    }
}

/// Adapts an async function or closure into an [`AsyncEndpoint`].
pub struct AsyncEndpointFn<F> {
    f: F,
}

/// See [`AsyncEndpointFn`].
pub fn async_endpoint_fn<F, Fut>(f: F) -> AsyncEndpointFn<F>
where
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send,
{
    AsyncEndpointFn { f }
}

#[async_trait]
impl<F, Fut> AsyncEndpoint for AsyncEndpointFn<F>
where
    F: Fn(Request<ReqBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send,
{
    async fn handle(&self, request: Request<ReqBody>) -> Result<Response, BoxError> {
        (self.f)(request).await
    }
}

impl<F> fmt::Debug for AsyncEndpointFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEndpointFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use crate::protocol::error::ParseError;
    use crate::protocol::message::{Message, PayloadSize};
    use crate::protocol::request::RequestHead;
    use crate::protocol::response::RespBody;

    use super::*;

    type PulledFrame = Result<Message<(RequestHead, PayloadSize)>, ParseError>;

    #[test]
    fn boxed_endpoints_delegate() {
        let endpoint = endpoint_fn(|request| {
            let response = http::Response::builder()
                .status(StatusCode::OK)
                .body(RespBody::from(request.uri().path().to_owned()))
                .unwrap();
            Ok(response)
        });
        let boxed: Box<dyn Endpoint> = Box::new(endpoint);

        // compile-time check: a box of the trait object is itself an endpoint
        fn assert_endpoint<E: Endpoint>(_: &E) {}
        assert_endpoint(&boxed);
    }

    #[tokio::test]
    async fn async_fn_adapter_runs() {
        let endpoint = async_endpoint_fn(|request: Request<ReqBody>| async move {
            let response = http::Response::builder()
                .status(StatusCode::OK)
                .body(RespBody::from(request.uri().path().to_owned()))
                .unwrap();
            Ok(response)
        });

        let mut stream = futures::stream::iter(Vec::<PulledFrame>::new());
        let (body, _pump) = ReqBody::channel(&mut stream);
        let request = Request::new(http::Request::new(()).into(), Default::default(), body);

        let response = endpoint.handle(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
