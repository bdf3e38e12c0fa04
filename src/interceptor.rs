//! Request interceptors, consulted in order before the endpoint runs.
//!
//! An interceptor sees the request head and path parameters but never the
//! body. Returning `Ok(Some(response))` short-circuits the exchange: the
//! endpoint is skipped and the response goes out as-is. Returning an error
//! aborts the exchange through the engine's failure classification.

use std::fmt;

use crate::protocol::error::BoxError;
use crate::protocol::request::RequestContext;
use crate::protocol::response::Response;

pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, context: RequestContext<'_>) -> Result<Option<Response>, BoxError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestContext<'_>) -> Result<Option<Response>, BoxError> + Send + Sync,
{
    fn intercept(&self, context: RequestContext<'_>) -> Result<Option<Response>, BoxError> {
        self(context)
    }
}

/// An ordered chain of interceptors, walked front to back.
#[derive(Default)]
pub struct InterceptorChain {
    inner: Vec<Box<dyn RequestInterceptor>>,
}

impl InterceptorChain {
    pub fn builder() -> InterceptorChainBuilder {
        InterceptorChainBuilder::new()
    }

    /// Runs each interceptor in order, stopping at the first that produces
    /// a response or fails.
    pub(crate) fn intercept(&self, context: RequestContext<'_>) -> Result<Option<Response>, BoxError> {
        for interceptor in self.inner.iter() {
            if let Some(response) = interceptor.intercept(context)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain").field("len", &self.inner.len()).finish()
    }
}

pub struct InterceptorChainBuilder {
    inner: Vec<Box<dyn RequestInterceptor>>,
}

impl InterceptorChainBuilder {
    fn new() -> Self {
        Self { inner: vec![] }
    }

    pub fn add_last<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.inner.push(Box::new(interceptor));
        self
    }

    pub fn add_first<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.inner.insert(0, Box::new(interceptor));
        self
    }

    pub fn build(self) -> InterceptorChain {
        InterceptorChain { inner: self.inner }
    }
}

impl fmt::Debug for InterceptorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChainBuilder").field("len", &self.inner.len()).finish()
    }
}
