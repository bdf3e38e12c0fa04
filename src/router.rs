//! Method-and-path routing built on a radix tree.
//!
//! Paths use `matchit` syntax: `/orders/{id}` captures `id`, `/files/{*rest}`
//! captures the remaining path. Each path holds one endpoint per method; a
//! path that matches with no endpoint for the request method is treated the
//! same as no match at all.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use thiserror::Error;

use crate::protocol::request::PathParams;

/// Immutable route table mapping method plus path to an endpoint `E`.
pub struct Router<E> {
    inner: matchit::Router<Vec<(Method, E)>>,
}

impl<E> Router<E> {
    pub fn builder() -> RouterBuilder<E> {
        RouterBuilder::new()
    }

    /// Looks up the endpoint for a request, capturing path parameters.
    ///
    /// Returns `None` when no path matches or when the path matches but no
    /// endpoint was registered for `method`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Route<'_, E>> {
        let matched = self.inner.at(path).ok()?;
        let endpoint = matched
            .value
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, endpoint)| endpoint)?;

        Some(Route { endpoint, params: matched.params.iter().collect() })
    }
}

impl<E> fmt::Debug for Router<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

/// A successful route lookup: the endpoint plus the captured parameters.
pub struct Route<'router, E> {
    endpoint: &'router E,
    params: PathParams,
}

impl<'router, E> Route<'router, E> {
    pub fn endpoint(&self) -> &'router E {
        self.endpoint
    }

    pub fn into_parts(self) -> (&'router E, PathParams) {
        (self.endpoint, self.params)
    }
}

impl<E> fmt::Debug for Route<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").field("params", &self.params).finish_non_exhaustive()
    }
}

/// Accumulates routes before freezing them into a [`Router`].
///
/// Registering the same method twice on one path keeps the later endpoint.
pub struct RouterBuilder<E> {
    routes: HashMap<String, Vec<(Method, E)>>,
}

impl<E> RouterBuilder<E> {
    fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    pub fn route(mut self, method: Method, path: impl Into<String>, endpoint: E) -> Self {
        let endpoints = self.routes.entry(path.into()).or_default();
        endpoints.retain(|(m, _)| m != &method);
        endpoints.push((method, endpoint));
        self
    }

    pub fn get(self, path: impl Into<String>, endpoint: E) -> Self {
        self.route(Method::GET, path, endpoint)
    }

    pub fn post(self, path: impl Into<String>, endpoint: E) -> Self {
        self.route(Method::POST, path, endpoint)
    }

    pub fn put(self, path: impl Into<String>, endpoint: E) -> Self {
        self.route(Method::PUT, path, endpoint)
    }

    pub fn delete(self, path: impl Into<String>, endpoint: E) -> Self {
        self.route(Method::DELETE, path, endpoint)
    }

    pub fn build(self) -> Result<Router<E>, RouterError> {
        let mut inner = matchit::Router::new();
        for (path, endpoints) in self.routes {
            inner
                .insert(path.clone(), endpoints)
                .map_err(|source| RouterError { path, source })?;
        }
        Ok(Router { inner })
    }
}

impl<E> Default for RouterBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RouterBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("paths", &self.routes.len()).finish_non_exhaustive()
    }
}

/// A route path that could not be inserted, e.g. two paths with conflicting
/// wildcards.
#[derive(Debug, Error)]
#[error("invalid route {path:?}: {source}")]
pub struct RouterError {
    path: String,
    source: matchit::InsertError,
}
