//! The interceptor chain engine.
//!
//! A call owns an ordered list of interceptors. Each one receives a [`Chain`]
//! positioned just after itself; calling [`Chain::proceed`] hands the request to
//! the next interceptor and returns whatever that interceptor produced. The last
//! interceptor in a well-formed list performs the transport I/O and never
//! proceeds.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::Result;
use crate::call::CallContext;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// A unit of request/response processing.
///
/// Implementations may rewrite the request before proceeding, proceed several
/// times (retries), or transform the response on the way back.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, chain: Chain<'_>) -> Result<Response>;

    /// Label used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Cursor into a call's interceptor list plus the request to deliver.
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    index: usize,
    request: Request,
    call: &'a CallContext,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        interceptors: &'a [Arc<dyn Interceptor>],
        index: usize,
        request: Request,
        call: &'a CallContext,
    ) -> Self {
        Self {
            interceptors,
            index,
            request,
            call,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The call this chain is executing for.
    pub fn call(&self) -> &'a CallContext {
        self.call
    }

    /// Position of the interceptor that [`Chain::proceed`] will invoke next.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Delivers `request` to the next interceptor and returns its result.
    ///
    /// May be called more than once; every call builds a fresh downstream chain.
    pub fn proceed(&self, request: Request) -> Result<Response> {
        let Some(interceptor) = self.interceptors.get(self.index) else {
            return Err(Error::ChainExhausted { index: self.index });
        };
        trace!(
            interceptor = interceptor.name(),
            index = self.index,
            "dispatching request to interceptor"
        );
        let next = Chain::new(self.interceptors, self.index + 1, request, self.call);
        interceptor.intercept(next)
    }
}

impl fmt::Debug for Chain<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Chain")
            .field("index", &self.index)
            .field("interceptors", &self.interceptors.len())
            .field("request", &self.request)
            .finish()
    }
}
