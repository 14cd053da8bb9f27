use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::info_span;

use crate::Result;
use crate::chain::Chain;
use crate::client::Client;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::util::redact_url_for_logs;

/// Receives the outcome of an enqueued call on the call's worker thread.
///
/// Any `FnOnce(Result<Response>)` closure qualifies.
pub trait Callback: Send + 'static {
    fn on_response(self, response: Response);

    fn on_failure(self, error: Error);
}

impl<F> Callback for F
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    fn on_response(self, response: Response) {
        self(Ok(response));
    }

    fn on_failure(self, error: Error) {
        self(Err(error));
    }
}

#[derive(Debug, Default)]
struct CallState {
    executed: AtomicBool,
    canceled: AtomicBool,
}

/// Cancels a call from any thread.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    state: Arc<CallState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }
}

/// What every interceptor of a running call can see about it.
pub struct CallContext {
    client: Client,
    request: Request,
    state: Arc<CallState>,
}

impl CallContext {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The request the call was created with, before any rewrite.
    pub fn original_request(&self) -> &Request {
        &self.request
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn canceled_error(&self, request: &Request) -> Error {
        Error::Canceled {
            method: request.method(),
            url: redact_url_for_logs(request.url().as_str()),
        }
    }

    fn run(&self) -> Result<Response> {
        let span = info_span!(
            "reqchain.call",
            method = %self.request.method(),
            url = %redact_url_for_logs(self.request.url().as_str()),
        );
        let _entered = span.enter();
        let chain = Chain::new(self.client.chain(), 0, self.request.clone(), self);
        chain.proceed(self.request.clone())
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CallContext")
            .field("request", &self.request)
            .field("state", &self.state)
            .finish()
    }
}

/// One logical request execution, retries and redirects included.
///
/// A call runs at most once, through either [`Call::execute`] or [`Call::enqueue`].
#[derive(Debug)]
pub struct Call {
    context: Arc<CallContext>,
}

impl Call {
    pub(crate) fn new(client: Client, request: Request) -> Self {
        Self {
            context: Arc::new(CallContext {
                client,
                request,
                state: Arc::new(CallState::default()),
            }),
        }
    }

    pub fn request(&self) -> &Request {
        &self.context.request
    }

    /// Runs the call on the current thread and returns the final response.
    pub fn execute(&self) -> Result<Response> {
        self.mark_executed()?;
        self.context.run()
    }

    /// Runs the call on a new thread and hands the outcome to `callback`.
    pub fn enqueue<C>(&self, callback: C) -> Result<JoinHandle<()>>
    where
        C: Callback,
    {
        self.mark_executed()?;
        let context = Arc::clone(&self.context);
        thread::Builder::new()
            .name(format!("reqchain-call-{}", context.request.url().host()))
            .spawn(move || match context.run() {
                Ok(response) => callback.on_response(response),
                Err(error) => callback.on_failure(error),
            })
            .map_err(|source| Error::Spawn { source })
    }

    pub fn cancel(&self) {
        self.context.state.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.context.is_canceled()
    }

    pub fn is_executed(&self) -> bool {
        self.context.state.executed.load(Ordering::SeqCst)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.context.cancel_handle()
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &CallContext {
        &self.context
    }

    fn mark_executed(&self) -> Result<()> {
        if self.context.state.executed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyExecuted);
        }
        Ok(())
    }
}
