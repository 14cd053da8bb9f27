use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::body::MAX_BUFFERED_BODY_BYTES;
use crate::call::Call;
use crate::chain::Interceptor;
use crate::connect::ConnectInterceptor;
use crate::cookie::CookieInterceptor;
use crate::proxy::ProxyConfig;
use crate::request::Request;
use crate::retry::FollowAndRetryInterceptor;
use crate::tls::TlsOptions;
use crate::transport::{ConnectionSettings, Transport, UreqTransport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRY_TIMES: usize = 3;
const DEFAULT_MAX_FOLLOWS: usize = 3;
const DEFAULT_CLIENT_NAME: &str = "reqchain";

/// Immutable client configuration shared by every call it creates.
///
/// Cloning is cheap; clones share the same configuration and transport.
#[derive(Clone)]
pub struct Client {
    shared: Arc<ClientShared>,
}

struct ClientShared {
    follow_redirects: bool,
    platform_follows_redirects: bool,
    retry_on_connection_failure: bool,
    max_retry_times: usize,
    max_follows: usize,
    call_timeout: Duration,
    client_name: String,
    max_response_body_bytes: usize,
    connection: ConnectionSettings,
    /// User interceptors followed by the built-in stages.
    chain: Vec<Arc<dyn Interceptor>>,
    user_interceptors: usize,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn new_call(&self, request: Request) -> Call {
        Call::new(self.clone(), request)
    }

    pub fn follow_redirects(&self) -> bool {
        self.shared.follow_redirects
    }

    /// Whether redirects are left to the transport instead of the chain.
    pub fn platform_follows_redirects(&self) -> bool {
        self.shared.platform_follows_redirects
    }

    pub fn retry_on_connection_failure(&self) -> bool {
        self.shared.retry_on_connection_failure
    }

    pub fn max_retry_times(&self) -> usize {
        self.shared.max_retry_times
    }

    pub fn max_follows(&self) -> usize {
        self.shared.max_follows
    }

    /// Zero means unbounded.
    pub fn call_timeout(&self) -> Duration {
        self.shared.call_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.shared.connection.connect_timeout()
    }

    pub fn read_timeout(&self) -> Duration {
        self.shared.connection.read_timeout()
    }

    pub fn write_timeout(&self) -> Duration {
        self.shared.connection.write_timeout()
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.shared.connection.proxy()
    }

    pub fn tls_options(&self) -> &TlsOptions {
        self.shared.connection.tls()
    }

    pub fn client_name(&self) -> &str {
        &self.shared.client_name
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.shared.max_response_body_bytes
    }

    /// The interceptors registered on the builder, in registration order.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.shared.chain[..self.shared.user_interceptors]
    }

    pub fn transport(&self) -> &dyn Transport {
        self.shared.transport.as_ref()
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.shared.connection
    }

    pub(crate) fn chain(&self) -> &[Arc<dyn Interceptor>] {
        &self.shared.chain
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = &self.shared;
        formatter
            .debug_struct("Client")
            .field("client_name", &shared.client_name)
            .field("follow_redirects", &shared.follow_redirects)
            .field("platform_follows_redirects", &shared.platform_follows_redirects)
            .field("retry_on_connection_failure", &shared.retry_on_connection_failure)
            .field("max_retry_times", &shared.max_retry_times)
            .field("max_follows", &shared.max_follows)
            .field("call_timeout", &shared.call_timeout)
            .field("connection", &shared.connection)
            .field(
                "interceptors",
                &self
                    .interceptors()
                    .iter()
                    .map(|interceptor| interceptor.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct ClientBuilder {
    follow_redirects: bool,
    platform_follows_redirects: bool,
    retry_on_connection_failure: bool,
    max_retry_times: usize,
    max_follows: usize,
    call_timeout: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    client_name: String,
    max_response_body_bytes: usize,
    proxy: Option<ProxyConfig>,
    tls_options: TlsOptions,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            follow_redirects: true,
            platform_follows_redirects: false,
            retry_on_connection_failure: true,
            max_retry_times: DEFAULT_MAX_RETRY_TIMES,
            max_follows: DEFAULT_MAX_FOLLOWS,
            call_timeout: Duration::ZERO,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            max_response_body_bytes: MAX_BUFFERED_BODY_BYTES,
            proxy: None,
            tls_options: TlsOptions::default(),
            interceptors: Vec::new(),
            transport: None,
        }
    }

    pub fn follow_redirects(mut self, follow_redirects: bool) -> Self {
        self.follow_redirects = follow_redirects;
        self
    }

    /// Lets the transport follow redirects itself; the chain then never sees 3xx hops.
    pub fn platform_follows_redirects(mut self, platform_follows_redirects: bool) -> Self {
        self.platform_follows_redirects = platform_follows_redirects;
        self
    }

    pub fn retry_on_connection_failure(mut self, retry_on_connection_failure: bool) -> Self {
        self.retry_on_connection_failure = retry_on_connection_failure;
        self
    }

    pub fn max_retry_times(mut self, max_retry_times: usize) -> Self {
        self.max_retry_times = max_retry_times;
        self
    }

    pub fn max_follows(mut self, max_follows: usize) -> Self {
        self.max_follows = max_follows;
        self
    }

    /// Deadline for a whole call; zero disables it. Enforce it by canceling the call.
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn tls_options(mut self, tls_options: TlsOptions) -> Self {
        self.tls_options = tls_options;
        self
    }

    /// Appends an interceptor. Interceptors run in registration order, before the built-in stages.
    pub fn interceptor<I>(self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptor_arc(Arc::new(interceptor))
    }

    pub fn interceptor_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Replaces the default `ureq` transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client> {
        let connection = ConnectionSettings {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            follow_redirects: self.platform_follows_redirects && self.follow_redirects,
            max_follows: self.max_follows,
            proxy: self.proxy,
            tls: self.tls_options,
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(UreqTransport::new(&connection, &self.client_name)?),
        };

        let user_interceptors = self.interceptors.len();
        let mut chain = self.interceptors;
        chain.push(Arc::new(FollowAndRetryInterceptor));
        chain.push(Arc::new(CookieInterceptor));
        chain.push(Arc::new(ConnectInterceptor));

        Ok(Client {
            shared: Arc::new(ClientShared {
                follow_redirects: self.follow_redirects,
                platform_follows_redirects: self.platform_follows_redirects,
                retry_on_connection_failure: self.retry_on_connection_failure,
                max_retry_times: self.max_retry_times,
                max_follows: self.max_follows,
                call_timeout: self.call_timeout,
                client_name: self.client_name,
                max_response_body_bytes: self.max_response_body_bytes,
                connection,
                chain,
                user_interceptors,
                transport,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
