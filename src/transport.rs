use std::io::{Cursor, Read};
use std::time::Duration;

use http::HeaderMap;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};

use crate::Result;
use crate::body::RequestBody;
use crate::error::{Error, TimeoutPhase, TransportErrorKind};
use crate::http_url::HttpUrl;
use crate::proxy::ProxyConfig;
use crate::request::Method;
use crate::tls::TlsOptions;
use crate::util::redact_url_for_logs;

/// Performs the network exchange for a single attempt.
///
/// Implementations return every status as a response; only failures to get a
/// response at all are errors.
pub trait Transport: Send + Sync {
    fn execute(&self, request: TransportRequest<'_>) -> Result<TransportResponse>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamingMode {
    FixedLength(u64),
    Chunked,
}

impl StreamingMode {
    /// Fixed length when the size is known and fits in memory, chunked otherwise.
    pub fn for_length(content_length: Option<u64>) -> Self {
        match content_length {
            Some(length) if usize::try_from(length).is_ok() => Self::FixedLength(length),
            _ => Self::Chunked,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutgoingBody<'a> {
    pub content: &'a RequestBody,
    pub mode: StreamingMode,
}

/// Everything a transport needs for one attempt.
#[derive(Debug)]
pub struct TransportRequest<'a> {
    pub url: &'a HttpUrl,
    pub method: Method,
    pub headers: HeaderMap,
    /// Present only for methods that carry a body.
    pub body: Option<OutgoingBody<'a>>,
    pub settings: &'a ConnectionSettings,
}

impl TransportRequest<'_> {
    /// The method as sent on the wire.
    pub fn method_name(&self) -> &'static str {
        self.method.as_str()
    }
}

/// Raw result of one exchange. The body stream is read lazily by the caller.
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: Box<dyn Read + Send>,
    /// Separate stream for error statuses, when the backend distinguishes one.
    pub error_body: Option<Box<dyn Read + Send>>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            reason: http::StatusCode::from_u16(status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or_default()
                .to_owned(),
            headers: Vec::new(),
            content_length: None,
            content_type: None,
            body,
            error_body: None,
        }
    }

    /// Error stream for statuses >= 400 when one exists, the regular stream otherwise.
    pub fn into_stream(self) -> Box<dyn Read + Send> {
        match self.error_body {
            Some(error_body) if self.status >= 400 => error_body,
            _ => self.body,
        }
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Connection-level settings derived from the client configuration.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) follow_redirects: bool,
    pub(crate) max_follows: usize,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) tls: TlsOptions,
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Whether the transport itself should follow redirects.
    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn max_follows(&self) -> usize {
        self.max_follows
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn tls(&self) -> &TlsOptions {
        &self.tls
    }

    fn timeout_for(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::Connect => self.connect_timeout,
            TimeoutPhase::Write => self.write_timeout,
            TimeoutPhase::Read => self.read_timeout,
        }
    }
}

/// Blocking transport backed by `ureq` agents built once per client.
#[derive(Clone)]
pub struct UreqTransport {
    direct: ureq::Agent,
    proxy: Option<ureq::Agent>,
}

impl UreqTransport {
    pub fn new(settings: &ConnectionSettings, client_name: &str) -> Result<Self> {
        let direct = make_agent(settings.tls(), client_name, None)?;
        let proxy = match settings.proxy() {
            Some(proxy_config) => {
                let uri = proxy_config.uri().to_string();
                let proxy = ureq::Proxy::new(&uri).map_err(|source| Error::InvalidProxy {
                    uri: uri.clone(),
                    message: source.to_string(),
                })?;
                Some(make_agent(settings.tls(), client_name, Some(proxy))?)
            }
            None => None,
        };
        Ok(Self { direct, proxy })
    }

    fn select_agent(&self, request: &TransportRequest<'_>) -> (&ureq::Agent, bool) {
        if let Some(proxy_config) = request.settings.proxy()
            && !proxy_config.bypasses(request.url)
            && let Some(proxy) = &self.proxy
        {
            return (proxy, true);
        }
        (&self.direct, false)
    }

    fn run_configured_request<S: ureq::AsSendBody>(
        &self,
        agent: &ureq::Agent,
        using_proxy: bool,
        request: ureq::http::Request<S>,
        transport_request: &TransportRequest<'_>,
    ) -> Result<ureq::http::Response<ureq::Body>> {
        let settings = transport_request.settings;
        let max_redirects = if settings.follow_redirects() {
            u32::try_from(settings.max_follows()).unwrap_or(u32::MAX)
        } else {
            0
        };
        let mut configured_request = agent
            .configure_request(request)
            .timeout_connect(Some(settings.connect_timeout()))
            .timeout_send_request(Some(settings.write_timeout()))
            .timeout_send_body(Some(settings.write_timeout()))
            .timeout_recv_response(Some(settings.read_timeout()))
            .timeout_recv_body(Some(settings.read_timeout()))
            .max_redirects(max_redirects)
            .build();

        if using_proxy
            && let Some(proxy_config) = settings.proxy()
            && let Some(proxy_authorization) = proxy_config.authorization_header()
        {
            configured_request
                .headers_mut()
                .insert("proxy-authorization", proxy_authorization.clone());
        }

        let method = transport_request.method;
        let url = redact_url_for_logs(transport_request.url.as_str());
        agent
            .run(configured_request)
            .map_err(|source| match source {
                ureq::Error::Timeout(which) => {
                    let phase = timeout_phase(&which);
                    Error::Timeout {
                        phase,
                        timeout_ms: settings.timeout_for(phase).as_millis(),
                        method,
                        url,
                    }
                }
                other => Error::Transport {
                    kind: classify_ureq_transport_error(&other),
                    method,
                    url,
                    source: Box::new(other),
                },
            })
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: TransportRequest<'_>) -> Result<TransportResponse> {
        let (agent, using_proxy) = self.select_agent(&request);
        let mut builder = ureq::http::Request::builder()
            .method(request.method_name())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = match request.body {
            Some(OutgoingBody {
                content,
                mode: StreamingMode::Chunked,
            }) => {
                let reader = Cursor::new(content.content().cloned().unwrap_or_default());
                let http_request = builder
                    .body(ureq::SendBody::from_owned_reader(reader))
                    .map_err(|source| request_build_error(&request, source))?;
                self.run_configured_request(agent, using_proxy, http_request, &request)?
            }
            Some(OutgoingBody {
                content,
                mode: StreamingMode::FixedLength(_),
            }) => {
                let payload: &[u8] = content
                    .content()
                    .map(|bytes| &bytes[..])
                    .unwrap_or_default();
                let http_request = builder
                    .body(payload)
                    .map_err(|source| request_build_error(&request, source))?;
                self.run_configured_request(agent, using_proxy, http_request, &request)?
            }
            None => {
                let http_request = builder
                    .body(Vec::new())
                    .map_err(|source| request_build_error(&request, source))?;
                self.run_configured_request(agent, using_proxy, http_request, &request)?
            }
        };

        Ok(into_transport_response(response))
    }
}

fn into_transport_response(response: ureq::http::Response<ureq::Body>) -> TransportResponse {
    let status = response.status();
    let response_headers = response.headers();
    let headers = response_headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let content_type = response_headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    // Decoded bodies no longer match the declared length.
    let content_length = if response_headers.contains_key(CONTENT_ENCODING) {
        None
    } else {
        response_headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    };

    TransportResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_owned(),
        headers,
        content_length,
        content_type,
        body: Box::new(response.into_body().into_reader()),
        error_body: None,
    }
}

fn make_agent(
    tls_options: &TlsOptions,
    client_name: &str,
    proxy: Option<ureq::Proxy>,
) -> Result<ureq::Agent> {
    let tls_config = tls_options.to_ureq_config()?;
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .user_agent(client_name)
        .tls_config(tls_config)
        .proxy(proxy)
        .build();
    Ok(config.new_agent())
}

fn request_build_error(request: &TransportRequest<'_>, source: http::Error) -> Error {
    Error::Transport {
        kind: TransportErrorKind::Protocol,
        method: request.method,
        url: redact_url_for_logs(request.url.as_str()),
        source: Box::new(source),
    }
}

fn timeout_phase(which: &ureq::Timeout) -> TimeoutPhase {
    match which {
        ureq::Timeout::Resolve | ureq::Timeout::Connect => TimeoutPhase::Connect,
        ureq::Timeout::SendRequest | ureq::Timeout::SendBody => TimeoutPhase::Write,
        _ => TimeoutPhase::Read,
    }
}

pub(crate) fn classify_ureq_transport_error(error: &ureq::Error) -> TransportErrorKind {
    match error {
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::Tls(_) => TransportErrorKind::TlsHandshake,
        #[cfg(feature = "tls-rustls-ring")]
        ureq::Error::Rustls(source) => classify_rustls_error(source),
        #[cfg(feature = "tls-native")]
        ureq::Error::NativeTls(_) => TransportErrorKind::TlsHandshake,
        #[cfg(feature = "tls-native")]
        ureq::Error::Der(_) => TransportErrorKind::TlsCertificate,
        #[cfg(any(feature = "tls-rustls-ring", feature = "tls-native"))]
        ureq::Error::Pem(_) => TransportErrorKind::TlsCertificate,
        ureq::Error::ConnectProxyFailed(_) | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Connect
        }
        ureq::Error::Protocol(_)
        | ureq::Error::BadUri(_)
        | ureq::Error::Http(_)
        | ureq::Error::TooManyRedirects
        | ureq::Error::RedirectFailed => TransportErrorKind::Protocol,
        ureq::Error::Io(source) => classify_io_error(source),
        _ => TransportErrorKind::Other,
    }
}

fn classify_io_error(source: &std::io::Error) -> TransportErrorKind {
    if let Some(inner) = source.get_ref() {
        if let Some(wrapped) = inner.downcast_ref::<ureq::Error>() {
            return classify_ureq_transport_error(wrapped);
        }
        #[cfg(feature = "tls-rustls-ring")]
        if let Some(tls) = inner.downcast_ref::<rustls::Error>() {
            return classify_rustls_error(tls);
        }
    }
    match source.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportErrorKind::Read,
        std::io::ErrorKind::NotFound => TransportErrorKind::Dns,
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
        std::io::ErrorKind::WriteZero => TransportErrorKind::Write,
        std::io::ErrorKind::InvalidData => TransportErrorKind::Protocol,
        _ => TransportErrorKind::Other,
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn classify_rustls_error(error: &rustls::Error) -> TransportErrorKind {
    match error {
        rustls::Error::InvalidCertificate(rustls::CertificateError::NotValidForName) => {
            TransportErrorKind::TlsPeerUnverified
        }
        rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented => {
            TransportErrorKind::TlsCertificate
        }
        _ => TransportErrorKind::TlsHandshake,
    }
}
