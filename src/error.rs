use thiserror::Error;

use crate::request::Method;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    /// Handshake failed because the peer certificate did not validate.
    TlsCertificate,
    /// The peer's identity could not be verified (e.g. hostname mismatch).
    TlsPeerUnverified,
    TlsHandshake,
    Write,
    Read,
    Protocol,
    /// The target resource plainly does not exist.
    NotFound,
    Other,
}

impl TransportErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::TlsCertificate => "tls_certificate",
            Self::TlsPeerUnverified => "tls_peer_unverified",
            Self::TlsHandshake => "tls_handshake",
            Self::Write => "write",
            Self::Read => "read",
            Self::Protocol => "protocol",
            Self::NotFound => "not_found",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeoutPhase {
    Connect,
    Write,
    Read,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::Write => "write",
            Self::Read => "read",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    MissingUrl,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    InvalidProxy,
    TlsConfig,
    AlreadyExecuted,
    Spawn,
    Transport,
    Timeout,
    RedirectLimitExceeded,
    ChainExhausted,
    ReadBody,
    ResponseBodyTooLarge,
    Deserialize,
    Canceled,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::MissingUrl => "missing_url",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::InvalidProxy => "invalid_proxy",
            Self::TlsConfig => "tls_config",
            Self::AlreadyExecuted => "already_executed",
            Self::Spawn => "spawn",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::RedirectLimitExceeded => "redirect_limit_exceeded",
            Self::ChainExhausted => "chain_exhausted",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::Deserialize => "deserialize",
            Self::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request url is required")]
    MissingUrl,
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid proxy {uri}: {message}")]
    InvalidProxy { uri: String, message: String },
    #[error("invalid tls configuration for backend {backend}: {message}")]
    TlsConfig {
        backend: &'static str,
        message: String,
    },
    #[error("call has already been executed")]
    AlreadyExecuted,
    #[error("failed to spawn call thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("http transport error ({kind}) for {method} {url}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("http request timed out in {phase} after {timeout_ms}ms for {method} {url}")]
    Timeout {
        phase: TimeoutPhase,
        timeout_ms: u128,
        method: Method,
        url: String,
    },
    #[error("{follows} redirects followed (limit {max_follows}) for {method} {url}; check the request url")]
    RedirectLimitExceeded {
        follows: usize,
        max_follows: usize,
        method: Method,
        url: String,
    },
    #[error("interceptor chain exhausted at index {index}; the last interceptor must not proceed")]
    ChainExhausted { index: usize },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: std::io::Error,
    },
    #[error("response body too large ({actual_bytes} bytes > {limit_bytes} bytes)")]
    ResponseBodyTooLarge { limit_bytes: usize, actual_bytes: u64 },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("call canceled for {method} {url}")]
    Canceled { method: Method, url: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::MissingUrl => ErrorCode::MissingUrl,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::InvalidProxy { .. } => ErrorCode::InvalidProxy,
            Self::TlsConfig { .. } => ErrorCode::TlsConfig,
            Self::AlreadyExecuted => ErrorCode::AlreadyExecuted,
            Self::Spawn { .. } => ErrorCode::Spawn,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::RedirectLimitExceeded { .. } => ErrorCode::RedirectLimitExceeded,
            Self::ChainExhausted { .. } => ErrorCode::ChainExhausted,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::Canceled { .. } => ErrorCode::Canceled,
        }
    }

    /// Transport kind for transport-class failures; `None` otherwise.
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the retry policy would consider this failure worth another attempt.
    pub fn is_retryable_transport(&self) -> bool {
        crate::retry::is_transport_failure(self)
            && !crate::retry::is_one_shot(self)
            && crate::retry::is_recoverable(self)
    }
}
