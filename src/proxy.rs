use http::Uri;
use http::header::HeaderValue;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::header::parse_header_value;
use crate::http_url::HttpUrl;

/// Forward proxy used for every request whose host is not listed in the bypass rules.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    uri: Uri,
    authorization: Option<HeaderValue>,
    no_proxy_rules: Vec<NoProxyRule>,
}

impl ProxyConfig {
    pub fn new(uri: &str) -> Result<Self> {
        let parsed: Uri = uri.parse().map_err(|source: http::uri::InvalidUri| {
            invalid_proxy(uri, source.to_string())
        })?;
        match parsed.scheme_str() {
            Some("http" | "https" | "socks4" | "socks4a" | "socks5" | "socks5h") => {}
            Some(other) => return Err(invalid_proxy(uri, format!("unsupported scheme {other}"))),
            None => return Err(invalid_proxy(uri, "missing scheme")),
        }
        if parsed.host().is_none_or(str::is_empty) {
            return Err(invalid_proxy(uri, "missing host"));
        }
        Ok(Self {
            uri: parsed,
            authorization: None,
            no_proxy_rules: Vec::new(),
        })
    }

    /// Sends `Proxy-Authorization` on requests routed through the proxy.
    pub fn authorization(mut self, value: &str) -> Result<Self> {
        let mut value = parse_header_value("proxy-authorization", value)?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    /// Hosts that bypass the proxy: `*`, `example.com` (subdomains included) or `host:port`.
    pub fn no_proxy<I, S>(mut self, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for rule in rules {
            let rule = rule.as_ref();
            let parsed = NoProxyRule::parse(rule)
                .ok_or_else(|| invalid_proxy(rule, "invalid no-proxy rule"))?;
            self.no_proxy_rules.push(parsed);
        }
        Ok(self)
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub(crate) fn authorization_header(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    pub fn bypasses(&self, url: &HttpUrl) -> bool {
        let host = url.host().to_ascii_lowercase();
        self.no_proxy_rules
            .iter()
            .any(|rule| rule.matches(&host, Some(url.port())))
    }
}

fn invalid_proxy(uri: &str, message: impl Into<String>) -> Error {
    Error::InvalidProxy {
        uri: uri.to_owned(),
        message: message.into(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum NoProxyRule {
    Any,
    Domain { host: String, port: Option<u16> },
}

impl NoProxyRule {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let mut candidate = text.trim().to_owned();
        let mut port = None;
        if candidate.is_empty() {
            return None;
        }
        if candidate == "*" {
            return Some(Self::Any);
        }
        if let Ok(url) = Url::parse(&candidate)
            && let Some(host) = url.host_str()
        {
            candidate = host.to_owned();
            port = url.port();
        }
        candidate = candidate.trim_start_matches('.').to_owned();
        if candidate.matches(':').count() == 1 {
            let (host, raw_port) = candidate.rsplit_once(':')?;
            if host.is_empty() {
                return None;
            }
            port = Some(raw_port.parse::<u16>().ok()?);
            candidate = host.to_owned();
        }
        if candidate.is_empty() {
            return None;
        }
        Some(Self::Domain {
            host: candidate.to_ascii_lowercase(),
            port,
        })
    }

    pub(crate) fn matches(&self, host: &str, port: Option<u16>) -> bool {
        match self {
            Self::Any => true,
            Self::Domain {
                host: domain,
                port: rule_port,
            } => {
                let host_matches = host == domain || host.ends_with(&format!(".{domain}"));
                if !host_matches {
                    return false;
                }
                match rule_port {
                    Some(rule_port) => port == Some(*rule_port),
                    None => true,
                }
            }
        }
    }
}
