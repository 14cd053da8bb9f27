use std::fmt;
use std::hash::{Hash, Hasher};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::Result;
use crate::error::Error;

/// Characters escaped in query names and values supplied through the builder.
/// Spaces become `%20`, never `+`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'*')
    .remove(b',')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

/// Characters escaped by [`HttpUrl::param_encode`] (form-urlencoded values).
const FORM_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// An absolute `http`/`https` URL.
///
/// The canonical string form is computed once when the URL is built and is the
/// basis for equality and hashing. Path segments and query parameters are kept
/// decoded; the `encoded_*` accessors slice the canonical string.
#[derive(Clone)]
pub struct HttpUrl {
    scheme: String,
    host: String,
    port: u16,
    /// Always at least one element; a bare root is `[""]`.
    path_segments: Vec<String>,
    /// `None` when the URL has no `?`. A `None` value means the name had no `=`.
    query: Option<Vec<(String, Option<String>)>>,
    url: url::Url,
}

impl HttpUrl {
    pub fn builder() -> HttpUrlBuilder {
        HttpUrlBuilder::default()
    }

    pub fn parse(url: &str) -> Result<Self> {
        Self::builder().url(url).build()
    }

    /// Returns `Some(80)` for `http`, `Some(443)` for `https`, `None` for any other scheme.
    pub fn default_port(scheme: &str) -> Option<u16> {
        if scheme.eq_ignore_ascii_case("http") {
            Some(80)
        } else if scheme.eq_ignore_ascii_case("https") {
            Some(443)
        } else {
            None
        }
    }

    /// Form-urlencodes `value` (`application/x-www-form-urlencoded`, spaces as `+`).
    pub fn param_encode(value: &str) -> String {
        utf8_percent_encode(value, FORM_COMPONENT)
            .to_string()
            .replace("%20", "+")
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `scheme://host`, with the port appended only when it is not the scheme default.
    pub fn origin(&self) -> String {
        if Self::default_port(&self.scheme) == Some(self.port) {
            format!("{}://{}", self.scheme, self.host)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }

    pub fn path_size(&self) -> usize {
        self.path_segments.len()
    }

    pub fn encoded_path(&self) -> &str {
        self.url.path()
    }

    pub fn encoded_path_segments(&self) -> Vec<&str> {
        self.url.path().split('/').skip(1).collect()
    }

    pub fn path_segments(&self) -> &[String] {
        &self.path_segments
    }

    pub fn encoded_query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Decoded query string, or `None` when the URL has no query.
    pub fn query(&self) -> Option<String> {
        let pairs = self.query.as_ref()?;
        let mut out = String::new();
        for (index, (name, value)) in pairs.iter().enumerate() {
            if index > 0 {
                out.push('&');
            }
            out.push_str(name);
            if let Some(value) = value {
                out.push('=');
                out.push_str(value);
            }
        }
        Some(out)
    }

    pub fn query_size(&self) -> usize {
        self.query.as_ref().map_or(0, Vec::len)
    }

    /// Value of the first parameter called `name`. `None` when the parameter is
    /// missing or was written without `=`; see [`HttpUrl::has_query_parameter`].
    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query
            .as_ref()?
            .iter()
            .find(|(candidate, _)| candidate == name)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has_query_parameter(&self, name: &str) -> bool {
        self.query
            .as_ref()
            .is_some_and(|pairs| pairs.iter().any(|(candidate, _)| candidate == name))
    }

    pub fn query_parameter_names(&self) -> Vec<&str> {
        self.query
            .as_ref()
            .map(|pairs| pairs.iter().map(|(name, _)| name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn as_url(&self) -> &url::Url {
        &self.url
    }
}

impl fmt::Display for HttpUrl {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.url.as_str())
    }
}

impl fmt::Debug for HttpUrl {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("HttpUrl")
            .field(&self.url.as_str())
            .finish()
    }
}

impl PartialEq for HttpUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url.as_str() == other.url.as_str()
    }
}

impl Eq for HttpUrl {}

impl Hash for HttpUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.as_str().hash(state);
    }
}

impl std::str::FromStr for HttpUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        Self::parse(url)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HttpUrlBuilder {
    url: Option<String>,
    path_segments: Vec<String>,
    query: Vec<(String, Option<String>)>,
}

impl HttpUrlBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Appends one decoded path segment after the base URL's path.
    pub fn path_segment(mut self, segment: impl Into<String>) -> Self {
        self.path_segments.push(segment.into());
        self
    }

    pub fn path_segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_segments
            .extend(segments.into_iter().map(Into::into));
        self
    }

    /// Sets `name=value`, replacing any parameter of the same name. Arrays are
    /// not supported; join multiple values with `,`.
    pub fn query_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_query(name.into(), Some(value.into()))
    }

    /// Sets a parameter that carries no `=` (for example `?debug`).
    pub fn query_name(self, name: impl Into<String>) -> Self {
        self.set_query(name.into(), None)
    }

    fn set_query(mut self, name: String, value: Option<String>) -> Self {
        match self.query.iter_mut().find(|(candidate, _)| *candidate == name) {
            Some(slot) => slot.1 = value,
            None => self.query.push((name, value)),
        }
        self
    }

    pub fn build(self) -> Result<HttpUrl> {
        let raw = self.url.ok_or(Error::MissingUrl)?;
        let invalid = |reason: String| Error::InvalidUrl {
            url: raw.clone(),
            reason,
        };

        let mut parsed = url::Url::parse(raw.trim()).map_err(|source| invalid(source.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_owned()));
        }

        if !self.path_segments.is_empty() {
            let mut segments = parsed
                .path_segments_mut()
                .map_err(|()| invalid("url cannot carry path segments".to_owned()))?;
            segments.pop_if_empty().extend(&self.path_segments);
        }

        if !self.query.is_empty() {
            let mut pairs = parsed
                .query()
                .map(split_encoded_query)
                .unwrap_or_default();
            for (name, value) in &self.query {
                let name = utf8_percent_encode(name, QUERY_COMPONENT).to_string();
                let value = value
                    .as_deref()
                    .map(|value| utf8_percent_encode(value, QUERY_COMPONENT).to_string());
                match pairs.iter_mut().find(|(candidate, _)| *candidate == name) {
                    Some(slot) => slot.1 = value,
                    None => pairs.push((name, value)),
                }
            }
            parsed.set_query(Some(&join_encoded_query(&pairs)));
        }

        let scheme = parsed.scheme().to_owned();
        let host = parsed.host_str().unwrap_or_default().to_owned();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_owned()))?;
        let path_segments = parsed
            .path()
            .split('/')
            .skip(1)
            .map(decode_component)
            .collect::<Vec<_>>();
        let path_segments = if path_segments.is_empty() {
            vec![String::new()]
        } else {
            path_segments
        };
        let query = parsed.query().map(|query| {
            split_encoded_query(query)
                .into_iter()
                .map(|(name, value)| (decode_component(&name), value.as_deref().map(decode_component)))
                .collect()
        });

        Ok(HttpUrl {
            scheme,
            host,
            port,
            path_segments,
            query,
            url: parsed,
        })
    }
}

fn decode_component(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

fn split_encoded_query(query: &str) -> Vec<(String, Option<String>)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
            None => (pair.to_owned(), None),
        })
        .collect()
}

fn join_encoded_query(pairs: &[(String, Option<String>)]) -> String {
    let mut out = String::new();
    for (index, (name, value)) in pairs.iter().enumerate() {
        if index > 0 {
            out.push('&');
        }
        out.push_str(name);
        if let Some(value) = value {
            out.push('=');
            out.push_str(value);
        }
    }
    out
}
