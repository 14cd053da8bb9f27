use std::fmt;

use crate::Result;
use crate::body::RequestBody;
use crate::error::Error;
use crate::header::{Header, first_value, validated_header};
use crate::http_url::HttpUrl;

/// The request methods this client sends. Anything else is rejected at the type level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    pub const fn permits_request_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        match text.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unsupported http method {other}")),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
        }
    }
}

/// An immutable HTTP request.
///
/// Use [`Request::to_builder`] to derive a modified copy; the original is never
/// touched, which is what lets redirects replay a request against a new URL.
#[derive(Clone, Debug)]
pub struct Request {
    url: HttpUrl,
    method: Method,
    headers: Vec<Header>,
    body: RequestBody,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn get(url: HttpUrl) -> Self {
        Self {
            url,
            method: Method::Get,
            headers: Vec::new(),
            body: RequestBody::default(),
        }
    }

    pub fn url(&self) -> &HttpUrl {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First value recorded under `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn is_https(&self) -> bool {
        self.url.is_https()
    }

    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            url: Some(self.url.clone()),
            method: self.method,
            headers: self.headers.clone(),
            body: Some(self.body.clone()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequestBuilder {
    url: Option<HttpUrl>,
    method: Method,
    headers: Vec<Header>,
    body: Option<RequestBody>,
}

impl RequestBuilder {
    pub fn url(mut self, url: HttpUrl) -> Self {
        self.url = Some(url);
        self
    }

    pub fn try_url(self, url: &str) -> Result<Self> {
        Ok(self.url(HttpUrl::parse(url)?))
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Records `name: value` with set semantics, dropping every earlier header of that name.
    pub fn set_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header = validated_header(name, value, true)?;
        self.headers
            .retain(|existing| !existing.name().eq_ignore_ascii_case(name));
        self.headers.push(header);
        Ok(self)
    }

    /// Records `name: value` with add semantics; earlier headers of that name are kept.
    pub fn add_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header = validated_header(name, value, false)?;
        self.headers.push(header);
        Ok(self)
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers
            .retain(|existing| !existing.name().eq_ignore_ascii_case(name));
        self
    }

    pub fn build(self) -> Result<Request> {
        let url = self.url.ok_or(Error::MissingUrl)?;
        Ok(Request {
            url,
            method: self.method,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        })
    }
}
