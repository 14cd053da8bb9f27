use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::body::ResponseBody;
use crate::error::Error;
use crate::header::{Header, first_value};
use crate::request::Request;

const MAX_ERROR_BODY_LEN: usize = 2048;

/// A response plus the request that produced it.
///
/// Non-2xx statuses are ordinary responses; deciding whether they are errors is
/// up to the caller. Dropping or closing the response closes its body.
pub struct Response {
    code: u16,
    message: String,
    headers: Vec<Header>,
    body: ResponseBody,
    request: Request,
}

impl Response {
    pub fn builder(request: Request) -> ResponseBuilder {
        ResponseBuilder {
            code: 200,
            message: String::new(),
            headers: Vec::new(),
            body: None,
            request,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Values of every header named exactly `name`.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|header| header.name() == name)
            .map(Header::value)
            .collect()
    }

    /// First value under `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    /// `true` for codes in `200..300`.
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.code, 300 | 301 | 302 | 303 | 307 | 308)
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn bytes(&mut self) -> Result<&Bytes> {
        self.body.bytes()
    }

    pub fn text(&mut self) -> Result<String> {
        self.body.string()
    }

    pub fn json<T>(&mut self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let content = self.body.bytes()?;
        serde_json::from_slice(content).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(content),
        })
    }

    pub fn close(&mut self) {
        self.body.close();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Response")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("url", &self.request.url().as_str())
            .field("headers", &self.headers.len())
            .field("body", &self.body)
            .finish()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "Response{{code={}, message={}, url={}}}",
            self.code,
            self.message,
            self.request.url()
        )
    }
}

pub struct ResponseBuilder {
    code: u16,
    message: String,
    headers: Vec<Header>,
    body: Option<ResponseBody>,
    request: Request,
}

impl ResponseBuilder {
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = Header>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: ResponseBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn request(mut self, request: Request) -> Self {
        self.request = request;
        self
    }

    pub fn build(self) -> Response {
        Response {
            code: self.code,
            message: self.message,
            headers: self.headers,
            body: self.body.unwrap_or_default(),
            request: self.request,
        }
    }
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::Response;
    use crate::body::ResponseBody;
    use crate::error::Error;
    use crate::header::Header;
    use crate::http_url::HttpUrl;
    use crate::request::Request;

    fn request() -> Request {
        Request::get(HttpUrl::parse("https://example.com/a").expect("url should parse"))
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn header_values_match_exact_name() {
        let response = Response::builder(request())
            .code(302)
            .header(Header::new("Location", "/b", true))
            .header(Header::new("location", "/c", true))
            .build();
        assert_eq!(response.header_values("Location"), ["/b"]);
        assert_eq!(response.header_values("location"), ["/c"]);
        assert_eq!(response.header("LOCATION"), Some("/b"));
        assert!(response.is_redirect());
        assert!(!response.is_successful());
    }

    #[test]
    fn json_decodes_buffered_body() {
        let mut response = Response::builder(request())
            .body(ResponseBody::from_bytes(None, r#"{"id":7}"#))
            .build();
        let item: Item = response.json().expect("json should decode");
        assert_eq!(item, Item { id: 7 });
        assert_eq!(response.text().expect("body stays readable"), r#"{"id":7}"#);
    }

    #[test]
    fn json_failure_carries_body() {
        let mut response = Response::builder(request())
            .body(ResponseBody::from_bytes(None, "not json"))
            .build();
        match response.json::<Item>() {
            Err(Error::Deserialize { body, .. }) => assert_eq!(body, "not json"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn display_references_origin_url() {
        let response = Response::builder(request()).code(404).message("Not Found").build();
        assert_eq!(
            response.to_string(),
            "Response{code=404, message=Not Found, url=https://example.com/a}"
        );
    }
}
