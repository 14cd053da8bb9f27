use std::io::Read;
use std::time::Instant;

use http::HeaderMap;
use http::header::CONTENT_TYPE;
use tracing::debug;

use crate::Result;
use crate::body::ResponseBody;
use crate::call::CancelHandle;
use crate::chain::{Chain, Interceptor};
use crate::header::{Header, parse_header_name, parse_header_value};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{OutgoingBody, StreamingMode, TransportRequest};
use crate::util::redact_url_for_logs;

/// Terminal stage: hands the effective request to the client's transport.
///
/// Never proceeds and never retries; failures go back up the chain unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectInterceptor;

impl Interceptor for ConnectInterceptor {
    fn intercept(&self, chain: Chain<'_>) -> Result<Response> {
        let call = chain.call();
        let client = call.client();
        let request = chain.request();
        if call.is_canceled() {
            return Err(call.canceled_error(request));
        }

        let headers = outgoing_headers(request)?;
        let body = request
            .method()
            .permits_request_body()
            .then(|| OutgoingBody {
                content: request.body(),
                mode: StreamingMode::for_length(request.body().content_length()),
            });
        let redacted_url = redact_url_for_logs(request.url().as_str());
        debug!(
            method = %request.method(),
            url = %redacted_url,
            streaming = ?body.map(|body| body.mode),
            "sending request"
        );

        let started_at = Instant::now();
        let transport_response = client.transport().execute(TransportRequest {
            url: request.url(),
            method: request.method(),
            headers,
            body,
            settings: client.connection_settings(),
        })?;
        debug!(
            method = %request.method(),
            url = %redacted_url,
            status = transport_response.status,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "received response"
        );

        let status = transport_response.status;
        let reason = transport_response.reason.clone();
        let content_type = transport_response.content_type.clone();
        let content_length = transport_response.content_length;
        let response_headers: Vec<Header> = transport_response
            .headers
            .iter()
            .map(|(name, value)| Header::new(name.as_str(), value.as_str(), true))
            .collect();
        let stream = CancelAwareReader {
            inner: transport_response.into_stream(),
            cancel: call.cancel_handle(),
        };
        let body = ResponseBody::new(content_type, content_length, Box::new(stream))
            .with_limit(client.max_response_body_bytes());

        Ok(Response::builder(request.clone())
            .code(status)
            .message(reason)
            .headers(response_headers)
            .body(body)
            .build())
    }

    fn name(&self) -> &str {
        "connect"
    }
}

/// Replays the recorded headers: set headers replace, add headers append.
fn outgoing_headers(request: &Request) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(request.headers().len() + 1);
    for header in request.headers() {
        let name = parse_header_name(header.name())?;
        let value = parse_header_value(header.name(), header.value())?;
        if header.is_set_header() {
            headers.insert(name, value);
        } else {
            headers.append(name, value);
        }
    }
    if request.method().permits_request_body() {
        let content_type = parse_header_value("content-type", request.body().content_type())?;
        headers.insert(CONTENT_TYPE, content_type);
    }
    Ok(headers)
}

/// Fails reads once the owning call has been canceled.
struct CancelAwareReader {
    inner: Box<dyn Read + Send>,
    cancel: CancelHandle,
}

impl Read for CancelAwareReader {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_canceled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "call canceled",
            ));
        }
        self.inner.read(buffer)
    }
}
