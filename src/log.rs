use std::fmt::Write as _;
use std::time::Instant;

use tracing::{Level, debug, enabled};

use crate::Result;
use crate::chain::{Chain, Interceptor};
use crate::request::Request;
use crate::response::Response;
use crate::util::redact_url_for_logs;

/// Renders each exchange into a single debug event.
///
/// Register it as a client interceptor. When debug logging is enabled the
/// response body is buffered so it can be logged; callers can still read it
/// through the response's caching accessors. Bodies that cannot be buffered
/// are logged as a placeholder and the response is returned untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpLogInterceptor;

impl Interceptor for HttpLogInterceptor {
    fn intercept(&self, chain: Chain<'_>) -> Result<Response> {
        let request = chain.request().clone();
        if !enabled!(Level::DEBUG) {
            return chain.proceed(request);
        }

        let rendered_request = render_request(&request);
        let started_at = Instant::now();
        let result = chain.proceed(request);
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match result {
            Ok(mut response) => {
                let rendered_response = render_response(&mut response);
                debug!(
                    elapsed_ms,
                    request = %rendered_request,
                    response = %rendered_response,
                    "http exchange"
                );
                Ok(response)
            }
            Err(error) => {
                debug!(
                    elapsed_ms,
                    request = %rendered_request,
                    error = %error,
                    "http exchange failed"
                );
                Err(error)
            }
        }
    }

    fn name(&self) -> &str {
        "http_log"
    }
}

fn render_request(request: &Request) -> String {
    let mut rendered = format!(
        "--> {} {}",
        request.method(),
        redact_url_for_logs(request.url().as_str())
    );
    for header in request.headers() {
        let mode = if header.is_set_header() { "set" } else { "add" };
        let _ = write!(rendered, "\n{}: {} ({mode})", header.name(), header.value());
    }
    if request.method().permits_request_body() {
        let body = request.body();
        let _ = write!(
            rendered,
            "\ncontent-type: {}\n\n{}",
            body.content_type(),
            body.string_content()
        );
    }
    rendered
}

fn render_response(response: &mut Response) -> String {
    let mut rendered = format!(
        "<-- {} {} {}",
        response.code(),
        response.message(),
        redact_url_for_logs(response.request().url().as_str())
    );
    for header in response.headers() {
        let _ = write!(rendered, "\n{}: {}", header.name(), header.value());
    }
    let body = response.body_mut();
    let limit = body.limit();
    match body.content_length() {
        Some(declared) if declared > limit as u64 => {
            let _ = write!(
                rendered,
                "\n\n<body not buffered: {declared} bytes exceeds {limit} bytes>"
            );
        }
        _ => match body.string() {
            Ok(text) => {
                let _ = write!(rendered, "\n\n{text}");
            }
            Err(error) => {
                let _ = write!(rendered, "\n\n<body unavailable: {error}>");
            }
        },
    }
    rendered
}
