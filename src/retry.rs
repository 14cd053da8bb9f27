use tracing::{debug, warn};

use crate::Result;
use crate::chain::{Chain, Interceptor};
use crate::error::{Error, TransportErrorKind};
use crate::http_url::HttpUrl;
use crate::request::Request;
use crate::response::Response;
use crate::util::redact_url_for_logs;

/// Retries transport failures and follows redirects for one call.
///
/// Both budgets are counted independently and live only for the duration of a
/// single `intercept` invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct FollowAndRetryInterceptor;

impl Interceptor for FollowAndRetryInterceptor {
    fn intercept(&self, chain: Chain<'_>) -> Result<Response> {
        let call = chain.call();
        let client = call.client();
        let mut request = chain.request().clone();
        let mut retry_count = 0_usize;
        let mut follow_count = 0_usize;

        loop {
            if call.is_canceled() {
                return Err(call.canceled_error(&request));
            }

            let response = match chain.proceed(request.clone()) {
                Ok(response) => response,
                Err(error) => {
                    if !is_transport_failure(&error) || !client.retry_on_connection_failure() {
                        return Err(error);
                    }
                    retry_count += 1;
                    if retry_count > client.max_retry_times() {
                        return Err(error);
                    }
                    if is_one_shot(&error) || !is_recoverable(&error) {
                        return Err(error);
                    }
                    warn!(
                        retry = retry_count,
                        max_retry_times = client.max_retry_times(),
                        method = %request.method(),
                        url = %redact_url_for_logs(request.url().as_str()),
                        error = %error,
                        "retrying request after transport error"
                    );
                    continue;
                }
            };

            if client.platform_follows_redirects()
                || !client.follow_redirects()
                || !response.is_redirect()
            {
                return Ok(response);
            }

            follow_count += 1;
            if follow_count > client.max_follows() {
                return Err(Error::RedirectLimitExceeded {
                    follows: follow_count,
                    max_follows: client.max_follows(),
                    method: request.method(),
                    url: redact_url_for_logs(request.url().as_str()),
                });
            }

            let Some(location) = redirect_location(&response) else {
                return Ok(response);
            };
            let target = resolve_location(request.url(), &location)?;
            let mut response = response;
            response.close();

            debug!(
                status = response.code(),
                follow = follow_count,
                from = %redact_url_for_logs(request.url().as_str()),
                to = %redact_url_for_logs(target.as_str()),
                "following redirect"
            );
            request = rebuild_for_redirect(&request, target)?;
        }
    }

    fn name(&self) -> &str {
        "follow_and_retry"
    }
}

fn rebuild_for_redirect(request: &Request, target: HttpUrl) -> Result<Request> {
    request.to_builder().url(target).build()
}

/// `Location` in its canonical casing first, then lowercase. Empty values count as absent.
fn redirect_location(response: &Response) -> Option<String> {
    ["Location", "location"].into_iter().find_map(|name| {
        response
            .header_values(name)
            .into_iter()
            .next()
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

fn resolve_location(current: &HttpUrl, location: &str) -> Result<HttpUrl> {
    if has_http_scheme(location) {
        return HttpUrl::parse(location);
    }
    if location.starts_with("//") {
        return HttpUrl::parse(&format!("{}:{location}", current.scheme()));
    }
    let separator = if location.starts_with('/') { "" } else { "/" };
    HttpUrl::parse(&format!("{}{separator}{location}", current.origin()))
}

fn has_http_scheme(location: &str) -> bool {
    ["http://", "https://"].into_iter().any(|scheme| {
        location
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

pub(crate) fn is_transport_failure(error: &Error) -> bool {
    matches!(error, Error::Transport { .. } | Error::Timeout { .. })
}

/// The target resource plainly does not exist; asking again cannot help.
pub(crate) fn is_one_shot(error: &Error) -> bool {
    error.transport_kind() == Some(TransportErrorKind::NotFound)
}

pub(crate) fn is_recoverable(error: &Error) -> bool {
    if error.is_timeout() {
        return true;
    }
    !matches!(
        error.transport_kind(),
        Some(
            TransportErrorKind::Protocol
                | TransportErrorKind::TlsCertificate
                | TransportErrorKind::TlsPeerUnverified
        )
    )
}
