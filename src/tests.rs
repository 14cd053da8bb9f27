use std::io::Cursor;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::body::RequestBody;
use crate::chain::{Chain, Interceptor};
use crate::client::{Client, ClientBuilder};
use crate::error::{Error, ErrorCode, TimeoutPhase, TransportErrorKind};
use crate::http_url::HttpUrl;
use crate::log::HttpLogInterceptor;
use crate::request::{Method, Request};
use crate::response::Response;
use crate::transport::{StreamingMode, Transport, TransportRequest, TransportResponse};

#[derive(Clone, Debug)]
struct CapturedRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    mode: Option<StreamingMode>,
    platform_redirects: bool,
}

impl CapturedRequest {
    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

type Script = Box<dyn Fn(&TransportRequest<'_>, usize) -> crate::Result<TransportResponse> + Send + Sync>;

/// Transport that records every attempt and answers from a script keyed by attempt number.
struct ScriptedTransport {
    script: Script,
    captured: Mutex<Vec<CapturedRequest>>,
}

impl ScriptedTransport {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&TransportRequest<'_>, usize) -> crate::Result<TransportResponse>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            captured: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.captured.lock().expect("captured lock").len()
    }

    fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("captured lock").clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: TransportRequest<'_>) -> crate::Result<TransportResponse> {
        let attempt = {
            let mut captured = self.captured.lock().expect("captured lock");
            captured.push(CapturedRequest {
                method: request.method,
                url: request.url.as_str().to_owned(),
                headers: request
                    .headers
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.as_str().to_owned(),
                            value.to_str().unwrap_or_default().to_owned(),
                        )
                    })
                    .collect(),
                body: request.body.map(|body| {
                    body.content
                        .content()
                        .map(|content| content.to_vec())
                        .unwrap_or_default()
                }),
                mode: request.body.map(|body| body.mode),
                platform_redirects: request.settings.follow_redirects(),
            });
            captured.len()
        };
        (self.script)(&request, attempt)
    }
}

fn respond(status: u16, headers: &[(&str, &str)], body: &str) -> TransportResponse {
    let mut response = TransportResponse::new(status, Box::new(Cursor::new(body.as_bytes().to_vec())));
    response.headers = headers
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    response.content_length = Some(body.len() as u64);
    response
}

fn timeout(request: &TransportRequest<'_>) -> Error {
    Error::Timeout {
        phase: TimeoutPhase::Read,
        timeout_ms: 10,
        method: request.method,
        url: request.url.as_str().to_owned(),
    }
}

fn failure(kind: TransportErrorKind, request: &TransportRequest<'_>) -> Error {
    Error::Transport {
        kind,
        method: request.method,
        url: request.url.as_str().to_owned(),
        source: format!("scripted {kind} failure").into(),
    }
}

fn client_with<F>(transport: &Arc<ScriptedTransport>, configure: F) -> Client
where
    F: FnOnce(ClientBuilder) -> ClientBuilder,
{
    let transport: Arc<dyn Transport> = transport.clone();
    configure(Client::builder().transport(transport))
        .build()
        .expect("client should build")
}

fn get(url: &str) -> Request {
    Request::get(HttpUrl::parse(url).expect("url should parse"))
}

#[test]
fn timeouts_are_retried_until_the_budget_is_spent() {
    let transport = ScriptedTransport::new(|request, _| Err(timeout(request)));
    let client = client_with(&transport, |builder| builder.max_retry_times(3));

    let error = client
        .new_call(get("http://h/a"))
        .execute()
        .expect_err("every attempt times out");

    assert!(matches!(error, Error::Timeout { .. }));
    assert_eq!(transport.attempts(), 4);
}

#[test]
fn transient_failure_recovers_on_retry() {
    let transport = ScriptedTransport::new(|request, attempt| match attempt {
        1 => Err(failure(TransportErrorKind::Connect, request)),
        _ => Ok(respond(200, &[], "ok")),
    });
    let client = client_with(&transport, |builder| builder);

    let mut response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("second attempt succeeds");

    assert_eq!(response.code(), 200);
    assert_eq!(response.text().expect("body should read"), "ok");
    assert_eq!(transport.attempts(), 2);
}

#[test]
fn redirect_loop_stops_after_max_follows() {
    let transport =
        ScriptedTransport::new(|_, _| Ok(respond(302, &[("Location", "http://h/a")], "")));
    let client = client_with(&transport, |builder| builder.max_follows(2));

    let error = client
        .new_call(get("http://h/a"))
        .execute()
        .expect_err("redirect loop exceeds the limit");

    match error {
        Error::RedirectLimitExceeded {
            follows,
            max_follows,
            method,
            ..
        } => {
            assert_eq!((follows, max_follows), (3, 2));
            assert_eq!(method, Method::Get);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.attempts(), 3);
}

#[test]
fn temporary_redirect_replays_post_with_headers_and_body() {
    let transport = ScriptedTransport::new(|_, attempt| match attempt {
        1 => Ok(respond(307, &[("Location", "http://h/b")], "")),
        _ => Ok(respond(201, &[], "created")),
    });
    let client = client_with(&transport, |builder| builder);
    let request = Request::builder()
        .url(HttpUrl::parse("http://h/a").expect("url should parse"))
        .method(Method::Post)
        .body(RequestBody::from_text("text/plain", "payload"))
        .set_header("X-Test", "1")
        .and_then(|builder| builder.build())
        .expect("request should build");

    let response = client
        .new_call(request)
        .execute()
        .expect("redirected post succeeds");

    assert_eq!(response.code(), 201);
    assert_eq!(response.request().url().as_str(), "http://h/b");
    let captured = transport.captured();
    assert_eq!(captured.len(), 2);
    let replay = &captured[1];
    assert_eq!(replay.method, Method::Post);
    assert_eq!(replay.url, "http://h/b");
    assert_eq!(replay.header_values("x-test"), ["1"]);
    assert_eq!(replay.body.as_deref(), Some(&b"payload"[..]));
    assert_eq!(replay.mode, Some(StreamingMode::FixedLength(7)));
}

#[test]
fn relative_location_resolves_against_request_origin() {
    let transport = ScriptedTransport::new(|request, _| {
        if request.url.encoded_path() == "/a" {
            Ok(respond(301, &[("Location", "/b")], "moved"))
        } else {
            Ok(respond(200, &[("Content-Type", "text/plain")], "ok"))
        }
    });
    let client = client_with(&transport, |builder| builder);

    let mut response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("redirect is followed");

    assert_eq!(response.code(), 200);
    assert_eq!(response.text().expect("body should read"), "ok");
    assert_eq!(response.request().url().as_str(), "http://h/b");
    assert_eq!(transport.attempts(), 2);
}

#[test]
fn lowercase_location_header_is_honored() {
    let transport = ScriptedTransport::new(|_, attempt| match attempt {
        1 => Ok(respond(303, &[("location", "https://other.example/c")], "")),
        _ => Ok(respond(200, &[], "")),
    });
    let client = client_with(&transport, |builder| builder);

    client
        .new_call(get("http://h/a"))
        .execute()
        .expect("redirect is followed");

    assert_eq!(transport.captured()[1].url, "https://other.example/c");
}

#[test]
fn redirect_without_location_is_returned_as_is() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(302, &[("Location", "")], "body")));
    let client = client_with(&transport, |builder| builder);

    let mut response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("response is returned");

    assert_eq!(response.code(), 302);
    assert_eq!(response.text().expect("body should read"), "body");
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn disabled_redirects_return_the_redirect_response() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(302, &[("Location", "/b")], "")));
    let client = client_with(&transport, |builder| builder.follow_redirects(false));

    let response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("response is returned");

    assert_eq!(response.code(), 302);
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn platform_redirects_leave_following_to_the_transport() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(302, &[("Location", "/b")], "")));
    let client = client_with(&transport, |builder| builder.platform_follows_redirects(true));

    let response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("response is returned");

    assert_eq!(response.code(), 302);
    assert_eq!(transport.attempts(), 1);
    assert!(transport.captured()[0].platform_redirects);
}

#[test]
fn certificate_failures_are_not_retried() {
    let transport =
        ScriptedTransport::new(|request, _| Err(failure(TransportErrorKind::TlsCertificate, request)));
    let client = client_with(&transport, |builder| builder);

    let error = client
        .new_call(get("https://h/a"))
        .execute()
        .expect_err("certificate failure surfaces");

    assert_eq!(error.transport_kind(), Some(TransportErrorKind::TlsCertificate));
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn peer_verification_and_protocol_failures_are_not_retried() {
    for kind in [
        TransportErrorKind::TlsPeerUnverified,
        TransportErrorKind::Protocol,
    ] {
        let transport = ScriptedTransport::new(move |request, _| Err(failure(kind, request)));
        let client = client_with(&transport, |builder| builder);

        let error = client
            .new_call(get("https://h/a"))
            .execute()
            .expect_err("failure surfaces");

        assert_eq!(error.transport_kind(), Some(kind));
        assert_eq!(transport.attempts(), 1, "{kind} must not be retried");
    }
}

#[test]
fn missing_resource_failure_is_one_shot() {
    let transport =
        ScriptedTransport::new(|request, _| Err(failure(TransportErrorKind::NotFound, request)));
    let client = client_with(&transport, |builder| builder.max_retry_times(5));

    let error = client
        .new_call(get("http://h/missing"))
        .execute()
        .expect_err("not-found failure surfaces");

    assert_eq!(error.code(), ErrorCode::Transport);
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn disabled_retries_surface_the_first_failure() {
    let transport =
        ScriptedTransport::new(|request, _| Err(failure(TransportErrorKind::Connect, request)));
    let client = client_with(&transport, |builder| {
        builder.retry_on_connection_failure(false)
    });

    let error = client
        .new_call(get("http://h/a"))
        .execute()
        .expect_err("connect failure surfaces");

    assert_eq!(error.transport_kind(), Some(TransportErrorKind::Connect));
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn error_statuses_are_ordinary_responses_read_from_the_error_stream() {
    let transport = ScriptedTransport::new(|_, _| {
        let mut response = respond(404, &[], "success-stream");
        response.error_body = Some(Box::new(Cursor::new(b"not here".to_vec())));
        response.content_length = None;
        Ok(response)
    });
    let client = client_with(&transport, |builder| builder);

    let mut response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("404 is a response");

    assert!(!response.is_successful());
    assert_eq!(response.message(), "Not Found");
    assert_eq!(response.text().expect("body should read"), "not here");
}

#[test]
fn get_requests_send_no_body_and_posts_send_fixed_length() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "")));
    let client = client_with(&transport, |builder| builder);

    client
        .new_call(get("http://h/a"))
        .execute()
        .expect("get succeeds");
    let post = Request::builder()
        .url(HttpUrl::parse("http://h/a").expect("url should parse"))
        .method(Method::Put)
        .body(RequestBody::empty("application/octet-stream"))
        .build()
        .expect("request should build");
    client.new_call(post).execute().expect("put succeeds");

    let captured = transport.captured();
    assert_eq!(captured[0].body, None);
    assert!(captured[0].header_values("content-type").is_empty());
    assert_eq!(captured[1].mode, Some(StreamingMode::Chunked));
    assert_eq!(
        captured[1].header_values("content-type"),
        ["application/octet-stream"]
    );
}

#[test]
fn canceled_call_never_reaches_the_transport() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "ok")));
    let client = client_with(&transport, |builder| builder);
    let call = client.new_call(get("http://h/a"));

    call.cancel();
    assert!(call.is_canceled());
    let error = call.execute().expect_err("canceled call fails");

    assert_eq!(error.code(), ErrorCode::Canceled);
    assert_eq!(transport.attempts(), 0);
}

#[test]
fn cancel_handle_aborts_body_reads() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "payload")));
    let client = client_with(&transport, |builder| builder);
    let call = client.new_call(get("http://h/a"));
    let handle = call.cancel_handle();

    let mut response = call.execute().expect("call succeeds");
    std::thread::spawn(move || handle.cancel())
        .join()
        .expect("cancel thread");

    let error = response.text().expect_err("read after cancel fails");
    match error {
        Error::ReadBody { source } => {
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionAborted);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn call_executes_at_most_once() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "")));
    let client = client_with(&transport, |builder| builder);
    let call = client.new_call(get("http://h/a"));

    call.execute().expect("first execute succeeds");
    assert!(call.is_executed());
    assert!(matches!(call.execute(), Err(Error::AlreadyExecuted)));
    assert!(matches!(
        call.enqueue(|_result: crate::Result<Response>| {}),
        Err(Error::AlreadyExecuted)
    ));
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn enqueue_delivers_the_outcome_on_a_worker_thread() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "async")));
    let client = client_with(&transport, |builder| builder);
    let call = client.new_call(get("http://h/a"));
    let (sender, receiver) = mpsc::channel();

    let worker = call
        .enqueue(move |result: crate::Result<Response>| {
            let outcome = result
                .and_then(|mut response| Ok((response.code(), response.text()?)))
                .map_err(|error| error.code());
            let thread_name = std::thread::current().name().map(str::to_owned);
            let _ = sender.send((outcome, thread_name));
        })
        .expect("enqueue succeeds");
    worker.join().expect("worker thread finishes");

    let (outcome, thread_name) = receiver.recv().expect("callback ran");
    assert_eq!(outcome, Ok((200, "async".to_owned())));
    assert_eq!(thread_name.as_deref(), Some("reqchain-call-h"));
}

#[test]
fn enqueue_reports_failures_to_the_callback() {
    let transport =
        ScriptedTransport::new(|request, _| Err(failure(TransportErrorKind::Protocol, request)));
    let client = client_with(&transport, |builder| builder);
    let (sender, receiver) = mpsc::channel();

    client
        .new_call(get("http://h/a"))
        .enqueue(move |result: crate::Result<Response>| {
            let _ = sender.send(result.map(|response| response.code()).map_err(|error| error.code()));
        })
        .expect("enqueue succeeds")
        .join()
        .expect("worker thread finishes");

    assert_eq!(receiver.recv().expect("callback ran"), Err(ErrorCode::Transport));
}

struct Recording {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for Recording {
    fn intercept(&self, chain: Chain<'_>) -> crate::Result<Response> {
        self.log
            .lock()
            .expect("log lock")
            .push(format!("{}>", self.label));
        assert_eq!(chain.call().original_request().url().as_str(), "http://h/a");
        let request = chain
            .request()
            .to_builder()
            .add_header("X-Seen", self.label)?
            .build()?;
        let response = chain.proceed(request);
        self.log
            .lock()
            .expect("log lock")
            .push(format!("<{}", self.label));
        response
    }

    fn name(&self) -> &str {
        self.label
    }
}

#[test]
fn interceptors_run_in_registration_order_and_unwind_in_reverse() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "")));
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(&transport, |builder| {
        builder
            .interceptor(Recording {
                label: "a",
                log: Arc::clone(&log),
            })
            .interceptor(Recording {
                label: "b",
                log: Arc::clone(&log),
            })
    });

    client
        .new_call(get("http://h/a"))
        .execute()
        .expect("call succeeds");

    assert_eq!(
        *log.lock().expect("log lock"),
        ["a>", "b>", "<b", "<a"].map(str::to_owned)
    );
    let names: Vec<_> = client
        .interceptors()
        .iter()
        .map(|interceptor| interceptor.name())
        .collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(transport.captured()[0].header_values("x-seen"), ["a", "b"]);
}

struct ShortCircuit;

impl Interceptor for ShortCircuit {
    fn intercept(&self, chain: Chain<'_>) -> crate::Result<Response> {
        Ok(Response::builder(chain.request().clone())
            .code(204)
            .message("No Content")
            .build())
    }
}

#[test]
fn interceptor_can_answer_without_proceeding() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "")));
    let client = client_with(&transport, |builder| builder.interceptor(ShortCircuit));

    let response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("short circuit answers");

    assert_eq!(response.code(), 204);
    assert_eq!(transport.attempts(), 0);
}

#[test]
fn proceeding_past_the_last_interceptor_is_an_error() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "")));
    let client = client_with(&transport, |builder| builder);
    let request = get("http://h/a");
    let call = client.new_call(request.clone());

    let chain = Chain::new(&[], 0, request.clone(), call.context());
    let error = chain.proceed(request).expect_err("empty chain cannot proceed");

    assert!(matches!(error, Error::ChainExhausted { index: 0 }));
}

#[test]
fn response_body_limit_applies_to_transport_bodies() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[], "too long")));
    let client = client_with(&transport, |builder| builder.max_response_body_bytes(4));

    let mut response = client
        .new_call(get("http://h/a"))
        .execute()
        .expect("headers arrive");

    assert!(matches!(
        response.text(),
        Err(Error::ResponseBodyTooLarge {
            limit_bytes: 4,
            actual_bytes: 8
        })
    ));
}

#[test]
fn log_interceptor_proceeds_once_and_keeps_the_body_readable() {
    let transport = ScriptedTransport::new(|_, _| Ok(respond(200, &[("Content-Type", "text/plain")], "logged")));
    let client = client_with(&transport, |builder| builder.interceptor(HttpLogInterceptor));
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();

    let mut response = tracing::subscriber::with_default(subscriber, || {
        client.new_call(get("http://h/a?token=secret")).execute()
    })
    .expect("call succeeds");

    assert_eq!(response.text().expect("body is cached"), "logged");
    assert_eq!(transport.attempts(), 1);
}

#[test]
fn log_interceptor_does_not_fail_calls_with_unbufferable_bodies() {
    let transport = ScriptedTransport::new(|_, attempt| {
        let mut response = respond(200, &[], "too long");
        if attempt > 1 {
            response.content_length = None;
        }
        Ok(response)
    });
    let client = client_with(&transport, |builder| {
        builder
            .max_response_body_bytes(4)
            .interceptor(HttpLogInterceptor)
    });
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();

    let (mut declared, mut streamed) = tracing::subscriber::with_default(subscriber, || {
        let declared = client.new_call(get("http://h/a")).execute();
        let streamed = client.new_call(get("http://h/a")).execute();
        (declared, streamed)
    });

    for response in [&mut declared, &mut streamed] {
        let response = response.as_mut().expect("logging keeps the call successful");
        assert_eq!(response.code(), 200);
        assert!(matches!(
            response.text(),
            Err(Error::ResponseBodyTooLarge { limit_bytes: 4, .. })
        ));
    }
}
