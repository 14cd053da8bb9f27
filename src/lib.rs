//! `reqchain` is a small synchronous HTTP client built around an interceptor chain.
//!
//! Every call runs through the interceptors registered on the [`Client`], then
//! through three built-in stages: retry/redirect handling, a cookie stage and
//! the transport stage that performs the I/O.
//!
//! # Quick Start
//!
//! ```no_run
//! use reqchain::prelude::{Client, HttpLogInterceptor, Method, Request, RequestBody};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct CreateItemResponse {
//!     id: String,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .client_name("my-sdk")
//!         .max_retry_times(2)
//!         .interceptor(HttpLogInterceptor)
//!         .build()?;
//!
//!     let request = Request::builder()
//!         .try_url("https://api.example.com/v1/items")?
//!         .method(Method::Post)
//!         .body(RequestBody::json(&serde_json::json!({ "name": "demo" }))?)
//!         .build()?;
//!
//!     let mut response = client.new_call(request).execute()?;
//!     let created: CreateItemResponse = response.json()?;
//!     println!("created id={}", created.id);
//!     Ok(())
//! }
//! ```
//!
//! # Behavior Notes
//!
//! - Non-2xx statuses are ordinary responses.
//! - Transport failures are retried up to `max_retry_times` unless they are
//!   certificate, peer-verification, protocol or not-found failures.
//! - Redirects are followed by the chain up to `max_follows`, replaying the
//!   method, headers and body.

#[cfg(all(not(feature = "tls-rustls-ring"), not(feature = "tls-native")))]
compile_error!("reqchain requires one TLS backend feature: enable `tls-rustls-ring` or `tls-native`");

mod body;
mod call;
mod chain;
mod client;
mod connect;
mod cookie;
mod error;
mod header;
mod http_url;
mod log;
mod proxy;
mod request;
mod response;
mod retry;
mod tls;
mod transport;
mod util;

pub use crate::body::{RequestBody, ResponseBody};
pub use crate::call::{Call, CallContext, Callback, CancelHandle};
pub use crate::chain::{Chain, Interceptor};
pub use crate::client::{Client, ClientBuilder};
pub use crate::connect::ConnectInterceptor;
pub use crate::cookie::CookieInterceptor;
pub use crate::error::{Error, ErrorCode, TimeoutPhase, TransportErrorKind};
pub use crate::header::Header;
pub use crate::http_url::{HttpUrl, HttpUrlBuilder};
pub use crate::log::HttpLogInterceptor;
pub use crate::proxy::ProxyConfig;
pub use crate::request::{Method, Request, RequestBuilder};
pub use crate::response::{Response, ResponseBuilder};
pub use crate::retry::FollowAndRetryInterceptor;
pub use crate::tls::{TlsBackend, TlsOptions, TlsRootStore};
pub use crate::transport::{
    ConnectionSettings, OutgoingBody, StreamingMode, Transport, TransportRequest,
    TransportResponse, UreqTransport,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Call, Callback, CancelHandle, Chain, Client, ClientBuilder, Error, ErrorCode, Header,
        HttpLogInterceptor, HttpUrl, Interceptor, Method, ProxyConfig, Request, RequestBody,
        Response, ResponseBody, Result, TimeoutPhase, TlsOptions, Transport,
        TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
