use crate::Result;
use crate::chain::{Chain, Interceptor};
use crate::response::Response;

/// Cookie stage of the built-in chain. Cookie storage is not implemented, so
/// requests and responses pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct CookieInterceptor;

impl Interceptor for CookieInterceptor {
    fn intercept(&self, chain: Chain<'_>) -> Result<Response> {
        let request = chain.request().clone();
        chain.proceed(request)
    }

    fn name(&self) -> &str {
        "cookie"
    }
}
