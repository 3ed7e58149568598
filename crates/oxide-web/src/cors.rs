//! Cross-origin resource sharing.

use crate::call::{Call, CallResult};
use crate::request::Method;

/// CORS policy installed with [`Router::cors`](crate::Router::cors).
///
/// Preflight requests are answered by halting with 204 before any route
/// runs; every other response gets `Access-Control-Allow-Origin` from an
/// after filter.
#[derive(Debug, Clone)]
pub struct CorsFilter {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    pub allowed_methods: Vec<Method>,
    /// Allowed request headers; `*` allows any.
    pub allowed_headers: Vec<String>,
    /// Preflight cache duration in seconds.
    pub max_age: u32,
}

impl CorsFilter {
    /// Allows every origin.
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Options,
            ],
            allowed_headers: vec!["*".to_string()],
            max_age: 86400,
        }
    }

    /// Allows the given origins only.
    pub fn new(origins: &[&str]) -> Self {
        Self {
            allowed_origins: origins.iter().map(|s| (*s).to_string()).collect(),
            allowed_methods: vec![Method::Get, Method::Post, Method::Put, Method::Delete],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            max_age: 86400,
        }
    }

    /// Sets the allowed methods.
    #[must_use]
    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods.to_vec();
        self
    }

    /// Sets the allowed request headers.
    #[must_use]
    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Returns whether `origin` may access the resources.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }

    fn allow_origin_value(&self, origin: Option<&str>) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some("*".to_string());
        }
        origin.filter(|o| self.allows(o)).map(str::to_string)
    }

    /// Answers preflight requests.
    pub(crate) fn preflight(&self, call: &mut Call) -> CallResult {
        if call.request.method != Method::Options {
            return Ok(());
        }
        let origin = call.request.origin().map(str::to_string);
        let Some(allowed) = self.allow_origin_value(origin.as_deref()) else {
            tracing::debug!(origin = ?origin, "CORS preflight rejected");
            return call.halt_status(403);
        };

        let methods: Vec<&str> = self.allowed_methods.iter().map(Method::as_str).collect();
        let headers = &mut call.response.headers;
        headers.set("Access-Control-Allow-Origin", allowed);
        headers.set("Access-Control-Allow-Methods", methods.join(", "));
        headers.set("Access-Control-Allow-Headers", self.allowed_headers.join(", "));
        headers.set("Access-Control-Max-Age", self.max_age.to_string());
        call.halt_status(204)
    }

    /// Adds the allow-origin header to regular responses.
    pub(crate) fn allow_origin(&self, call: &mut Call) -> CallResult {
        if call.response.headers.contains("Access-Control-Allow-Origin") {
            return Ok(());
        }
        if let Some(allowed) = self.allow_origin_value(call.request.origin()) {
            if allowed != "*" {
                call.response.headers.add("Vary", "Origin");
            }
            call.response
                .headers
                .set("Access-Control-Allow-Origin", allowed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn test_allows() {
        let cors = CorsFilter::new(&["https://example.com"]);
        assert!(cors.allows("https://example.com"));
        assert!(!cors.allows("https://evil.com"));
        assert!(CorsFilter::permissive().allows("https://evil.com"));
    }

    #[test]
    fn test_preflight_halts() {
        let cors = CorsFilter::new(&["https://example.com"]);
        let mut call = Call::new(
            Request::new(Method::Options, "/api").header("Origin", "https://example.com"),
        );
        cors.preflight(&mut call).unwrap();
        assert_eq!(call.halted().and_then(|h| h.status), Some(204));
        assert_eq!(
            call.response.headers.get("Access-Control-Allow-Methods"),
            Some("GET, POST, PUT, DELETE")
        );

        let mut rejected = Call::new(
            Request::new(Method::Options, "/api").header("Origin", "https://evil.com"),
        );
        cors.preflight(&mut rejected).unwrap();
        assert_eq!(rejected.halted().and_then(|h| h.status), Some(403));

        let mut get = Call::new(Request::get("/api"));
        cors.preflight(&mut get).unwrap();
        assert!(!get.is_halted());
    }

    #[test]
    fn test_allow_origin() {
        let cors = CorsFilter::new(&["https://example.com"]);
        let mut call = Call::new(Request::get("/").header("Origin", "https://example.com"));
        cors.allow_origin(&mut call).unwrap();
        assert_eq!(
            call.response.headers.get("Access-Control-Allow-Origin"),
            Some("https://example.com")
        );
        assert_eq!(call.response.headers.get("Vary"), Some("Origin"));

        let mut other = Call::new(Request::get("/").header("Origin", "https://evil.com"));
        cors.allow_origin(&mut other).unwrap();
        assert!(!other.response.headers.contains("Access-Control-Allow-Origin"));
    }
}
