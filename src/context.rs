//! Minimal in-process request/response model consumed by the routing core.
//!
//! The transport is someone else's job; these types carry only what endpoint
//! selection and link generation read: method, path, content type, scheme and
//! host, plus the response status the terminal endpoints write.

use crate::endpoint::Endpoint;
use crate::route_values::RouteValueDictionary;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, StatusCode};
use std::sync::Arc;

/// Inbound request as seen by the matcher.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub scheme: String,
    /// Mount point of the application, e.g. `/app`. Empty when mounted at root.
    pub path_base: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            scheme: "http".to_string(),
            path_base: String::new(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
        }
    }

    /// Builder-style header insertion; invalid header text is ignored.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_content_type(self, content_type: &str) -> Self {
        self.with_header(CONTENT_TYPE, content_type)
    }

    #[must_use]
    pub fn with_host(self, host: &str) -> Self {
        self.with_header(HOST, host)
    }

    #[must_use]
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    /// The `Content-Type` header, if present, non-empty and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.headers.get(HOST).and_then(|v| v.to_str().ok())
    }
}

/// Response written by endpoint delegates.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

/// Per-request state threaded through matching and dispatch.
#[derive(Debug, Clone)]
pub struct HttpContext {
    pub request: HttpRequest,
    pub response: HttpResponse,
    /// Endpoint chosen by the router, if any.
    pub endpoint: Option<Arc<Endpoint>>,
    /// Route values of the chosen endpoint (ambient values for link generation).
    pub route_values: RouteValueDictionary,
}

impl HttpContext {
    #[must_use]
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            response: HttpResponse::default(),
            endpoint: None,
            route_values: RouteValueDictionary::new(),
        }
    }
}

/// Handler attached to an endpoint.
///
/// Errors are user failures: the router returns them to the caller untouched.
pub type RequestDelegate = Arc<dyn Fn(&mut HttpContext) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`RequestDelegate`].
pub fn request_delegate<F>(handler: F) -> RequestDelegate
where
    F: Fn(&mut HttpContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Delegate that leaves the default `200 OK` response untouched.
#[must_use]
pub fn empty_delegate() -> RequestDelegate {
    request_delegate(|_| Ok(()))
}
