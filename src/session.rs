use crate::http::HttpRequest;

/// Derives the key under which a request's tokens live in a `TokenStore`.
pub trait SessionIdExtractor: Send + Sync + 'static {
    fn session_id(&self, request: &HttpRequest) -> Option<String>;
}

impl<F> SessionIdExtractor for F
where
    F: Fn(&HttpRequest) -> Option<String> + Send + Sync + 'static,
{
    fn session_id(&self, request: &HttpRequest) -> Option<String> {
        self(request)
    }
}

/// Reads the session id from a named cookie.
#[derive(Debug, Clone)]
pub struct CookieSession {
    name: String,
}

impl CookieSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SessionIdExtractor for CookieSession {
    fn session_id(&self, request: &HttpRequest) -> Option<String> {
        request.cookie(&self.name).filter(|id| !id.is_empty())
    }
}

/// Reads the session id from a request header, e.g. `X-Client-Id`.
#[derive(Debug, Clone)]
pub struct HeaderSession {
    name: String,
}

impl HeaderSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SessionIdExtractor for HeaderSession {
    fn session_id(&self, request: &HttpRequest) -> Option<String> {
        request
            .header(&self.name)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Uses one fixed key for every request, which suits a service that holds a
/// single machine-to-machine token.
#[derive(Debug, Clone)]
pub struct FixedSession(pub String);

impl SessionIdExtractor for FixedSession {
    fn session_id(&self, _request: &HttpRequest) -> Option<String> {
        Some(self.0.clone())
    }
}
