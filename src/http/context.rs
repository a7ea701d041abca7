use super::http_value::HttpMethod;
use super::request::HttpRequest;
use super::response::HttpResponse;
use crate::extensions::Params;
use crate::token::Token;

/// The request context handed through the middleware chain: the inbound
/// request, the response being built, and request-scoped `Params`.
#[derive(Debug, Default)]
pub struct HttpReqCtx {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub params: Params,
}

impl HttpReqCtx {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            response: HttpResponse::default(),
            params: Params::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn method(&self) -> HttpMethod {
        self.request.method
    }

    /// The token attached by the authentication middleware, if any.
    pub fn token(&self) -> Option<&Token> {
        self.params.get::<Token>()
    }
}
