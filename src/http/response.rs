use std::collections::HashMap;

use super::http_value::{StatusCode, header_names};

/// The response written by a middleware or handler.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Sets a header (name stored lowercase), builder style.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header_names::LOCATION)
    }

    pub fn www_authenticate(&self) -> Option<&str> {
        self.header(header_names::WWW_AUTHENTICATE)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK, Vec::new())
    }
}

pub mod response_templates {
    use super::HttpResponse;
    use crate::http::http_value::{StatusCode, header_names};

    pub fn normal_response(status: StatusCode, body: impl Into<Vec<u8>>) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    pub fn return_status(status: StatusCode) -> HttpResponse {
        normal_response(status, Vec::new())
    }

    pub fn text_response(body: impl Into<String>) -> HttpResponse {
        normal_response(StatusCode::OK, body.into().into_bytes())
            .with_header(header_names::CONTENT_TYPE, "text/plain; charset=utf-8")
    }

    pub fn json_response(status: StatusCode, body: &serde_json::Value) -> HttpResponse {
        let bytes = serde_json::to_vec(body).unwrap_or_default();
        normal_response(status, bytes).with_header(header_names::CONTENT_TYPE, "application/json")
    }

    /// 302 Found pointing at `location`.
    pub fn redirect_response(location: impl Into<String>) -> HttpResponse {
        return_status(StatusCode::FOUND).with_header(header_names::LOCATION, location)
    }
}
