use std::collections::VecDeque;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;

use crate::http::HttpMethod;
use crate::url_encoding::encode_pairs;

/// Outbound request to a token, device or discovery endpoint.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl ClientRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::GET,
            url: url.into(),
            headers: vec![("Accept".into(), "application/json".into())],
            body: None,
            timeout: None,
        }
    }

    /// `application/x-www-form-urlencoded` POST, the encoding every token
    /// endpoint expects.
    pub fn form_post<K, V>(url: impl Into<String>, form: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            method: HttpMethod::POST,
            url: url.into(),
            headers: vec![
                ("Content-Type".into(), "application/x-www-form-urlencoded".into()),
                ("Accept".into(), "application/json".into()),
            ],
            body: Some(encode_pairs(form).into_bytes()),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded form body, mostly useful when asserting on recorded requests.
    pub fn form(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| crate::url_encoding::parse_query(&String::from_utf8_lossy(body)))
            .unwrap_or_default()
    }

    pub fn form_value(&self, name: &str) -> Option<String> {
        self.form().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Response from an outbound call.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        let mut resp = Self::new(status, serde_json::to_vec(body).unwrap_or_default());
        resp.headers.push(("Content-Type".into(), "application/json".into()));
        resp
    }
}

/// Error type for HTTP client operations.
pub type HttpClientError = Box<dyn Error + Send + Sync>;

pub type ClientFuture = Pin<Box<dyn Future<Output = Result<ClientResponse, HttpClientError>> + Send + 'static>>;

/// Generic HTTP client interface for the outbound side of the OAuth flows.
pub trait OAuthHttpClient: Send + Sync + 'static {
    fn execute(&self, request: ClientRequest) -> ClientFuture;
}

/// Scripted client for tests.
///
/// Responses are registered per URL. Several responses for one URL are
/// served in order and the last one keeps being served. Every executed
/// request is recorded.
#[derive(Clone, Default)]
pub struct InMemoryHttpClient {
    responses: Arc<DashMap<String, VecDeque<ClientResponse>>>,
    default_response: Option<ClientResponse>,
    requests: Arc<Mutex<Vec<ClientRequest>>>,
    latency: Option<Duration>,
}

impl InMemoryHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that answers unknown URLs with `response`.
    pub fn with_default(response: ClientResponse) -> Self {
        Self {
            default_response: Some(response),
            ..Self::default()
        }
    }

    /// Delays every response, which lets tests overlap concurrent calls.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a response for a URL.
    pub fn insert_response(&self, url: impl Into<String>, response: ClientResponse) {
        self.responses.entry(url.into()).or_default().push_back(response);
    }

    pub fn requests(&self) -> Vec<ClientRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_to(&self, url: &str) -> Vec<ClientRequest> {
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }

    fn next_response(&self, url: &str) -> Option<ClientResponse> {
        let mut queue = self.responses.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl OAuthHttpClient for InMemoryHttpClient {
    fn execute(&self, request: ClientRequest) -> ClientFuture {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let response = self
            .next_response(&request.url)
            .or_else(|| self.default_response.clone());
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            response.ok_or_else(|| HttpClientError::from(format!("no mock response for {}", request.url)))
        })
    }
}

/// Placeholder used when no real client is compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledHttpClient;

impl OAuthHttpClient for DisabledHttpClient {
    fn execute(&self, request: ClientRequest) -> ClientFuture {
        Box::pin(async move {
            Err::<ClientResponse, _>(HttpClientError::from(format!(
                "no HTTP client configured for {}",
                request.url
            )))
        })
    }
}

/// Production client backed by `reqwest`. Redirects are never followed, so a
/// misconfigured token endpoint cannot bounce credentials elsewhere.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
    pub fn new() -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("starberry_auth/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest")]
impl OAuthHttpClient for ReqwestHttpClient {
    fn execute(&self, request: ClientRequest) -> ClientFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())?;
            let mut builder = client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let body = response.bytes().await?.to_vec();
            Ok::<_, HttpClientError>(ClientResponse { status, headers, body })
        })
    }
}

/// The client used when none is configured explicitly.
pub fn default_http_client() -> Arc<dyn OAuthHttpClient> {
    #[cfg(feature = "reqwest")]
    {
        match ReqwestHttpClient::new() {
            Ok(client) => return Arc::new(client),
            Err(err) => tracing::warn!(error = %err, "could not build reqwest client"),
        }
    }
    Arc::new(DisabledHttpClient)
}
