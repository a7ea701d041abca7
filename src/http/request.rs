use std::collections::HashMap;
use std::fmt;

use ring::digest;

use super::http_value::{HttpMethod, header_names};
use crate::url_encoding::{encode_pairs, parse_query};

/// A DER encoded X.509 certificate presented by the peer during an already
/// completed TLS handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    der: Vec<u8>,
}

impl PeerCertificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Lowercase hex SHA-256 over the DER bytes, the usual pinning fingerprint.
    pub fn fingerprint_sha256(&self) -> String {
        let hash = digest::digest(&digest::SHA256, &self.der);
        hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCertificate")
            .field("len", &self.der.len())
            .field("sha256", &self.fingerprint_sha256())
            .finish()
    }
}

#[cfg(feature = "tls")]
impl From<&rustls::pki_types::CertificateDer<'_>> for PeerCertificate {
    fn from(cert: &rustls::pki_types::CertificateDer<'_>) -> Self {
        Self::from_der(cert.as_ref().to_vec())
    }
}

/// Collects the peer chain of a finished rustls server handshake, leaf first.
#[cfg(feature = "tls")]
pub fn peer_chain(conn: &rustls::ServerConnection) -> Vec<PeerCertificate> {
    conn.peer_certificates()
        .map(|chain| chain.iter().map(PeerCertificate::from).collect())
        .unwrap_or_default()
}

/// Represents the inbound request as seen by the authentication layer.
///
/// Header names are stored lowercase. The query string is kept decoded and in
/// its original order so flows can strip a parameter and re-serialize.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub peer_certificates: Vec<PeerCertificate>,
    target: String,
}

impl HttpRequest {
    /// Builds a request from a method and a request target such as `/cb?code=1`.
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query(q)),
            None => (target.clone(), Vec::new()),
        };
        Self {
            method,
            path,
            query,
            headers: HashMap::new(),
            peer_certificates: Vec::new(),
            target,
        }
    }

    /// Adds a header, builder style.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Appends a certificate to the peer chain, builder style.
    pub fn with_peer_certificate(mut self, cert: PeerCertificate) -> Self {
        self.peer_certificates.push(cert);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(header_names::AUTHORIZATION)
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Removes every occurrence of a query parameter and returns the first value.
    pub fn remove_query_param(&mut self, name: &str) -> Option<String> {
        let removed = self.query_param(name).map(str::to_string);
        if removed.is_some() {
            self.query.retain(|(k, _)| k != name);
            self.target = if self.query.is_empty() {
                self.path.clone()
            } else {
                format!("{}?{}", self.path, encode_pairs(&self.query))
            };
        }
        removed
    }

    /// The request target exactly as received (path plus raw query).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Reads one cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header(header_names::COOKIE)?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new(HttpMethod::GET, "/")
    }
}

/// Helpers to build common requests, mostly for tests and adapters.
pub mod request_templates {
    use super::HttpRequest;
    use crate::http::http_value::HttpMethod;

    pub fn get_request<T: Into<String>>(target: T) -> HttpRequest {
        HttpRequest::new(HttpMethod::GET, target)
    }

    pub fn post_request<T: Into<String>>(target: T) -> HttpRequest {
        HttpRequest::new(HttpMethod::POST, target)
    }
}
