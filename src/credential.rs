//! Per-scheme extraction of the proof a client presents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::AuthError;
use crate::http::{HttpRequest, PeerCertificate};
use crate::url_encoding::unquote;

/// A decoded `Authorization: Basic` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The fields of an `Authorization: Digest` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestParams {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
}

/// Whatever proof the request carried, tagged by scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    Basic(BasicCredentials),
    Bearer(String),
    Digest(DigestParams),
    ClientCertificate(PeerCertificate),
}

impl Credential {
    /// Picks the scheme from the `Authorization` header, falling back to the
    /// TLS peer certificate when no header is present.
    pub fn from_request(request: &HttpRequest) -> Result<Credential, AuthError> {
        let Some(header) = request.authorization() else {
            return extract_client_certificate(request).map(Credential::ClientCertificate);
        };
        let (scheme, _) = split_scheme(header).ok_or(AuthError::MalformedCredential)?;
        match scheme.to_ascii_lowercase().as_str() {
            "basic" => extract_basic(request).map(Credential::Basic),
            "bearer" => extract_bearer(request).map(Credential::Bearer),
            "digest" => extract_digest(request).map(Credential::Digest),
            _ => Err(AuthError::MalformedCredential),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Credential::Basic(_) => "Basic",
            Credential::Bearer(_) => "Bearer",
            Credential::Digest(_) => "Digest",
            Credential::ClientCertificate(_) => "mTLS",
        }
    }
}

/// Splits `Scheme rest` at the first space.
fn split_scheme(header: &str) -> Option<(&str, &str)> {
    let header = header.trim();
    match header.split_once(' ') {
        Some((scheme, rest)) => Some((scheme, rest.trim())),
        None if !header.is_empty() => Some((header, "")),
        None => None,
    }
}

/// Returns the header payload when the `Authorization` header uses `scheme`.
/// Scheme names compare case-insensitively.
fn authorization_payload<'a>(request: &'a HttpRequest, scheme: &str) -> Result<&'a str, AuthError> {
    let header = request.authorization().ok_or(AuthError::MissingCredential)?;
    match split_scheme(header) {
        Some((name, payload)) if name.eq_ignore_ascii_case(scheme) => Ok(payload),
        _ => Err(AuthError::MissingCredential),
    }
}

pub fn extract_basic(request: &HttpRequest) -> Result<BasicCredentials, AuthError> {
    let payload = authorization_payload(request, "Basic")?;
    let decoded = STANDARD
        .decode(payload)
        .map_err(|_| AuthError::MalformedCredential)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedCredential)?;
    let (username, password) = decoded.split_once(':').ok_or(AuthError::MalformedCredential)?;
    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

pub fn extract_bearer(request: &HttpRequest) -> Result<String, AuthError> {
    let token = authorization_payload(request, "Bearer")?;
    if token.is_empty() {
        return Err(AuthError::MalformedCredential);
    }
    Ok(token.to_string())
}

pub fn extract_digest(request: &HttpRequest) -> Result<DigestParams, AuthError> {
    let payload = authorization_payload(request, "Digest")?;
    parse_digest_params(payload)
}

/// The leaf of the already negotiated peer chain.
pub fn extract_client_certificate(request: &HttpRequest) -> Result<PeerCertificate, AuthError> {
    request
        .peer_certificates
        .first()
        .cloned()
        .ok_or(AuthError::MissingCredential)
}

/// Parses `k="v", k=v, ...` and checks the fields every Digest response needs.
pub fn parse_digest_params(payload: &str) -> Result<DigestParams, AuthError> {
    let mut params = DigestParams::default();
    for item in split_unquoted_commas(payload) {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let value = unquote(value);
        match key.trim().to_ascii_lowercase().as_str() {
            "username" => params.username = value,
            "realm" => params.realm = value,
            "nonce" => params.nonce = value,
            "uri" => params.uri = value,
            "response" => params.response = value,
            "qop" => params.qop = Some(value),
            "nc" => params.nc = Some(value),
            "cnonce" => params.cnonce = Some(value),
            "algorithm" => params.algorithm = Some(value),
            "opaque" => params.opaque = Some(value),
            _ => {}
        }
    }
    let required = [
        &params.username,
        &params.realm,
        &params.nonce,
        &params.uri,
        &params.response,
    ];
    if required.iter().any(|field| field.is_empty()) {
        return Err(AuthError::MalformedCredential);
    }
    Ok(params)
}

/// Splits on commas that are not inside a quoted-string.
fn split_unquoted_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}
