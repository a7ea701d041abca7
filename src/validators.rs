//! Capability traits for the checks an application plugs into each scheme.
//!
//! Each trait is implemented for plain closures, so small setups can pass a
//! lambda while real deployments implement the trait on a database-backed type.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::http::PeerCertificate;

/// Looks up the cleartext password of a user in a Digest realm.
#[async_trait]
pub trait PasswordLookup: Send + Sync + 'static {
    async fn lookup(&self, username: &str, realm: &str) -> Option<String>;
}

#[async_trait]
impl<F> PasswordLookup for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
{
    async fn lookup(&self, username: &str, realm: &str) -> Option<String> {
        self(username, realm)
    }
}

/// Accepts or rejects a Basic `username:password` pair.
#[async_trait]
pub trait CredentialValidator: Send + Sync + 'static {
    async fn validate(&self, username: &str, password: &str) -> bool;
}

#[async_trait]
impl<F> CredentialValidator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    async fn validate(&self, username: &str, password: &str) -> bool {
        self(username, password)
    }
}

/// Decides whether a bearer, access or ID token is acceptable.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    async fn validate(&self, token: &str) -> bool;
}

#[async_trait]
impl<F> TokenValidator for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    async fn validate(&self, token: &str) -> bool {
        self(token)
    }
}

/// Decides whether the leaf certificate of a client chain is acceptable.
#[async_trait]
pub trait CertificateValidator: Send + Sync + 'static {
    async fn validate(&self, certificate: &PeerCertificate) -> bool;
}

#[async_trait]
impl<F> CertificateValidator for F
where
    F: Fn(&PeerCertificate) -> bool + Send + Sync + 'static,
{
    async fn validate(&self, certificate: &PeerCertificate) -> bool {
        self(certificate)
    }
}

/// Pins client certificates by their SHA-256 fingerprint.
#[derive(Debug, Clone, Default)]
pub struct FingerprintAllowList {
    fingerprints: HashSet<String>,
}

impl FingerprintAllowList {
    pub fn new<I, S>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for fp in fingerprints {
            list = list.allow(fp.as_ref());
        }
        list
    }

    /// Adds a fingerprint. Colons and case are ignored, so the output of
    /// `openssl x509 -fingerprint -sha256` can be pasted as is.
    pub fn allow(mut self, fingerprint: &str) -> Self {
        self.fingerprints.insert(normalize_fingerprint(fingerprint));
        self
    }

    pub fn contains(&self, certificate: &PeerCertificate) -> bool {
        self.fingerprints.contains(&certificate.fingerprint_sha256())
    }
}

#[async_trait]
impl CertificateValidator for FingerprintAllowList {
    async fn validate(&self, certificate: &PeerCertificate) -> bool {
        self.contains(certificate)
    }
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
