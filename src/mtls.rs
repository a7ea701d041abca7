use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::credential::extract_client_certificate;
use crate::error::AuthError;
use crate::http::HttpReqCtx;
use crate::layer::{AuthDecision, Authenticator};
use crate::validators::CertificateValidator;

/// Mutual TLS: accepts the request when the transport already negotiated a
/// client chain and the leaf certificate passes the validator. The accepted
/// certificate is stored in the request `Params`.
pub struct MtlsAuth {
    validator: Arc<dyn CertificateValidator>,
}

impl MtlsAuth {
    pub fn new(validator: impl CertificateValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

#[async_trait]
impl Authenticator for MtlsAuth {
    fn scheme(&self) -> &'static str {
        "mtls"
    }

    async fn authenticate(&self, ctx: &mut HttpReqCtx) -> AuthDecision {
        let certificate = match extract_client_certificate(&ctx.request) {
            Ok(certificate) => certificate,
            Err(err) => return AuthDecision::Deny(err),
        };
        if !self.validator.validate(&certificate).await {
            return AuthDecision::Deny(AuthError::InvalidCredential);
        }
        debug!(fingerprint = %certificate.fingerprint_sha256(), "client certificate accepted");
        ctx.params.set(certificate);
        AuthDecision::Proceed(None)
    }
}
