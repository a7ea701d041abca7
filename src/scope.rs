//! Scope checks run after authentication.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::app::middleware::{AsyncMiddleware, BoxFuture, Next};
use crate::error::AuthError;
use crate::http::HttpReqCtx;

/// True when every required scope was granted. Vacuously true for an empty
/// requirement.
pub fn has_all_scopes<S: AsRef<str>>(granted: &HashSet<&str>, required: &[S]) -> bool {
    required.iter().all(|scope| granted.contains(scope.as_ref()))
}

/// True when at least one required scope was granted. Always false for an
/// empty requirement.
pub fn has_any_scopes<S: AsRef<str>>(granted: &HashSet<&str>, required: &[S]) -> bool {
    required.iter().any(|scope| granted.contains(scope.as_ref()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    All,
    Any,
}

/// Middleware that denies requests whose token lacks the required scopes.
///
/// It must run after an authentication layer that attached a token: without
/// one the answer is `401` "no token in context", with one that falls short
/// it is `403` "insufficient scopes".
#[derive(Debug, Clone)]
pub struct RequireScopes {
    required: Arc<[String]>,
    mode: Match,
}

impl RequireScopes {
    pub fn all<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            mode: Match::All,
        }
    }

    pub fn any<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            mode: Match::Any,
        }
    }

    /// The authorization decision for one context.
    pub fn check(&self, ctx: &HttpReqCtx) -> Result<(), AuthError> {
        let token = ctx.token().ok_or(AuthError::NoTokenInContext)?;
        let granted = token.scopes();
        let allowed = match self.mode {
            Match::All => has_all_scopes(&granted, &self.required[..]),
            Match::Any => has_any_scopes(&granted, &self.required[..]),
        };
        if allowed {
            Ok(())
        } else {
            debug!(required = ?self.required, granted = %token.scope, "insufficient scopes");
            Err(AuthError::InsufficientScope)
        }
    }
}

impl AsyncMiddleware for RequireScopes {
    fn handle(&self, mut ctx: HttpReqCtx, next: Next) -> BoxFuture<HttpReqCtx> {
        match self.check(&ctx) {
            Ok(()) => next(ctx),
            Err(err) => Box::pin(async move {
                ctx.response = err.into_response();
                ctx
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set<'a>(scopes: &[&'a str]) -> HashSet<&'a str> {
        scopes.iter().copied().collect()
    }

    #[test]
    fn all_scopes() {
        assert!(has_all_scopes(&set(&["read", "write", "profile"]), &["read", "write"]));
        assert!(!has_all_scopes(&set(&["read", "profile"]), &["read", "write"]));
    }

    #[test]
    fn any_scopes() {
        assert!(!has_any_scopes(&set(&["profile", "email"]), &["read", "write"]));
        assert!(has_any_scopes(&set(&["read", "profile"]), &["read", "write"]));
    }

    #[test]
    fn empty_requirement_is_asymmetric() {
        let none: [&str; 0] = [];
        assert!(has_all_scopes(&set(&[]), &none));
        assert!(has_all_scopes(&set(&["read"]), &none));
        assert!(!has_any_scopes(&set(&["read"]), &none));
    }
}
