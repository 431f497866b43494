#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **supervisor-auth** – Bearer-token authentication for the control plane.
//!
//! The spec's auth requirement (§4.5, §6) is a flat bearer token checked
//! against a configured set — no claims, expiry, or minting. This mirrors
//! the `TokenValidator` seam the teacher workspace (`toka-auth`) defines for
//! its own, heavier JWT implementation, simplified to the contract this
//! system actually needs.

use std::collections::HashSet;

use async_trait::async_trait;

/// Error returned when a bearer token fails validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header (or no bearer scheme) was present.
    #[error("authentication required")]
    MissingToken,
    /// A token was present but didn't match the configured set.
    #[error("invalid bearer token")]
    InvalidToken,
}

/// Verifier trait used by the control plane's auth middleware.
///
/// Kept abstract so tests can substitute a fake validator, and so a future
/// transport (JSON-RPC, gRPC) can reuse the same contract (§9 "Dynamic
/// dispatch").
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a raw bearer token (without the `Bearer ` prefix).
    async fn validate(&self, raw: &str) -> Result<(), AuthError>;
}

/// Validator backed by a fixed set of accepted tokens, loaded from
/// configuration or the `SUPERVISOR_AUTH_TOKEN(S)` environment variables
/// (§6).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashSet<String>,
}

impl StaticTokenValidator {
    /// Build a validator from an explicit token list.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Build a validator that has no configured tokens (used when the
    /// control plane is configured with authentication disabled).
    pub fn disabled() -> Self {
        Self {
            tokens: HashSet::new(),
        }
    }

    /// Whether this validator has no configured tokens (auth effectively
    /// disabled). The service layer decides whether that's acceptable.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, raw: &str) -> Result<(), AuthError> {
        if raw.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        if self.tokens.contains(raw) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Parse the bearer scheme out of a raw `Authorization` header value,
/// returning `None` if it isn't a well-formed `Bearer <token>` header.
pub fn parse_bearer_header(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_token_is_accepted() {
        let validator = StaticTokenValidator::new(["secret-token".to_string()]);
        assert!(validator.validate("secret-token").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let validator = StaticTokenValidator::new(["secret-token".to_string()]);
        assert!(matches!(
            validator.validate("wrong").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn empty_token_is_missing_not_invalid() {
        let validator = StaticTokenValidator::new(["secret-token".to_string()]);
        assert!(matches!(
            validator.validate("").await,
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn parse_bearer_header_extracts_token() {
        assert_eq!(parse_bearer_header("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer_header("Basic abc123"), None);
        assert_eq!(parse_bearer_header("Bearer "), None);
    }
}
