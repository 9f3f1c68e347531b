//! Error types for OIDC client operations

/// Errors from OIDC client operations.
///
/// Verification failures are split so callers can tell a transient
/// condition (`KeyNotFound`, `KeyRefresh`) from a token that must be
/// rejected outright (`SignatureVerification`, `MalformedToken`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entropy source failed: {0}")]
    Randomness(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("signing key not found: {0}")]
    KeyNotFound(String),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("claims decode failed: {0}")]
    ClaimsDecode(String),

    #[error("claims validation failed: {0}")]
    ClaimsValidation(String),

    #[error("client key decode failed: {0}")]
    KeyDecode(String),

    #[error("client assertion signing failed: {0}")]
    Signing(String),

    #[error("key set refresh failed: {0}")]
    KeyRefresh(String),

    #[error("introspection failed: {0}")]
    Introspection(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether retrying later could succeed without a different token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::KeyNotFound(_) | Error::KeyRefresh(_))
    }
}

/// Result alias for OIDC client operations.
pub type Result<T> = std::result::Result<T, Error>;
