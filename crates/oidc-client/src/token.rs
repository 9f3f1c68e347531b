//! Authorization code exchange
//!
//! Second half of the PKCE flow: the provider redirected back with a code,
//! and we trade it plus the stored verifier for an access/ID token bundle.
//! Authorization codes are single-use, so there is exactly one attempt and
//! no retry; retry policy belongs to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    GRANT_TYPE_AUTHORIZATION_CODE, PARAM_CLIENT_ID, PARAM_CODE, PARAM_CODE_VERIFIER,
    PARAM_GRANT_TYPE, PARAM_REDIRECT_URI,
};
use crate::endpoints::{Endpoints, endpoint_url};
use crate::error::{Error, Result};

/// Response from the token endpoint for an authorization code exchange.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    /// Compact-serialized signed JWT; verify with `Client::parse_claims`
    pub id_token: String,
    #[serde(default)]
    pub state: String,
}

impl fmt::Display for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Access Token -> {}", redact(&self.access_token))?;
        writeln!(f, "Token Type -> {}", self.token_type)?;
        writeln!(f, "Expires In -> {}", self.expires_in)?;
        writeln!(f, "State -> {}", self.state)?;
        writeln!(f, "ID Token -> {}", redact(&self.id_token))
    }
}

/// Keep enough of a token to correlate log lines without leaking it.
fn redact(token: &str) -> String {
    match token.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}

/// Exchange an authorization code for tokens.
///
/// POSTs `grant_type=authorization_code` with the code, redirect URI, client
/// id and PKCE verifier as a form body to `<issuer><token-path>`. Transport
/// failures, non-2xx statuses and undecodable bodies all surface as
/// `Error::TokenExchange`.
pub async fn exchange_code(
    http: &reqwest::Client,
    issuer: &str,
    endpoints: &dyn Endpoints,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<AuthResponse> {
    let url = endpoint_url(issuer, endpoints.token());
    debug!(url, client_id, "exchanging authorization code");

    let response = http
        .post(&url)
        .form(&[
            (PARAM_CODE, code),
            (PARAM_GRANT_TYPE, GRANT_TYPE_AUTHORIZATION_CODE),
            (PARAM_REDIRECT_URI, redirect_uri),
            (PARAM_CLIENT_ID, client_id),
            (PARAM_CODE_VERIFIER, verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::TokenExchange(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<AuthResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}
