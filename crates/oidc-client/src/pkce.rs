//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the
//! authorization flow. The verifier stays with the caller (session or
//! cookie, keyed by `state`) and is sent during token exchange; the
//! challenge goes into the authorization URL so the provider can check the
//! exchange came from the party that started the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::{
    CODE_CHALLENGE_METHOD_S256, PARAM_CLIENT_ID, PARAM_CODE_CHALLENGE,
    PARAM_CODE_CHALLENGE_METHOD, PARAM_REDIRECT_URI, PARAM_RESPONSE_TYPE, PARAM_SCOPE,
    PARAM_STATE, RESPONSE_TYPE_CODE, VERIFIER_BYTES,
};
use crate::endpoints::{Endpoints, endpoint_url};
use crate::error::{Error, Result};

/// Generate a cryptographically random PKCE code verifier.
///
/// Reads `VERIFIER_BYTES` from the OS entropy source and encodes them as
/// URL-safe base64 without padding (43 characters). A new verifier must be
/// generated for every authorization attempt.
pub fn generate_verifier() -> Result<String> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| Error::Randomness(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization URL with all required OAuth parameters.
///
/// Scopes are joined with single spaces in the order given; they are not
/// deduplicated or validated. Every value is form-encoded by `url`.
pub fn build_authorization_url<S: AsRef<str>>(
    issuer: &str,
    endpoints: &dyn Endpoints,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[S],
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let base = endpoint_url(issuer, endpoints.authorize());
    let mut url = Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;

    let scope = scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");

    url.query_pairs_mut()
        .append_pair(PARAM_CLIENT_ID, client_id)
        .append_pair(PARAM_REDIRECT_URI, redirect_uri)
        .append_pair(PARAM_SCOPE, &scope)
        .append_pair(PARAM_RESPONSE_TYPE, RESPONSE_TYPE_CODE)
        .append_pair(PARAM_STATE, state)
        .append_pair(PARAM_CODE_CHALLENGE, challenge)
        .append_pair(PARAM_CODE_CHALLENGE_METHOD, CODE_CHALLENGE_METHOD_S256);

    Ok(url)
}
