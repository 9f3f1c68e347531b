//! ID token verification and claims decoding
//!
//! Verification resolves the token's `kid` against the `KeyStore`, checks
//! the RSA signature, and decodes the payload into whatever shape the
//! caller asks for. It deliberately stops there: expiry and audience are
//! checked by the separate `Claims::validate` step.

use std::collections::HashMap;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::keys::KeyStore;

/// Signature algorithms accepted on ID tokens.
const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Verify an ID token's signature and decode its payload into `C`.
///
/// A `kid` missing from the store triggers exactly one synchronous refresh
/// before failing with `Error::KeyNotFound`; the provider may have rotated
/// keys since the last scheduled refresh.
pub async fn verify_id_token<C: DeserializeOwned>(store: &KeyStore, id_token: &str) -> Result<C> {
    let header = jsonwebtoken::decode_header(id_token)
        .map_err(|e| Error::MalformedToken(format!("unparsable token header: {e}")))?;

    if !RSA_ALGORITHMS.contains(&header.alg) {
        return Err(Error::MalformedToken(format!(
            "unsupported signature algorithm {:?}",
            header.alg
        )));
    }

    let kid = header
        .kid
        .ok_or_else(|| Error::MalformedToken("token header has no kid".into()))?;

    let key = match store.lookup(&kid) {
        Some(key) => key,
        None => {
            debug!(kid, "signing key not cached, refreshing key set");
            let refresh_failure = match store.refresh().await {
                Ok(_) => None,
                Err(e) => {
                    warn!(kid, error = %e, "key refresh on cache miss failed");
                    Some(e)
                }
            };
            store.lookup(&kid).ok_or_else(|| match refresh_failure {
                Some(e) => Error::KeyNotFound(format!("kid {kid} not cached and refresh failed: {e}")),
                None => Error::KeyNotFound(format!("kid {kid} not in key set after refresh")),
            })?
        }
    };

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<C>(id_token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::Json(_) => Error::ClaimsDecode(e.to_string()),
            ErrorKind::Base64(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
                Error::MalformedToken(e.to_string())
            }
            _ => Error::SignatureVerification(e.to_string()),
        })
}

/// The `aud` claim: a single string or an array of strings on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Audience(Vec<String>);

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        self.0.iter().any(|a| a == audience)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(aud) => Audience(vec![aud]),
            OneOrMany::Many(auds) => Audience(auds),
        })
    }
}

/// Standard OIDC profile claims plus Zitadel project roles.
///
/// Everything except `sub` is optional on the wire and defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub auth_time: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preferred_username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub picture: String,
    /// role name -> organization id -> organization domain
    #[serde(default, rename = "urn:zitadel:iam:org:project:roles")]
    pub roles: HashMap<String, HashMap<String, String>>,
}

impl Claims {
    /// Role names granted to the subject, sorted.
    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check expiry against `now` (unix seconds) and that `expected_audience`
    /// is among the token's audiences.
    pub fn validate(&self, expected_audience: &str, now: i64) -> Result<()> {
        if self.exp <= now {
            return Err(Error::ClaimsValidation(format!(
                "token expired at {} (now {now})",
                self.exp
            )));
        }
        if !self.aud.contains(expected_audience) {
            return Err(Error::ClaimsValidation(format!(
                "audience {:?} does not include {expected_audience}",
                self.aud.0
            )));
        }
        Ok(())
    }
}
