//! Token introspection (RFC 7662) with JWT-profile client authentication
//!
//! Each call mints a fresh client assertion, POSTs it with the token to the
//! provider's introspection endpoint, and reports the `active` flag.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assertion::{ClientKey, generate_assertion};
use crate::constants::{
    CLIENT_ASSERTION_TYPE_JWT_BEARER, PARAM_CLIENT_ASSERTION, PARAM_CLIENT_ASSERTION_TYPE,
    PARAM_TOKEN,
};
use crate::endpoints::{Endpoints, endpoint_url};
use crate::error::{Error, Result};

/// Body of an introspection response. Only `active` is relied upon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntrospectionResult {
    pub active: bool,
}

/// Reports whether a token is currently active at the provider.
///
/// Uses `Pin<Box<dyn Future>>` so implementations can sit behind
/// `Arc<dyn Introspector>`.
pub trait Introspector: Send + Sync {
    fn introspect<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}

/// Introspector authenticating with a private-key JWT client assertion.
pub struct JwtProfileIntrospector {
    http: reqwest::Client,
    issuer: String,
    endpoints: Arc<dyn Endpoints>,
    key: ClientKey,
}

impl JwtProfileIntrospector {
    pub fn new(
        http: reqwest::Client,
        issuer: impl Into<String>,
        endpoints: Arc<dyn Endpoints>,
        key: ClientKey,
    ) -> Self {
        Self {
            http,
            issuer: issuer.into(),
            endpoints,
            key,
        }
    }

    /// Build from a JSON key document held in memory.
    pub fn from_json(
        http: reqwest::Client,
        issuer: impl Into<String>,
        endpoints: Arc<dyn Endpoints>,
        data: &[u8],
    ) -> Result<Self> {
        let key = ClientKey::from_json(data)?;
        Ok(Self::new(http, issuer, endpoints, key))
    }

    /// Build from a JSON key document on disk.
    pub async fn from_file(
        http: reqwest::Client,
        issuer: impl Into<String>,
        endpoints: Arc<dyn Endpoints>,
        path: &Path,
    ) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Io(format!("reading key file {}: {e}", path.display())))?;
        Self::from_json(http, issuer, endpoints, &data)
    }

    pub fn client_id(&self) -> &str {
        &self.key.client_id
    }

    async fn introspect_token(&self, token: &str) -> Result<bool> {
        let assertion = generate_assertion(&self.key, &self.issuer)?;
        let url = endpoint_url(&self.issuer, self.endpoints.introspect());
        debug!(url, client_id = self.key.client_id, "introspecting token");

        let response = self
            .http
            .post(&url)
            .form(&[
                (PARAM_CLIENT_ASSERTION, assertion.as_str()),
                (PARAM_CLIENT_ASSERTION_TYPE, CLIENT_ASSERTION_TYPE_JWT_BEARER),
                (PARAM_TOKEN, token),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("introspection request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Introspection(format!(
                "introspection endpoint returned {status}: {body}"
            )));
        }

        let result = response
            .json::<IntrospectionResult>()
            .await
            .map_err(|e| Error::Introspection(format!("invalid introspection response: {e}")))?;

        let active = if result.active { "true" } else { "false" };
        metrics::counter!("oidc_introspections_total", "active" => active).increment(1);
        Ok(result.active)
    }
}

impl Introspector for JwtProfileIntrospector {
    fn introspect<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(self.introspect_token(token))
    }
}
