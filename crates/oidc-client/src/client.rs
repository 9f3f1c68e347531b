//! Relying-party client for the Authorization Code + PKCE flow
//!
//! Owns the JWKS cache and its background refresh task. Everything else is
//! immutable configuration, so a `Client` can be shared behind an `Arc`.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use crate::claims::{Claims, verify_id_token};
use crate::endpoints::{Endpoints, endpoint_url};
use crate::error::Result;
use crate::keys::{KeyStore, RefreshTask, spawn_refresh_task};
use crate::pkce::{build_authorization_url, compute_challenge, generate_verifier};
use crate::token::{AuthResponse, exchange_code};

/// OIDC client generic over the claims shape `C` decoded from ID tokens.
pub struct Client<C = Claims> {
    http: reqwest::Client,
    issuer: String,
    client_id: String,
    endpoints: Arc<dyn Endpoints>,
    keys: Arc<KeyStore>,
    refresh: Mutex<Option<RefreshTask>>,
    _claims: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> Client<C> {
    /// Create a client and start refreshing the provider's keys every
    /// `key_refresh`.
    ///
    /// The initial key fetch is best-effort: a failure is logged and the
    /// background task (or the first cache miss) retries.
    pub async fn new(
        http: reqwest::Client,
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        endpoints: Arc<dyn Endpoints>,
        key_refresh: Duration,
    ) -> Self {
        let issuer = issuer.into();
        let keys = Arc::new(KeyStore::new(
            http.clone(),
            endpoint_url(&issuer, endpoints.keys()),
        ));

        if let Err(e) = keys.refresh().await {
            warn!(issuer, error = %e, "initial key fetch failed, background refresh will retry");
        }
        let refresh = spawn_refresh_task(keys.clone(), key_refresh);

        Self {
            http,
            issuer,
            client_id: client_id.into(),
            endpoints,
            keys,
            refresh: Mutex::new(Some(refresh)),
            _claims: PhantomData,
        }
    }

    /// Build the provider redirect for a new login attempt.
    ///
    /// Returns the URL and the fresh PKCE verifier. The caller must store
    /// the verifier against `state` and hand it back to
    /// `request_auth_response` on the callback.
    pub fn build_authenticate_redirect<S: AsRef<str>>(
        &self,
        state: &str,
        redirect_uri: &str,
        scopes: &[S],
    ) -> Result<(Url, String)> {
        let verifier = generate_verifier()?;
        let challenge = compute_challenge(&verifier);
        let url = build_authorization_url(
            &self.issuer,
            self.endpoints.as_ref(),
            &self.client_id,
            redirect_uri,
            scopes,
            state,
            &challenge,
        )?;
        Ok((url, verifier))
    }

    /// Exchange the callback's authorization code for tokens.
    pub async fn request_auth_response(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<AuthResponse> {
        exchange_code(
            &self.http,
            &self.issuer,
            self.endpoints.as_ref(),
            &self.client_id,
            code,
            redirect_uri,
            verifier,
        )
        .await
    }

    /// Verify an ID token against the cached keys and decode it into `C`.
    ///
    /// Expiry and audience are not checked here.
    pub async fn parse_claims(&self, id_token: &str) -> Result<C> {
        verify_id_token(&self.keys, id_token).await
    }
}

impl<C> Client<C> {
    /// Stop the background key refresh and wait for it to exit. Verification
    /// keeps working from the last fetched key set.
    pub async fn shutdown(&self) {
        let task = self
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoints(&self) -> Arc<dyn Endpoints> {
        self.endpoints.clone()
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }
}
