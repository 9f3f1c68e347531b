//! JWKS cache with background refresh
//!
//! Holds the provider's current signing keys by key id. A refresh fetches
//! the whole key set, decodes it outside the lock, then swaps the mapping
//! in one write-locked clear-and-repopulate, so a reader sees either the
//! previous set or the next one and never a mix. A failed refresh leaves the
//! previous keys in place: stale keys still verify tokens, an empty cache
//! verifies nothing.
//!
//! Lookups take the read lock only long enough to clone one key and never
//! hold it across an await.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::constants::MIN_KEY_REFRESH;
use crate::error::{Error, Result};

/// A JWK as published by the provider. Only RSA signing keys are kept.
#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

impl Jwk {
    /// Convert to a verification key, or `None` when this entry cannot verify
    /// RSA signatures (other key types, encryption keys, missing fields).
    fn into_decoding_key(self) -> Option<(String, DecodingKey)> {
        let kid = self.kid?;
        if self.kty != "RSA" || self.key_use.as_deref().is_some_and(|u| u != "sig") {
            debug!(kid, kty = self.kty, "skipping non-RSA-signing key");
            return None;
        }
        let (n, e) = (self.n?, self.e?);
        match DecodingKey::from_rsa_components(&n, &e) {
            Ok(key) => Some((kid, key)),
            Err(err) => {
                warn!(kid, error = %err, "skipping key with invalid RSA components");
                None
            }
        }
    }
}

/// Thread-safe cache of the provider's signing keys.
pub struct KeyStore {
    http: reqwest::Client,
    url: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    #[cfg(test)]
    replace_pause: Duration,
}

impl KeyStore {
    /// Create an empty store that fetches its key set from `url`.
    ///
    /// Nothing is fetched until `refresh()` is called.
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            keys: RwLock::new(HashMap::new()),
            #[cfg(test)]
            replace_pause: Duration::ZERO,
        }
    }

    /// Fetch the key set and replace the cached mapping with it.
    ///
    /// Returns the number of usable keys installed. On any fetch or decode
    /// failure the cache is left untouched and `Error::KeyRefresh` returned.
    pub async fn refresh(&self) -> Result<usize> {
        match self.fetch().await {
            Ok(fresh) => {
                let count = fresh.len();
                self.replace(fresh);
                metrics::counter!("oidc_jwks_refresh_total", "outcome" => "success").increment(1);
                info!(url = self.url, keys = count, "refreshed signing keys");
                Ok(count)
            }
            Err(e) => {
                metrics::counter!("oidc_jwks_refresh_total", "outcome" => "failure").increment(1);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<(String, DecodingKey)>> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::KeyRefresh(format!("key set request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::KeyRefresh(format!(
                "keys endpoint returned {status}: {body}"
            )));
        }

        let set = response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::KeyRefresh(format!("invalid key set: {e}")))?;

        Ok(set
            .keys
            .into_iter()
            .filter_map(Jwk::into_decoding_key)
            .collect())
    }

    /// Clear and repopulate under one write guard.
    pub(crate) fn replace(&self, fresh: Vec<(String, DecodingKey)>) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.clear();
        for (kid, key) in fresh {
            keys.insert(kid, key);
            #[cfg(test)]
            if !self.replace_pause.is_zero() {
                std::thread::sleep(self.replace_pause);
            }
        }
    }

    /// Look up the verification key for `kid`.
    pub fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid).cloned()
    }

    /// Sorted key ids of the current mapping, taken under a single read guard.
    pub fn key_ids(&self) -> Vec<String> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Handle to the background refresh task.
///
/// `shutdown()` stops the task and waits for it; dropping the handle
/// aborts it.
pub struct RefreshTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Signal the task to stop and wait until it has exited.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "key refresh task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawn a task that refreshes `store` every `interval` until shut down.
///
/// The first tick is skipped: callers populate the store before spawning.
/// Refresh failures are logged and the next tick retries. An `interval`
/// below `MIN_KEY_REFRESH` (including zero) is raised to it.
pub fn spawn_refresh_task(store: Arc<KeyStore>, interval: Duration) -> RefreshTask {
    let interval = if interval < MIN_KEY_REFRESH {
        warn!(
            requested_ms = interval.as_millis() as u64,
            min_ms = MIN_KEY_REFRESH.as_millis() as u64,
            "key refresh interval too short, using minimum"
        );
        MIN_KEY_REFRESH
    } else {
        interval
    };
    let (tx, mut rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticker.tick() => {
                    if let Err(e) = store.refresh().await {
                        warn!(url = store.url(), error = %e, "background key refresh failed, will retry next tick");
                    }
                }
            }
        }
        debug!(url = store.url(), "key refresh task stopped");
    });

    RefreshTask {
        shutdown: Some(tx),
        handle: Some(handle),
    }
}
