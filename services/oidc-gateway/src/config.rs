//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The introspection signing key is referenced by path only; the key
//! document itself never appears in the TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oidc_client::{CustomEndpoints, DEFAULT_SCOPES, Endpoints, ZitadelEndpoints};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub oidc: OidcConfig,
    #[serde(default)]
    pub introspection: IntrospectionConfig,
    pub server: ServerConfig,
}

/// Identity provider and relying-party registration
#[derive(Debug, Deserialize)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_key_refresh_secs")]
    pub key_refresh_secs: u64,
    #[serde(default)]
    pub endpoints: EndpointProfile,
    /// Required when `endpoints = "custom"`
    #[serde(default)]
    pub custom_endpoints: Option<CustomEndpoints>,
}

/// Which endpoint path layout the provider uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointProfile {
    #[default]
    Zitadel,
    Custom,
}

/// Token introspection settings; introspection is disabled without a key file
#[derive(Debug, Default, Deserialize)]
pub struct IntrospectionConfig {
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_key_refresh_secs() -> u64 {
    3600
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `OIDC_INTROSPECTION_KEY_FILE` overrides `[introspection] key_file`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.oidc.issuer.starts_with("http://") && !config.oidc.issuer.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "issuer must start with http:// or https://, got: {}",
                config.oidc.issuer
            )));
        }

        if config.oidc.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        if config.oidc.key_refresh_secs == 0 {
            return Err(common::Error::Config(
                "key_refresh_secs must be greater than 0".into(),
            ));
        }

        if config.oidc.endpoints == EndpointProfile::Custom
            && config.oidc.custom_endpoints.is_none()
        {
            return Err(common::Error::Config(
                "endpoints = \"custom\" requires an [oidc.custom_endpoints] table".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Ok(key_file) = std::env::var("OIDC_INTROSPECTION_KEY_FILE") {
            config.introspection.key_file = Some(PathBuf::from(key_file));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oidc-gateway.toml")
    }
}

impl OidcConfig {
    /// Endpoint profile selected by `endpoints`.
    pub fn endpoint_profile(&self) -> Arc<dyn Endpoints> {
        match (&self.endpoints, &self.custom_endpoints) {
            (EndpointProfile::Custom, Some(custom)) => Arc::new(custom.clone()),
            _ => Arc::new(ZitadelEndpoints),
        }
    }
}
