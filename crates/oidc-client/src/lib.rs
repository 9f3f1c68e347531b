//! OpenID Connect relying-party client
//!
//! Implements the Authorization Code flow with PKCE against a single
//! identity provider, plus token introspection authenticated with a signed
//! JWT client assertion. HTTP calls go through a caller-supplied
//! `reqwest::Client`; endpoint paths come from an [`Endpoints`] profile.
//!
//! Login flow:
//! 1. `Client::build_authenticate_redirect()` returns the provider URL and a
//!    fresh PKCE verifier the caller stores against `state`
//! 2. The provider redirects back with `code` + `state`
//! 3. `Client::request_auth_response()` exchanges the code and verifier
//! 4. `Client::parse_claims()` verifies the ID token against the cached JWKS
//! 5. `Claims::validate()` checks expiry and audience when the caller wants it
//!
//! The JWKS cache (`keys::KeyStore`) is refreshed by a background task owned
//! by the `Client`; a cache miss during verification forces one synchronous
//! refresh before giving up.

pub mod assertion;
pub mod claims;
pub mod client;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod introspect;
pub mod keys;
pub mod pkce;
pub mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use assertion::{ClientKey, generate_assertion};
pub use claims::{Audience, Claims, verify_id_token};
pub use client::Client;
pub use constants::*;
pub use endpoints::{CustomEndpoints, Endpoints, ZitadelEndpoints};
pub use error::{Error, Result};
pub use introspect::{IntrospectionResult, Introspector, JwtProfileIntrospector};
pub use keys::{KeyStore, RefreshTask, spawn_refresh_task};
pub use pkce::{build_authorization_url, compute_challenge, generate_verifier};
pub use token::{AuthResponse, exchange_code};
