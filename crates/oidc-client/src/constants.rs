//! OAuth2 / OIDC protocol constants
//!
//! Parameter names and fixed values used on the wire. Endpoint paths are
//! not here; they belong to an `Endpoints` profile.

use std::time::Duration;

pub const PARAM_CLIENT_ID: &str = "client_id";
pub const PARAM_CODE: &str = "code";
pub const PARAM_REDIRECT_URI: &str = "redirect_uri";
pub const PARAM_SCOPE: &str = "scope";
pub const PARAM_RESPONSE_TYPE: &str = "response_type";
pub const PARAM_STATE: &str = "state";
pub const PARAM_CODE_CHALLENGE: &str = "code_challenge";
pub const PARAM_CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
pub const PARAM_GRANT_TYPE: &str = "grant_type";
pub const PARAM_CODE_VERIFIER: &str = "code_verifier";
pub const PARAM_CLIENT_ASSERTION: &str = "client_assertion";
pub const PARAM_CLIENT_ASSERTION_TYPE: &str = "client_assertion_type";
pub const PARAM_TOKEN: &str = "token";

/// Only S256 is supported; `plain` would leak the verifier in the redirect.
pub const CODE_CHALLENGE_METHOD_S256: &str = "S256";
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
pub const RESPONSE_TYPE_CODE: &str = "code";

/// RFC 7523 client assertion type for JWT bearer client authentication
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a minted client assertion (`exp - iat`)
pub const ASSERTION_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Shortest background key refresh period; shorter requests are raised to it.
pub const MIN_KEY_REFRESH: Duration = Duration::from_secs(1);

/// Random bytes behind each PKCE verifier. 32 bytes encode to 43 base64url
/// characters, the RFC 7636 minimum.
pub const VERIFIER_BYTES: usize = 32;

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_PROFILE: &str = "profile";
pub const SCOPE_EMAIL: &str = "email";

/// Scopes for a basic login: identity, profile and email claims.
pub const DEFAULT_SCOPES: [&str; 3] = [SCOPE_OPENID, SCOPE_PROFILE, SCOPE_EMAIL];
