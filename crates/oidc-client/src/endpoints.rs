//! Provider endpoint profiles
//!
//! The client never hard-codes a path; every request URL is
//! `<issuer><path>` with the path supplied by an [`Endpoints`] profile.

use serde::Deserialize;

/// Relative paths of the four provider endpoints the client talks to.
pub trait Endpoints: Send + Sync {
    fn authorize(&self) -> &str;
    fn token(&self) -> &str;
    fn keys(&self) -> &str;
    fn introspect(&self) -> &str;
}

/// Endpoint layout of a Zitadel instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZitadelEndpoints;

impl Endpoints for ZitadelEndpoints {
    fn authorize(&self) -> &str {
        "/oauth/v2/authorize"
    }

    fn token(&self) -> &str {
        "/oauth/v2/token"
    }

    fn keys(&self) -> &str {
        "/oauth/v2/keys"
    }

    fn introspect(&self) -> &str {
        "/oauth/v2/introspect"
    }
}

/// Endpoint paths read from configuration, for providers without a
/// built-in profile.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomEndpoints {
    pub authorize: String,
    pub token: String,
    pub keys: String,
    pub introspect: String,
}

impl Endpoints for CustomEndpoints {
    fn authorize(&self) -> &str {
        &self.authorize
    }

    fn token(&self) -> &str {
        &self.token
    }

    fn keys(&self) -> &str {
        &self.keys
    }

    fn introspect(&self) -> &str {
        &self.introspect
    }
}

/// Join an issuer base URL and an endpoint path without doubling the slash.
pub(crate) fn endpoint_url(issuer: &str, path: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zitadel_paths() {
        let e = ZitadelEndpoints;
        assert_eq!(e.authorize(), "/oauth/v2/authorize");
        assert_eq!(e.token(), "/oauth/v2/token");
        assert_eq!(e.keys(), "/oauth/v2/keys");
        assert_eq!(e.introspect(), "/oauth/v2/introspect");
    }

    #[test]
    fn custom_endpoints_deserialize() {
        let e: CustomEndpoints = serde_json::from_str(
            r#"{"authorize":"/auth","token":"/token","keys":"/certs","introspect":"/token/introspect"}"#,
        )
        .unwrap();
        assert_eq!(e.keys(), "/certs");
        assert_eq!(e.introspect(), "/token/introspect");
    }

    #[test]
    fn endpoint_url_handles_trailing_slash() {
        assert_eq!(
            endpoint_url("https://idp.example/", "/oauth/v2/token"),
            "https://idp.example/oauth/v2/token"
        );
        assert_eq!(
            endpoint_url("https://idp.example", "/oauth/v2/token"),
            "https://idp.example/oauth/v2/token"
        );
    }
}
