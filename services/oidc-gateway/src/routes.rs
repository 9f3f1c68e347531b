//! HTTP surface of the gateway
//!
//! Endpoints:
//! - GET  /login      : start a PKCE login, 303 to the provider
//! - GET  /callback   : exchange the code, verify the ID token, return the session
//! - POST /introspect : ask the provider whether an access token is active
//! - GET  /me         : claims of the bearer ID token (guarded by `require_claims`)
//! - GET  /health     : key cache and uptime status
//! - GET  /metrics    : Prometheus exposition
//!
//! Verified claims ride on the request's extensions from the guard to the
//! handler; nothing else about a request is stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Extension, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use oidc_client::{Claims, Client, Introspector};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::metrics::record_login;

/// PKCE verifier of a login awaiting its callback.
///
/// Created by /login and consumed by /callback. Entries older than
/// `PENDING_LOGIN_EXPIRY` are swept on the next /login.
struct PendingLogin {
    verifier: String,
    created_at: Instant,
}

const PENDING_LOGIN_EXPIRY: Duration = Duration::from_secs(600);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    client: Arc<Client>,
    introspector: Option<Arc<dyn Introspector>>,
    redirect_uri: String,
    scopes: Vec<String>,
    pending: Arc<Mutex<HashMap<String, PendingLogin>>>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        client: Arc<Client>,
        introspector: Option<Arc<dyn Introspector>>,
        redirect_uri: String,
        scopes: Vec<String>,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            client,
            introspector,
            redirect_uri,
            scopes,
            pending: Arc::new(Mutex::new(HashMap::new())),
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the router with all routes and shared state.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_claims));

    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/introspect", post(introspect))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(protected)
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn json_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    json_response(status, serde_json::json!({ "error": message.to_string() }))
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Map a verification failure to a status: retryable key problems are the
/// gateway's fault (503), everything else is the token's (401).
fn verification_failure(e: &oidc_client::Error) -> Response {
    if e.is_retryable() {
        json_error(StatusCode::SERVICE_UNAVAILABLE, e)
    } else {
        json_error(StatusCode::UNAUTHORIZED, e)
    }
}

/// GET /login: generate state + PKCE verifier and redirect to the provider.
async fn login(State(state): State<AppState>) -> Response {
    let login_state = uuid::Uuid::new_v4().as_simple().to_string();

    let (url, verifier) = match state.client.build_authenticate_redirect(
        &login_state,
        &state.redirect_uri,
        &state.scopes,
    ) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to build authorization redirect");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    {
        let mut pending = state.pending.lock().await;
        pending.retain(|_, p| p.created_at.elapsed() < PENDING_LOGIN_EXPIRY);
        pending.insert(
            login_state.clone(),
            PendingLogin {
                verifier,
                created_at: Instant::now(),
            },
        );
    }

    info!(state = login_state, "login initiated");
    (StatusCode::SEE_OTHER, [(header::LOCATION, url.to_string())]).into_response()
}

/// Query string the provider appends to the redirect URI.
#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /callback: complete the login started by /login.
async fn callback(State(state): State<AppState>, Query(params): Query<CallbackParams>) -> Response {
    if let Some(error) = params.error {
        record_login("provider_error");
        let description = params.error_description.unwrap_or_default();
        warn!(error, description, "provider rejected the login");
        return json_error(StatusCode::BAD_REQUEST, format!("{error}: {description}"));
    }

    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        return json_error(StatusCode::BAD_REQUEST, "callback requires code and state");
    };

    let pending = state.pending.lock().await.remove(&login_state);
    let Some(pending) = pending else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "no pending login for this state (expired or not initiated)",
        );
    };
    if pending.created_at.elapsed() > PENDING_LOGIN_EXPIRY {
        return json_error(
            StatusCode::BAD_REQUEST,
            "login expired (>10 minutes), please start again",
        );
    }

    let auth = match state
        .client
        .request_auth_response(&code, &state.redirect_uri, &pending.verifier)
        .await
    {
        Ok(auth) => auth,
        Err(e) => {
            record_login("exchange_failed");
            warn!(state = login_state, error = %e, "code exchange failed");
            return json_error(StatusCode::BAD_GATEWAY, e);
        }
    };

    let claims = match state.client.parse_claims(&auth.id_token).await {
        Ok(claims) => claims,
        Err(e) => {
            record_login("invalid_token");
            warn!(state = login_state, error = %e, "ID token verification failed");
            return verification_failure(&e);
        }
    };

    if let Err(e) = claims.validate(state.client.client_id(), now_secs()) {
        record_login("invalid_token");
        warn!(state = login_state, sub = claims.sub, error = %e, "ID token rejected");
        return json_error(StatusCode::UNAUTHORIZED, e);
    }

    record_login("success");
    info!(sub = claims.sub, "login completed");

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "sub": claims.sub,
            "name": claims.name,
            "email": claims.email,
            "roles": claims.role_names(),
            "token_type": auth.token_type,
            "expires_in": auth.expires_in,
            "access_token": auth.access_token,
            "id_token": auth.id_token,
        }),
    )
}

/// Request body for /introspect.
#[derive(Deserialize)]
struct IntrospectRequest {
    token: String,
}

/// POST /introspect: report whether an access token is still active.
async fn introspect(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<IntrospectRequest>,
) -> Response {
    let Some(introspector) = &state.introspector else {
        return json_error(
            StatusCode::NOT_IMPLEMENTED,
            "introspection is not configured (no key file)",
        );
    };

    match introspector.introspect(&body.token).await {
        Ok(active) => json_response(StatusCode::OK, serde_json::json!({ "active": active })),
        Err(e) => {
            warn!(error = %e, "introspection failed");
            json_error(StatusCode::BAD_GATEWAY, e)
        }
    }
}

/// Verify `Authorization: Bearer <id_token>` and attach the claims to the
/// request for downstream handlers.
async fn require_claims(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return json_error(StatusCode::UNAUTHORIZED, "missing bearer token");
    };

    let claims = match state.client.parse_claims(&token).await {
        Ok(claims) => claims,
        Err(e) => return verification_failure(&e),
    };
    if let Err(e) = claims.validate(state.client.client_id(), now_secs()) {
        return json_error(StatusCode::UNAUTHORIZED, e);
    }

    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Token from an `Authorization` value whose scheme is `Bearer`, in any case.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// GET /me: profile of the authenticated caller.
async fn me(Extension(claims): Extension<Claims>) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "sub": claims.sub,
            "name": claims.name,
            "preferred_username": claims.preferred_username,
            "email": claims.email,
            "email_verified": claims.email_verified,
            "locale": claims.locale,
            "roles": claims.role_names(),
        }),
    )
}

/// GET /health: 200 while signing keys are cached, 503 otherwise.
async fn health(State(state): State<AppState>) -> Response {
    let keys_cached = state.client.key_store().len();
    let pending_logins = state.pending.lock().await.len();
    let (status, label) = if keys_cached > 0 {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    json_response(
        status,
        serde_json::json!({
            "status": label,
            "issuer": state.client.issuer(),
            "keys_cached": keys_cached,
            "pending_logins": pending_logins,
            "introspection": state.introspector.is_some(),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use oidc_client::test_support::{K1_N, K1_PEM, K2_PEM, jwks, rsa_jwk, sign};
    use oidc_client::{JwtProfileIntrospector, ZitadelEndpoints, compute_challenge};
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REDIRECT_URI: &str = "https://app.example/cb";

    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    async fn provider() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/v2/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&[rsa_jwk("k1", K1_N)])))
            .mount(&server)
            .await;
        server
    }

    async fn test_state(issuer: &str, introspector: Option<Arc<dyn Introspector>>) -> AppState {
        let client: Client = Client::new(
            reqwest::Client::new(),
            issuer,
            "app1",
            Arc::new(ZitadelEndpoints),
            Duration::from_secs(3600),
        )
        .await;
        AppState::new(
            Arc::new(client),
            introspector,
            REDIRECT_URI.into(),
            vec!["openid".into(), "profile".into(), "email".into()],
            test_prometheus_handle(),
        )
    }

    fn id_token(sub: &str, exp: i64) -> String {
        sign(
            K1_PEM,
            "k1",
            &serde_json::json!({
                "sub": sub,
                "aud": ["app1"],
                "exp": exp,
                "name": "User One",
                "email": "u1@example.com",
                "urn:zitadel:iam:org:project:roles": {"admin": {"org1": "org1.example"}}
            }),
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    /// Run /login and return the state parameter from the redirect.
    async fn start_login(state: &AppState) -> (String, HashMap<String, String>) {
        let response = build_router(state.clone())
            .oneshot(get("/login"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let url = reqwest::Url::parse(location).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        (query["state"].clone(), query)
    }

    #[tokio::test]
    async fn login_redirects_with_pkce_and_remembers_verifier() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let (login_state, query) = start_login(&state).await;

        assert_eq!(query["response_type"], "code");
        assert_eq!(query["redirect_uri"], REDIRECT_URI);
        assert_eq!(query["scope"], "openid profile email");
        assert_eq!(query["code_challenge_method"], "S256");

        let pending = state.pending.lock().await;
        let verifier = &pending[&login_state].verifier;
        assert_eq!(query["code_challenge"], compute_challenge(verifier));
    }

    #[tokio::test]
    async fn callback_without_pending_login_returns_400() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let response = build_router(state)
            .oneshot(get("/callback?code=c&state=never-issued"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_reports_provider_error() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let response = build_router(state)
            .oneshot(get("/callback?error=access_denied&error_description=user+cancelled"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("access_denied"));
    }

    #[tokio::test]
    async fn callback_completes_login() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;
        let (login_state, _) = start_login(&state).await;
        let verifier = state.pending.lock().await[&login_state].verifier.clone();

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .and(body_string_contains(format!("code_verifier={verifier}")))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_123",
                "token_type": "Bearer",
                "expires_in": 3600,
                "id_token": id_token("u1", now_secs() + 600),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = build_router(state.clone())
            .oneshot(get(&format!("/callback?code=auth-code&state={login_state}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sub"], "u1");
        assert_eq!(body["roles"], serde_json::json!(["admin"]));
        assert_eq!(body["access_token"], "at_123");
        assert!(state.pending.lock().await.is_empty(), "state is single-use");
    }

    #[tokio::test]
    async fn callback_rejects_expired_id_token() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;
        let (login_state, _) = start_login(&state).await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at_123",
                "token_type": "Bearer",
                "expires_in": 3600,
                "id_token": id_token("u1", now_secs() - 10),
            })))
            .mount(&server)
            .await;

        let response = build_router(state)
            .oneshot(get(&format!("/callback?code=auth-code&state={login_state}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn callback_maps_exchange_failure_to_502() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;
        let (login_state, _) = start_login(&state).await;

        Mock::given(method("POST"))
            .and(path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let response = build_router(state)
            .oneshot(get(&format!("/callback?code=reused&state={login_state}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn me_requires_bearer_token() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let response = build_router(state).oneshot(get("/me")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_claims_of_valid_bearer() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let request = axum::http::Request::builder()
            .uri("/me")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", id_token("u1", now_secs() + 600)),
            )
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sub"], "u1");
        assert_eq!(body["email"], "u1@example.com");
    }

    #[tokio::test]
    async fn me_accepts_bearer_scheme_in_any_case() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        for scheme in ["bearer", "BEARER", "BeArEr"] {
            let request = axum::http::Request::builder()
                .uri("/me")
                .header(
                    header::AUTHORIZATION,
                    format!("{scheme} {}", id_token("u1", now_secs() + 600)),
                )
                .body(Body::empty())
                .unwrap();
            let response = build_router(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "scheme {scheme}");
        }
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer  "), None);
    }

    #[tokio::test]
    async fn me_rejects_forged_bearer() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;
        let forged = sign(
            K2_PEM,
            "k1",
            &serde_json::json!({"sub": "admin", "aud": ["app1"], "exp": now_secs() + 600}),
        );

        let request = axum::http::Request::builder()
            .uri("/me")
            .header(header::AUTHORIZATION, format!("Bearer {forged}"))
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn introspect_without_key_returns_501() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/introspect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"token":"at_123"}"#))
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn introspect_reports_provider_answer() {
        let server = provider().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/introspect"))
            .and(body_string_contains("token=at_123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"active": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let key_document = serde_json::json!({
            "type": "application",
            "keyId": "key-1",
            "key": K1_PEM,
            "clientId": "api-client"
        });
        let introspector = JwtProfileIntrospector::from_json(
            reqwest::Client::new(),
            server.uri(),
            Arc::new(ZitadelEndpoints),
            key_document.to_string().as_bytes(),
        )
        .unwrap();
        let state = test_state(&server.uri(), Some(Arc::new(introspector))).await;

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/introspect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"token":"at_123"}"#))
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["active"], true);
    }

    #[tokio::test]
    async fn health_reflects_key_cache() {
        let server = provider().await;
        let healthy = test_state(&server.uri(), None).await;
        let response = build_router(healthy).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["keys_cached"], 1);

        let degraded = test_state("http://127.0.0.1:1", None).await;
        let response = build_router(degraded).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_format() {
        let server = provider().await;
        let state = test_state(&server.uri(), None).await;
        let response = build_router(state).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }
}
