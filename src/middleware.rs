// Copyright (c) 2025 Riskgate Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Axum middleware surface.
//!
//! Three guards, applied inside-out on protected routes:
//!
//! 1. [`rate_limit_guard`] buckets by principal (falling back to client
//!    IP before authentication) and operation class;
//! 2. [`csrf_guard`] enforces the double-submit token on unsafe methods;
//! 3. [`session_guard`] runs the full risk evaluation and converts the
//!    resolved action into an HTTP rejection.
//!
//! The guards assume an upstream authentication layer has inserted
//! [`AuthenticatedPrincipal`] into request extensions.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::csrf::CsrfTokens;
use crate::errors::SecurityRejection;
use crate::lifecycle::SessionLifecycle;
use crate::ratelimit::RateLimiter;
use crate::types::RequestContext;

/// Principal identifier inserted by the authentication layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub String);

/// Shared state for the security guards.
#[derive(Clone)]
pub struct SecurityState {
    pub lifecycle: Arc<SessionLifecycle>,
    pub limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfTokens>,
}

/// Cookie carrying the CSRF token half of the double-submit pair.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header carrying the other half.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Cookie carrying the session credential token.
pub const SESSION_COOKIE: &str = "session_token";

/// Build a [`RequestContext`] from the incoming request.
///
/// Client IP comes from the first `x-forwarded-for` entry (the service
/// runs behind a trusted proxy); the session token from a bearer
/// `Authorization` header or the session cookie, in that order.
pub fn extract_context(request: &Request<Body>) -> RequestContext {
    let headers = request.headers();
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let session_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
        .or_else(|| cookie_value(request, SESSION_COOKIE))
        .unwrap_or_default();

    RequestContext {
        client_ip,
        user_agent,
        path: request.uri().path().to_string(),
        method: request.method().as_str().to_string(),
        session_token,
    }
}

fn cookie_value(request: &Request<Body>, name: &str) -> Option<String> {
    let header = request.headers().get("cookie")?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Full risk evaluation on every protected request.
pub async fn session_guard(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let principal = match request.extensions().get::<AuthenticatedPrincipal>() {
        Some(principal) => principal.0.clone(),
        None => return SecurityRejection::session_terminated(None).into_response(),
    };
    let context = extract_context(&request);
    if context.session_token.is_empty() {
        return SecurityRejection::session_terminated(None).into_response();
    }

    let decision = state.lifecycle.evaluate(&principal, &context);
    if !decision.is_valid {
        return SecurityRejection::session_terminated(decision.reason).into_response();
    }
    if let Some(rejection) = SecurityRejection::from_action(decision.action, &principal) {
        return rejection.into_response();
    }
    next.run(request).await
}

/// Per-principal, per-operation rate limiting with lockout.
///
/// The rules and the auth/api path split come from
/// [`EngineConfig::rate_limits`](crate::config::RateLimitRules):
/// paths under a configured auth prefix get the strict rule, everything
/// else the general API rule. Before authentication the bucket falls
/// back to the client IP so login attempts are still bounded.
pub async fn rate_limit_guard(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let context = extract_context(&request);
    let identifier = request
        .extensions()
        .get::<AuthenticatedPrincipal>()
        .map(|p| p.0.clone())
        .unwrap_or_else(|| context.client_ip.clone());

    let rules = &state.lifecycle.config().rate_limits;
    let is_auth = rules
        .auth_path_prefixes
        .iter()
        .any(|prefix| context.path.starts_with(prefix.as_str()));
    let (operation, rule) = if is_auth {
        ("auth", &rules.auth)
    } else {
        ("api", &rules.api)
    };

    let outcome = state.limiter.check_and_consume(&identifier, operation, rule);
    if outcome.blocked {
        return SecurityRejection::rate_limited(outcome.retry_after_secs.unwrap_or(60))
            .into_response();
    }
    next.run(request).await
}

/// Double-submit CSRF enforcement on state-changing methods.
///
/// Safe methods pass through untouched. Unsafe methods must carry a
/// matching cookie and header pair naming a live token; validation
/// consumes the token, so each form render needs a fresh one.
pub async fn csrf_guard(
    State(state): State<SecurityState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let unsafe_method = matches!(
        request.method().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    );
    if !unsafe_method {
        return next.run(request).await;
    }

    let cookie = cookie_value(&request, CSRF_COOKIE);
    let header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if !state.csrf.validate(cookie.as_deref(), header.as_deref()) {
        return SecurityRejection::csrf_rejected().into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::EngineConfig;
    use crate::session::{Fingerprint, SessionOptions};
    use crate::store::memory::MemoryStore;
    use crate::store::SessionStore;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{middleware, Extension, Router};
    use tower::ServiceExt;

    fn state() -> SecurityState {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        SecurityState {
            lifecycle: Arc::new(SessionLifecycle::new(
                store.clone(),
                audit.clone(),
                EngineConfig::default(),
            )),
            limiter: Arc::new(RateLimiter::new(store.clone(), audit)),
            csrf: Arc::new(CsrfTokens::new(store, 3600)),
        }
    }

    fn session_app(state: SecurityState, principal: &str) -> Router {
        let principal = AuthenticatedPrincipal(principal.to_string());
        Router::new()
            .route("/api/data", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, session_guard))
            .layer(Extension(principal))
    }

    fn request_with_token(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/data")
            .header("authorization", format!("Bearer {token}"))
            .header("user-agent", "Mozilla/5.0")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_guard_allows_valid_session() {
        let state = state();
        state
            .lifecycle
            .create(
                "u1",
                "tok-1",
                Fingerprint {
                    client_ip: "203.0.113.7".to_string(),
                    user_agent: "Mozilla/5.0".to_string(),
                },
                SessionOptions::default(),
            )
            .unwrap();
        let app = session_app(state, "u1");
        let response = app.oneshot(request_with_token("tok-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_guard_rejects_unknown_token() {
        let app = session_app(state(), "u1");
        let response = app.oneshot(request_with_token("bogus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_guard_rejects_missing_principal() {
        let state = state();
        let app = Router::new()
            .route("/api/data", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, session_guard));
        let response = app.oneshot(request_with_token("tok-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_guard_maps_review_to_locked() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let mut config = EngineConfig::default();
        // Seed 25 plus a device change delta of 30 lands at 55.
        config.thresholds.elevated = 50;
        let state = SecurityState {
            lifecycle: Arc::new(SessionLifecycle::new(store.clone(), audit.clone(), config)),
            limiter: Arc::new(RateLimiter::new(store.clone(), audit)),
            csrf: Arc::new(CsrfTokens::new(store, 3600)),
        };
        state
            .lifecycle
            .create(
                "u1",
                "tok-1",
                Fingerprint {
                    client_ip: "203.0.113.7".to_string(),
                    user_agent: "Mozilla/5.0".to_string(),
                },
                SessionOptions::default(),
            )
            .unwrap();

        let app = session_app(state, "u1");
        let request = Request::builder()
            .uri("/api/data")
            .header("authorization", "Bearer tok-1")
            .header("user-agent", "curl/8.0")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_rate_limit_guard_blocks_after_burst() {
        let state = state();
        let app = Router::new()
            .route("/auth/login", post(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_guard));

        for _ in 0..5 {
            let request = Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn test_rate_limit_guard_honors_configured_rules() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let mut config = EngineConfig::default();
        config.rate_limits.api.max_attempts = 2;
        config.rate_limits.auth_path_prefixes = vec!["/login".to_string()];
        let state = SecurityState {
            lifecycle: Arc::new(SessionLifecycle::new(store.clone(), audit.clone(), config)),
            limiter: Arc::new(RateLimiter::new(store.clone(), audit)),
            csrf: Arc::new(CsrfTokens::new(store, 3600)),
        };
        let app = Router::new()
            .route("/api/data", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_guard));

        let build = || {
            Request::builder()
                .uri("/api/data")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap()
        };
        for _ in 0..2 {
            let response = app.clone().oneshot(build()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        // The host's tightened API rule applies, not the shipped default.
        let response = app.oneshot(build()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_csrf_guard_passes_safe_methods() {
        let state = state();
        let app = Router::new()
            .route("/form", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, csrf_guard));
        let request = Request::builder().uri("/form").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_csrf_guard_rejects_missing_token() {
        let state = state();
        let app = Router::new()
            .route("/form", post(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, csrf_guard));
        let request = Request::builder()
            .method("POST")
            .uri("/form")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_csrf_guard_accepts_then_rejects_replay() {
        let state = state();
        let token = state.csrf.issue().unwrap();
        let app = Router::new()
            .route("/form", post(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, csrf_guard));

        let build = |token: &str| {
            Request::builder()
                .method("POST")
                .uri("/form")
                .header("cookie", format!("{CSRF_COOKIE}={token}"))
                .header(CSRF_HEADER, token)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(build(&token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let replay = app.oneshot(build(&token)).await.unwrap();
        assert_eq!(replay.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_extract_context_prefers_bearer_token() {
        let request = Request::builder()
            .uri("/api/x")
            .header("authorization", "Bearer abc")
            .header("cookie", "session_token=def")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let context = extract_context(&request);
        assert_eq!(context.session_token, "abc");
        assert_eq!(context.client_ip, "203.0.113.7");
        assert_eq!(context.method, "GET");
    }

    #[test]
    fn test_extract_context_falls_back_to_cookie() {
        let request = Request::builder()
            .uri("/api/x")
            .header("cookie", "theme=dark; session_token=def")
            .body(Body::empty())
            .unwrap();
        let context = extract_context(&request);
        assert_eq!(context.session_token, "def");
        assert_eq!(context.client_ip, "unknown");
    }
}
