//! HTTP server for webhook intake.
//!
//! This module implements the HTTP server that:
//! - Accepts webhooks from the supported providers, authenticates them, and
//!   returns the normalized event
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /webhook/{provider}` - Accepts a delivery from the named provider
//! - `GET /health` - Returns 200 if server is running

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{VcsProvider, WebhookOrigin};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. It holds one
/// read-only [`WebhookOrigin`] per provider; providers with no configuration
/// get a default origin (no secret, no base URL).
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// One origin per provider, indexed by [`provider_index`].
    origins: [WebhookOrigin; 4],
}

impl AppState {
    /// Creates a new `AppState` from the given origins.
    ///
    /// Providers not covered by `origins` fall back to a default origin; a
    /// later entry for the same provider overrides an earlier one.
    pub fn new(origins: impl IntoIterator<Item = WebhookOrigin>) -> Self {
        let mut all = VcsProvider::ALL.map(WebhookOrigin::new);
        for origin in origins {
            let index = provider_index(origin.provider);
            all[index] = origin;
        }
        AppState {
            inner: Arc::new(AppStateInner { origins: all }),
        }
    }

    /// Returns the configured origin for a provider.
    pub fn origin_for(&self, provider: VcsProvider) -> &WebhookOrigin {
        &self.inner.origins[provider_index(provider)]
    }
}

fn provider_index(provider: VcsProvider) -> usize {
    match provider {
        VcsProvider::GitHub => 0,
        VcsProvider::GitLab => 1,
        VcsProvider::BitbucketServer => 2,
        VcsProvider::BitbucketCloud => 3,
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}: {source}")]
    ListenAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Server configuration, loaded from the environment.
///
/// Recognized variables, where `<PROVIDER>` is `GITHUB`, `GITLAB`,
/// `BITBUCKET_SERVER` or `BITBUCKET_CLOUD`:
///
/// - `WEBHOOK_<PROVIDER>_SECRET` - shared secret / token for that provider
/// - `WEBHOOK_<PROVIDER>_ORIGIN` - base URL used to build compare links
/// - `WEBHOOK_LISTEN_ADDR` - socket address to bind (default `0.0.0.0:3000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub origins: Vec<WebhookOrigin>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match std::env::var("WEBHOOK_LISTEN_ADDR") {
            Ok(value) => value
                .parse()
                .map_err(|source| ConfigError::ListenAddr { value, source })?,
            Err(_) => SocketAddr::from(DEFAULT_LISTEN_ADDR),
        };

        let origins = VcsProvider::ALL
            .iter()
            .map(|&provider| {
                let key = provider.as_str().to_uppercase();
                let mut origin = WebhookOrigin::new(provider);
                if let Ok(secret) = std::env::var(format!("WEBHOOK_{key}_SECRET")) {
                    origin = origin.with_secret(secret);
                }
                if let Ok(url) = std::env::var(format!("WEBHOOK_{key}_ORIGIN")) {
                    origin = origin.with_url(url);
                }
                origin
            })
            .collect();

        Ok(Config {
            listen_addr,
            origins,
        })
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook/{provider}", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_providers_get_default_origins() {
        let state = AppState::new([]);
        for provider in VcsProvider::ALL {
            let origin = state.origin_for(provider);
            assert_eq!(origin.provider, provider);
            assert_eq!(origin.secret_str(), "");
            assert_eq!(origin.base_url(), None);
        }
    }

    #[test]
    fn configured_origin_overrides_default() {
        let state = AppState::new([WebhookOrigin::new(VcsProvider::GitLab)
            .with_secret("s3cret")
            .with_url("https://gitlab.example.com")]);

        assert_eq!(state.origin_for(VcsProvider::GitLab).secret_str(), "s3cret");
        assert_eq!(state.origin_for(VcsProvider::GitHub).secret_str(), "");
    }

    #[test]
    fn app_state_is_clone() {
        let state = AppState::new([WebhookOrigin::new(VcsProvider::GitHub).with_secret("x")]);
        let cloned = state.clone();
        assert_eq!(
            state.origin_for(VcsProvider::GitHub),
            cloned.origin_for(VcsProvider::GitHub)
        );
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::webhooks::signature::{compute_signature, format_signature_header};

    fn test_app(origins: impl IntoIterator<Item = WebhookOrigin>) -> axum::Router {
        build_router(AppState::new(origins))
    }

    fn github_push_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "ref": "refs/heads/main",
            "before": "9b6b9466fdf7af8a34bdbea9bf5b9a1e9c891e12",
            "after": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
            "repository": {
                "name": "hello-world",
                "owner": { "login": "octocat" }
            },
            "sender": { "login": "octocat" },
            "head_commit": {
                "id": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
                "message": "fix flaky webhook test",
                "timestamp": "2021-08-31T16:24:16+03:00"
            }
        }))
        .unwrap()
    }

    /// Creates a signed GitHub push request against `/webhook/github`.
    fn github_push_request(secret: &[u8], event_type: &str) -> Request<Body> {
        let body = github_push_body();
        let signature_header = format_signature_header(&compute_signature(&body, secret));

        Request::builder()
            .method("POST")
            .uri("/webhook/github")
            .header("content-type", "application/json")
            .header("x-github-event", event_type)
            .header("x-hub-signature-256", signature_header)
            .body(Body::from(body))
            .unwrap()
    }

    // ─── Health endpoint tests ───

    #[tokio::test]
    async fn health_returns_200() {
        let app = test_app([]);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    // ─── Webhook endpoint tests ───

    #[tokio::test]
    async fn valid_delivery_returns_normalized_event() {
        let app = test_app([WebhookOrigin::new(VcsProvider::GitHub).with_secret("test-secret")]);

        let response = app
            .oneshot(github_push_request(b"test-secret", "push"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["event"], "push");
        assert_eq!(parsed["target_repository"]["owner"], "octocat");
        assert_eq!(parsed["target_branch"], "main");
        assert_eq!(parsed["timestamp"], 1630416256);
    }

    #[tokio::test]
    async fn invalid_signature_returns_401() {
        let app = test_app([WebhookOrigin::new(VcsProvider::GitHub).with_secret("correct-secret")]);

        let response = app
            .oneshot(github_push_request(b"wrong-secret", "push"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"signature mismatch");
    }

    #[tokio::test]
    async fn unmodeled_event_returns_204() {
        let app = test_app([WebhookOrigin::new(VcsProvider::GitHub).with_secret("test-secret")]);

        let response = app
            .oneshot(github_push_request(b"test-secret", "star"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let app = test_app([]);

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/github")
            .header("x-github-event", "push")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_provider_returns_404() {
        let app = test_app([]);

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/sourceforge")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"unsupported provider: sourceforge");
    }

    #[tokio::test]
    async fn gitlab_token_is_checked() {
        let app = test_app([WebhookOrigin::new(VcsProvider::GitLab).with_secret("s3cret")]);

        let body = serde_json::json!({
            "object_kind": "push",
            "ref": "refs/heads/main",
            "before": "9b6b9466fdf7af8a34bdbea9bf5b9a1e9c891e12",
            "after": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
            "project": { "path_with_namespace": "platform/hello-world" },
            "commits": []
        });

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/gitlab")
            .header("x-gitlab-token", "s3cret")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let response = test_app([WebhookOrigin::new(VcsProvider::GitLab).with_secret("s3cret")])
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bad = Request::builder()
            .method("POST")
            .uri("/webhook/gitlab")
            .header("x-gitlab-token", "wrong")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(bad).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"token mismatch");
    }

    #[tokio::test]
    async fn bitbucket_cloud_token_travels_in_query() {
        let body = serde_json::json!({
            "repository": { "full_name": "platform/hello-world" },
            "push": { "changes": [] }
        });

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/bitbucket_cloud?token=s3cret")
            .header("x-event-key", "repo:push")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let app =
            test_app([WebhookOrigin::new(VcsProvider::BitbucketCloud).with_secret("s3cret")]);
        let response = app.oneshot(request).await.unwrap();

        // Authenticated; an empty change list normalizes to nothing.
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
