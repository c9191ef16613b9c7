//! Webhook endpoint handler.
//!
//! Accepts deliveries at `POST /webhook/{provider}`, authenticates them
//! against the provider's configured secret, and returns the normalized
//! event as JSON. Deliveries for event types we do not model are
//! acknowledged with 204 so providers do not retry them.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::types::{UnknownProvider, VcsProvider};
use crate::webhooks::{parse_incoming_webhook, AuthError, WebhookError};

/// Errors that can occur when handling a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookHandlerError {
    /// The `{provider}` path segment names no supported provider.
    #[error(transparent)]
    UnknownProvider(#[from] UnknownProvider),

    /// Authentication or extraction failed.
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookHandlerError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            WebhookHandlerError::Webhook(WebhookError::Auth(_)) => StatusCode::UNAUTHORIZED,
            WebhookHandlerError::Webhook(WebhookError::Extract(_))
            | WebhookHandlerError::Webhook(WebhookError::BodyRead(_)) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Path: `/webhook/{provider}` where `{provider}` is one of `github`,
///   `gitlab`, `bitbucket_server`, `bitbucket_cloud`
/// - Headers/query: the provider's authentication scheme and event type
/// - Body: the provider's JSON payload
///
/// # Response
///
/// - 200 OK: the normalized event, as JSON
/// - 204 No Content: authenticated, but the event type is not modeled
/// - 400 Bad Request: malformed payload
/// - 401 Unauthorized: signature or token verification failed
/// - 404 Not Found: unrecognized provider name
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    request: Request,
) -> Result<Response, WebhookHandlerError> {
    let provider: VcsProvider = provider.parse()?;
    let origin = app_state.origin_for(provider);

    match parse_incoming_webhook(origin, request).await {
        Ok(Some(info)) => {
            info!(
                provider = %provider,
                event = ?info.event,
                repository = %info.target_repository,
                "webhook normalized"
            );
            Ok((StatusCode::OK, Json(info)).into_response())
        }
        Ok(None) => {
            debug!(provider = %provider, "unmodeled webhook event, acknowledging");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => {
            match &e {
                WebhookError::Auth(AuthError::TokenMismatch)
                | WebhookError::Auth(AuthError::SignatureMismatch)
                | WebhookError::Auth(AuthError::PayloadSignatureMismatch) => {
                    warn!(provider = %provider, error = %e, "webhook authentication failed");
                }
                _ => {
                    debug!(provider = %provider, error = %e, "webhook rejected");
                }
            }
            Err(e.into())
        }
    }
}
