//! The parser contract, the provider factory, and the dispatch entry point.
//!
//! One inbound HTTP request flows through here exactly once:
//!
//! 1. The body is fully buffered (signatures cover the raw bytes, so
//!    streaming verification is not possible).
//! 2. The factory resolves the concrete parser for the origin's provider.
//! 3. `authenticate` checks the provider's signature/token scheme against
//!    the origin's shared secret.
//! 4. `extract` classifies the payload and produces a canonical
//!    [`WebhookInfo`], or nothing for events we do not model.
//!
//! Authentication failures stop the pipeline; extraction is never attempted
//! after a failed check.

use axum::body::Bytes;
use axum::http::HeaderMap;
use thiserror::Error;
use tracing::debug;

use crate::types::{VcsProvider, WebhookInfo, WebhookOrigin};

use super::providers::{
    BitbucketCloudParser, BitbucketServerParser, GitHubParser, GitLabParser,
};

/// Upper bound on a buffered webhook body. Providers cap payloads well
/// below this (GitHub at 25 MB).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// An inbound webhook request with its body already buffered.
///
/// Buffering happens once, in [`parse_incoming_webhook`]; both
/// authentication and extraction operate on the same byte slice, so the
/// body is never read twice.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    headers: HeaderMap,
    query: String,
    body: Bytes,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, query: impl Into<String>, body: Bytes) -> Self {
        InboundRequest {
            headers,
            query: query.into(),
            body,
        }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a URL query parameter, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// The raw request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Authentication failures.
///
/// The message texts for the mismatch variants are part of the compatibility
/// contract with existing callers; do not reword them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A secret is configured but the request carries no signature header.
    #[error("missing signature header {0}")]
    MissingSignature(&'static str),

    /// The signature header is not `sha256=<hex>`.
    #[error("error decoding signature: {0}")]
    MalformedSignature(String),

    /// GitHub signature did not match the payload.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Bitbucket Server signature did not match the payload.
    #[error("payload signature mismatch")]
    PayloadSignatureMismatch,

    /// Plain-token comparison failed (GitLab, Bitbucket Cloud).
    #[error("token mismatch")]
    TokenMismatch,
}

/// Extraction failures (malformed payloads).
///
/// An event or action we do not model is *not* an error; extraction returns
/// `Ok(None)` so callers can acknowledge the delivery without acting.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp field could not be parsed with the provider's layout.
    #[error("invalid timestamp for {field}: {value}")]
    Timestamp { field: &'static str, value: String },
}

/// Errors produced by the dispatch entry point.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Reading the request body failed.
    #[error("failed to read request body: {0}")]
    BodyRead(axum::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// The two-step contract every provider parser implements.
///
/// One implementing type exists per [`VcsProvider`] variant; the factory
/// performs the enum-to-type dispatch so callers only ever see the trait.
pub trait WebhookParser: Send + Sync {
    /// The provider this parser handles.
    fn provider(&self) -> VcsProvider;

    /// Verifies the request against the configured shared secret.
    ///
    /// An unconfigured (empty) secret together with no signature/token on
    /// the request is trivially authenticated; this preserves backward
    /// compatibility for origins that are not configured to sign.
    fn authenticate(&self, request: &InboundRequest) -> Result<(), AuthError>;

    /// Classifies the payload and derives the canonical event.
    ///
    /// Returns `Ok(None)` for event types and actions this design does not
    /// model.
    fn extract(&self, request: &InboundRequest) -> Result<Option<WebhookInfo>, ExtractError>;
}

/// Selects the concrete parser for an origin.
///
/// Pure selection, no side effects. `VcsProvider` is a closed enum, so
/// selection is total; unrecognized provider *names* are rejected earlier,
/// at the string boundary (`VcsProvider::from_str`).
pub fn parser_for(origin: &WebhookOrigin) -> Box<dyn WebhookParser> {
    let secret = origin.secret.clone();
    let base_url = origin.base_url().map(str::to_string);
    match origin.provider {
        VcsProvider::GitHub => Box::new(GitHubParser::new(secret, base_url)),
        VcsProvider::GitLab => Box::new(GitLabParser::new(secret, base_url)),
        VcsProvider::BitbucketServer => Box::new(BitbucketServerParser::new(secret, base_url)),
        VcsProvider::BitbucketCloud => Box::new(BitbucketCloudParser::new(secret, base_url)),
    }
}

/// Parses one inbound webhook request end to end.
///
/// Buffers the body exactly once, authenticates, then extracts. The first
/// error encountered is propagated; extraction is never attempted after an
/// authentication failure. The buffered body is dropped when this function
/// returns, so the request body's lifecycle is handled regardless of which
/// step fails.
pub async fn parse_incoming_webhook(
    origin: &WebhookOrigin,
    request: axum::extract::Request,
) -> Result<Option<WebhookInfo>, WebhookError> {
    let (parts, body) = request.into_parts();
    let query = parts.uri.query().unwrap_or("").to_string();

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(WebhookError::BodyRead)?;

    let inbound = InboundRequest::new(parts.headers, query, bytes);
    let parser = parser_for(origin);

    parser.authenticate(&inbound)?;
    debug!(provider = %origin.provider, "webhook authenticated");

    Ok(parser.extract(&inbound)?)
}
