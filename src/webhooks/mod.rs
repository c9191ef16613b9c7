//! Webhook authentication and normalization.
//!
//! Inbound deliveries from GitHub, GitLab, Bitbucket Server and Bitbucket
//! Cloud are verified against a per-origin shared secret and mapped onto one
//! canonical event model, so downstream automation never sees
//! provider-specific payload shapes.

pub mod parser;
pub mod providers;
pub mod refs;
pub mod signature;

pub use parser::{
    parse_incoming_webhook, parser_for, AuthError, ExtractError, InboundRequest, WebhookError,
    WebhookParser,
};
pub use refs::{branch_status_from_hashes, resolve_branch_status};
