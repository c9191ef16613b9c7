//! Core domain types shared across the crate.

pub mod ids;
pub mod info;
pub mod origin;

pub use ids::{NIL_HASH, RepoId, Sha};
pub use info::{
    BranchStatus, Commit, PullRequestInfo, TagInfo, User, WebhookEvent, WebhookInfo,
};
pub use origin::{UnknownProvider, VcsProvider, WebhookOrigin};
