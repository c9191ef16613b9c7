//! The canonical webhook event model.
//!
//! Every provider parser produces the same [`WebhookInfo`] structure,
//! regardless of which provider delivered the payload. This is the contract
//! downstream automation depends on: field names are stable, unset optional
//! fields are omitted from the wire format, and timestamps are always UTC
//! Unix seconds.
//!
//! # Invariants
//!
//! - Exactly one [`WebhookEvent`] value is set per instance.
//! - `commit`, `before_commit`, `branch_status` and `compare_url` are
//!   populated only when `event == Push`.
//! - `pull_request` is populated only for the PR lifecycle events.
//! - `tag` is populated only for the tag events.
//! - The three groups above are mutually exclusive per instance.

use serde::{Deserialize, Serialize};

use super::ids::{RepoId, Sha};

/// The kind of change a webhook delivery describes.
///
/// Closed enum; providers' native event taxonomies are mapped onto these
/// seven values and everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    /// Commits were pushed to a branch (including branch create/delete).
    Push,
    /// A pull/merge request was opened or reopened.
    PrOpened,
    /// A pull/merge request was edited or its source ref updated.
    PrEdited,
    /// A pull/merge request was merged.
    PrMerged,
    /// A pull/merge request was closed without merging.
    PrRejected,
    /// A tag was created.
    TagPushed,
    /// A tag was deleted.
    TagRemoved,
}

/// Lifecycle state of a branch after a push.
///
/// Always derived from the before/after hash sentinels, never taken from a
/// provider field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Created,
    Updated,
    Deleted,
}

/// A user identity as reported by the provider.
///
/// Providers differ in which of these they expose; absent fields stay empty
/// and are omitted from the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
}

impl User {
    /// Returns true if no identity field is set.
    pub fn is_empty(&self) -> bool {
        self.login.is_empty()
            && self.display_name.is_empty()
            && self.email.is_empty()
            && self.avatar_url.is_empty()
    }
}

/// A single commit reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: Sha,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl Commit {
    pub fn from_hash(hash: impl Into<Sha>) -> Self {
        Commit {
            hash: hash.into(),
            ..Commit::default()
        }
    }
}

/// Pull-request details attached to PR lifecycle events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compare_url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<User>,
    #[serde(default, skip_serializing_if = "RepoId::is_empty")]
    pub target_repository: RepoId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_hash: String,
    #[serde(default, skip_serializing_if = "RepoId::is_empty")]
    pub source_repository: RepoId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_hash: String,
}

/// Tag details attached to tag events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub hash: Sha,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "RepoId::is_empty")]
    pub repository: RepoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
}

/// The canonical output of webhook normalization.
///
/// Created fresh per inbound request by a provider parser, returned once,
/// and owned by the caller thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookInfo {
    pub event: WebhookEvent,

    pub target_repository: RepoId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_branch: String,

    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub pull_request_id: u64,
    #[serde(default, skip_serializing_if = "RepoId::is_empty")]
    pub source_repository: RepoId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_branch: String,

    /// UTC Unix seconds, normalized from whatever format the provider used.
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_commit: Option<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_status: Option<BranchStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compare_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagInfo>,
}

impl WebhookInfo {
    /// Creates an info with the given event, repository and timestamp and
    /// every optional field unset. Parsers fill in the rest via struct
    /// update syntax.
    pub fn new(event: WebhookEvent, target_repository: RepoId, timestamp: i64) -> Self {
        WebhookInfo {
            event,
            target_repository,
            target_branch: String::new(),
            pull_request_id: 0,
            source_repository: RepoId::default(),
            source_branch: String::new(),
            timestamp,
            commit: None,
            before_commit: None,
            branch_status: None,
            compare_url: String::new(),
            triggered_by: None,
            committer: None,
            author: None,
            pull_request: None,
            tag: None,
        }
    }
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}
