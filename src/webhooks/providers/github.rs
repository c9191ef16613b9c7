//! GitHub webhook parser.
//!
//! Authentication: `X-Hub-Signature-256: sha256=<hex hmac>` over the raw
//! body. Event classification: the `X-GitHub-Event` header selects the
//! payload schema; a tag push is distinguished from a branch push by the
//! `refs/tags/` prefix on the same push payload.

use serde::Deserialize;

use crate::types::{
    Commit, PullRequestInfo, RepoId, Sha, TagInfo, User, VcsProvider, WebhookEvent, WebhookInfo,
};
use crate::webhooks::refs::{branch_name, branch_status_from_hashes, is_branch_ref, tag_name};
use crate::webhooks::signature::{SignatureError, verify_signature_header};

use super::super::parser::{AuthError, ExtractError, InboundRequest, WebhookParser};
use super::rfc3339_epoch;

const EVENT_HEADER: &str = "X-GitHub-Event";
const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Parser for webhooks delivered by github.com or GitHub Enterprise.
pub struct GitHubParser {
    secret: Option<String>,
    base_url: Option<String>,
}

impl GitHubParser {
    pub fn new(secret: Option<String>, base_url: Option<String>) -> Self {
        GitHubParser { secret, base_url }
    }

    fn compare_url(&self, repo: &RepoId, before: &Sha, after: &Sha) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/{}/{}/compare/{before}...{after}", repo.owner, repo.name),
            None => String::new(),
        }
    }
}

impl WebhookParser for GitHubParser {
    fn provider(&self) -> VcsProvider {
        VcsProvider::GitHub
    }

    fn authenticate(&self, request: &InboundRequest) -> Result<(), AuthError> {
        let secret = self.secret.as_deref().unwrap_or("");
        if secret.is_empty() {
            // Not configured to sign; nothing to verify against.
            return Ok(());
        }

        let header = request
            .header(SIGNATURE_HEADER)
            .ok_or(AuthError::MissingSignature(SIGNATURE_HEADER))?;

        verify_signature_header(request.body(), header, secret.as_bytes()).map_err(|e| match e {
            SignatureError::Malformed(reason) => AuthError::MalformedSignature(reason),
            SignatureError::Mismatch => AuthError::SignatureMismatch,
        })
    }

    fn extract(&self, request: &InboundRequest) -> Result<Option<WebhookInfo>, ExtractError> {
        match request.header(EVENT_HEADER) {
            Some("push") => self.extract_push(request.body()),
            Some("pull_request") => self.extract_pull_request(request.body()),
            // Everything else (ping, issues, stars, ...) is acknowledged
            // without producing an event.
            _ => Ok(None),
        }
    }
}

impl GitHubParser {
    fn extract_push(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPushPayload = serde_json::from_slice(payload)?;
        let repo = RepoId::new(raw.repository.owner.login.clone(), raw.repository.name.clone());

        let timestamp = match raw.head_commit.as_ref().and_then(|c| c.timestamp.as_deref()) {
            Some(value) => rfc3339_epoch(value, "head_commit.timestamp")?,
            // Branch deletions carry no head commit.
            None => 0,
        };

        if let Some(tag) = tag_name(&raw.git_ref) {
            return Ok(self.tag_change(&raw, repo, tag, timestamp));
        }
        if !is_branch_ref(&raw.git_ref) {
            return Ok(None);
        }

        let before = Sha::new(&raw.before);
        let after = Sha::new(&raw.after);

        let mut info = WebhookInfo::new(WebhookEvent::Push, repo.clone(), timestamp);
        info.target_branch = branch_name(&raw.git_ref).to_string();
        info.branch_status = Some(branch_status_from_hashes(&before, &after));
        info.compare_url = self.compare_url(&repo, &before, &after);
        info.commit = Some(Commit {
            hash: after,
            message: raw
                .head_commit
                .as_ref()
                .and_then(|c| c.message.clone())
                .unwrap_or_default(),
            url: raw
                .head_commit
                .as_ref()
                .and_then(|c| c.url.clone())
                .unwrap_or_default(),
        });
        info.before_commit = Some(Commit::from_hash(before));
        info.triggered_by = raw.sender.as_ref().map(account_user);
        info.author = raw
            .head_commit
            .as_ref()
            .and_then(|c| c.author.as_ref())
            .map(identity_user);
        info.committer = raw
            .head_commit
            .as_ref()
            .and_then(|c| c.committer.as_ref())
            .map(identity_user);

        Ok(Some(info))
    }

    /// Tag pushes arrive on the same payload type as branch pushes; the
    /// payload's own created/deleted booleans say which way the tag moved.
    fn tag_change(
        &self,
        raw: &RawPushPayload,
        repo: RepoId,
        tag: &str,
        timestamp: i64,
    ) -> Option<WebhookInfo> {
        let (event, hash) = if raw.deleted {
            (WebhookEvent::TagRemoved, Sha::new(&raw.before))
        } else if raw.created {
            (WebhookEvent::TagPushed, Sha::new(&raw.after))
        } else {
            return None;
        };

        let mut info = WebhookInfo::new(event, repo.clone(), timestamp);
        info.triggered_by = raw.sender.as_ref().map(account_user);
        info.tag = Some(TagInfo {
            name: tag.to_string(),
            hash,
            target_hash: String::new(),
            message: raw
                .head_commit
                .as_ref()
                .and_then(|c| c.message.clone())
                .unwrap_or_default(),
            repository: repo,
            author: raw
                .head_commit
                .as_ref()
                .and_then(|c| c.author.as_ref())
                .map(identity_user)
                .or_else(|| raw.sender.as_ref().map(account_user)),
        });
        Some(info)
    }

    fn extract_pull_request(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
        let pr = &raw.pull_request;

        let event = match raw.action.as_str() {
            "opened" | "reopened" => WebhookEvent::PrOpened,
            "synchronize" | "edited" => WebhookEvent::PrEdited,
            "closed" if pr.merged.unwrap_or(false) => WebhookEvent::PrMerged,
            "closed" => WebhookEvent::PrRejected,
            // labeled, assigned, review_requested, ... are not modeled.
            _ => return Ok(None),
        };

        let repo = RepoId::new(raw.repository.owner.login.clone(), raw.repository.name.clone());
        let timestamp = match pr.updated_at.as_deref().or(pr.created_at.as_deref()) {
            Some(value) => rfc3339_epoch(value, "pull_request.updated_at")?,
            None => 0,
        };

        let source_repo = pr
            .head
            .repo
            .as_ref()
            .map(|r| RepoId::new(r.owner.login.clone(), r.name.clone()))
            .unwrap_or_default();
        let triggered_by = raw.sender.as_ref().map(account_user);
        let author = pr.user.as_ref().map(account_user);

        let mut info = WebhookInfo::new(event, repo.clone(), timestamp);
        info.target_branch = pr.base.ref_name.clone();
        info.source_branch = pr.head.ref_name.clone();
        info.source_repository = source_repo.clone();
        info.pull_request_id = pr.number;
        info.triggered_by = triggered_by.clone();
        info.pull_request = Some(PullRequestInfo {
            id: pr.number,
            title: pr.title.clone().unwrap_or_default(),
            compare_url: pr.html_url.clone().unwrap_or_default(),
            timestamp,
            author,
            triggered_by,
            target_repository: repo,
            target_branch: pr.base.ref_name.clone(),
            target_hash: pr.base.sha.clone(),
            source_repository: source_repo,
            source_branch: pr.head.ref_name.clone(),
            source_hash: pr.head.sha.clone(),
        });

        Ok(Some(info))
    }
}

// ============================================================================
// Raw payload structures
//
// These mirror GitHub's webhook JSON. Optional upstream fields stay Option
// here and are unwrapped with explicit defaults; required structure is
// enforced by serde.
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    before: String,
    after: String,
    #[serde(default)]
    created: bool,
    #[serde(default)]
    deleted: bool,
    repository: RawRepository,
    sender: Option<RawAccount>,
    head_commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    login: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    message: Option<String>,
    timestamp: Option<String>,
    url: Option<String>,
    author: Option<RawGitIdentity>,
    committer: Option<RawGitIdentity>,
}

#[derive(Debug, Deserialize)]
struct RawGitIdentity {
    name: Option<String>,
    email: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
    repository: RawRepository,
    sender: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    title: Option<String>,
    html_url: Option<String>,
    merged: Option<bool>,
    created_at: Option<String>,
    updated_at: Option<String>,
    user: Option<RawAccount>,
    head: RawPrRef,
    base: RawPrRef,
}

#[derive(Debug, Deserialize)]
struct RawPrRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
    repo: Option<RawRepository>,
}

fn account_user(account: &RawAccount) -> User {
    User {
        login: account.login.clone(),
        avatar_url: account.avatar_url.clone().unwrap_or_default(),
        ..User::default()
    }
}

fn identity_user(identity: &RawGitIdentity) -> User {
    User {
        login: identity.username.clone().unwrap_or_default(),
        display_name: identity.name.clone().unwrap_or_default(),
        email: identity.email.clone().unwrap_or_default(),
        ..User::default()
    }
}
