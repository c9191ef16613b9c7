//! Bitbucket Cloud (bitbucket.org) webhook parser.
//!
//! Authentication: Bitbucket Cloud offers no signing, so the shared secret
//! travels as a `token` query parameter on the hook URL and is compared as a
//! plain string. Event classification: the `X-Event-Key` header.
//!
//! Pushes batch like Bitbucket Server's, but with old/new snapshots instead
//! of from/to hashes; a missing snapshot marks branch creation or deletion.
//! Only `created` and `updated` exist in the PR lifecycle here; merge and
//! decline deliveries carry no modeled distinction and are ignored.

use serde::Deserialize;

use crate::types::{
    Commit, PullRequestInfo, RepoId, Sha, User, VcsProvider, WebhookEvent, WebhookInfo,
};
use crate::webhooks::refs::resolve_branch_status;

use super::super::parser::{AuthError, ExtractError, InboundRequest, WebhookParser};
use super::{check_plain_token, rfc3339_epoch};

const EVENT_HEADER: &str = "X-Event-Key";
const TOKEN_PARAM: &str = "token";

/// Parser for webhooks delivered by bitbucket.org.
pub struct BitbucketCloudParser {
    secret: Option<String>,
    base_url: Option<String>,
}

impl BitbucketCloudParser {
    pub fn new(secret: Option<String>, base_url: Option<String>) -> Self {
        BitbucketCloudParser { secret, base_url }
    }

    fn compare_url(&self, repo: &RepoId, before: &Sha, after: &Sha) -> String {
        match &self.base_url {
            Some(base) => format!(
                "{base}/{}/{}/branches/compare/{after}..{before}",
                repo.owner, repo.name
            ),
            None => String::new(),
        }
    }
}

impl WebhookParser for BitbucketCloudParser {
    fn provider(&self) -> VcsProvider {
        VcsProvider::BitbucketCloud
    }

    fn authenticate(&self, request: &InboundRequest) -> Result<(), AuthError> {
        let token = request.query_param(TOKEN_PARAM);
        check_plain_token(token.as_deref(), self.secret.as_deref().unwrap_or(""))
    }

    fn extract(&self, request: &InboundRequest) -> Result<Option<WebhookInfo>, ExtractError> {
        let event = match request.header(EVENT_HEADER) {
            Some(event) => event,
            None => return Ok(None),
        };
        match event {
            "repo:push" => self.extract_push(request.body()),
            "pullrequest:created" => {
                self.extract_pull_request(request.body(), WebhookEvent::PrOpened)
            }
            "pullrequest:updated" => {
                self.extract_pull_request(request.body(), WebhookEvent::PrEdited)
            }
            // pullrequest:fulfilled/rejected, issue:*, repo:fork, ... are
            // not modeled.
            _ => Ok(None),
        }
    }
}

impl BitbucketCloudParser {
    fn extract_push(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPushPayload = serde_json::from_slice(payload)?;
        let repo = RepoId::from_path(&raw.repository.full_name);

        // First branch-typed change wins; tag changes are not modeled here.
        for change in &raw.push.changes {
            let snapshot_type = change
                .new
                .as_ref()
                .or(change.old.as_ref())
                .map(|s| s.snapshot_type.as_str());
            if snapshot_type != Some("branch") {
                continue;
            }

            let before = change
                .old
                .as_ref()
                .map(|s| Sha::new(&s.target.hash))
                .unwrap_or_else(Sha::nil);
            let after = change
                .new
                .as_ref()
                .map(|s| Sha::new(&s.target.hash))
                .unwrap_or_else(Sha::nil);

            let branch = change
                .new
                .as_ref()
                .or(change.old.as_ref())
                .map(|s| s.name.clone())
                .unwrap_or_default();

            let timestamp = match change.new.as_ref().and_then(|s| s.target.date.as_deref()) {
                Some(value) => rfc3339_epoch(value, "push.changes.new.target.date")?,
                None => 0,
            };

            let mut info = WebhookInfo::new(WebhookEvent::Push, repo.clone(), timestamp);
            info.target_branch = branch;
            info.branch_status = Some(resolve_branch_status(
                before.denotes_ref(),
                after.denotes_ref(),
            ));
            info.compare_url = self.compare_url(&repo, &before, &after);
            info.commit = change.new.as_ref().map(|s| Commit {
                hash: after.clone(),
                message: s.target.message.clone().unwrap_or_default(),
                url: s
                    .target
                    .links
                    .as_ref()
                    .and_then(|l| l.html.as_ref())
                    .map(|h| h.href.clone())
                    .unwrap_or_default(),
            });
            info.before_commit = Some(Commit::from_hash(before));
            info.triggered_by = actor_user(&raw.actor);
            return Ok(Some(info));
        }

        Ok(None)
    }

    fn extract_pull_request(
        &self,
        payload: &[u8],
        event: WebhookEvent,
    ) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
        let pr = &raw.pullrequest;

        let target_repo = endpoint_repo(&pr.destination);
        let source_repo = endpoint_repo(&pr.source);

        let timestamp = match pr.updated_on.as_deref() {
            Some(value) => rfc3339_epoch(value, "pullrequest.updated_on")?,
            None => 0,
        };

        let compare_url = pr
            .links
            .as_ref()
            .and_then(|l| l.html.as_ref())
            .map(|h| h.href.clone())
            .unwrap_or_default();

        let author = actor_user(&pr.author);
        let triggered_by = actor_user(&raw.actor);

        let mut info = WebhookInfo::new(event, target_repo.clone(), timestamp);
        info.target_branch = pr.destination.branch.name.clone();
        info.source_branch = pr.source.branch.name.clone();
        info.source_repository = source_repo.clone();
        info.pull_request_id = pr.id;
        info.triggered_by = triggered_by.clone();
        info.pull_request = Some(PullRequestInfo {
            id: pr.id,
            title: pr.title.clone().unwrap_or_default(),
            compare_url,
            timestamp,
            author,
            triggered_by,
            target_repository: target_repo,
            target_branch: pr.destination.branch.name.clone(),
            target_hash: endpoint_hash(&pr.destination),
            source_repository: source_repo,
            source_branch: pr.source.branch.name.clone(),
            source_hash: endpoint_hash(&pr.source),
        });

        Ok(Some(info))
    }
}

fn actor_user(actor: &Option<RawActor>) -> Option<User> {
    actor.as_ref().map(|a| User {
        login: a.nickname.clone().unwrap_or_default(),
        display_name: a.display_name.clone().unwrap_or_default(),
        avatar_url: a
            .links
            .as_ref()
            .and_then(|l| l.avatar.as_ref())
            .map(|h| h.href.clone())
            .unwrap_or_default(),
        ..User::default()
    })
}

fn endpoint_repo(endpoint: &RawPrEndpoint) -> RepoId {
    endpoint
        .repository
        .as_ref()
        .map(|r| RepoId::from_path(&r.full_name))
        .unwrap_or_default()
}

fn endpoint_hash(endpoint: &RawPrEndpoint) -> String {
    endpoint
        .commit
        .as_ref()
        .map(|c| c.hash.clone())
        .unwrap_or_default()
}

// ============================================================================
// Raw payload structures (Bitbucket Cloud event shapes)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    actor: Option<RawActor>,
    repository: RawRepository,
    push: RawPush,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    nickname: Option<String>,
    display_name: Option<String>,
    links: Option<RawActorLinks>,
}

#[derive(Debug, Deserialize)]
struct RawActorLinks {
    avatar: Option<RawHref>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawPush {
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    old: Option<RawSnapshot>,
    new: Option<RawSnapshot>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(rename = "type")]
    snapshot_type: String,
    name: String,
    target: RawTarget,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    hash: String,
    message: Option<String>,
    date: Option<String>,
    links: Option<RawTargetLinks>,
}

#[derive(Debug, Deserialize)]
struct RawTargetLinks {
    html: Option<RawHref>,
}

#[derive(Debug, Deserialize)]
struct RawHref {
    href: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    actor: Option<RawActor>,
    pullrequest: RawPullRequest,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    id: u64,
    title: Option<String>,
    updated_on: Option<String>,
    author: Option<RawActor>,
    links: Option<RawTargetLinks>,
    source: RawPrEndpoint,
    destination: RawPrEndpoint,
}

#[derive(Debug, Deserialize)]
struct RawPrEndpoint {
    branch: RawBranch,
    commit: Option<RawCommit>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    hash: String,
}
