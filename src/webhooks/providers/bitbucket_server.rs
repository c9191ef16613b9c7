//! Bitbucket Server (Data Center) webhook parser.
//!
//! Authentication: HMAC-SHA256 over the raw body, delivered in the
//! `X-Hub-Signature` header as `sha256=<hex>`. Event classification: the
//! `X-Event-Key` header.
//!
//! Bitbucket Server batches ref updates: one `repo:refs_changed` delivery
//! carries a list of changes. One delivery maps to at most one canonical
//! event, so the first change that classifies (a branch update or a tag
//! add/delete) wins and the rest are ignored.

use chrono::DateTime;
use serde::Deserialize;

use crate::types::{
    Commit, PullRequestInfo, RepoId, Sha, TagInfo, User, VcsProvider, WebhookEvent, WebhookInfo,
};
use crate::webhooks::refs::branch_status_from_hashes;
use crate::webhooks::signature::{verify_signature_header, SignatureError};

use super::super::parser::{AuthError, ExtractError, InboundRequest, WebhookParser};

const EVENT_HEADER: &str = "X-Event-Key";
const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// The timestamp layout Bitbucket Server uses in webhook envelopes, e.g.
/// `2021-08-31T16:24:16+0300`. Not RFC 3339: the offset has no colon.
const DATE_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Parser for webhooks delivered by a self-hosted Bitbucket Server.
pub struct BitbucketServerParser {
    secret: Option<String>,
    base_url: Option<String>,
}

impl BitbucketServerParser {
    pub fn new(secret: Option<String>, base_url: Option<String>) -> Self {
        BitbucketServerParser { secret, base_url }
    }

    fn compare_url(&self, repo: &RepoId, before: &Sha, after: &Sha) -> String {
        match &self.base_url {
            Some(base) => format!(
                "{base}/projects/{}/repos/{}/compare/commits?from={before}&to={after}",
                repo.owner, repo.name
            ),
            None => String::new(),
        }
    }
}

impl WebhookParser for BitbucketServerParser {
    fn provider(&self) -> VcsProvider {
        VcsProvider::BitbucketServer
    }

    fn authenticate(&self, request: &InboundRequest) -> Result<(), AuthError> {
        let secret = self.secret.as_deref().unwrap_or("");
        if secret.is_empty() {
            return Ok(());
        }
        let header = request
            .header(SIGNATURE_HEADER)
            .ok_or(AuthError::MissingSignature(SIGNATURE_HEADER))?;
        verify_signature_header(request.body(), header, secret.as_bytes()).map_err(|e| match e {
            SignatureError::Malformed(msg) => AuthError::MalformedSignature(msg),
            SignatureError::Mismatch => AuthError::PayloadSignatureMismatch,
        })
    }

    fn extract(&self, request: &InboundRequest) -> Result<Option<WebhookInfo>, ExtractError> {
        let event = match request.header(EVENT_HEADER) {
            Some(event) => event,
            None => return Ok(None),
        };
        match event {
            "repo:refs_changed" => self.extract_refs_changed(request.body()),
            "pr:opened" => self.extract_pull_request(request.body(), WebhookEvent::PrOpened),
            "pr:from_ref_updated" => {
                self.extract_pull_request(request.body(), WebhookEvent::PrEdited)
            }
            "pr:merged" => self.extract_pull_request(request.body(), WebhookEvent::PrMerged),
            "pr:declined" | "pr:deleted" => {
                self.extract_pull_request(request.body(), WebhookEvent::PrRejected)
            }
            // diagnostics:ping, pr:comment:*, pr:reviewer:*, ... are not
            // modeled.
            _ => Ok(None),
        }
    }
}

impl BitbucketServerParser {
    fn extract_refs_changed(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawRefsChangedPayload = serde_json::from_slice(payload)?;
        let timestamp = envelope_epoch(&raw.date)?;
        let repo = repo_id(&raw.repository);
        let actor = actor_user(&raw.actor);

        // First classifying change wins; the rest of the batch is ignored.
        for change in &raw.changes {
            match change.ref_info.ref_type.as_str() {
                "BRANCH" => {
                    let before = Sha::new(&change.from_hash);
                    let after = Sha::new(&change.to_hash);

                    let mut info = WebhookInfo::new(WebhookEvent::Push, repo.clone(), timestamp);
                    info.target_branch = change.ref_info.display_id.clone();
                    info.branch_status = Some(branch_status_from_hashes(&before, &after));
                    info.compare_url = self.compare_url(&repo, &before, &after);
                    info.commit = Some(Commit::from_hash(after));
                    info.before_commit = Some(Commit::from_hash(before));
                    info.triggered_by = actor.clone();
                    return Ok(Some(info));
                }
                "TAG" => {
                    let (event, hash) = match change.change_type.as_str() {
                        "ADD" => (WebhookEvent::TagPushed, &change.to_hash),
                        "DELETE" => (WebhookEvent::TagRemoved, &change.from_hash),
                        // A force-moved tag (UPDATE) does not classify.
                        _ => continue,
                    };

                    let mut info = WebhookInfo::new(event, repo.clone(), timestamp);
                    info.triggered_by = actor.clone();
                    info.tag = Some(TagInfo {
                        name: change.ref_info.display_id.clone(),
                        hash: Sha::new(hash),
                        target_hash: String::new(),
                        message: String::new(),
                        repository: repo.clone(),
                        author: actor.clone(),
                    });
                    return Ok(Some(info));
                }
                _ => continue,
            }
        }

        Ok(None)
    }

    fn extract_pull_request(
        &self,
        payload: &[u8],
        event: WebhookEvent,
    ) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;
        let timestamp = envelope_epoch(&raw.date)?;
        let pr = &raw.pull_request;

        let target_repo = repo_id(&pr.to_ref.repository);
        let source_repo = repo_id(&pr.from_ref.repository);
        let actor = actor_user(&raw.actor);

        let compare_url = pr
            .links
            .self_links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();

        let mut info = WebhookInfo::new(event, target_repo.clone(), timestamp);
        info.target_branch = pr.to_ref.display_id.clone();
        info.source_branch = pr.from_ref.display_id.clone();
        info.source_repository = source_repo.clone();
        info.pull_request_id = pr.id;
        info.triggered_by = actor.clone();
        info.pull_request = Some(PullRequestInfo {
            id: pr.id,
            title: pr.title.clone().unwrap_or_default(),
            compare_url,
            timestamp,
            author: actor.clone(),
            triggered_by: actor,
            target_repository: target_repo,
            target_branch: pr.to_ref.display_id.clone(),
            target_hash: pr.to_ref.latest_commit.clone().unwrap_or_default(),
            source_repository: source_repo,
            source_branch: pr.from_ref.display_id.clone(),
            source_hash: pr.from_ref.latest_commit.clone().unwrap_or_default(),
        });

        Ok(Some(info))
    }
}

/// Parses the envelope `date` field. A date that does not match the fixed
/// layout is a malformed payload, not a missing field.
fn envelope_epoch(value: &str) -> Result<i64, ExtractError> {
    DateTime::parse_from_str(value, DATE_LAYOUT)
        .map(|dt| dt.timestamp())
        .map_err(|_| ExtractError::Timestamp {
            field: "date",
            value: value.to_string(),
        })
}

fn repo_id(repo: &RawRepository) -> RepoId {
    RepoId::new(&repo.project.key, &repo.slug)
}

fn actor_user(actor: &Option<RawActor>) -> Option<User> {
    actor.as_ref().map(|a| User {
        login: a.name.clone().unwrap_or_default(),
        display_name: a.display_name.clone().unwrap_or_default(),
        email: a.email_address.clone().unwrap_or_default(),
        ..User::default()
    })
}

// ============================================================================
// Raw payload structures (Bitbucket Server event shapes)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRefsChangedPayload {
    date: String,
    actor: Option<RawActor>,
    repository: RawRepository,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActor {
    name: Option<String>,
    email_address: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    slug: String,
    project: RawProject,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChange {
    #[serde(rename = "ref")]
    ref_info: RawRef,
    from_hash: String,
    to_hash: String,
    #[serde(rename = "type")]
    change_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRef {
    display_id: String,
    #[serde(rename = "type")]
    ref_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullRequestPayload {
    date: String,
    actor: Option<RawActor>,
    pull_request: RawPullRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullRequest {
    id: u64,
    title: Option<String>,
    from_ref: RawPrRef,
    to_ref: RawPrRef,
    #[serde(default)]
    links: RawLinks,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrRef {
    display_id: String,
    latest_commit: Option<String>,
    repository: RawRepository,
}

#[derive(Debug, Default, Deserialize)]
struct RawLinks {
    #[serde(rename = "self", default)]
    self_links: Vec<RawLink>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    href: String,
}
