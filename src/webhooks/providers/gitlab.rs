//! GitLab webhook parser.
//!
//! Authentication: the `X-GitLab-Token` header is compared to the shared
//! secret as a plain string (no HMAC). Event classification: GitLab embeds
//! an `object_kind` discriminator in every payload, so classification is a
//! type switch over the decoded union rather than a header dispatch.
//!
//! Tag push hooks are not modeled in this design; only pushes and merge
//! requests produce events.

use serde::Deserialize;

use crate::types::{
    Commit, PullRequestInfo, RepoId, Sha, User, VcsProvider, WebhookEvent, WebhookInfo,
};
use crate::webhooks::refs::{branch_name, branch_status_from_hashes};

use super::super::parser::{AuthError, ExtractError, InboundRequest, WebhookParser};
use super::{check_plain_token, rfc3339_epoch};

const TOKEN_HEADER: &str = "X-GitLab-Token";

/// Parser for webhooks delivered by gitlab.com or self-managed GitLab.
pub struct GitLabParser {
    secret: Option<String>,
    base_url: Option<String>,
}

impl GitLabParser {
    pub fn new(secret: Option<String>, base_url: Option<String>) -> Self {
        GitLabParser { secret, base_url }
    }

    fn compare_url(&self, repo: &RepoId, before: &Sha, after: &Sha) -> String {
        match &self.base_url {
            Some(base) => format!(
                "{base}/{}/{}/-/compare/{before}...{after}",
                repo.owner, repo.name
            ),
            None => String::new(),
        }
    }
}

impl WebhookParser for GitLabParser {
    fn provider(&self) -> VcsProvider {
        VcsProvider::GitLab
    }

    fn authenticate(&self, request: &InboundRequest) -> Result<(), AuthError> {
        check_plain_token(request.header(TOKEN_HEADER), self.secret.as_deref().unwrap_or(""))
    }

    fn extract(&self, request: &InboundRequest) -> Result<Option<WebhookInfo>, ExtractError> {
        let envelope: RawEnvelope = serde_json::from_slice(request.body())?;
        match envelope.object_kind.as_str() {
            "push" => self.extract_push(request.body()),
            "merge_request" => self.extract_merge_request(request.body()),
            // tag_push, issues, notes, pipelines, ... are not modeled.
            _ => Ok(None),
        }
    }
}

impl GitLabParser {
    fn extract_push(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawPushPayload = serde_json::from_slice(payload)?;
        let repo = RepoId::from_path(&raw.project.path_with_namespace);

        let before = Sha::new(&raw.before);
        let after = Sha::new(&raw.after);

        // The commit list is unordered relative to the ref tip; prefer the
        // entry matching the after hash, fall back to the last one.
        let head = raw
            .commits
            .iter()
            .find(|c| c.id == raw.after)
            .or_else(|| raw.commits.last());

        let timestamp = match head.and_then(|c| c.timestamp.as_deref()) {
            Some(value) => rfc3339_epoch(value, "commits.timestamp")?,
            None => 0,
        };

        let mut info = WebhookInfo::new(WebhookEvent::Push, repo.clone(), timestamp);
        info.target_branch = branch_name(&raw.git_ref).to_string();
        info.branch_status = Some(branch_status_from_hashes(&before, &after));
        info.compare_url = self.compare_url(&repo, &before, &after);
        info.commit = Some(Commit {
            hash: after,
            message: head.and_then(|c| c.message.clone()).unwrap_or_default(),
            url: head.and_then(|c| c.url.clone()).unwrap_or_default(),
        });
        info.before_commit = Some(Commit::from_hash(before));
        info.triggered_by = Some(User {
            login: raw.user_username.unwrap_or_default(),
            display_name: raw.user_name.unwrap_or_default(),
            email: raw.user_email.unwrap_or_default(),
            avatar_url: raw.user_avatar.unwrap_or_default(),
        });
        info.author = head.and_then(|c| c.author.as_ref()).map(|a| User {
            display_name: a.name.clone().unwrap_or_default(),
            email: a.email.clone().unwrap_or_default(),
            ..User::default()
        });

        Ok(Some(info))
    }

    fn extract_merge_request(&self, payload: &[u8]) -> Result<Option<WebhookInfo>, ExtractError> {
        let raw: RawMergeRequestPayload = serde_json::from_slice(payload)?;
        let attrs = &raw.object_attributes;

        let event = match attrs.action.as_deref() {
            Some("open") | Some("reopen") => WebhookEvent::PrOpened,
            Some("update") => WebhookEvent::PrEdited,
            Some("merge") => WebhookEvent::PrMerged,
            Some("close") => WebhookEvent::PrRejected,
            // approved, unapproved, ... are not modeled.
            _ => return Ok(None),
        };

        let repo = RepoId::from_path(&raw.project.path_with_namespace);
        let source_repo = attrs
            .source
            .as_ref()
            .map(|p| RepoId::from_path(&p.path_with_namespace))
            .unwrap_or_default();

        let timestamp = match attrs.last_commit.as_ref().and_then(|c| c.timestamp.as_deref()) {
            Some(value) => rfc3339_epoch(value, "object_attributes.last_commit.timestamp")?,
            None => 0,
        };

        let triggered_by = raw.user.as_ref().map(|u| User {
            login: u.username.clone().unwrap_or_default(),
            display_name: u.name.clone().unwrap_or_default(),
            avatar_url: u.avatar_url.clone().unwrap_or_default(),
            ..User::default()
        });

        let mut info = WebhookInfo::new(event, repo.clone(), timestamp);
        info.target_branch = attrs.target_branch.clone();
        info.source_branch = attrs.source_branch.clone();
        info.source_repository = source_repo.clone();
        info.pull_request_id = attrs.iid;
        info.triggered_by = triggered_by.clone();
        info.pull_request = Some(PullRequestInfo {
            id: attrs.iid,
            title: attrs.title.clone().unwrap_or_default(),
            compare_url: attrs.url.clone().unwrap_or_default(),
            timestamp,
            author: triggered_by.clone(),
            triggered_by,
            target_repository: repo,
            target_branch: attrs.target_branch.clone(),
            target_hash: String::new(),
            source_repository: source_repo,
            source_branch: attrs.source_branch.clone(),
            source_hash: attrs
                .last_commit
                .as_ref()
                .map(|c| c.id.clone())
                .unwrap_or_default(),
        });

        Ok(Some(info))
    }
}

// ============================================================================
// Raw payload structures (GitLab system hook shapes)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    object_kind: String,
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    before: String,
    after: String,
    user_name: Option<String>,
    user_username: Option<String>,
    user_email: Option<String>,
    user_avatar: Option<String>,
    project: RawProject,
    #[serde(default)]
    commits: Vec<RawCommit>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    id: String,
    message: Option<String>,
    timestamp: Option<String>,
    url: Option<String>,
    author: Option<RawCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct RawCommitAuthor {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMergeRequestPayload {
    user: Option<RawUser>,
    project: RawProject,
    object_attributes: RawMrAttributes,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMrAttributes {
    iid: u64,
    title: Option<String>,
    action: Option<String>,
    url: Option<String>,
    source_branch: String,
    target_branch: String,
    source: Option<RawProject>,
    last_commit: Option<RawCommit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::HeaderMap;

    use crate::types::BranchStatus;

    fn request(payload: &str) -> InboundRequest {
        InboundRequest::new(HeaderMap::new(), "", Bytes::from(payload.to_string()))
    }

    fn parser() -> GitLabParser {
        GitLabParser::new(None, Some("https://gitlab.example.com".to_string()))
    }

    const PUSH: &str = r#"{
        "object_kind": "push",
        "ref": "refs/heads/main",
        "before": "9b6b9466fdf7af8a34bdbea9bf5b9a1e9c891e12",
        "after": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
        "user_name": "Jane Dev",
        "user_username": "janedev",
        "user_email": "jane@example.com",
        "user_avatar": "https://gitlab.example.com/avatar/jane",
        "project": { "path_with_namespace": "platform/hello-world" },
        "commits": [
            {
                "id": "1111111111111111111111111111111111111111",
                "message": "intermediate commit",
                "timestamp": "2021-08-31T10:00:00+00:00",
                "url": "https://gitlab.example.com/platform/hello-world/-/commit/1111111",
                "author": { "name": "Jane Dev", "email": "jane@example.com" }
            },
            {
                "id": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
                "message": "fix flaky webhook test",
                "timestamp": "2021-08-31T16:24:16+03:00",
                "url": "https://gitlab.example.com/platform/hello-world/-/commit/9566fb3",
                "author": { "name": "Jane Dev", "email": "jane@example.com" }
            }
        ]
    }"#;

    #[test]
    fn push_is_normalized() {
        let info = parser().extract(&request(PUSH)).unwrap().unwrap();

        assert_eq!(info.event, WebhookEvent::Push);
        assert_eq!(info.target_repository, RepoId::new("platform", "hello-world"));
        assert_eq!(info.target_branch, "main");
        assert_eq!(info.branch_status, Some(BranchStatus::Updated));
        // Timestamp comes from the commit matching the after hash.
        assert_eq!(info.timestamp, 1630416256);
        assert_eq!(info.commit.as_ref().unwrap().message, "fix flaky webhook test");
        assert_eq!(
            info.compare_url,
            "https://gitlab.example.com/platform/hello-world/-/compare/9b6b9466fdf7af8a34bdbea9bf5b9a1e9c891e12...9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a"
        );

        let user = info.triggered_by.unwrap();
        assert_eq!(user.login, "janedev");
        assert_eq!(user.display_name, "Jane Dev");
        assert_eq!(info.author.unwrap().email, "jane@example.com");
    }

    #[test]
    fn branch_deletion_has_deleted_status_and_no_commits() {
        let payload = r#"{
            "object_kind": "push",
            "ref": "refs/heads/old-feature",
            "before": "9b6b9466fdf7af8a34bdbea9bf5b9a1e9c891e12",
            "after": "0000000000000000000000000000000000000000",
            "user_username": "janedev",
            "project": { "path_with_namespace": "platform/hello-world" },
            "commits": []
        }"#;
        let info = parser().extract(&request(payload)).unwrap().unwrap();
        assert_eq!(info.branch_status, Some(BranchStatus::Deleted));
        assert_eq!(info.timestamp, 0);
    }

    #[test]
    fn tag_push_hooks_are_not_modeled() {
        let payload = r#"{
            "object_kind": "tag_push",
            "ref": "refs/tags/v1.0.0",
            "before": "0000000000000000000000000000000000000000",
            "after": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
            "project": { "path_with_namespace": "platform/hello-world" }
        }"#;
        assert!(parser().extract(&request(payload)).unwrap().is_none());
    }

    fn mr_payload(action: &str) -> String {
        format!(
            r#"{{
                "object_kind": "merge_request",
                "user": {{ "name": "Jane Dev", "username": "janedev", "avatar_url": "https://gitlab.example.com/avatar/jane" }},
                "project": {{ "path_with_namespace": "platform/hello-world" }},
                "object_attributes": {{
                    "iid": 7,
                    "title": "Refactor parser",
                    "action": "{action}",
                    "url": "https://gitlab.example.com/platform/hello-world/-/merge_requests/7",
                    "source_branch": "refactor",
                    "target_branch": "main",
                    "source": {{ "path_with_namespace": "janedev/hello-world" }},
                    "last_commit": {{
                        "id": "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a",
                        "message": "refactor",
                        "timestamp": "2021-08-31T13:24:16Z"
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn mr_action_table() {
        let cases = [
            ("open", WebhookEvent::PrOpened),
            ("reopen", WebhookEvent::PrOpened),
            ("update", WebhookEvent::PrEdited),
            ("merge", WebhookEvent::PrMerged),
            ("close", WebhookEvent::PrRejected),
        ];
        for (action, expected) in cases {
            let info = parser().extract(&request(&mr_payload(action))).unwrap().unwrap();
            assert_eq!(info.event, expected, "action {action}");
        }
    }

    #[test]
    fn mr_fields_are_normalized() {
        let info = parser().extract(&request(&mr_payload("open"))).unwrap().unwrap();
        assert_eq!(info.pull_request_id, 7);
        assert_eq!(info.target_branch, "main");
        assert_eq!(info.source_branch, "refactor");
        assert_eq!(info.source_repository, RepoId::new("janedev", "hello-world"));
        assert_eq!(info.timestamp, 1630416256);

        let pr = info.pull_request.unwrap();
        assert_eq!(pr.id, 7);
        assert_eq!(pr.title, "Refactor parser");
        assert_eq!(
            pr.compare_url,
            "https://gitlab.example.com/platform/hello-world/-/merge_requests/7"
        );
        assert_eq!(pr.source_hash, "9566fb3a0c63b85ec4b81a1eb4ed0b8f1be7b02a");
    }

    #[test]
    fn unmodeled_mr_actions_yield_nothing() {
        for action in ["approved", "unapproved"] {
            assert!(parser().extract(&request(&mr_payload(action))).unwrap().is_none());
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parser().extract(&request("[1,2")),
            Err(ExtractError::Json(_))
        ));
    }

    // ─── Authentication ───

    fn token_request(token: Option<&str>) -> InboundRequest {
        let mut headers = HeaderMap::new();
        if let Some(t) = token {
            headers.insert("x-gitlab-token", t.parse().unwrap());
        }
        InboundRequest::new(headers, "", Bytes::from_static(b"{}"))
    }

    #[test]
    fn matching_token_authenticates() {
        let parser = GitLabParser::new(Some("s3cret".to_string()), None);
        assert_eq!(parser.authenticate(&token_request(Some("s3cret"))), Ok(()));
    }

    #[test]
    fn wrong_or_missing_token_is_a_mismatch() {
        let parser = GitLabParser::new(Some("s3cret".to_string()), None);

        let err = parser.authenticate(&token_request(Some("nope"))).unwrap_err();
        assert_eq!(err.to_string(), "token mismatch");

        assert_eq!(
            parser.authenticate(&token_request(None)),
            Err(AuthError::TokenMismatch)
        );
    }

    #[test]
    fn token_without_configured_secret_is_a_mismatch() {
        let parser = GitLabParser::new(None, None);
        assert_eq!(
            parser.authenticate(&token_request(Some("anything"))),
            Err(AuthError::TokenMismatch)
        );
    }

    #[test]
    fn no_secret_and_no_token_is_trivially_authenticated() {
        let parser = GitLabParser::new(None, None);
        assert_eq!(parser.authenticate(&token_request(None)), Ok(()));
    }
}
