//! Per-provider webhook parsers.
//!
//! Each provider gets one implementing type of
//! [`WebhookParser`](super::parser::WebhookParser) with its own
//! authentication scheme, its own raw decode structs (field shapes are never
//! unified across providers), and its own mapping onto the canonical event
//! model.

pub mod bitbucket_cloud;
pub mod bitbucket_server;
pub mod github;
pub mod gitlab;

pub use bitbucket_cloud::BitbucketCloudParser;
pub use bitbucket_server::BitbucketServerParser;
pub use github::GitHubParser;
pub use gitlab::GitLabParser;

use chrono::DateTime;

use super::parser::{AuthError, ExtractError};

/// Plain-string token comparison used by GitLab (`X-GitLab-Token` header)
/// and Bitbucket Cloud (`token` query parameter).
///
/// Both sides absent (or empty) is trivially authenticated; any other
/// disagreement, including one side empty, is a token mismatch.
pub(crate) fn check_plain_token(provided: Option<&str>, secret: &str) -> Result<(), AuthError> {
    if provided.unwrap_or("") == secret {
        Ok(())
    } else {
        Err(AuthError::TokenMismatch)
    }
}

/// Parses an RFC 3339 timestamp into UTC Unix seconds.
pub(crate) fn rfc3339_epoch(value: &str, field: &'static str) -> Result<i64, ExtractError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|_| ExtractError::Timestamp {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tokens_authenticate() {
        assert_eq!(check_plain_token(Some("abc"), "abc"), Ok(()));
        assert_eq!(check_plain_token(None, ""), Ok(()));
        assert_eq!(check_plain_token(Some(""), ""), Ok(()));
    }

    #[test]
    fn any_disagreement_is_a_mismatch() {
        assert_eq!(
            check_plain_token(Some("abc"), "xyz"),
            Err(AuthError::TokenMismatch)
        );
        assert_eq!(
            check_plain_token(None, "xyz"),
            Err(AuthError::TokenMismatch)
        );
        assert_eq!(
            check_plain_token(Some("abc"), ""),
            Err(AuthError::TokenMismatch)
        );
    }

    #[test]
    fn rfc3339_normalizes_offsets_to_utc() {
        assert_eq!(
            rfc3339_epoch("2021-08-31T16:24:16+03:00", "t").unwrap(),
            1630416256
        );
        assert_eq!(
            rfc3339_epoch("2021-08-31T13:24:16Z", "t").unwrap(),
            1630416256
        );
    }

    #[test]
    fn bad_rfc3339_reports_field_and_value() {
        let err = rfc3339_epoch("yesterday", "head_commit.timestamp").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid timestamp for head_commit.timestamp: yesterday"
        );
    }
}
