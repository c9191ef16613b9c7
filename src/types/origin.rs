//! Provider identity and per-call webhook configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A hosted source-control service we accept webhooks from.
///
/// Closed enum; used only to select a parser and never mutated after
/// construction. Unrecognized provider names are rejected at the string
/// boundary ([`VcsProvider::from_str`]), so an unsupported provider can be
/// distinguished from an authentication failure by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsProvider {
    GitHub,
    GitLab,
    BitbucketServer,
    BitbucketCloud,
}

impl VcsProvider {
    /// All providers, in a stable order. Used for configuration loading.
    pub const ALL: [VcsProvider; 4] = [
        VcsProvider::GitHub,
        VcsProvider::GitLab,
        VcsProvider::BitbucketServer,
        VcsProvider::BitbucketCloud,
    ];

    /// The canonical lowercase name used in routes and configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsProvider::GitHub => "github",
            VcsProvider::GitLab => "gitlab",
            VcsProvider::BitbucketServer => "bitbucket_server",
            VcsProvider::BitbucketCloud => "bitbucket_cloud",
        }
    }
}

impl fmt::Display for VcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a provider name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for VcsProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(VcsProvider::GitHub),
            "gitlab" => Ok(VcsProvider::GitLab),
            "bitbucket_server" | "bitbucket-server" => Ok(VcsProvider::BitbucketServer),
            "bitbucket_cloud" | "bitbucket-cloud" => Ok(VcsProvider::BitbucketCloud),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Per-call webhook configuration: which provider the request claims to come
/// from, the base URL used to build comparison/diff links, and the shared
/// secret used for authentication.
///
/// Immutable; constructed once per inbound call (or once at startup and
/// shared read-only, since nothing here is mutated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOrigin {
    pub provider: VcsProvider,
    /// Origin/API base URL, e.g. `https://github.example.com`. When absent,
    /// compare URLs are left empty.
    pub url: Option<String>,
    /// Shared secret or token. When absent, requests carrying no
    /// signature/token are trivially authenticated.
    pub secret: Option<String>,
}

impl WebhookOrigin {
    pub fn new(provider: VcsProvider) -> Self {
        WebhookOrigin {
            provider,
            url: None,
            secret: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// The configured secret, treating "not configured" and "empty" the same.
    pub fn secret_str(&self) -> &str {
        self.secret.as_deref().unwrap_or("")
    }

    /// The origin URL with any trailing slash removed, or `None`.
    pub fn base_url(&self) -> Option<&str> {
        self.url.as_deref().map(|u| u.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_roundtrip() {
        for provider in VcsProvider::ALL {
            assert_eq!(provider.as_str().parse::<VcsProvider>(), Ok(provider));
        }
    }

    #[test]
    fn dashed_aliases_parse() {
        assert_eq!(
            "bitbucket-server".parse::<VcsProvider>(),
            Ok(VcsProvider::BitbucketServer)
        );
        assert_eq!(
            "bitbucket-cloud".parse::<VcsProvider>(),
            Ok(VcsProvider::BitbucketCloud)
        );
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = "sourceforge".parse::<VcsProvider>().unwrap_err();
        assert_eq!(err, UnknownProvider("sourceforge".to_string()));
        assert_eq!(err.to_string(), "unsupported provider: sourceforge");
    }

    #[test]
    fn origin_builder_sets_fields() {
        let origin = WebhookOrigin::new(VcsProvider::GitLab)
            .with_url("https://gitlab.example.com/")
            .with_secret("s3cret");
        assert_eq!(origin.provider, VcsProvider::GitLab);
        assert_eq!(origin.base_url(), Some("https://gitlab.example.com"));
        assert_eq!(origin.secret_str(), "s3cret");
    }

    #[test]
    fn missing_secret_reads_as_empty() {
        let origin = WebhookOrigin::new(VcsProvider::GitHub);
        assert_eq!(origin.secret_str(), "");
        assert_eq!(origin.base_url(), None);
    }
}
