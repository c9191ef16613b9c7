//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of plain strings (e.g., using a
//! branch name where a commit hash is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The 40-character all-zero hash that Git-based wire protocols use to mean
/// "this ref did not exist on this side of the change".
pub const NIL_HASH: &str = "0000000000000000000000000000000000000000";

/// A git commit SHA (40 hex characters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(pub String);

impl Sha {
    /// Creates a new Sha from a string.
    ///
    /// Note: This does not validate the format. Valid SHAs are 40 hex characters.
    pub fn new(s: impl Into<String>) -> Self {
        Sha(s.into())
    }

    /// The nil sentinel (40 zeros).
    pub fn nil() -> Self {
        Sha(NIL_HASH.to_string())
    }

    /// Returns true if this hash denotes a ref that exists: non-empty and
    /// not the nil sentinel.
    pub fn denotes_ref(&self) -> bool {
        !self.0.is_empty() && self.0 != NIL_HASH
    }

    /// Returns the SHA as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        // Use get() to avoid panic on short or non-ASCII input, which can
        // occur via Sha::new or Deserialize on bad payloads.
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Sha {
    fn from(s: String) -> Self {
        Sha(s)
    }
}

impl From<&str> for Sha {
    fn from(s: &str) -> Self {
        Sha(s.to_string())
    }
}

/// A repository identifier (owner + name).
///
/// "Owner" is whatever the provider scopes repositories under: a GitHub
/// user/organization login, a GitLab namespace, a Bitbucket Server project
/// key, or a Bitbucket Cloud workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Splits an `owner/name` path (GitLab `path_with_namespace`, Bitbucket
    /// Cloud `full_name`) on the last slash. Paths without a slash become a
    /// name with an empty owner.
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('/') {
            Some((owner, name)) => RepoId::new(owner, name),
            None => RepoId::new("", path),
        }
    }

    /// Returns true if both components are empty.
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.name.is_empty()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
