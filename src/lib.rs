//! vcs-hooks - webhook authentication and normalization for hosted VCS providers.
//!
//! This library accepts webhook deliveries from GitHub, GitLab, Bitbucket
//! Server and Bitbucket Cloud, verifies them against per-provider shared
//! secrets, and maps them onto one canonical event model.

pub mod server;
pub mod types;
pub mod webhooks;
