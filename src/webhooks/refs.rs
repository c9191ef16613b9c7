//! Ref handling shared by all push-event extractors.
//!
//! Providers report pushes in terms of fully-qualified refs
//! (`refs/heads/main`, `refs/tags/v1.0`) and a pair of before/after commit
//! hashes. The lifecycle of the branch is never stated explicitly; it is
//! derived here from whether each side of the change existed.

use crate::types::{BranchStatus, Sha};

const BRANCH_REF_PREFIX: &str = "refs/heads/";
const TAG_REF_PREFIX: &str = "refs/tags/";

/// Derives the branch lifecycle state from ref existence on each side of a
/// push.
///
/// The `(false, false)` input cannot be produced by any wire protocol (a
/// push where the ref existed on neither side); it falls through to
/// `Updated` rather than being specially handled.
pub fn resolve_branch_status(existed_before: bool, exists_after: bool) -> BranchStatus {
    match (existed_before, exists_after) {
        (false, true) => BranchStatus::Created,
        (true, false) => BranchStatus::Deleted,
        _ => BranchStatus::Updated,
    }
}

/// Derives the branch lifecycle state from the before/after hashes, using
/// the all-zero nil sentinel to mean "did not exist on that side".
pub fn branch_status_from_hashes(before: &Sha, after: &Sha) -> BranchStatus {
    resolve_branch_status(before.denotes_ref(), after.denotes_ref())
}

/// Strips the `refs/heads/` prefix from a fully-qualified branch ref.
/// Unqualified input is returned unchanged.
pub fn branch_name(r: &str) -> &str {
    r.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(r)
}

/// Returns the tag name if the ref is a fully-qualified tag ref.
pub fn tag_name(r: &str) -> Option<&str> {
    r.strip_prefix(TAG_REF_PREFIX)
}

/// Returns true for fully-qualified branch refs.
pub fn is_branch_ref(r: &str) -> bool {
    r.starts_with(BRANCH_REF_PREFIX)
}
