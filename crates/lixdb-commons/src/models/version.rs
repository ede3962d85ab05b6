//! Version records of the inheritance forest.

use serde::{Deserialize, Serialize};

use super::ids::{ChangeSetId, CommitId, VersionId};

/// A named, independently mutable branch of state.
///
/// `inherits_from_version_id` is set once at creation and never changes;
/// the inheritance graph is a forest by construction. `change_set_id` is
/// repointed when a shared change set is forked on first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub name: String,
    pub change_set_id: ChangeSetId,
    pub inherits_from_version_id: Option<VersionId>,
    /// Head of this version's commit chain, `None` before its first write.
    pub tip_commit_id: Option<CommitId>,
}
