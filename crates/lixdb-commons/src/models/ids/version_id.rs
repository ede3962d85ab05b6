//! Type-safe wrapper for version identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::Defaults;

/// Identifier of a version (an independently mutable branch of state).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random version id.
    #[inline]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The version seeded at bootstrap that every database starts from.
    #[inline]
    pub fn global() -> Self {
        Self(Defaults::GLOBAL_VERSION_ID.to_string())
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        self.0 == Defaults::GLOBAL_VERSION_ID
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VersionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
