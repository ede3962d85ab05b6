//! Type-safe wrapper for entity identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::Defaults;

/// Identifier of a domain entity within a (schema, file) scope.
///
/// Usually derived from the schema's primary-key property values; composite
/// keys are joined with [`Defaults::ENTITY_ID_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Joins primary-key part values into a single entity id.
    pub fn from_key_parts<S: AsRef<str>>(parts: &[S]) -> Self {
        let joined = parts
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(Defaults::ENTITY_ID_SEPARATOR);
        Self(joined)
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

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
