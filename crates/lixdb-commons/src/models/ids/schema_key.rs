//! Type-safe wrapper for schema keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key of a registered schema. Doubles as the base name of the entity views
/// generated for it (`<key>`, `<key>_all`, `<key>_history`), so it must be a
/// plain SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaKey(String);

/// Error type for schema key validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaKeyValidationError(pub String);

impl fmt::Display for SchemaKeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SchemaKeyValidationError {}

impl SchemaKey {
    /// Creates a new SchemaKey.
    ///
    /// # Panics
    /// Panics if the key is not a valid identifier. Use `try_new()` for
    /// fallible creation.
    #[inline]
    pub fn new(key: impl Into<String>) -> Self {
        Self::try_new(key).expect("schema key is not a valid identifier")
    }

    /// Creates a new SchemaKey, returning an error if validation fails.
    ///
    /// A key must start with a lowercase letter or underscore and contain
    /// only lowercase letters, digits, and underscores. This keeps generated
    /// view names unambiguous and JSON paths escape-free.
    pub fn try_new(key: impl Into<String>) -> Result<Self, SchemaKeyValidationError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    fn validate(key: &str) -> Result<(), SchemaKeyValidationError> {
        if key.is_empty() {
            return Err(SchemaKeyValidationError(
                "schema key cannot be empty".to_string(),
            ));
        }
        let mut chars = key.chars();
        let first = chars.next().unwrap_or('_');
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(SchemaKeyValidationError(format!(
                "schema key '{key}' must start with a lowercase letter or underscore"
            )));
        }
        if let Some(bad) = key
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
        {
            return Err(SchemaKeyValidationError(format!(
                "schema key '{key}' contains invalid character '{bad}'"
            )));
        }
        Ok(())
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

impl fmt::Display for SchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SchemaKey {
    /// Converts a &str into a SchemaKey.
    ///
    /// # Panics
    /// Panics if the key is not a valid identifier.
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for SchemaKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(SchemaKey::try_new("md_paragraph").is_ok());
        assert!(SchemaKey::try_new("_internal").is_ok());
        assert!(SchemaKey::try_new("v2_table").is_ok());
    }

    #[test]
    fn test_empty_key_blocked() {
        assert!(SchemaKey::try_new("").is_err());
    }

    #[test]
    fn test_uppercase_blocked() {
        let err = SchemaKey::try_new("MdParagraph").unwrap_err();
        assert!(err.0.contains("lowercase"));
    }

    #[test]
    fn test_punctuation_blocked() {
        assert!(SchemaKey::try_new("md-paragraph").is_err());
        assert!(SchemaKey::try_new("md.paragraph").is_err());
        assert!(SchemaKey::try_new("md paragraph").is_err());
    }

    #[test]
    fn test_leading_digit_blocked() {
        assert!(SchemaKey::try_new("1table").is_err());
    }
}
