// Error types module
use thiserror::Error;

use lixdb_sql::SqlError;
use lixdb_store::StoreError;

/// Core result alias.
pub type Result<T, E = LixError> = std::result::Result<T, E>;

/// Main error type for the LixDB engine.
///
/// Every validation and constraint failure carries enough context (entity
/// id, schema key, violating property) for the caller to act on; none of
/// them leave a partial commit behind.
#[derive(Error, Debug)]
pub enum LixError {
    #[error("schema validation failed for '{schema_key}', property '{property}': {message}")]
    SchemaValidation {
        schema_key: String,
        property: String,
        message: String,
    },

    #[error(
        "foreign key violation: '{referencing_schema}.{referencing_property}' in version \
         '{version_id}' still references entity '{entity_id}' of '{schema_key}'"
    )]
    ForeignKeyViolation {
        schema_key: String,
        entity_id: String,
        referencing_schema: String,
        referencing_property: String,
        version_id: String,
    },

    #[error("unresolved schema: '{key}' version {version}")]
    UnresolvedSchema { key: String, version: String },

    #[error("schema already registered: '{key}' version {version}")]
    DuplicateSchema { key: String, version: String },

    #[error("entity '{entity_id}' of '{schema_key}' already exists in version '{version_id}'")]
    EntityAlreadyExists {
        schema_key: String,
        entity_id: String,
        version_id: String,
    },

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("sql error: {0}")]
    Sql(#[from] SqlError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LixError {
    /// Create a schema validation error
    pub fn schema_validation<K, P, M>(schema_key: K, property: P, message: M) -> Self
    where
        K: Into<String>,
        P: Into<String>,
        M: Into<String>,
    {
        LixError::SchemaValidation {
            schema_key: schema_key.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Create an unresolved-schema error
    pub fn unresolved_schema<K: Into<String>, V: Into<String>>(key: K, version: V) -> Self {
        LixError::UnresolvedSchema {
            key: key.into(),
            version: version.into(),
        }
    }

    /// Create a duplicate-schema error
    pub fn duplicate_schema<K: Into<String>, V: Into<String>>(key: K, version: V) -> Self {
        LixError::DuplicateSchema {
            key: key.into(),
            version: version.into(),
        }
    }

    /// Create a version-not-found error
    pub fn version_not_found<S: Into<String>>(id: S) -> Self {
        LixError::VersionNotFound(id.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        LixError::InvalidOperation(msg.into())
    }
}
