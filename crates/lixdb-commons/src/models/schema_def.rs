//! Structural schema definitions.
//!
//! A schema describes the shape of the JSON snapshots stored for its
//! entities and drives three things: snapshot validation on write, the
//! entity views the rewriter generates, and foreign-key enforcement on
//! delete. Definitions are immutable once registered under a
//! `(key, version)` pair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::SchemaKey;

/// Property types a schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl PropertyType {
    /// Human-readable name used in validation errors.
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::Object => "object",
            PropertyType::Array => "array",
        }
    }

    /// Whether a JSON value matches this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Number => value.is_number(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
            PropertyType::Array => value.is_array(),
        }
    }
}

/// A foreign-key constraint from one property to another schema's property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub property: String,
    pub references: ForeignKeyRef,
}

/// The referenced side of a foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub schema_key: SchemaKey,
    pub property: String,
}

/// Which generated view variants are enabled for a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewVariants {
    #[serde(default = "default_true")]
    pub base: bool,
    #[serde(default = "default_true")]
    pub by_version: bool,
    #[serde(default = "default_true")]
    pub history: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ViewVariants {
    fn default() -> Self {
        Self {
            base: true,
            by_version: true,
            history: true,
        }
    }
}

/// A structural schema, keyed by `(key, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub key: SchemaKey,
    pub version: String,
    /// Property name to declared type.
    pub properties: BTreeMap<String, PropertyType>,
    /// Properties that must be present and non-null. Primary-key properties
    /// are required regardless of whether they are listed here.
    #[serde(default)]
    pub required: Vec<String>,
    /// When false, snapshots may not carry properties the schema does not
    /// declare.
    #[serde(default)]
    pub additional_properties: bool,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Literal overrides for metadata columns, e.g. pinning
    /// `lixcol_version_id` so a schema always reads from one version.
    #[serde(default)]
    pub lixcol_overrides: BTreeMap<String, Value>,
    #[serde(default)]
    pub variants: ViewVariants,
}

impl SchemaDefinition {
    /// Minimal definition: every property optional, all variants enabled.
    pub fn new(key: SchemaKey, version: impl Into<String>) -> Self {
        Self {
            key,
            version: version.into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: false,
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            lixcol_overrides: BTreeMap::new(),
            variants: ViewVariants::default(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }

    pub fn with_primary_key<S: Into<String>>(mut self, props: Vec<S>) -> Self {
        self.primary_key = props.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required<S: Into<String>>(mut self, props: Vec<S>) -> Self {
        self.required = props.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key(
        mut self,
        property: impl Into<String>,
        ref_schema: SchemaKey,
        ref_property: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            property: property.into(),
            references: ForeignKeyRef {
                schema_key: ref_schema,
                property: ref_property.into(),
            },
        });
        self
    }

    pub fn with_lixcol_override(mut self, column: impl Into<String>, literal: Value) -> Self {
        self.lixcol_overrides.insert(column.into(), literal);
        self
    }

    /// Whether a property must be present and non-null.
    pub fn is_required(&self, property: &str) -> bool {
        self.primary_key.iter().any(|p| p == property)
            || self.required.iter().any(|p| p == property)
    }
}
