//! Schema registration, resolution, and snapshot validation.

pub mod registry;
pub mod validate;

pub use registry::SchemaRegistry;
pub use validate::{validate_definition, validate_snapshot};
