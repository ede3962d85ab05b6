//! Domain models shared across the engine.

pub mod cache_entry;
pub mod change;
pub mod ids;
pub mod schema_def;
pub mod state_row;
pub mod version;

pub use cache_entry::CacheEntry;
pub use change::Change;
pub use schema_def::{ForeignKey, ForeignKeyRef, PropertyType, SchemaDefinition, ViewVariants};
pub use state_row::StateRow;
pub use version::Version;
