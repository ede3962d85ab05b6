//! SQL preprocessing for LixDB.
//!
//! Pure, synchronous AST passes over the `sqlparser` statement tree:
//!
//! - [`parser`]: dialect-aware parse helper
//! - [`column_usage`]: per-alias analysis of which columns a statement
//!   actually references (drives projection pruning)
//! - [`rewriter`]: expansion of entity-view table references into
//!   subqueries over the primitive state relations
//!
//! The crate knows nothing about SQLite or storage; the schema lookups the
//! rewriter needs come in through the [`views::ViewSchemaResolver`] trait.

pub mod column_usage;
pub mod error;
pub mod parser;
pub mod rewriter;
pub mod views;

pub use column_usage::{analyze_statement, ColumnUsage, UsageAnalysis};
pub use error::SqlError;
pub use parser::parse_sql;
pub use rewriter::EntityViewRewriter;
pub use views::{ViewSchemaResolver, ViewVariant};

/// SQL-layer result alias.
pub type Result<T, E = SqlError> = std::result::Result<T, E>;
