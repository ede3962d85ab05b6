//! Parsing SQL text into the statement AST the rewriter consumes.
//!
//! The engine executes against SQLite, so the SQLite dialect is tried
//! first; the generic dialect is the fallback for syntax sqlparser's
//! SQLite dialect does not accept.

use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::error::SqlError;

/// Parse SQL text into statements (multiple statements separated by
/// semicolons are supported).
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, SqlError> {
    if let Ok(statements) = try_parse_with_dialect(sql, &SQLiteDialect {}) {
        return Ok(statements);
    }
    try_parse_with_dialect(sql, &GenericDialect {})
        .map_err(|e| SqlError::parse(e.to_string()))
}

/// Parse SQL text that must contain exactly one statement.
pub fn parse_single(sql: &str) -> Result<Statement, SqlError> {
    let mut statements = parse_sql(sql)?;
    if statements.len() != 1 {
        return Err(SqlError::parse(format!(
            "expected exactly one statement, got {}",
            statements.len()
        )));
    }
    // len checked above
    Ok(statements.remove(0))
}

fn try_parse_with_dialect(
    sql: &str,
    dialect: &dyn Dialect,
) -> Result<Vec<Statement>, sqlparser::parser::ParserError> {
    Parser::parse_sql(dialect, sql)
}
