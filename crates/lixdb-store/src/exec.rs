//! Running rewritten SQL text and mapping result rows to JSON values.

use std::collections::BTreeMap;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;

use crate::error::StoreError;

/// Result of a row-returning statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
}

/// Executes a SELECT (or any row-returning statement) and collects rows.
pub fn run_query(conn: &Connection, sql: &str) -> Result<QueryOutput, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = BTreeMap::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), value_ref_to_json(row.get_ref(i)?));
        }
        collected.push(record);
    }
    Ok(QueryOutput {
        columns,
        rows: collected,
    })
}

/// Executes a non-row-returning statement, returning the affected row count.
pub fn run_statement(conn: &Connection, sql: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(sql, [])?)
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap;

    #[test]
    fn test_run_query_maps_types() {
        let conn = Connection::open_in_memory().expect("open");
        bootstrap::initialize(&conn).expect("init");
        let output = run_query(
            &conn,
            "SELECT 1 AS n, 'x' AS s, 1.5 AS f, NULL AS missing",
        )
        .expect("query");
        assert_eq!(output.columns, vec!["n", "s", "f", "missing"]);
        let row = &output.rows[0];
        assert_eq!(row["n"], Value::from(1));
        assert_eq!(row["s"], Value::from("x"));
        assert_eq!(row["f"], Value::from(1.5));
        assert_eq!(row["missing"], Value::Null);
    }
}
