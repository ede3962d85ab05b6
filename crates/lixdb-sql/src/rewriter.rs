//! Entity-view expansion.
//!
//! Rewrites every table reference that names a schema-derived view (in any
//! nested statement: CTEs, derived tables, expression subqueries, and
//! set-operation branches) into a generated subquery over the primitive
//! state relations. Table names that do not resolve to a view, or that are
//! shadowed by a CTE in scope, are left untouched; a statement without any
//! view reference is returned as the identical input value.
//!
//! The pass works in two phases over one statement:
//! 1. a read-only scan collects the effective aliases of every view
//!    reference, feeding the column-usage analysis,
//! 2. an in-place transform replaces the references, pruning each generated
//!    projection to the columns its alias actually needs.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use sqlparser::ast::{
    Expr, FromTable, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, JoinConstraint,
    JoinOperator, LimitClause, ObjectName, ObjectNamePart, OrderByKind, Query, Select, SelectItem,
    SetExpr, Statement, TableAlias, TableFactor, TableWithJoins, UpdateTableFromKind,
};

use lixdb_commons::{LixCol, Relations, SchemaDefinition};

use crate::column_usage::{analyze_statement, ColumnUsage, UsageAnalysis};
use crate::error::SqlError;
use crate::parser::parse_single;
use crate::views::{metadata_columns, resolve_view_reference, ViewSchemaResolver, ViewVariant};

/// Statement-level entity-view rewriter.
pub struct EntityViewRewriter<'a> {
    resolver: &'a dyn ViewSchemaResolver,
}

impl<'a> EntityViewRewriter<'a> {
    pub fn new(resolver: &'a dyn ViewSchemaResolver) -> Self {
        Self { resolver }
    }

    /// Rewrites one statement. Statements without view references come back
    /// unchanged (same value, deep-equal to the input).
    pub fn rewrite_statement(&self, stmt: Statement) -> Result<Statement, SqlError> {
        let mut shadows = Vec::new();
        let mut aliases = HashSet::new();
        self.collect_statement(&stmt, &mut shadows, &mut aliases);
        if aliases.is_empty() {
            return Ok(stmt);
        }

        let analysis = analyze_statement(&stmt, &aliases);
        let mut stmt = stmt;
        let mut shadows = Vec::new();
        let changed = self.statement(&mut stmt, &mut shadows, &analysis)?;
        if changed {
            log::debug!("expanded {} entity-view reference(s)", aliases.len());
        }
        Ok(stmt)
    }

    // ---- phase 1: collect view aliases ---------------------------------

    fn collect_statement(
        &self,
        stmt: &Statement,
        shadows: &mut Vec<String>,
        out: &mut HashSet<String>,
    ) {
        match stmt {
            Statement::Query(query) => self.collect_query(query, shadows, out),
            Statement::Insert(insert) => {
                if let Some(source) = &insert.source {
                    self.collect_query(source, shadows, out);
                }
            }
            Statement::Update {
                assignments,
                from,
                selection,
                ..
            } => {
                for assignment in assignments {
                    self.collect_expr(&assignment.value, shadows, out);
                }
                if let Some(from) = from {
                    let tables = match from {
                        UpdateTableFromKind::BeforeSet(tables)
                        | UpdateTableFromKind::AfterSet(tables) => tables,
                    };
                    for table in tables {
                        self.collect_table_with_joins(table, shadows, out);
                    }
                }
                if let Some(selection) = selection {
                    self.collect_expr(selection, shadows, out);
                }
            }
            Statement::Delete(delete) => {
                if let Some(selection) = &delete.selection {
                    self.collect_expr(selection, shadows, out);
                }
            }
            _ => {}
        }
    }

    fn collect_query(&self, query: &Query, shadows: &mut Vec<String>, out: &mut HashSet<String>) {
        let mut pushed = 0;
        if let Some(with) = &query.with {
            if with.recursive {
                for cte in &with.cte_tables {
                    shadows.push(cte.alias.name.value.to_ascii_lowercase());
                    pushed += 1;
                }
                for cte in &with.cte_tables {
                    self.collect_query(&cte.query, shadows, out);
                }
            } else {
                for cte in &with.cte_tables {
                    self.collect_query(&cte.query, shadows, out);
                    shadows.push(cte.alias.name.value.to_ascii_lowercase());
                    pushed += 1;
                }
            }
        }
        self.collect_set_expr(&query.body, shadows, out);
        if let Some(order_by) = &query.order_by {
            if let OrderByKind::Expressions(exprs) = &order_by.kind {
                for item in exprs {
                    self.collect_expr(&item.expr, shadows, out);
                }
            }
        }
        if let Some(LimitClause::LimitOffset { limit, offset, .. }) = &query.limit_clause {
            if let Some(limit) = limit {
                self.collect_expr(limit, shadows, out);
            }
            if let Some(offset) = offset {
                self.collect_expr(&offset.value, shadows, out);
            }
        }
        for _ in 0..pushed {
            shadows.pop();
        }
    }

    fn collect_set_expr(
        &self,
        body: &SetExpr,
        shadows: &mut Vec<String>,
        out: &mut HashSet<String>,
    ) {
        match body {
            SetExpr::Select(select) => self.collect_select(select, shadows, out),
            SetExpr::Query(query) => self.collect_query(query, shadows, out),
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_set_expr(left, shadows, out);
                self.collect_set_expr(right, shadows, out);
            }
            SetExpr::Values(values) => {
                for row in &values.rows {
                    for expr in row {
                        self.collect_expr(expr, shadows, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_select(
        &self,
        select: &Select,
        shadows: &mut Vec<String>,
        out: &mut HashSet<String>,
    ) {
        for table in &select.from {
            self.collect_table_with_joins(table, shadows, out);
        }
        for item in &select.projection {
            if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                self.collect_expr(expr, shadows, out);
            }
        }
        if let Some(selection) = &select.selection {
            self.collect_expr(selection, shadows, out);
        }
        if let Some(having) = &select.having {
            self.collect_expr(having, shadows, out);
        }
    }

    fn collect_table_with_joins(
        &self,
        table: &TableWithJoins,
        shadows: &mut Vec<String>,
        out: &mut HashSet<String>,
    ) {
        self.collect_table_factor(&table.relation, shadows, out);
        for join in &table.joins {
            self.collect_table_factor(&join.relation, shadows, out);
        }
    }

    fn collect_table_factor(
        &self,
        factor: &TableFactor,
        shadows: &mut Vec<String>,
        out: &mut HashSet<String>,
    ) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                if self.match_view(name, shadows).is_some() {
                    let effective = alias
                        .as_ref()
                        .map(|a| a.name.value.clone())
                        .or_else(|| object_name_tail(name).map(str::to_string));
                    if let Some(effective) = effective {
                        out.insert(effective.to_ascii_lowercase());
                    }
                }
            }
            TableFactor::Derived { subquery, .. } => self.collect_query(subquery, shadows, out),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.collect_table_with_joins(table_with_joins, shadows, out),
            _ => {}
        }
    }

    fn collect_expr(&self, expr: &Expr, shadows: &mut Vec<String>, out: &mut HashSet<String>) {
        match expr {
            Expr::Subquery(query) => self.collect_query(query, shadows, out),
            Expr::Exists { subquery, .. } => self.collect_query(subquery, shadows, out),
            Expr::InSubquery { expr, subquery, .. } => {
                self.collect_expr(expr, shadows, out);
                self.collect_query(subquery, shadows, out);
            }
            Expr::BinaryOp { left, right, .. } => {
                self.collect_expr(left, shadows, out);
                self.collect_expr(right, shadows, out);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => {
                self.collect_expr(expr, shadows, out)
            }
            Expr::InList { expr, list, .. } => {
                self.collect_expr(expr, shadows, out);
                for item in list {
                    self.collect_expr(item, shadows, out);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.collect_expr(expr, shadows, out);
                self.collect_expr(low, shadows, out);
                self.collect_expr(high, shadows, out);
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.collect_expr(operand, shadows, out);
                }
                for when in conditions {
                    self.collect_expr(&when.condition, shadows, out);
                    self.collect_expr(&when.result, shadows, out);
                }
                if let Some(else_result) = else_result {
                    self.collect_expr(else_result, shadows, out);
                }
            }
            Expr::Function(function) => {
                match &function.args {
                    FunctionArguments::List(list) => {
                        for arg in &list.args {
                            let arg_expr = match arg {
                                FunctionArg::Named { arg, .. }
                                | FunctionArg::ExprNamed { arg, .. }
                                | FunctionArg::Unnamed(arg) => arg,
                            };
                            if let FunctionArgExpr::Expr(expr) = arg_expr {
                                self.collect_expr(expr, shadows, out);
                            }
                        }
                    }
                    FunctionArguments::Subquery(query) => {
                        self.collect_query(query, shadows, out)
                    }
                    FunctionArguments::None => {}
                }
            }
            _ => {}
        }
    }

    // ---- phase 2: in-place rewrite -------------------------------------

    fn statement(
        &self,
        stmt: &mut Statement,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        match stmt {
            Statement::Query(query) => self.query(query, shadows, analysis),
            Statement::Insert(insert) => match &mut insert.source {
                Some(source) => self.query(source, shadows, analysis),
                None => Ok(false),
            },
            Statement::Update {
                assignments,
                from,
                selection,
                ..
            } => {
                let mut changed = false;
                for assignment in assignments {
                    changed |= self.expr(&mut assignment.value, shadows, analysis)?;
                }
                if let Some(from) = from {
                    let tables = match from {
                        UpdateTableFromKind::BeforeSet(tables)
                        | UpdateTableFromKind::AfterSet(tables) => tables,
                    };
                    for table in tables {
                        changed |= self.table_with_joins(table, shadows, analysis)?;
                    }
                }
                if let Some(selection) = selection {
                    changed |= self.expr(selection, shadows, analysis)?;
                }
                Ok(changed)
            }
            Statement::Delete(delete) => match &mut delete.selection {
                Some(selection) => self.expr(selection, shadows, analysis),
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn query(
        &self,
        query: &mut Query,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        let mut changed = false;
        let mut pushed = 0;
        if let Some(with) = &mut query.with {
            if with.recursive {
                for cte in &with.cte_tables {
                    shadows.push(cte.alias.name.value.to_ascii_lowercase());
                    pushed += 1;
                }
                for cte in &mut with.cte_tables {
                    changed |= self.query(&mut cte.query, shadows, analysis)?;
                }
            } else {
                for cte in &mut with.cte_tables {
                    changed |= self.query(&mut cte.query, shadows, analysis)?;
                    shadows.push(cte.alias.name.value.to_ascii_lowercase());
                    pushed += 1;
                }
            }
        }
        changed |= self.set_expr(&mut query.body, shadows, analysis)?;
        if let Some(order_by) = &mut query.order_by {
            if let OrderByKind::Expressions(exprs) = &mut order_by.kind {
                for item in exprs {
                    changed |= self.expr(&mut item.expr, shadows, analysis)?;
                }
            }
        }
        if let Some(LimitClause::LimitOffset { limit, offset, .. }) = &mut query.limit_clause {
            if let Some(limit) = limit {
                changed |= self.expr(limit, shadows, analysis)?;
            }
            if let Some(offset) = offset {
                changed |= self.expr(&mut offset.value, shadows, analysis)?;
            }
        }
        for _ in 0..pushed {
            shadows.pop();
        }
        Ok(changed)
    }

    fn set_expr(
        &self,
        body: &mut SetExpr,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        match body {
            SetExpr::Select(select) => self.select(select, shadows, analysis),
            SetExpr::Query(query) => self.query(query, shadows, analysis),
            SetExpr::SetOperation { left, right, .. } => {
                let left_changed = self.set_expr(left, shadows, analysis)?;
                let right_changed = self.set_expr(right, shadows, analysis)?;
                Ok(left_changed || right_changed)
            }
            SetExpr::Values(values) => {
                let mut changed = false;
                for row in &mut values.rows {
                    for expr in row {
                        changed |= self.expr(expr, shadows, analysis)?;
                    }
                }
                Ok(changed)
            }
            _ => Ok(false),
        }
    }

    fn select(
        &self,
        select: &mut Select,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        let mut changed = false;
        for table in &mut select.from {
            changed |= self.table_with_joins(table, shadows, analysis)?;
        }
        for item in &mut select.projection {
            if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                changed |= self.expr(expr, shadows, analysis)?;
            }
        }
        if let Some(selection) = &mut select.selection {
            changed |= self.expr(selection, shadows, analysis)?;
        }
        if let Some(having) = &mut select.having {
            changed |= self.expr(having, shadows, analysis)?;
        }
        Ok(changed)
    }

    fn table_with_joins(
        &self,
        table: &mut TableWithJoins,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        let mut changed = self.table_factor(&mut table.relation, shadows, analysis)?;
        for join in &mut table.joins {
            changed |= self.table_factor(&mut join.relation, shadows, analysis)?;
            let constraint = match &mut join.join_operator {
                JoinOperator::Join(c)
                | JoinOperator::Inner(c)
                | JoinOperator::Left(c)
                | JoinOperator::LeftOuter(c)
                | JoinOperator::Right(c)
                | JoinOperator::RightOuter(c)
                | JoinOperator::FullOuter(c) => Some(c),
                _ => None,
            };
            if let Some(JoinConstraint::On(expr)) = constraint {
                changed |= self.expr(expr, shadows, analysis)?;
            }
        }
        Ok(changed)
    }

    fn table_factor(
        &self,
        factor: &mut TableFactor,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let Some((def, variant)) = self.match_view(name, shadows) else {
                    return Ok(false);
                };
                let fallback_name = object_name_tail(name)
                    .map(str::to_string)
                    .unwrap_or_else(|| def.key.as_str().to_string());
                let effective_alias = alias.clone().unwrap_or_else(|| TableAlias {
                    // unaliased references keep resolving under the view name
                    name: Ident::new(fallback_name),
                    columns: vec![],
                });
                let usage = analysis.usage_for(&effective_alias.name.value);
                let sql = build_view_subquery(&def, variant, usage);
                let subquery = match parse_single(&sql)? {
                    Statement::Query(query) => query,
                    _ => {
                        return Err(SqlError::unsupported(
                            "generated view subquery did not parse as a query",
                        ))
                    }
                };
                *factor = TableFactor::Derived {
                    lateral: false,
                    subquery,
                    alias: Some(effective_alias),
                };
                Ok(true)
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery, shadows, analysis),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins, shadows, analysis),
            _ => Ok(false),
        }
    }

    fn expr(
        &self,
        expr: &mut Expr,
        shadows: &mut Vec<String>,
        analysis: &UsageAnalysis,
    ) -> Result<bool, SqlError> {
        match expr {
            Expr::Subquery(query) => self.query(query, shadows, analysis),
            Expr::Exists { subquery, .. } => self.query(subquery, shadows, analysis),
            Expr::InSubquery { expr, subquery, .. } => {
                let expr_changed = self.expr(expr, shadows, analysis)?;
                let sub_changed = self.query(subquery, shadows, analysis)?;
                Ok(expr_changed || sub_changed)
            }
            Expr::BinaryOp { left, right, .. } => {
                let left_changed = self.expr(left, shadows, analysis)?;
                let right_changed = self.expr(right, shadows, analysis)?;
                Ok(left_changed || right_changed)
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => self.expr(expr, shadows, analysis),
            Expr::InList { expr, list, .. } => {
                let mut changed = self.expr(expr, shadows, analysis)?;
                for item in list {
                    changed |= self.expr(item, shadows, analysis)?;
                }
                Ok(changed)
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                let mut changed = self.expr(expr, shadows, analysis)?;
                changed |= self.expr(low, shadows, analysis)?;
                changed |= self.expr(high, shadows, analysis)?;
                Ok(changed)
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                let mut changed = false;
                if let Some(operand) = operand {
                    changed |= self.expr(operand, shadows, analysis)?;
                }
                for when in conditions {
                    changed |= self.expr(&mut when.condition, shadows, analysis)?;
                    changed |= self.expr(&mut when.result, shadows, analysis)?;
                }
                if let Some(else_result) = else_result {
                    changed |= self.expr(else_result, shadows, analysis)?;
                }
                Ok(changed)
            }
            Expr::Function(function) => {
                let mut changed = false;
                match &mut function.args {
                    FunctionArguments::List(list) => {
                        for arg in &mut list.args {
                            let arg_expr = match arg {
                                FunctionArg::Named { arg, .. }
                                | FunctionArg::ExprNamed { arg, .. }
                                | FunctionArg::Unnamed(arg) => arg,
                            };
                            if let FunctionArgExpr::Expr(expr) = arg_expr {
                                changed |= self.expr(expr, shadows, analysis)?;
                            }
                        }
                    }
                    FunctionArguments::Subquery(query) => {
                        changed |= self.query(query, shadows, analysis)?;
                    }
                    FunctionArguments::None => {}
                }
                Ok(changed)
            }
            _ => Ok(false),
        }
    }

    /// Resolves a table name against the registry, honoring CTE shadowing.
    /// Multi-part names never match (entity views are bare identifiers).
    fn match_view(
        &self,
        name: &ObjectName,
        shadows: &[String],
    ) -> Option<(Arc<SchemaDefinition>, ViewVariant)> {
        if name.0.len() != 1 {
            return None;
        }
        let base = object_name_tail(name)?.to_ascii_lowercase();
        if shadows.contains(&base) {
            return None;
        }
        resolve_view_reference(&base, self.resolver)
    }
}

fn object_name_tail(name: &ObjectName) -> Option<&str> {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.as_str())
}

/// The single-relation table name a DELETE targets, if any.
pub fn delete_target_name(from: &FromTable) -> Option<&ObjectName> {
    let tables = match from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    };
    if tables.len() != 1 {
        return None;
    }
    match &tables[0].relation {
        TableFactor::Table { name, .. } => Some(name),
        _ => None,
    }
}

/// Generates the replacement subquery text for one view reference.
///
/// Properties come first (JSON-path extractions aliased to the property
/// name), then the variant's metadata columns. The entity id column is
/// always retained so the projection is never empty; all other columns are
/// dropped when the usage analysis proves the alias does not need them.
fn build_view_subquery(
    def: &SchemaDefinition,
    variant: ViewVariant,
    usage: Option<&ColumnUsage>,
) -> String {
    let needs = |column: &str| usage.map_or(true, |u| u.requires(column));

    let mut columns: Vec<String> = Vec::new();
    for prop in def.properties.keys() {
        if needs(prop) {
            columns.push(format!(
                "json_extract(snapshot_content, '$.\"{prop}\"') AS \"{prop}\""
            ));
        }
    }
    for (lixcol, backing) in metadata_columns(variant) {
        if lixcol != LixCol::ENTITY_ID && !needs(lixcol) {
            continue;
        }
        match def.lixcol_overrides.get(lixcol) {
            Some(literal) => columns.push(format!("{} AS {lixcol}", sql_literal(literal))),
            None => columns.push(format!("{backing} AS {lixcol}")),
        }
    }

    let mut predicates = vec![format!("schema_key = '{}'", def.key.as_str())];
    if variant == ViewVariant::Base {
        match def.lixcol_overrides.get(LixCol::VERSION_ID) {
            Some(literal) => predicates.push(format!("version_id = {}", sql_literal(literal))),
            None => predicates.push(format!(
                "version_id = (SELECT version_id FROM {})",
                Relations::ACTIVE_VERSION
            )),
        }
    }

    format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        variant.backing_relation(),
        predicates.join(" AND ")
    )
}

/// Renders a JSON literal from a metadata override as a SQL literal.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}
