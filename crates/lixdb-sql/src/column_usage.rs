//! Per-alias column-usage analysis.
//!
//! Given a parsed statement and the set of table aliases that denote
//! entity views, determine for every such alias either the exact set of
//! columns the statement references (case-insensitive) or `RequireAll`.
//! The result drives projection pruning in the rewriter.
//!
//! The analysis is conservative by construction: wildcards, shadowed or
//! ambiguous references, and any construct the walker does not model all
//! degrade to `RequireAll` instead of erroring. Over-collection only costs
//! a wider projection; under-collection would break queries, so every
//! doubtful path widens.

use std::collections::{BTreeSet, HashMap, HashSet};

use sqlparser::ast::{
    Cte, Distinct, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArgumentClause,
    FunctionArguments, GroupByExpr, Join, JoinConstraint, JoinOperator, LimitClause,
    NamedWindowExpr, ObjectName, ObjectNamePart, OrderByExpr, OrderByKind, Query, Select,
    SelectItem, SelectItemQualifiedWildcardKind, SetExpr, Statement, TableFactor, TableWithJoins,
    WindowSpec, WindowType,
};

/// What a single alias needs projected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnUsage {
    /// Conservative: every column must be projected.
    RequireAll,
    /// Only these columns (lowercase) are referenced.
    Columns(BTreeSet<String>),
}

impl ColumnUsage {
    fn add(&mut self, column: &str) {
        if let ColumnUsage::Columns(set) = self {
            set.insert(column.to_ascii_lowercase());
        }
    }

    fn require_all(&mut self) {
        *self = ColumnUsage::RequireAll;
    }

    /// Whether a column must be kept in the projection.
    pub fn requires(&self, column: &str) -> bool {
        match self {
            ColumnUsage::RequireAll => true,
            ColumnUsage::Columns(set) => set.contains(&column.to_ascii_lowercase()),
        }
    }
}

/// Analysis result for one statement.
#[derive(Debug, Default)]
pub struct UsageAnalysis {
    per_alias: HashMap<String, ColumnUsage>,
}

impl UsageAnalysis {
    /// Usage recorded for an alias (lowercase lookup).
    pub fn usage_for(&self, alias: &str) -> Option<&ColumnUsage> {
        self.per_alias.get(&alias.to_ascii_lowercase())
    }
}

/// Analyzes which columns each view alias needs.
///
/// `view_aliases` holds the lowercase effective aliases of every entity-view
/// table reference in the statement (an explicit alias, or the table name
/// itself when unaliased).
pub fn analyze_statement(stmt: &Statement, view_aliases: &HashSet<String>) -> UsageAnalysis {
    let mut analyzer = Analyzer::new(view_aliases);
    match stmt {
        Statement::Query(query) => analyzer.query(query),
        // DML and everything else: no pruning, keep every column
        _ => analyzer.mark_all(),
    }
    UsageAnalysis {
        per_alias: analyzer.usage,
    }
}

fn object_name_tail(name: &ObjectName) -> Option<&str> {
    name.0
        .last()
        .and_then(ObjectNamePart::as_ident)
        .map(|ident| ident.value.as_str())
}

fn order_by_exprs(query: &Query) -> &[OrderByExpr] {
    match query.order_by.as_ref().map(|order_by| &order_by.kind) {
        Some(OrderByKind::Expressions(exprs)) => exprs,
        _ => &[],
    }
}

/// Scoped traversal context; relation scopes are an explicit stack so the
/// analyzer is reentrant and testable in isolation.
struct Analyzer<'a> {
    view_aliases: &'a HashSet<String>,
    usage: HashMap<String, ColumnUsage>,
    /// One entry per nested statement scope: the relation aliases it
    /// declares (lowercase).
    scopes: Vec<Vec<String>>,
}

impl<'a> Analyzer<'a> {
    fn new(view_aliases: &'a HashSet<String>) -> Self {
        let usage = view_aliases
            .iter()
            .map(|alias| (alias.clone(), ColumnUsage::Columns(BTreeSet::new())))
            .collect();
        Self {
            view_aliases,
            usage,
            scopes: Vec::new(),
        }
    }

    /// Conservative escape hatch: every view alias needs everything.
    fn mark_all(&mut self) {
        for usage in self.usage.values_mut() {
            usage.require_all();
        }
    }

    fn require_all(&mut self, alias: &str) {
        let alias = alias.to_ascii_lowercase();
        if let Some(usage) = self.usage.get_mut(&alias) {
            usage.require_all();
        }
    }

    fn add_column(&mut self, alias: &str, column: &str) {
        let alias = alias.to_ascii_lowercase();
        if let Some(usage) = self.usage.get_mut(&alias) {
            usage.add(column);
        }
    }

    /// Unqualified column: attribute to every relation of the nearest
    /// enclosing scope that declares relations. A subquery exposing its own
    /// relations shadows outer aliases; one without relations resolves
    /// against the outer statement.
    fn add_unqualified(&mut self, column: &str) {
        let relations = self
            .scopes
            .iter()
            .rev()
            .find(|scope| !scope.is_empty())
            .cloned()
            .unwrap_or_default();
        for alias in relations {
            self.add_column(&alias, column);
        }
    }

    /// Qualified column: attribute to the nearest in-scope alias of that
    /// name (inner scopes shadow outer ones).
    fn add_qualified(&mut self, alias: &str, column: &str) {
        let needle = alias.to_ascii_lowercase();
        let found = self
            .scopes
            .iter()
            .rev()
            .any(|scope| scope.contains(&needle));
        if found || self.view_aliases.contains(&needle) {
            self.add_column(&needle, column);
        }
    }

    /// Wildcard over the current scope's relations.
    fn wildcard_current_scope(&mut self) {
        let relations = self
            .scopes
            .iter()
            .rev()
            .find(|scope| !scope.is_empty())
            .cloned()
            .unwrap_or_default();
        for alias in relations {
            self.require_all(&alias);
        }
    }

    fn query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.cte(cte);
            }
        }
        self.set_expr(&query.body, query);
    }

    fn cte(&mut self, cte: &Cte) {
        // a CTE body is its own statement scope
        self.query(&cte.query);
    }

    fn set_expr(&mut self, body: &SetExpr, query: &Query) {
        match body {
            SetExpr::Select(select) => self.select(select, query),
            SetExpr::Query(inner) => {
                self.query(inner);
                self.query_tail(query);
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left, query);
                self.set_expr(right, query);
                // compound ORDER BY names refer to output columns; resolve
                // conservatively against the surrounding scope
                for item in order_by_exprs(query) {
                    self.expr(&item.expr);
                }
            }
            SetExpr::Values(values) => {
                for row in &values.rows {
                    for expr in row {
                        self.expr(expr);
                    }
                }
            }
            // nested DML inside a query body is out of the model
            _ => self.mark_all(),
        }
    }

    /// ORDER BY / LIMIT / OFFSET of the enclosing `Query` node.
    fn query_tail(&mut self, query: &Query) {
        for item in order_by_exprs(query) {
            self.expr(&item.expr);
        }
        match &query.limit_clause {
            Some(LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            }) => {
                if let Some(limit) = limit {
                    self.expr(limit);
                }
                if let Some(offset) = offset {
                    self.expr(&offset.value);
                }
                for expr in limit_by {
                    self.expr(expr);
                }
            }
            Some(LimitClause::OffsetCommaLimit { offset, limit }) => {
                self.expr(offset);
                self.expr(limit);
            }
            None => {}
        }
    }

    fn select(&mut self, select: &Select, query: &Query) {
        // register every relation of this scope before visiting expressions
        let mut relations = Vec::new();
        for table in &select.from {
            self.collect_relations(table, &mut relations);
        }
        self.scopes.push(relations);

        for table in &select.from {
            self.table_with_joins(table);
        }
        for item in &select.projection {
            self.select_item(item);
        }
        if let Some(selection) = &select.selection {
            self.expr(selection);
        }
        if let Some(Distinct::On(exprs)) = &select.distinct {
            for expr in exprs {
                self.expr(expr);
            }
        }
        match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => {
                for expr in exprs {
                    self.expr(expr);
                }
            }
            GroupByExpr::All(_) => {}
        }
        if let Some(having) = &select.having {
            self.expr(having);
        }
        if let Some(qualify) = &select.qualify {
            self.expr(qualify);
        }
        for expr in &select.sort_by {
            self.expr(&expr.expr);
        }
        for window in &select.named_window {
            if let NamedWindowExpr::WindowSpec(spec) = &window.1 {
                self.window_spec(spec);
            }
        }
        self.query_tail(query);

        self.scopes.pop();
    }

    /// Registers the aliases a FROM item contributes to the scope. Factors
    /// the walker does not model poison the analysis conservatively.
    fn collect_relations(&mut self, table: &TableWithJoins, out: &mut Vec<String>) {
        self.factor_relations(&table.relation, out);
        for join in &table.joins {
            self.factor_relations(&join.relation, out);
        }
    }

    fn factor_relations(&mut self, factor: &TableFactor, out: &mut Vec<String>) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let effective = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .or_else(|| object_name_tail(name).map(str::to_string));
                if let Some(name) = effective {
                    out.push(name.to_ascii_lowercase());
                }
            }
            TableFactor::Derived { alias, .. } => {
                if let Some(alias) = alias {
                    out.push(alias.name.value.to_ascii_lowercase());
                }
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.factor_relations(&table_with_joins.relation, out);
                for join in &table_with_joins.joins {
                    self.factor_relations(&join.relation, out);
                }
            }
            TableFactor::UNNEST { alias, .. } => {
                if let Some(alias) = alias {
                    out.push(alias.name.value.to_ascii_lowercase());
                }
            }
            // opaque relation source: stop pruning anything
            _ => self.mark_all(),
        }
    }

    fn table_with_joins(&mut self, table: &TableWithJoins) {
        self.table_factor(&table.relation);
        for join in &table.joins {
            self.join(join);
        }
    }

    fn join(&mut self, join: &Join) {
        self.table_factor(&join.relation);
        let constraint = match &join.join_operator {
            JoinOperator::Join(c)
            | JoinOperator::Inner(c)
            | JoinOperator::Left(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::Right(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c)
            | JoinOperator::Semi(c)
            | JoinOperator::LeftSemi(c)
            | JoinOperator::RightSemi(c)
            | JoinOperator::Anti(c)
            | JoinOperator::LeftAnti(c)
            | JoinOperator::RightAnti(c) => Some(c),
            _ => None,
        };
        if let Some(JoinConstraint::On(expr)) = constraint {
            self.expr(expr);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { .. } => {}
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.table_factor(&table_with_joins.relation);
                for join in &table_with_joins.joins {
                    self.join(join);
                }
            }
            TableFactor::UNNEST { array_exprs, .. } => {
                for expr in array_exprs {
                    self.expr(expr);
                }
            }
            _ => {}
        }
    }

    fn select_item(&mut self, item: &SelectItem) {
        match item {
            SelectItem::UnnamedExpr(expr) => self.expr(expr),
            SelectItem::ExprWithAlias { expr, .. } => self.expr(expr),
            SelectItem::QualifiedWildcard(kind, _) => match kind {
                SelectItemQualifiedWildcardKind::ObjectName(name) => {
                    if let Some(alias) = object_name_tail(name) {
                        let alias = alias.to_string();
                        self.require_all(&alias);
                    }
                }
                _ => self.wildcard_current_scope(),
            },
            SelectItem::Wildcard(_) => self.wildcard_current_scope(),
        }
    }

    fn function(&mut self, function: &Function) {
        self.function_arguments(&function.parameters);
        self.function_arguments(&function.args);
        if let Some(filter) = &function.filter {
            self.expr(filter);
        }
        for item in &function.within_group {
            self.expr(&item.expr);
        }
        if let Some(WindowType::WindowSpec(spec)) = &function.over {
            self.window_spec(spec);
        }
    }

    fn function_arguments(&mut self, args: &FunctionArguments) {
        match args {
            FunctionArguments::None => {}
            FunctionArguments::Subquery(query) => self.query(query),
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. }
                        | FunctionArg::ExprNamed { arg, .. }
                        | FunctionArg::Unnamed(arg) => arg,
                    };
                    match arg_expr {
                        FunctionArgExpr::Expr(expr) => self.expr(expr),
                        FunctionArgExpr::QualifiedWildcard(name) => {
                            if let Some(alias) = object_name_tail(name) {
                                let alias = alias.to_string();
                                self.require_all(&alias);
                            }
                        }
                        FunctionArgExpr::Wildcard => self.wildcard_current_scope(),
                    }
                }
                for clause in &list.clauses {
                    if let FunctionArgumentClause::OrderBy(items) = clause {
                        for item in items {
                            self.expr(&item.expr);
                        }
                    }
                }
            }
        }
    }

    fn window_spec(&mut self, spec: &WindowSpec) {
        for expr in &spec.partition_by {
            self.expr(expr);
        }
        for item in &spec.order_by {
            self.expr(&item.expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => self.add_unqualified(&ident.value),
            Expr::CompoundIdentifier(parts) => {
                if parts.len() >= 2 {
                    let alias = parts[parts.len() - 2].value.clone();
                    let column = parts[parts.len() - 1].value.clone();
                    self.add_qualified(&alias, &column);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::UnaryOp { expr, .. } => self.expr(expr),
            Expr::Nested(inner) => self.expr(inner),
            Expr::Value(_) | Expr::TypedString { .. } => {}
            Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsNotTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::IsNotFalse(inner) => self.expr(inner),
            Expr::IsDistinctFrom(left, right) | Expr::IsNotDistinctFrom(left, right) => {
                self.expr(left);
                self.expr(right);
            }
            Expr::InList { expr, list, .. } => {
                self.expr(expr);
                for item in list {
                    self.expr(item);
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr);
                self.query(subquery);
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.expr(expr);
                self.expr(low);
                self.expr(high);
            }
            Expr::Like { expr, pattern, .. }
            | Expr::ILike { expr, pattern, .. }
            | Expr::SimilarTo { expr, pattern, .. } => {
                self.expr(expr);
                self.expr(pattern);
            }
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Cast { expr, .. } => self.expr(expr),
            Expr::Extract { expr, .. } => self.expr(expr),
            Expr::Collate { expr, .. } => self.expr(expr),
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.expr(operand);
                }
                for when in conditions {
                    self.expr(&when.condition);
                    self.expr(&when.result);
                }
                if let Some(else_result) = else_result {
                    self.expr(else_result);
                }
            }
            Expr::Exists { subquery, .. } => self.query(subquery),
            Expr::Subquery(subquery) => self.query(subquery),
            Expr::Function(function) => self.function(function),
            Expr::Tuple(exprs) => {
                for item in exprs {
                    self.expr(item);
                }
            }
            // anything the walker does not model could reference a view
            // column invisibly: give up pruning entirely
            _ => self.mark_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_single;

    fn aliases(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn analyze(sql: &str, view_aliases: &[&str]) -> UsageAnalysis {
        let stmt = parse_single(sql).expect("parse");
        analyze_statement(&stmt, &aliases(view_aliases))
    }

    fn columns(analysis: &UsageAnalysis, alias: &str) -> Vec<String> {
        match analysis.usage_for(alias).expect("alias tracked") {
            ColumnUsage::Columns(set) => set.iter().cloned().collect(),
            ColumnUsage::RequireAll => panic!("expected explicit columns for {alias}"),
        }
    }

    #[test]
    fn test_simple_projection_and_filter() {
        let analysis = analyze(
            "SELECT d.title FROM doc AS d WHERE d.status = 'open'",
            &["d"],
        );
        assert_eq!(columns(&analysis, "d"), vec!["status", "title"]);
    }

    #[test]
    fn test_unqualified_columns_attribute_to_single_relation() {
        let analysis = analyze("SELECT title FROM doc WHERE body LIKE '%x%'", &["doc"]);
        assert_eq!(columns(&analysis, "doc"), vec!["body", "title"]);
    }

    #[test]
    fn test_select_star_requires_all() {
        let analysis = analyze("SELECT * FROM doc", &["doc"]);
        assert_eq!(
            analysis.usage_for("doc"),
            Some(&ColumnUsage::RequireAll)
        );
    }

    #[test]
    fn test_qualified_star_requires_all_only_for_that_alias() {
        let analysis = analyze(
            "SELECT a.*, b.title FROM doc AS a JOIN doc AS b ON a.id = b.id",
            &["a", "b"],
        );
        assert_eq!(analysis.usage_for("a"), Some(&ColumnUsage::RequireAll));
        assert_eq!(columns(&analysis, "b"), vec!["id", "title"]);
    }

    #[test]
    fn test_count_star_is_conservative() {
        let analysis = analyze("SELECT COUNT(*) FROM doc", &["doc"]);
        assert_eq!(analysis.usage_for("doc"), Some(&ColumnUsage::RequireAll));
    }

    #[test]
    fn test_group_order_and_join_on_tracked() {
        let analysis = analyze(
            "SELECT d.category, COUNT(d.id) FROM doc d \
             JOIN tag t ON t.doc_id = d.id \
             GROUP BY d.category HAVING COUNT(d.id) > 1 \
             ORDER BY d.rank LIMIT 5",
            &["d", "t"],
        );
        assert_eq!(columns(&analysis, "d"), vec!["category", "id", "rank"]);
        assert_eq!(columns(&analysis, "t"), vec!["doc_id"]);
    }

    #[test]
    fn test_subquery_alias_shadowing() {
        // the inner doc shadows the outer one; both collapse into the same
        // alias name, so the union is recorded (conservative)
        let analysis = analyze(
            "SELECT d.outer_col FROM doc d \
             WHERE d.id IN (SELECT d.inner_col FROM other d)",
            &["d"],
        );
        assert_eq!(
            columns(&analysis, "d"),
            vec!["id", "inner_col", "outer_col"]
        );
    }

    #[test]
    fn test_unqualified_in_subquery_without_relations_resolves_outward() {
        let analysis = analyze(
            "SELECT title FROM doc WHERE EXISTS (SELECT 1 WHERE flag = TRUE)",
            &["doc"],
        );
        assert_eq!(columns(&analysis, "doc"), vec!["flag", "title"]);
    }

    #[test]
    fn test_cte_and_set_operation_branches() {
        let analysis = analyze(
            "WITH recent AS (SELECT d.id FROM doc d WHERE d.age < 5) \
             SELECT id FROM recent \
             UNION ALL \
             SELECT e.id FROM doc e",
            &["d", "e"],
        );
        assert_eq!(columns(&analysis, "d"), vec!["age", "id"]);
        assert_eq!(columns(&analysis, "e"), vec!["id"]);
    }

    #[test]
    fn test_window_function_tracked() {
        let analysis = analyze(
            "SELECT ROW_NUMBER() OVER (PARTITION BY d.category ORDER BY d.rank) FROM doc d",
            &["d"],
        );
        assert_eq!(columns(&analysis, "d"), vec!["category", "rank"]);
    }

    #[test]
    fn test_case_expression_tracked() {
        let analysis = analyze(
            "SELECT CASE WHEN d.kind = 'a' THEN d.title ELSE d.body END FROM doc d",
            &["d"],
        );
        assert_eq!(columns(&analysis, "d"), vec!["body", "kind", "title"]);
    }

    #[test]
    fn test_unreferenced_alias_has_empty_usage() {
        let analysis = analyze("SELECT 1 FROM doc", &["doc"]);
        assert_eq!(columns(&analysis, "doc"), Vec::<String>::new());
    }

    #[test]
    fn test_non_query_statement_is_conservative() {
        let stmt = parse_single("INSERT INTO doc (title) VALUES ('x')").expect("parse");
        let analysis = analyze_statement(&stmt, &aliases(&["doc"]));
        assert_eq!(analysis.usage_for("doc"), Some(&ColumnUsage::RequireAll));
    }
}
