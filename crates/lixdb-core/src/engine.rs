//! The engine facade.
//!
//! One `Engine` owns one backing database: the caller registers schemas,
//! manages versions, and issues SQL (or direct state-store calls) against
//! it. SELECT statements flow through the entity-view rewriter before
//! execution; DML against entity views is routed into state mutations;
//! everything else passes through to SQLite untouched.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sqlparser::ast::Statement;

use lixdb_commons::{MonotonicClock, SchemaDefinition, Version, VersionId};
use lixdb_sql::rewriter::EntityViewRewriter;
use lixdb_sql::views::resolve_view_reference;
use lixdb_sql::{parse_sql, ViewVariant};
use lixdb_store::{exec, versions, Store};

use crate::dml;
use crate::error::{LixError, Result};
use crate::schema_registry::SchemaRegistry;
use crate::state::{StateCacheManager, StateStore};
use crate::version_graph::{CreateVersionSpec, VersionGraph};

/// Outcome of [`Engine::execute`]: result rows for row-returning
/// statements, an affected-row count for mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
    pub rows_affected: usize,
}

impl ExecutionResult {
    pub(crate) fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// The embedded LixDB engine.
pub struct Engine {
    store: Arc<Store>,
    registry: Arc<SchemaRegistry>,
    graph: VersionGraph,
    cache_manager: Arc<StateCacheManager>,
    state: StateStore,
}

impl Engine {
    /// Opens (creating if needed) an engine over a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_store(Store::open(path)?)
    }

    /// Opens an engine over an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_store(Store::open_in_memory()?)
    }

    fn from_store(store: Store) -> Result<Self> {
        let store = Arc::new(store);
        let clock = Arc::new(MonotonicClock::new());
        let registry = Arc::new(SchemaRegistry::new(Arc::clone(&store), Arc::clone(&clock))?);
        let cache_manager = Arc::new(StateCacheManager::new(Arc::clone(&store)));
        let graph = VersionGraph::new(Arc::clone(&store));
        let state = StateStore::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&cache_manager),
            clock,
        );
        Ok(Self {
            store,
            registry,
            graph,
            cache_manager,
            state,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn versions(&self) -> &VersionGraph {
        &self.graph
    }

    /// Registers a schema and invalidates the state cache.
    pub fn register_schema(&self, def: SchemaDefinition) -> Result<()> {
        self.registry.register(def)?;
        self.cache_manager.clear()
    }

    pub fn create_version(&self, spec: CreateVersionSpec) -> Result<Version> {
        self.graph.create(spec)
    }

    pub fn active_version(&self) -> Result<VersionId> {
        self.store
            .with_conn(|conn| versions::get_active_version(conn).map_err(LixError::from))
    }

    pub fn set_active_version(&self, id: &VersionId) -> Result<()> {
        self.store.with_conn(|conn| {
            if versions::get_version(conn, id)?.is_none() {
                return Err(LixError::version_not_found(id.as_str()));
            }
            versions::set_active_version(conn, id).map_err(LixError::from)
        })
    }

    /// Drops the state cache; subsequent access rebuilds it from the
    /// change ledger.
    pub fn clear_state_cache(&self) -> Result<()> {
        self.cache_manager.clear()
    }

    /// Parses and executes SQL. Multiple statements run in order; the last
    /// statement's result is returned.
    pub fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        let statements = parse_sql(sql)?;
        let mut result = ExecutionResult::default();
        for stmt in statements {
            result = self.execute_statement(stmt)?;
        }
        Ok(result)
    }

    fn execute_statement(&self, stmt: Statement) -> Result<ExecutionResult> {
        if matches!(stmt, Statement::Query(_)) {
            return self.run_select(stmt);
        }
        let is_dml = matches!(
            stmt,
            Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_)
        );
        if is_dml {
            if let Some((name, def, variant)) = self.dml_view_target(&stmt) {
                return match &stmt {
                    Statement::Insert(_) => dml::execute_insert(self, &stmt, def, variant),
                    Statement::Update { .. } => dml::execute_update(self, &stmt, &name, def, variant),
                    _ => dml::execute_delete(self, &stmt, &name, def, variant),
                };
            }
        }
        self.run_passthrough(stmt)
    }

    fn run_select(&self, stmt: Statement) -> Result<ExecutionResult> {
        self.cache_manager.ensure_fresh()?;
        let rewriter = EntityViewRewriter::new(self.registry.as_ref());
        let rewritten = rewriter.rewrite_statement(stmt)?;
        let sql = rewritten.to_string();
        log::trace!("executing: {sql}");
        let output = self
            .store
            .with_conn(|conn| exec::run_query(conn, &sql).map_err(LixError::from))?;
        Ok(ExecutionResult {
            columns: output.columns,
            rows: output.rows,
            rows_affected: 0,
        })
    }

    /// Read path used internally by the DML router.
    pub(crate) fn query_internal(&self, sql: &str) -> Result<ExecutionResult> {
        let stmt = lixdb_sql::parser::parse_single(sql)?;
        self.run_select(stmt)
    }

    /// Statements outside the entity-view surface run against SQLite
    /// as-is (view references in their nested queries still expand).
    fn run_passthrough(&self, stmt: Statement) -> Result<ExecutionResult> {
        self.cache_manager.ensure_fresh()?;
        let rewriter = EntityViewRewriter::new(self.registry.as_ref());
        let rewritten = rewriter.rewrite_statement(stmt)?;
        let sql = rewritten.to_string();
        log::trace!("executing passthrough: {sql}");
        let affected = self
            .store
            .with_conn(|conn| exec::run_statement(conn, &sql).map_err(LixError::from))?;
        Ok(ExecutionResult::affected(affected))
    }

    fn dml_view_target(
        &self,
        stmt: &Statement,
    ) -> Option<(String, Arc<SchemaDefinition>, ViewVariant)> {
        let name = dml::dml_target_name(stmt)?;
        let (def, variant) = resolve_view_reference(&name, self.registry.as_ref())?;
        Some((name, def, variant))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
