//! The in-process schema registry.
//!
//! Definitions persist append-only in `stored_schema`; resolution goes
//! through a DashMap cache so the rewriter's per-table lookups stay cheap.
//! Hit/miss counters are kept for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use lixdb_commons::{ForeignKey, MonotonicClock, SchemaDefinition, SchemaKey};
use lixdb_sql::ViewSchemaResolver;
use lixdb_store::{schemas, Store, StoreError};

use crate::error::{LixError, Result};
use crate::schema_registry::validate::validate_definition;

/// Registry over stored schema definitions.
pub struct SchemaRegistry {
    store: Arc<Store>,
    clock: Arc<MonotonicClock>,
    /// Latest registered definition per key.
    latest: DashMap<String, Arc<SchemaDefinition>>,
    /// Exact (key, version) pairs.
    exact: DashMap<(String, String), Arc<SchemaDefinition>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaRegistry {
    /// Creates a registry and warms the cache from persisted definitions.
    pub fn new(store: Arc<Store>, clock: Arc<MonotonicClock>) -> Result<Self> {
        let registry = Self {
            store,
            clock,
            latest: DashMap::new(),
            exact: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        registry.warm_up()?;
        Ok(registry)
    }

    /// Loads every persisted definition into the cache. Keeping the cache
    /// complete matters: resolution during an open transaction must never
    /// fall through to the store (the connection mutex is not reentrant).
    fn warm_up(&self) -> Result<()> {
        let definitions = self
            .store
            .with_conn(|conn| schemas::all_definitions(conn).map_err(LixError::from))?;
        for json in definitions {
            let def: SchemaDefinition = serde_json::from_str(&json)?;
            self.cache_definition(Arc::new(def));
        }
        log::debug!("schema registry warmed with {} key(s)", self.latest.len());
        Ok(())
    }

    /// Registers a definition. Duplicate (key, version) pairs are rejected;
    /// the caller is responsible for invalidating the state cache afterwards.
    pub fn register(&self, def: SchemaDefinition) -> Result<()> {
        validate_definition(&def)?;
        let json = serde_json::to_string(&def)?;
        let created_at = self.clock.now_rfc3339();
        let key = def.key.clone();
        let version = def.version.clone();
        self.store
            .with_conn(|conn| {
                schemas::insert_schema(conn, &key, &version, &json, &created_at)
            })
            .map_err(|err| match err {
                StoreError::Duplicate(_) => {
                    LixError::duplicate_schema(key.as_str(), version.clone())
                }
                other => other.into(),
            })?;
        self.cache_definition(Arc::new(def));
        log::info!("registered schema '{key}' version {version}");
        Ok(())
    }

    fn cache_definition(&self, def: Arc<SchemaDefinition>) {
        self.exact.insert(
            (def.key.as_str().to_string(), def.version.clone()),
            Arc::clone(&def),
        );
        // most recently registered wins
        self.latest.insert(def.key.as_str().to_string(), def);
    }

    /// Resolves the most recently registered definition for a key.
    pub fn resolve(&self, key: &SchemaKey) -> Result<Arc<SchemaDefinition>> {
        if let Some(def) = self.latest.get(key.as_str()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(def.value()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let json = self
            .store
            .with_conn(|conn| schemas::latest_schema(conn, key).map_err(LixError::from))?
            .ok_or_else(|| LixError::unresolved_schema(key.as_str(), "any"))?;
        let def: Arc<SchemaDefinition> = Arc::new(serde_json::from_str(&json)?);
        self.cache_definition(Arc::clone(&def));
        Ok(def)
    }

    /// Resolves an exact (key, version) pair.
    pub fn resolve_at(&self, key: &SchemaKey, version: &str) -> Result<Arc<SchemaDefinition>> {
        let cache_key = (key.as_str().to_string(), version.to_string());
        if let Some(def) = self.exact.get(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(def.value()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let json = self
            .store
            .with_conn(|conn| schemas::get_schema(conn, key, version).map_err(LixError::from))?
            .ok_or_else(|| LixError::unresolved_schema(key.as_str(), version))?;
        let def: Arc<SchemaDefinition> = Arc::new(serde_json::from_str(&json)?);
        self.exact.insert(cache_key, Arc::clone(&def));
        Ok(def)
    }

    /// Non-erroring lookup used by the rewriter.
    pub fn try_resolve(&self, key: &str) -> Option<Arc<SchemaDefinition>> {
        let key = SchemaKey::try_new(key).ok()?;
        self.resolve(&key).ok()
    }

    /// Every latest definition whose foreign keys reference the target
    /// schema, with the referencing constraint.
    pub fn foreign_keys_referencing(
        &self,
        target: &SchemaKey,
    ) -> Vec<(Arc<SchemaDefinition>, ForeignKey)> {
        let mut referencing = Vec::new();
        for entry in self.latest.iter() {
            for fk in &entry.value().foreign_keys {
                if &fk.references.schema_key == target {
                    referencing.push((Arc::clone(entry.value()), fk.clone()));
                }
            }
        }
        referencing
    }

    /// Cache hit rate (for diagnostics).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Number of distinct schema keys cached.
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl ViewSchemaResolver for SchemaRegistry {
    fn resolve_view_schema(&self, key: &str) -> Option<Arc<SchemaDefinition>> {
        self.try_resolve(key)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("keys", &self.latest.len())
            .finish_non_exhaustive()
    }
}
