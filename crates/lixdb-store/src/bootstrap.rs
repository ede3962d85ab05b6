//! Schema bootstrap: tables, derived views, and the seeded global version.

use rusqlite::Connection;

use lixdb_commons::Defaults;

use crate::error::StoreError;

/// Physical tables.
///
/// `change` is the append-only ledger; `change_set_element` is an
/// append-only pointer journal (the live element for a key within one set
/// is the one with the greatest `seq`); `state_cache` is the write-through
/// mirror of owned rows.
const TABLES: &str = "
CREATE TABLE IF NOT EXISTS change (
    id               TEXT PRIMARY KEY,
    entity_id        TEXT NOT NULL,
    schema_key       TEXT NOT NULL,
    schema_version   TEXT NOT NULL,
    file_id          TEXT NOT NULL,
    plugin_key       TEXT NOT NULL,
    snapshot_content TEXT,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_change_entity
    ON change (schema_key, entity_id, file_id);

CREATE TABLE IF NOT EXISTS change_set (
    id                TEXT PRIMARY KEY,
    parent_id         TEXT REFERENCES change_set (id),
    parent_cutoff_seq INTEGER
);

CREATE TABLE IF NOT EXISTS change_set_element (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    change_set_id TEXT NOT NULL REFERENCES change_set (id),
    change_id     TEXT NOT NULL REFERENCES change (id),
    entity_id     TEXT NOT NULL,
    schema_key    TEXT NOT NULL,
    file_id       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_element_key
    ON change_set_element (change_set_id, entity_id, schema_key, file_id, seq);

CREATE TABLE IF NOT EXISTS version (
    id                        TEXT PRIMARY KEY,
    name                      TEXT NOT NULL UNIQUE,
    change_set_id             TEXT NOT NULL REFERENCES change_set (id),
    inherits_from_version_id  TEXT REFERENCES version (id),
    tip_commit_id             TEXT
);
CREATE INDEX IF NOT EXISTS idx_version_change_set
    ON version (change_set_id);
CREATE INDEX IF NOT EXISTS idx_version_parent
    ON version (inherits_from_version_id);

CREATE TABLE IF NOT EXISTS commits (
    id               TEXT PRIMARY KEY,
    change_set_id    TEXT NOT NULL REFERENCES change_set (id),
    parent_commit_id TEXT REFERENCES commits (id),
    metadata         TEXT,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commit_element (
    commit_id TEXT NOT NULL REFERENCES commits (id),
    change_id TEXT NOT NULL REFERENCES change (id),
    PRIMARY KEY (commit_id, change_id)
);

CREATE TABLE IF NOT EXISTS state_cache (
    version_id       TEXT NOT NULL,
    entity_id        TEXT NOT NULL,
    schema_key       TEXT NOT NULL,
    file_id          TEXT NOT NULL,
    plugin_key       TEXT NOT NULL,
    schema_version   TEXT NOT NULL,
    snapshot_content TEXT,
    change_id        TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (version_id, entity_id, schema_key, file_id)
);
CREATE INDEX IF NOT EXISTS idx_cache_schema
    ON state_cache (schema_key, version_id);

CREATE TABLE IF NOT EXISTS stored_schema (
    key        TEXT NOT NULL,
    version    TEXT NOT NULL,
    definition TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (key, version)
);

CREATE TABLE IF NOT EXISTS active_version (
    slot       INTEGER PRIMARY KEY CHECK (slot = 1),
    version_id TEXT NOT NULL REFERENCES version (id)
);
";

/// Resolved per-version state.
///
/// Walks the version inheritance forest over the cache: the nearest
/// ancestor holding an entry defines the row; a tombstone at a nearer
/// depth shadows ancestor rows and is then hidden from the result.
const STATE_BY_VERSION: &str = "
CREATE VIEW IF NOT EXISTS state_by_version AS
WITH RECURSIVE ancestry (version_id, ancestor_id, depth) AS (
    SELECT id, id, 0 FROM version
    UNION ALL
    SELECT a.version_id, v.inherits_from_version_id, a.depth + 1
    FROM ancestry a
    JOIN version v ON v.id = a.ancestor_id
    WHERE v.inherits_from_version_id IS NOT NULL
),
resolved AS (
    SELECT
        a.version_id                       AS version_id,
        sc.entity_id                       AS entity_id,
        sc.schema_key                      AS schema_key,
        sc.schema_version                  AS schema_version,
        sc.file_id                         AS file_id,
        sc.plugin_key                      AS plugin_key,
        sc.snapshot_content                AS snapshot_content,
        sc.change_id                       AS change_id,
        sc.created_at                      AS created_at,
        sc.updated_at                      AS updated_at,
        CASE WHEN a.depth = 0 THEN NULL ELSE a.ancestor_id END
                                           AS inherited_from_version_id,
        ROW_NUMBER() OVER (
            PARTITION BY a.version_id, sc.entity_id, sc.schema_key, sc.file_id
            ORDER BY a.depth
        )                                  AS pick
    FROM ancestry a
    JOIN state_cache sc ON sc.version_id = a.ancestor_id
)
SELECT
    entity_id, schema_key, schema_version, file_id, plugin_key,
    snapshot_content, version_id, inherited_from_version_id,
    change_id, created_at, updated_at
FROM resolved
WHERE pick = 1 AND snapshot_content IS NOT NULL;
";

/// Commit-ancestry walk over the ledger: every change reachable from each
/// root commit, with its distance from that root.
const STATE_HISTORY: &str = "
CREATE VIEW IF NOT EXISTS state_history AS
WITH RECURSIVE commit_ancestry (root_commit_id, commit_id, depth) AS (
    SELECT id, id, 0 FROM commits
    UNION ALL
    SELECT ca.root_commit_id, co.parent_commit_id, ca.depth + 1
    FROM commit_ancestry ca
    JOIN commits co ON co.id = ca.commit_id
    WHERE co.parent_commit_id IS NOT NULL
)
SELECT
    ch.entity_id        AS entity_id,
    ch.schema_key       AS schema_key,
    ch.schema_version   AS schema_version,
    ch.file_id          AS file_id,
    ch.plugin_key       AS plugin_key,
    ch.snapshot_content AS snapshot_content,
    ch.id               AS change_id,
    ca.commit_id        AS commit_id,
    ca.root_commit_id   AS root_commit_id,
    ca.depth            AS depth,
    co.metadata         AS metadata,
    ch.created_at       AS created_at
FROM commit_ancestry ca
JOIN commits co ON co.id = ca.commit_id
JOIN commit_element ce ON ce.commit_id = ca.commit_id
JOIN change ch ON ch.id = ce.change_id;
";

/// Creates all tables and views and seeds the global version.
pub fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(TABLES)?;
    conn.execute_batch(STATE_BY_VERSION)?;
    conn.execute_batch(STATE_HISTORY)?;
    seed_global_version(conn)?;
    log::debug!("storage bootstrap complete");
    Ok(())
}

fn seed_global_version(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO change_set (id, parent_id, parent_cutoff_seq)
         VALUES (?1, NULL, NULL)",
        [Defaults::GLOBAL_VERSION_ID],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO version
             (id, name, change_set_id, inherits_from_version_id, tip_commit_id)
         VALUES (?1, ?2, ?1, NULL, NULL)",
        [Defaults::GLOBAL_VERSION_ID, Defaults::GLOBAL_VERSION_NAME],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO active_version (slot, version_id) VALUES (1, ?1)",
        [Defaults::GLOBAL_VERSION_ID],
    )?;
    Ok(())
}
