//! SQLite schema of the console database, as seen by the worker.

use anyhow::{bail, Result};
use rusqlite::{params, Connection};

/// Offset added to the schema version stored in `PRAGMA user_version`, so a
/// database created by something else is never mistaken for ours.
pub const BASE_DB_VERSION: usize = 7300;

pub struct VersionedSchema {
    pub version: usize,
    /// Table name and its `CREATE TABLE` statement.
    pub tables: &'static [(&'static str, &'static str)],
    pub indices: &'static [&'static str],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for (_, create_sql) in self.tables {
            conn.execute(create_sql, params![])?;
        }
        for index_sql in self.indices {
            conn.execute(index_sql, params![])?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check that every table of this version exists.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for (name, _) in self.tables {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                    params![name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing", name);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Version 1 - Settings, tenants, sites and tenant-scoped records
// =============================================================================

const SETTINGS_TABLE_V1: &str = "CREATE TABLE settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    update_channel TEXT NOT NULL,
    session_lifetime_minutes INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int))
)";

const TENANTS_TABLE_V1: &str = "CREATE TABLE tenants (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    is_default INTEGER NOT NULL DEFAULT 0
)";

const SITES_TABLE_V1: &str = "CREATE TABLE sites (
    id INTEGER PRIMARY KEY,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    UNIQUE (tenant_id, name)
)";

const AGENTS_TABLE_V1: &str = "CREATE TABLE agents (
    id INTEGER PRIMARY KEY,
    hostname TEXT NOT NULL,
    nickname TEXT,
    site_id INTEGER REFERENCES sites(id) ON DELETE SET NULL
)";

const TAGS_TABLE_V1: &str = "CREATE TABLE tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tenant_id INTEGER REFERENCES tenants(id) ON DELETE SET NULL
)";

const METADATA_TABLE_V1: &str = "CREATE TABLE metadata (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tenant_id INTEGER REFERENCES tenants(id) ON DELETE SET NULL
)";

const PROFILES_TABLE_V1: &str = "CREATE TABLE profiles (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tenant_id INTEGER REFERENCES tenants(id) ON DELETE SET NULL
)";

pub const CONSOLE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        ("settings", SETTINGS_TABLE_V1),
        ("tenants", TENANTS_TABLE_V1),
        ("sites", SITES_TABLE_V1),
        ("agents", AGENTS_TABLE_V1),
        ("tags", TAGS_TABLE_V1),
        ("metadata", METADATA_TABLE_V1),
        ("profiles", PROFILES_TABLE_V1),
    ],
    indices: &[
        "CREATE INDEX idx_agents_site_id ON agents(site_id)",
        "CREATE INDEX idx_sites_tenant_id ON sites(tenant_id)",
    ],
    migration: None,
}];
