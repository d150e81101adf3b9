use super::schema::{BASE_DB_VERSION, CONSOLE_VERSIONED_SCHEMAS};
use super::{
    PersistenceGateway, SettingsReader, DEFAULT_SESSION_LIFETIME_MINUTES, DEFAULT_SITE_NAME,
    DEFAULT_TENANT_NAME, DEFAULT_UPDATE_CHANNEL,
};
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed [`PersistenceGateway`] and [`SettingsReader`].
///
/// Constructing the store does not touch the filesystem; the database is only
/// opened by [`connect`](PersistenceGateway::connect), which the worker retries
/// until it succeeds.
pub struct SqliteConsoleStore {
    db_path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteConsoleStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            conn: Mutex::new(None),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Console database lock poisoned"))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock_conn()?;
        let conn = guard.as_ref().context("Console database is not connected")?;
        f(conn)
    }

    fn open(path: &Path) -> Result<Connection> {
        // Never create the directory: a missing data volume must stay a
        // retryable connect failure.
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory {} does not exist", parent.display());
            }
        }

        let is_new_db = !path.exists();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open console database at {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = CONSOLE_VERSIONED_SCHEMAS
            .last()
            .context("No console database schema defined")?;
        let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

        if is_new_db || raw_version == 0 {
            info!("Creating new console database at {:?}", path);
            latest.create(&conn)?;
            return Ok(conn);
        }

        let db_version = raw_version - BASE_DB_VERSION as i64;
        if db_version < 1 {
            bail!(
                "Console database version {} is invalid (expected >= 1)",
                db_version
            );
        }

        let version_index = CONSOLE_VERSIONED_SCHEMAS
            .iter()
            .position(|s| s.version == db_version as usize)
            .with_context(|| format!("Unknown console database version {}", db_version))?;
        CONSOLE_VERSIONED_SCHEMAS[version_index]
            .validate(&conn)
            .with_context(|| {
                format!(
                    "Console database schema validation failed for version {}",
                    db_version
                )
            })?;

        if (db_version as usize) < latest.version {
            info!(
                "Migrating console database from version {} to {}",
                db_version, latest.version
            );
            Self::migrate_if_needed(&mut conn, db_version as usize)?;
        }
        Ok(conn)
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in CONSOLE_VERSIONED_SCHEMAS.iter().skip(from_version) {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            latest_from = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn default_tenant_id(conn: &Connection) -> Result<i64> {
        conn.query_row(
            "SELECT id FROM tenants WHERE is_default = 1 ORDER BY id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .context("Default tenant does not exist")
    }

    fn default_site_id(conn: &Connection) -> Result<i64> {
        let tenant_id = Self::default_tenant_id(conn)?;
        conn.query_row(
            "SELECT id FROM sites WHERE tenant_id = ?1 AND is_default = 1 ORDER BY id LIMIT 1",
            params![tenant_id],
            |row| row.get(0),
        )
        .optional()?
        .context("Default site does not exist")
    }

    fn associate_to_default_tenant(&self, table: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let tenant_id = Self::default_tenant_id(conn)?;
            let updated = conn
                .execute(
                    &format!("UPDATE {} SET tenant_id = ?1 WHERE tenant_id IS NULL", table),
                    params![tenant_id],
                )
                .with_context(|| format!("Failed to associate {} to the default tenant", table))?;
            debug!("Associated {} {} row(s) to tenant {}", updated, table, tenant_id);
            Ok(updated)
        })
    }
}

impl PersistenceGateway for SqliteConsoleStore {
    fn connect(&self) -> Result<()> {
        let mut guard = self.lock_conn()?;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(Self::open(&self.db_path)?);
        info!("Connected to console database at {:?}", self.db_path);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn close(&self) -> Result<()> {
        let conn = self.lock_conn()?.take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| e)
                .context("Failed to close console database")?;
            info!("Closed console database");
        }
        Ok(())
    }

    fn create_initial_settings(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO settings (id, update_channel, session_lifetime_minutes)
                 VALUES (1, ?1, ?2)",
                params![DEFAULT_UPDATE_CHANNEL, DEFAULT_SESSION_LIFETIME_MINUTES as i64],
            )
            .context("Failed to create initial settings")?;
            Ok(())
        })
    }

    fn create_default_tenant_and_site(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM tenants WHERE is_default = 1 ORDER BY id LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let tenant_id = match existing {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO tenants (name, is_default) VALUES (?1, 1)",
                        params![DEFAULT_TENANT_NAME],
                    )
                    .context("Failed to create default tenant")?;
                    info!("Created default tenant");
                    tx.last_insert_rowid()
                }
            };
            tx.execute(
                "INSERT INTO sites (tenant_id, name, is_default)
                 SELECT ?1, ?2, 1
                 WHERE NOT EXISTS (SELECT 1 FROM sites WHERE tenant_id = ?1 AND is_default = 1)",
                params![tenant_id, DEFAULT_SITE_NAME],
            )
            .context("Failed to create default site")?;
            tx.commit()?;
            Ok(())
        })
    }

    fn associate_agents_to_default_site(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let site_id = Self::default_site_id(conn)?;
            let updated = conn
                .execute(
                    "UPDATE agents SET site_id = ?1 WHERE site_id IS NULL",
                    params![site_id],
                )
                .context("Failed to associate agents to the default site")?;
            debug!("Associated {} agent(s) to site {}", updated, site_id);
            Ok(updated)
        })
    }

    fn associate_tags_to_default_tenant(&self) -> Result<usize> {
        self.associate_to_default_tenant("tags")
    }

    fn associate_metadata_to_default_tenant(&self) -> Result<usize> {
        self.associate_to_default_tenant("metadata")
    }

    fn associate_profiles_to_default_tenant(&self) -> Result<usize> {
        self.associate_to_default_tenant("profiles")
    }

    fn assign_default_agent_nicknames(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE agents SET nickname = hostname WHERE nickname IS NULL OR nickname = ''",
                    [],
                )
                .context("Failed to assign default agent nicknames")?;
            Ok(updated)
        })
    }
}

impl SettingsReader for SqliteConsoleStore {
    fn read_update_channel(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT update_channel FROM settings WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn read_session_lifetime_minutes(&self) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            let minutes: Option<i64> = conn
                .query_row(
                    "SELECT session_lifetime_minutes FROM settings WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(minutes.and_then(|m| u64::try_from(m).ok()))
        })
    }
}
