//! Persistence seen from the worker: connect, best-effort backfills and
//! settings reads.

mod schema;
mod sqlite_console_store;

pub use schema::{BASE_DB_VERSION, CONSOLE_VERSIONED_SCHEMAS};
pub use sqlite_console_store::SqliteConsoleStore;

use anyhow::Result;
use tracing::warn;

pub const DEFAULT_UPDATE_CHANNEL: &str = "stable";
pub const DEFAULT_SESSION_LIFETIME_MINUTES: u64 = 1440;
/// Longest accepted session lifetime (ten years).
pub const MAX_SESSION_LIFETIME_MINUTES: u64 = 10 * 365 * 1440;

pub const DEFAULT_TENANT_NAME: &str = "Default";
pub const DEFAULT_SITE_NAME: &str = "Default";

/// Operations the bootstrap chain runs against the database.
///
/// Every backfill is idempotent: running it again on an already backfilled
/// database changes nothing. The counts returned are the rows touched.
pub trait PersistenceGateway: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
    /// Drop the connection. Closing a closed gateway is a no-op.
    fn close(&self) -> Result<()>;

    fn create_initial_settings(&self) -> Result<()>;
    fn create_default_tenant_and_site(&self) -> Result<()>;
    fn associate_agents_to_default_site(&self) -> Result<usize>;
    fn associate_tags_to_default_tenant(&self) -> Result<usize>;
    fn associate_metadata_to_default_tenant(&self) -> Result<usize>;
    fn associate_profiles_to_default_tenant(&self) -> Result<usize>;
    fn assign_default_agent_nicknames(&self) -> Result<usize>;
}

/// Read access to the global settings row.
///
/// Implementors only provide the raw reads; the provided methods apply the
/// fallbacks.
pub trait SettingsReader: Send + Sync {
    fn read_update_channel(&self) -> Result<Option<String>>;
    fn read_session_lifetime_minutes(&self) -> Result<Option<u64>>;

    /// Update channel, or [`DEFAULT_UPDATE_CHANNEL`] when unset or unreadable.
    fn update_channel(&self) -> String {
        match self.read_update_channel() {
            Ok(Some(channel)) if !channel.trim().is_empty() => channel.trim().to_string(),
            Ok(_) => DEFAULT_UPDATE_CHANNEL.to_string(),
            Err(e) => {
                warn!(
                    "Could not read update channel, using {:?}: {:#}",
                    DEFAULT_UPDATE_CHANNEL, e
                );
                DEFAULT_UPDATE_CHANNEL.to_string()
            }
        }
    }

    /// Session lifetime, or [`DEFAULT_SESSION_LIFETIME_MINUTES`] when unset,
    /// zero, above [`MAX_SESSION_LIFETIME_MINUTES`] or unreadable.
    fn session_lifetime_minutes(&self) -> u64 {
        match self.read_session_lifetime_minutes() {
            Ok(Some(minutes)) if minutes > MAX_SESSION_LIFETIME_MINUTES => {
                warn!(
                    "Stored session lifetime of {} minutes exceeds {}, using {} minutes",
                    minutes, MAX_SESSION_LIFETIME_MINUTES, DEFAULT_SESSION_LIFETIME_MINUTES
                );
                DEFAULT_SESSION_LIFETIME_MINUTES
            }
            Ok(Some(minutes)) if minutes > 0 => minutes,
            Ok(_) => DEFAULT_SESSION_LIFETIME_MINUTES,
            Err(e) => {
                warn!(
                    "Could not read session lifetime, using {} minutes: {:#}",
                    DEFAULT_SESSION_LIFETIME_MINUTES, e
                );
                DEFAULT_SESSION_LIFETIME_MINUTES
            }
        }
    }
}
