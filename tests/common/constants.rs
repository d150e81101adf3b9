//! Shared constants for end-to-end tests
//!
//! When timings or fixture values change, update only this file.

use std::time::Duration;

// ============================================================================
// Timings
// ============================================================================

/// Upper bound for the worker to reach Ready once the database is reachable
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between database connection attempts in tests
pub const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// How long to poll for a condition before failing the test
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request timeout for the HTTP test client
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Upper bound for each teardown wait
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Fixture values
// ============================================================================

/// Update channel stored in the fake settings
pub const TEST_UPDATE_CHANNEL: &str = "beta";

/// Session lifetime stored in the fake settings
pub const TEST_SESSION_LIFETIME_MINUTES: u64 = 60;

/// Release metadata URL template used by the catalog tests
pub const TEST_RELEASE_URL: &str = "http://releases.invalid/{channel}/latest.json";

/// Body every catalog download returns from the fake fetcher
pub const TEST_CATALOG_BODY: &[u8] = br#"{"entries":[]}"#;

/// Backfill steps in execution order
pub const BACKFILL_STEPS: [&str; 7] = [
    "create_initial_settings",
    "create_default_tenant_and_site",
    "associate_agents_to_default_site",
    "associate_tags_to_default_tenant",
    "associate_metadata_to_default_tenant",
    "associate_profiles_to_default_tenant",
    "assign_default_agent_nicknames",
];
