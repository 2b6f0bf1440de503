//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Default bind address of the HTTP service.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Config file looked up in the working directory when `RPA_DASHBOARD_CONFIG`
/// is not set.
pub const CONFIG_FILE_NAME: &str = "dashboard.toml";

/// Environment variable holding an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "RPA_DASHBOARD_CONFIG";

/// Maximum JSON body accepted on write endpoints (bytes).
pub const MAX_BODY_BYTES: usize = 1_048_576;

// ============================================================================
// Database
// ============================================================================

/// Connections kept by the PostgreSQL pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// ============================================================================
// Sessions & Login
// ============================================================================

/// Inactivity after which a session expires (seconds).
///
/// 8 hours, one working day.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 3600;

/// Interval of the expired-session sweep (seconds).
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Failed logins for one user name before login answers 429.
pub const MAX_LOGIN_FAILURES: u32 = 5;

/// Window over which failed logins are counted (seconds).
pub const LOGIN_FAILURE_WINDOW_SECS: u64 = 900;

/// PBKDF2 iterations used for new password hashes.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted by config validation.
pub const MIN_PBKDF2_ITERATIONS: u32 = 10_000;

// ============================================================================
// Demo mode
// ============================================================================

/// Login of the seeded demo user.
pub const DEMO_USER: &str = "demo";

/// Password of the seeded demo user.
pub const DEMO_PASSWORD: &str = "demo";
