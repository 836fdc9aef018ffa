//! Default configuration values - single source of truth

/// Connections opened when a pool is built and kept through idle eviction
pub const MIN_CONNECTIONS: usize = 1;

/// Upper bound on live connections per pool
pub const MAX_CONNECTIONS: usize = 10;

/// How long `acquire` waits for a free connection; 0 waits forever
pub const ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Idle connections older than this are closed on the next acquire; 0 disables
pub const IDLE_TIMEOUT_MS: u64 = 300_000;

/// SQLite busy handler timeout
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Statements run inside an implicit transaction unless autocommit is on
pub const AUTOCOMMIT: bool = false;
