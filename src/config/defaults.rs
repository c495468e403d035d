//! System-wide default constants.
//!
//! Centralises the numeric defaults named in the configuration surface so
//! they aren't scattered across the codebase.

/// Token safety margin: a credential is considered invalid once less than
/// this much time remains before it expires.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 5 * 60;

/// Discovery engine cadence (C3).
pub const DISCOVERY_REFRESH_INTERVAL_MS: u64 = 300_000;

/// Collection scheduler cadence (C4).
pub const SCRAPE_INTERVAL_SECONDS: u64 = 60;
pub const SCRAPE_INTERVAL_SECONDS_MIN: u64 = 10;

/// Statistics window requested per destination per cycle.
pub const SCRAPE_PERIOD_SECONDS: u64 = 600;
pub const SCRAPE_PERIOD_SECONDS_MIN: u64 = 300;

/// HTTP client policy (C2).
pub const HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub const HTTP_READ_TIMEOUT_SECONDS: u64 = 30;
pub const HTTP_MAX_RETRIES: u32 = 3;
pub const HTTP_RETRY_BASE_DELAY_SECONDS: u64 = 1;

/// Bounded fan-out concurrency per collection cycle.
pub const COLLECTION_CONCURRENCY: usize = 20;

/// Monitor evaluator cadence (C5).
pub const MONITOR_EVALUATION_INTERVAL_SECONDS: u64 = 60;
pub const MONITOR_EVALUATION_INTERVAL_SECONDS_MIN: u64 = 10;

/// Default cooldown / window merged into monitor definitions that omit them.
pub const MONITOR_DEFAULT_COOLDOWN_MINUTES: i64 = 15;
pub const MONITOR_DEFAULT_EVALUATION_WINDOW_MINUTES: usize = 5;

/// Bounded FIFO capacity backing each MonitorState's baseline buffer.
pub const MONITOR_STATE_BUFFER_CAPACITY: usize = 100;

/// EQ-condition tolerance.
pub const EQ_EPSILON: f64 = 1e-3;

/// Current-stats map staleness sweep: entries untouched for longer than this
/// many scrape intervals are dropped. Not specified upstream — chosen to
/// tolerate the eventual-convergence model in spec.md §1 while still
/// bounding memory for destinations that disappear permanently.
pub const STALE_ENTRY_SCRAPE_INTERVALS: u32 = 3;

/// Health cache TTL backing `/actuator/health`'s UP/DOWN decision.
pub const HEALTH_CACHE_TTL_SECONDS: i64 = 30;

/// Bounded fan-out concurrency across a single result's notification channels.
pub const NOTIFICATION_DISPATCH_CONCURRENCY: usize = 8;
