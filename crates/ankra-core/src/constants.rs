/// Primary dedup set capacity. On overflow the set is cleared outright;
/// downstream handlers are idempotent so re-dispatch is safe.
pub const MAX_PROCESSED_HASHES: usize = 10_000;

/// TTL for cached account-permission lookups (seconds).
pub const ACCOUNT_CACHE_TTL_SECS: u64 = 300;

/// Maximum recursion depth when resolving delegated authorities.
pub const MAX_AUTH_DEPTH: usize = 5;

/// Permission checked against the anchoring account unless the chain
/// metadata names another.
pub const DEFAULT_PERMISSION: &str = "active";

/// Contract actions that carry anchors.
pub const ANCHOR_ACTIONS: &[&str] = &["put", "vote", "finalize"];

/// The action whose payload carries the canonical content hash.
pub const ACTION_PUT: &str = "put";

/// Streaming source: maximum unacknowledged block messages.
pub const DEFAULT_MAX_MESSAGES_IN_FLIGHT: u32 = 5;

/// TTL for event bodies in the cache tier (seconds).
pub const DEFAULT_EVENT_CACHE_TTL_SECS: u64 = 86_400;

/// Interval between periodic status log lines (seconds).
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

/// Streaming source reconnect policy defaults.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
