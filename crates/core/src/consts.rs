//! Constant variables.
//!
//! Every duration is in milliseconds.

/// Width of the digest used to derive identifiers, also the widest supported id space.
pub const MAX_ID_BITS: u32 = 160;
/// Default id space width.
pub const DEFAULT_ID_BITS: u32 = 160;

/// Default number of finger table slots.
pub const DEFAULT_FINGER_TABLE_SIZE: usize = 32;
/// Default bound of successor and predecessor lists.
pub const DEFAULT_SUCC_LIST_SIZE: usize = 32;
/// Fingers refreshed per maintenance tick.
pub const DEFAULT_FIX_FINGER_CONCURRENCY: usize = 8;
/// Successor backups touched on join and synced per tick, in addition to the successor.
pub const DEFAULT_SUCC_BACKUP_CONCURRENCY: usize = 3;
/// Stored values untouched for this long are evicted.
pub const DEFAULT_STORE_RECYCLE_TIMEOUT: u64 = 60 * 1000;
/// A subscriber not renewed for this long is dropped from its channel.
pub const DEFAULT_SUBSCRIPTION_EXPIRATION: u64 = 10 * 60 * 1000;

/// Links kept alive regardless of idleness.
pub const DEFAULT_MIN_CONNS_TO_RECYCLE: usize = 5;
/// Deadline of a correlated call.
pub const DEFAULT_PEER_CALL_TIMEOUT: u64 = 10 * 1000;
/// Deadline of a connection wait.
pub const DEFAULT_PEER_CONNECT_TIMEOUT: u64 = 10 * 1000;
/// Links idle for this long may be recycled.
pub const DEFAULT_PEER_RECYCLE_TIMEOUT: u64 = 30 * 1000;
/// A failed connect blocks new attempts to the same peer for this long.
pub const DEFAULT_FAILED_CONNECT_BACKOFF: u64 = 1000;

/// Hop budget of forwarded messages.
pub const DEFAULT_FORWARD_TTL: u32 = 128;
/// Pause between maintenance ticks.
pub const DEFAULT_STABILIZE_INTERVAL: u64 = 500;
/// Deadline of offer and answer exchange.
pub const DEFAULT_SIGNAL_TIMEOUT: u64 = 60 * 1000;
/// Deadline for the introduced peer to report ready.
pub const DEFAULT_WAIT_EVENT_TIMEOUT: u64 = 1000;
/// Deadline of one maintenance tick.
pub const DEFAULT_NODE_POLL_TIMEOUT: u64 = 3000;
/// Join attempts before giving up.
pub const DEFAULT_MAX_JOIN_RETRY: usize = 10;
/// Pause between join attempts.
pub const DEFAULT_JOIN_RETRY_BACKOFF: u64 = 2000;
/// Ticks of unchanged state before the ring is considered stable.
pub const DEFAULT_NODE_STATE_CHECK_LENGTH: usize = 30 * 1000 / 500;
/// Grow the finger table while fewer links than this are live.
pub const DEFAULT_MIN_HUB_CONN_COUNT: usize = 5;
/// Shrink the finger table while more links than this are live.
pub const DEFAULT_MAX_HUB_CONN_COUNT: usize = 10;
/// Lower bound of adaptive finger sizing.
pub const DEFAULT_MIN_NODE_FINGER_SIZE: usize = 20;
/// Upper bound of adaptive finger sizing.
pub const DEFAULT_MAX_NODE_FINGER_SIZE: usize = 30;
