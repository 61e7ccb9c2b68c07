//! Normative Kademlia parameters. `B` denotes the ID bit-width only; it is
//! never the bucket-splitting modulus — that is the separate, deliberately
//! distinct `SPLIT_THRESHOLD`.

/// Maximum contacts held by one k-bucket.
pub const K: usize = 20;
/// Degree of parallelism for iterative lookups.
pub const ALPHA: usize = 3;
/// Default TTL for a stored key/value pair, in seconds (24h).
pub const EXPIRATION_TIME_SEC: u64 = 86_400;
/// Interval after which an otherwise-untouched bucket must be refreshed.
pub const T_REFRESH_SEC: u64 = 3_600;
/// Interval between replication events (publishing the whole local store).
pub const T_REPLICATE_SEC: u64 = 3_600;
/// Interval after which the original publisher must republish a key/value.
pub const T_REPUBLISH_SEC: u64 = 86_400;
/// Prefix-length threshold at which a bucket outside our own range stops
/// splitting (the glossary's `b`, distinct from the ID width `B`).
pub const SPLIT_THRESHOLD: usize = 5;
/// Default per-RPC timeout applied by the router and the eviction path.
pub const DEFAULT_RPC_TIMEOUT_SEC: u64 = 5;
