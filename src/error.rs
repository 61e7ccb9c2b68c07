//! Error types for the DHT core and the surrounding process.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Attempted to insert our own ID into the routing table.
    #[error("cannot add our own node as a contact")]
    OurNodeCannotBeAContact,

    /// KBucket::add_contact was called on a bucket that was already full.
    /// BucketList checks is_full() before calling this, so seeing it here
    /// indicates a bug, not a routine condition.
    #[error("k-bucket is full (length is {len})")]
    TooManyContacts { len: usize },

    /// Contact ID falls outside the bucket's [low, high] range.
    #[error("contact id is out of range for this k-bucket")]
    OutOfRange,

    /// A peer's inbound RPC named us as the sender.
    #[error("sender cannot be ourselves")]
    SenderIsSelf,

    /// A peer's inbound query named us as the sender (find_node/find_value path).
    #[error("cannot send a query to ourselves")]
    SendingQueryToSelf,

    /// Router asked for a closest non-empty bucket with no contacts anywhere.
    #[error("no non-empty k-buckets are available")]
    AllKBucketsAreEmpty,

    /// An RPC either timed out or the transport reported an error. The
    /// router folds this into "unresponsive peer"; bucket-list eviction
    /// folds it into "candidate for replacement".
    #[error("rpc to peer failed: {0}")]
    Rpc(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),
}
