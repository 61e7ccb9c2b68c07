//! A peer descriptor: an [`Id`], a handle to reach it, and a staleness clock.

use crate::id::Id;
use crate::protocol::Protocol;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// `(id, protocol, last_seen)` as described by the data model: a Contact is
/// owned by exactly one KBucket at a time, and its protocol handle is a
/// non-owning capability reference to the remote peer.
#[derive(Clone)]
pub struct Contact {
    pub id: Id,
    pub protocol: Arc<dyn Protocol>,
    last_seen: u64,
}

impl Contact {
    pub fn new(id: Id, protocol: Arc<dyn Protocol>) -> Self {
        Contact {
            id,
            protocol,
            last_seen: now_unix(),
        }
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Updates the last-seen clock to now.
    pub fn touch(&mut self) {
        self.last_seen = now_unix();
    }
}

impl std::fmt::Debug for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Contact {}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
