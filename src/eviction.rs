//! The concrete [`EvictionSink`] used by [`crate::dht::Dht`]. Bucket-list
//! insertion calls into this while holding the bucket list's write lock, so
//! it only stages decisions; applying them happens later, lock-free, via
//! `Dht::process_pending_evictions`.

use crate::bucket_list::EvictionSink;
use crate::contact::Contact;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct PendingContacts {
    pending: RwLock<Vec<Contact>>,
    evictions: RwLock<Vec<(Contact, Contact)>>,
}

impl PendingContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn take_pending(&self) -> Vec<Contact> {
        std::mem::take(&mut *self.pending.write().await)
    }

    pub async fn take_evictions(&self) -> Vec<(Contact, Contact)> {
        std::mem::take(&mut *self.evictions.write().await)
    }
}

#[async_trait]
impl EvictionSink for PendingContacts {
    async fn delay_evict(&self, stale: Contact, replacement: Contact) {
        self.evictions.write().await.push((stale, replacement));
    }

    async fn add_to_pending(&self, candidate: Contact) {
        self.pending.write().await.push(candidate);
    }
}
