//! The top-level peer: owns a [`Node`], a [`Router`], and the originator
//! store, and drives bootstrap, publish, and lookup-with-caching.

use crate::constants::{ALPHA, EXPIRATION_TIME_SEC, K};
use crate::contact::Contact;
use crate::error::Error;
use crate::eviction::PendingContacts;
use crate::id::Id;
use crate::node::Node;
use crate::router::{LookupKind, Router};
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a value lookup: whether it was found, the K closest contacts
/// discovered along the way (empty on a local hit), and the value itself.
pub struct FindValueResult {
    pub found: bool,
    pub contacts: Vec<Contact>,
    pub value: Option<String>,
}

pub struct Dht {
    node: Arc<Node>,
    router: Router,
    pending: Arc<PendingContacts>,
}

impl Dht {
    pub fn new(id: Id, storage: Arc<dyn Storage>) -> Arc<Dht> {
        Self::with_config(
            id,
            storage,
            K,
            ALPHA,
            Duration::from_secs(crate::constants::DEFAULT_RPC_TIMEOUT_SEC),
            crate::constants::SPLIT_THRESHOLD,
        )
    }

    pub fn with_config(
        id: Id,
        storage: Arc<dyn Storage>,
        k: usize,
        alpha: usize,
        rpc_timeout: Duration,
        split_threshold: usize,
    ) -> Arc<Dht> {
        let node = Node::with_config(
            id,
            storage,
            Arc::new(crate::storage::InMemoryStorage::new()),
            k,
            rpc_timeout,
            split_threshold,
        );
        let pending = Arc::new(PendingContacts::new());
        node.bucket_list()
            .try_write()
            .expect("fresh node has no contending readers")
            .set_eviction_sink(pending.clone());

        Arc::new(Dht {
            node,
            router: Router::new(alpha, k, rpc_timeout),
            pending,
        })
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn our_contact(&self) -> Contact {
        self.node.our_contact().clone()
    }

    /// Contacts the already-known `known_peer`, bootstraps our routing table
    /// from its FIND_NODE response, then refreshes every bucket other than
    /// the one `known_peer` landed in so the rest of the table fills in too.
    pub async fn bootstrap(&self, known_peer: Contact) -> Result<(), Error> {
        let known_peer_id = known_peer.id;
        self.node
            .bucket_list()
            .write()
            .await
            .add_contact(known_peer.clone())
            .await?;

        let contacts = known_peer
            .protocol
            .find_node(self.node.our_contact().clone(), self.node.id())
            .await?;
        for contact in contacts {
            self.insert_discovered(contact).await;
        }

        let known_peer_range = {
            let bucket_list = self.node.bucket_list().read().await;
            let bucket = bucket_list.get_kbucket(&known_peer_id)?;
            (bucket.low(), bucket.high())
        };
        let other_ranges: Vec<(Id, Id)> = {
            let bucket_list = self.node.bucket_list().read().await;
            bucket_list
                .buckets()
                .iter()
                .map(|b| (b.low(), b.high()))
                .filter(|range| *range != known_peer_range)
                .collect()
        };

        info!(peer = %known_peer_id, buckets_to_refresh = other_ranges.len(), "bootstrapped");
        for (low, high) in other_ranges {
            self.refresh_bucket(low, high).await?;
        }
        Ok(())
    }

    /// Touches the bucket covering `low`, samples a random key in its range,
    /// and FIND_NODEs every contact currently in it (a snapshot, so the
    /// concurrent insertions below don't invalidate the iteration).
    async fn refresh_bucket(&self, low: Id, high: Id) -> Result<(), Error> {
        let snapshot: Vec<Contact> = {
            let mut bucket_list = self.node.bucket_list().write().await;
            let bucket = bucket_list.get_kbucket_mut(&low)?;
            bucket.touch();
            bucket.contacts().to_vec()
        };

        let random_key = Id::random_in_range(&mut rand::thread_rng(), low, high);
        for contact in snapshot {
            match contact
                .protocol
                .find_node(self.node.our_contact().clone(), random_key)
                .await
            {
                Ok(found) => {
                    for c in found {
                        self.insert_discovered(c).await;
                    }
                }
                Err(e) => debug!(peer = %contact.id, error = %e, "refresh probe failed"),
            }
        }
        Ok(())
    }

    async fn insert_discovered(&self, contact: Contact) {
        if contact.id == self.node.id() {
            return;
        }
        if let Err(e) = self.node.bucket_list().write().await.add_contact(contact).await {
            debug!(error = %e, "discovered contact not admitted");
        }
    }

    /// Writes `key`/`value` to our own originator store, then pushes it out
    /// to the K contacts closest to `key` so the network converges on the
    /// same replica set even if we go offline.
    pub async fn store(&self, key: Id, value: String) -> Result<(), Error> {
        self.touch_bucket_with_key(key).await;
        self.node.storage().set(key, value.clone(), EXPIRATION_TIME_SEC).await;
        self.store_on_closer_contacts(key, value).await;
        Ok(())
    }

    async fn touch_bucket_with_key(&self, key: Id) {
        let mut bucket_list = self.node.bucket_list().write().await;
        if let Ok(bucket) = bucket_list.get_kbucket_mut(&key) {
            bucket.touch();
        }
    }

    async fn store_on_closer_contacts(&self, key: Id, value: String) {
        let result = self.router.lookup(&self.node, key, LookupKind::FindNode).await;
        for contact in result.contacts {
            let sender = self.node.our_contact().clone();
            let value = value.clone();
            if let Err(e) = contact
                .protocol
                .store(sender, key, value, false, EXPIRATION_TIME_SEC)
                .await
            {
                debug!(peer = %contact.id, error = %e, "replication store failed");
            }
        }
    }

    /// Checks our own originator store first; on a miss, runs an iterative
    /// FIND_VALUE lookup and, on success, opportunistically caches the
    /// value at the closest contact that did not already have it.
    pub async fn find_value(&self, key: Id) -> FindValueResult {
        self.touch_bucket_with_key(key).await;

        let (present, value) = self.node.storage().try_get_value(&key).await;
        if present {
            return FindValueResult {
                found: true,
                contacts: Vec::new(),
                value,
            };
        }

        let result = self.router.lookup(&self.node, key, LookupKind::FindValue).await;
        if result.found {
            self.cache_at_closest(key, result.value.clone(), &result.contacts, result.found_by.as_ref())
                .await;
            return FindValueResult {
                found: true,
                contacts: result.contacts,
                value: result.value,
            };
        }

        FindValueResult {
            found: false,
            contacts: result.contacts,
            value: None,
        }
    }

    async fn cache_at_closest(
        &self,
        key: Id,
        value: Option<String>,
        contacts: &[Contact],
        found_by: Option<&Contact>,
    ) {
        let Some(value) = value else { return };
        let mut candidates: Vec<&Contact> = contacts
            .iter()
            .filter(|c| found_by.map(|f| f.id != c.id).unwrap_or(true))
            .collect();
        candidates.sort_by_key(|c| c.id.distance(&key));
        if let Some(target) = candidates.first() {
            let sender = self.node.our_contact().clone();
            if let Err(e) = target
                .protocol
                .store(sender, key, value, true, EXPIRATION_TIME_SEC)
                .await
            {
                warn!(peer = %target.id, error = %e, "opportunistic cache store failed");
            }
        }
    }

    /// Drains eviction decisions staged by the routing table during
    /// `add_contact` and applies them: swap in the replacement for a
    /// confirmed-unresponsive stale contact, or promote a pending candidate
    /// whose stale rival turned out to still be alive and was left in place.
    pub async fn process_pending_evictions(&self) -> Result<(), Error> {
        for (stale, replacement) in self.pending.take_evictions().await {
            let mut bucket_list = self.node.bucket_list().write().await;
            if let Ok(bucket) = bucket_list.get_kbucket_mut(&stale.id) {
                bucket.remove(&stale.id);
            }
            drop(bucket_list);
            self.node
                .bucket_list()
                .write()
                .await
                .add_contact(replacement)
                .await?;
        }
        // Pending candidates whose stale rival answered are simply dropped;
        // nothing to promote until that bucket frees up on its own.
        self.pending.take_pending().await;
        Ok(())
    }
}
