//! An ordered partition of the ID space into [`KBucket`]s, with the
//! insertion policy that drives splitting and eviction.

use crate::contact::Contact;
use crate::constants::SPLIT_THRESHOLD;
use crate::error::Error;
use crate::id::Id;
use crate::kbucket::KBucket;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Narrow callback capability handed to BucketList instead of a back
/// reference to the DHT, breaking the Node/BucketList/DHT reference cycle
/// flagged in the design notes: BucketList depends only on this interface.
#[async_trait]
pub trait EvictionSink: Send + Sync {
    /// The stale contact failed to respond to a ping; evict it and admit
    /// `replacement` in its place once the caller confirms the eviction.
    async fn delay_evict(&self, stale: Contact, replacement: Contact);

    /// The stale contact is still alive, so `candidate` could not be
    /// admitted; park it for later promotion.
    async fn add_to_pending(&self, candidate: Contact);
}

pub struct BucketList {
    our_contact: Contact,
    buckets: Vec<KBucket>,
    k: usize,
    rpc_timeout: Duration,
    split_threshold: usize,
    eviction_sink: Option<Arc<dyn EvictionSink>>,
}

impl BucketList {
    pub fn new(our_contact: Contact, k: usize, rpc_timeout: Duration) -> Self {
        Self::with_split_threshold(our_contact, k, rpc_timeout, SPLIT_THRESHOLD)
    }

    pub fn with_split_threshold(
        our_contact: Contact,
        k: usize,
        rpc_timeout: Duration,
        split_threshold: usize,
    ) -> Self {
        BucketList {
            buckets: vec![KBucket::new(Id::zero(), Id::max(), k)],
            our_contact,
            k,
            rpc_timeout,
            split_threshold,
            eviction_sink: None,
        }
    }

    pub fn our_id(&self) -> Id {
        self.our_contact.id
    }

    pub fn set_eviction_sink(&mut self, sink: Arc<dyn EvictionSink>) {
        self.eviction_sink = Some(sink);
    }

    pub fn buckets(&self) -> &[KBucket] {
        &self.buckets
    }

    fn get_kbucket_index(&self, id: &Id) -> Option<usize> {
        self.buckets.iter().position(|b| b.is_in_range(id))
    }

    pub fn get_kbucket(&self, id: &Id) -> Result<&KBucket, Error> {
        self.get_kbucket_index(id)
            .map(|i| &self.buckets[i])
            .ok_or(Error::OutOfRange)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.get_kbucket(id).map(|b| b.contains(id)).unwrap_or(false)
    }

    pub fn get_kbucket_mut(&mut self, id: &Id) -> Result<&mut KBucket, Error> {
        let index = self.get_kbucket_index(id).ok_or(Error::OutOfRange)?;
        Ok(&mut self.buckets[index])
    }

    fn can_split(&self, bucket: &KBucket) -> bool {
        bucket.is_in_range(&self.our_contact.id) || (bucket.depth() % self.split_threshold != 0)
    }

    /// Adds (or refreshes) a contact, splitting buckets and, when a full
    /// un-splittable bucket blocks insertion, probing the stale contact
    /// via `EvictionSink` — the recursive split-then-retry path from the
    /// distilled source rewritten as a loop to keep the call non-recursive.
    pub async fn add_contact(&mut self, mut contact: Contact) -> Result<(), Error> {
        if contact.id == self.our_contact.id {
            return Err(Error::OurNodeCannotBeAContact);
        }
        contact.touch();

        loop {
            let index = self
                .get_kbucket_index(&contact.id)
                .ok_or(Error::OutOfRange)?;

            if self.buckets[index].contains(&contact.id) {
                self.buckets[index].replace_contact(contact);
                return Ok(());
            }

            if !self.buckets[index].is_full() {
                self.buckets[index].add_contact(contact).inspect_err(|e| {
                    error!(error = %e, "bucket rejected an add_contact its own is_full check just passed");
                })?;
                return Ok(());
            }

            if self.can_split(&self.buckets[index]) {
                let (k1, k2) = self.buckets[index].split().inspect_err(|e| {
                    error!(error = %e, "split produced a contact outside a child bucket's range");
                })?;
                self.buckets[index] = k1;
                self.buckets.insert(index + 1, k2);
                debug!(bucket_count = self.buckets.len(), "split k-bucket");
                continue;
            }

            // Eviction path: ping the staleness leader; hand the policy
            // decision to the eviction sink so this call returns promptly.
            let stale = match self.buckets[index].least_recently_seen() {
                Some(c) => c.clone(),
                None => return Ok(()),
            };
            let ping_result =
                tokio::time::timeout(self.rpc_timeout, stale.protocol.ping(self.our_contact.clone()))
                    .await;
            let stale_unresponsive = matches!(ping_result, Err(_) | Ok(Err(_)));

            if let Some(sink) = &self.eviction_sink {
                if stale_unresponsive {
                    warn!(stale = %stale.id, "evicting unresponsive contact");
                    sink.delay_evict(stale, contact).await;
                } else {
                    sink.add_to_pending(contact).await;
                }
            }
            return Ok(());
        }
    }

    /// Flattens all bucket contents, drops `exclude`, sorts ascending by
    /// XOR distance to `key`, and returns at most K.
    pub fn get_close_contacts(&self, key: &Id, exclude: &Id) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|b| b.contacts().iter().cloned())
            .filter(|c| c.id != *exclude)
            .collect();
        contacts.sort_by_key(|c| c.id.distance(key));
        contacts.truncate(self.k);
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VirtualProtocol;
    use crate::storage::InMemoryStorage;

    fn make_contact(byte: u8) -> Contact {
        let id = Id::from_bytes([byte; crate::id::BYTE_LEN]);
        let storage = Arc::new(InMemoryStorage::new());
        let node = crate::node::Node::new(id, storage);
        Contact::new(id, Arc::new(VirtualProtocol::unresponsive(node)))
    }

    fn make_bucket_list(our_byte: u8) -> BucketList {
        let our_id = Id::from_bytes([our_byte; crate::id::BYTE_LEN]);
        let storage = Arc::new(InMemoryStorage::new());
        let node = crate::node::Node::new(our_id, storage);
        let our_contact = Contact::new(our_id, Arc::new(VirtualProtocol::unresponsive(node)));
        BucketList::new(our_contact, 20, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn adding_self_is_rejected() {
        let our_id = Id::from_bytes([1u8; crate::id::BYTE_LEN]);
        let storage = Arc::new(InMemoryStorage::new());
        let node = crate::node::Node::new(our_id, storage);
        let our_contact = Contact::new(our_id, Arc::new(VirtualProtocol::unresponsive(node)));
        let mut list = BucketList::new(our_contact.clone(), 20, Duration::from_millis(50));
        let err = list.add_contact(our_contact).await.unwrap_err();
        assert!(matches!(err, Error::OurNodeCannotBeAContact));
    }

    #[tokio::test]
    async fn re_adding_a_contact_replaces_rather_than_duplicates() {
        let mut list = make_bucket_list(0xaa);
        let contact = make_contact(42);
        list.add_contact(contact.clone()).await.unwrap();
        let t0 = list.get_kbucket(&contact.id).unwrap().contacts()[0].last_seen();
        std::thread::sleep(std::time::Duration::from_millis(10));
        list.add_contact(contact.clone()).await.unwrap();
        let matching: Vec<_> = list
            .buckets()
            .iter()
            .flat_map(|b| b.contacts())
            .filter(|c| c.id == contact.id)
            .collect();
        assert_eq!(matching.len(), 1);
        assert!(matching[0].last_seen() >= t0);
    }

    #[tokio::test]
    async fn overflow_splits_the_bucket_covering_our_id() {
        // our_id sits in the middle of the space so the first bucket
        // (which always covers it) must keep splitting as it fills.
        let our_id = Id::mid();
        let storage = Arc::new(InMemoryStorage::new());
        let node = crate::node::Node::new(our_id, storage);
        let our_contact = Contact::new(our_id, Arc::new(VirtualProtocol::unresponsive(node)));
        let mut list = BucketList::new(our_contact, 20, Duration::from_millis(50));

        for i in 0u8..21 {
            let mut bytes = [0u8; crate::id::BYTE_LEN];
            bytes[crate::id::BYTE_LEN - 1] = i;
            let id = Id::from_bytes(bytes);
            let c_storage = Arc::new(InMemoryStorage::new());
            let c_node = crate::node::Node::new(id, c_storage);
            let contact = Contact::new(id, Arc::new(VirtualProtocol::unresponsive(c_node)));
            list.add_contact(contact).await.unwrap();
        }

        assert!(list.buckets().len() >= 2);
        let total: usize = list.buckets().iter().map(|b| b.contacts().len()).sum();
        assert_eq!(total, 21);
    }

    #[tokio::test]
    async fn get_close_contacts_orders_by_xor_distance() {
        let mut list = make_bucket_list(0);
        for byte in [1u8, 2, 4, 8, 16] {
            list.add_contact(make_contact(byte)).await.unwrap();
        }
        let key = Id::from_bytes([5u8; crate::id::BYTE_LEN]);
        let exclude = Id::max();
        let contacts = list.get_close_contacts(&key, &exclude);
        let ids: Vec<u8> = contacts.iter().map(|c| c.id.as_bytes()[0]).collect();
        assert_eq!(ids, vec![4, 1, 2, 8, 16]);
    }
}
