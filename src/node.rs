//! The local endpoint that services inbound RPCs against the bucket list
//! and storage. One `Node` backs one DHT peer.

use crate::bucket_list::BucketList;
use crate::constants::{DEFAULT_RPC_TIMEOUT_SEC, EXPIRATION_TIME_SEC, K, SPLIT_THRESHOLD};
use crate::contact::Contact;
use crate::error::Error;
use crate::id::Id;
use crate::protocol::LookupResponse;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::trace;

pub struct Node {
    our_contact: Contact,
    storage: Arc<dyn Storage>,
    cache_storage: Arc<dyn Storage>,
    bucket_list: RwLock<BucketList>,
}

impl Node {
    /// Convenience constructor using default K and RPC timeout, with a
    /// fresh in-memory cache store. `storage` is the originator store.
    pub fn new(id: Id, storage: Arc<dyn Storage>) -> Arc<Node> {
        Self::with_config(
            id,
            storage,
            Arc::new(crate::storage::InMemoryStorage::new()),
            K,
            Duration::from_secs(DEFAULT_RPC_TIMEOUT_SEC),
            SPLIT_THRESHOLD,
        )
    }

    pub fn with_config(
        id: Id,
        storage: Arc<dyn Storage>,
        cache_storage: Arc<dyn Storage>,
        k: usize,
        rpc_timeout: Duration,
        split_threshold: usize,
    ) -> Arc<Node> {
        Arc::new_cyclic(|weak| {
            let protocol = Arc::new(crate::protocol::VirtualProtocol::new_weak(weak.clone()));
            let our_contact = Contact::new(id, protocol);
            let bucket_list =
                BucketList::with_split_threshold(our_contact.clone(), k, rpc_timeout, split_threshold);
            Node {
                our_contact,
                storage,
                cache_storage,
                bucket_list: RwLock::new(bucket_list),
            }
        })
    }

    pub fn our_contact(&self) -> &Contact {
        &self.our_contact
    }

    pub fn id(&self) -> Id {
        self.our_contact.id
    }

    pub fn bucket_list(&self) -> &RwLock<BucketList> {
        &self.bucket_list
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    async fn intake_sender(&self, sender: &Contact, is_query: bool) -> Result<(), Error> {
        if sender.id == self.our_contact.id {
            return Err(if is_query {
                Error::SendingQueryToSelf
            } else {
                Error::SenderIsSelf
            });
        }
        let is_new = !self.bucket_list.read().await.contains(&sender.id);
        if is_new {
            self.send_key_values_if_new_contact(sender).await;
        }
        self.bucket_list.write().await.add_contact(sender.clone()).await?;
        Ok(())
    }

    /// When `sender` was not already a known contact, republish any of our
    /// originator-stored keys for which `sender` is now one of the K
    /// closest holders by XOR distance, so routing-table churn keeps the
    /// replica set correct without a separate republish sweep.
    async fn send_key_values_if_new_contact(&self, sender: &Contact) {
        let keys = self.storage.get_keys().await;
        for key in keys {
            let Some(value) = self.storage.get(&key).await else {
                continue;
            };
            let close = self
                .bucket_list
                .read()
                .await
                .get_close_contacts(&key, &self.our_contact.id);
            let sender_distance = sender.id.distance(&key);
            let qualifies = close.len() < K
                || close
                    .last()
                    .map(|farthest| sender_distance < farthest.id.distance(&key))
                    .unwrap_or(true);
            if qualifies {
                trace!(key = %key, sender = %sender.id, "republishing to new contact");
                let _ = sender
                    .protocol
                    .store(self.our_contact.clone(), key, value, true, EXPIRATION_TIME_SEC)
                    .await;
            }
        }
    }

    pub async fn ping(&self, sender: Contact) -> Result<(), Error> {
        self.intake_sender(&sender, false).await
    }

    pub async fn store(
        &self,
        key: Id,
        sender: Contact,
        value: String,
        is_cached: bool,
        expiration_time_sec: u64,
    ) -> Result<(), Error> {
        self.intake_sender(&sender, false).await?;
        if is_cached {
            self.cache_storage.set(key, value, expiration_time_sec).await;
        } else {
            self.storage.set(key, value, EXPIRATION_TIME_SEC).await;
        }
        Ok(())
    }

    pub async fn find_node(&self, key: Id, sender: Contact) -> Result<Vec<Contact>, Error> {
        self.intake_sender(&sender, true).await?;
        let contacts = self
            .bucket_list
            .read()
            .await
            .get_close_contacts(&key, &sender.id);
        Ok(contacts)
    }

    pub async fn find_value(&self, key: Id, sender: Contact) -> Result<LookupResponse, Error> {
        self.intake_sender(&sender, true).await?;
        if let Some(value) = self.storage.get(&key).await {
            return Ok(LookupResponse {
                contacts: Vec::new(),
                value: Some(value),
            });
        }
        if let Some(value) = self.cache_storage.get(&key).await {
            return Ok(LookupResponse {
                contacts: Vec::new(),
                value: Some(value),
            });
        }
        let contacts = self
            .bucket_list
            .read()
            .await
            .get_close_contacts(&key, &sender.id);
        Ok(LookupResponse {
            contacts,
            value: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VirtualProtocol;
    use crate::storage::InMemoryStorage;

    fn peer(byte: u8) -> Arc<Node> {
        let id = Id::from_bytes([byte; crate::id::BYTE_LEN]);
        Node::new(id, Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn ping_from_self_is_rejected() {
        let node = peer(1);
        let err = node.ping(node.our_contact().clone()).await.unwrap_err();
        assert!(matches!(err, Error::SenderIsSelf));
    }

    #[tokio::test]
    async fn find_node_from_self_is_rejected() {
        let node = peer(1);
        let key = Id::from_bytes([9u8; crate::id::BYTE_LEN]);
        let err = node
            .find_node(key, node.our_contact().clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SendingQueryToSelf));
    }

    #[tokio::test]
    async fn store_then_find_value_hits_without_rpc() {
        let node = peer(1);
        let sender = peer(2);
        let key = Id::from_bytes([5u8; crate::id::BYTE_LEN]);
        node.store(
            key,
            sender.our_contact().clone(),
            "hello".to_string(),
            false,
            86400,
        )
        .await
        .unwrap();

        let response = node
            .find_value(key, sender.our_contact().clone())
            .await
            .unwrap();
        assert_eq!(response.value, Some("hello".to_string()));
        assert!(response.contacts.is_empty());
    }

    #[tokio::test]
    async fn find_value_miss_returns_close_contacts() {
        let node = peer(1);
        let sender = peer(2);
        let unknown_key = Id::from_bytes([0xeeu8; crate::id::BYTE_LEN]);
        let response = node
            .find_value(unknown_key, sender.our_contact().clone())
            .await
            .unwrap();
        assert!(response.value.is_none());
    }

    #[tokio::test]
    async fn inbound_rpc_adds_sender_to_routing_table() {
        let node = peer(1);
        let sender = peer(2);
        node.ping(sender.our_contact().clone()).await.unwrap();
        assert!(node.bucket_list.read().await.contains(&sender.id()));
    }
}
