//! Multi-peer scenarios exercised over in-process `VirtualProtocol`s: no
//! real sockets, several `Dht` instances wired directly to each other.

use kadmesh::{Contact, Dht, Id, InMemoryStorage, Protocol, VirtualProtocol};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn id_with_last_byte(b: u8) -> Id {
    let mut bytes = [0u8; 20];
    bytes[19] = b;
    Id::from_bytes(bytes)
}

fn peer(id: Id) -> Arc<Dht> {
    Dht::new(id, Arc::new(InMemoryStorage::new()))
}

fn contact_for(dht: &Arc<Dht>) -> Contact {
    Contact::new(
        dht.node().id(),
        Arc::new(VirtualProtocol::new_weak(Arc::downgrade(dht.node()))),
    )
}

async fn link(a: &Arc<Dht>, b: &Arc<Dht>) {
    a.node()
        .bucket_list()
        .write()
        .await
        .add_contact(contact_for(b))
        .await
        .unwrap();
}

/// Scenario 5: a peer with ten contacts across disjoint bucket ranges
/// bootstraps a fresh peer, which must learn the introducer plus all ten.
#[tokio::test]
async fn bootstrap_propagates_a_peers_whole_routing_table() {
    let introducer = peer(Id::mid());
    let mut known = Vec::new();
    for i in 0u8..10 {
        let far_peer = peer(id_with_last_byte(i));
        link(&introducer, &far_peer).await;
        known.push(far_peer);
    }

    let local = peer(id_with_last_byte(200));
    local.bootstrap(contact_for(&introducer)).await.unwrap();

    let table = local.node().bucket_list().read().await;
    assert!(table.contains(&introducer.node().id()));
    for far_peer in &known {
        assert!(
            table.contains(&far_peer.node().id()),
            "missing {:?} after bootstrap",
            far_peer.node().id()
        );
    }
}

/// Scenario 6: a successful lookup caches the value at exactly the closest
/// contact that wasn't the one who held it.
#[tokio::test]
async fn find_value_caches_at_the_single_closest_non_holder() {
    struct CountingProtocol {
        inner: VirtualProtocol,
        store_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Protocol for CountingProtocol {
        async fn ping(&self, sender: Contact) -> kadmesh::Result<()> {
            self.inner.ping(sender).await
        }
        async fn store(
            &self,
            sender: Contact,
            key: Id,
            value: String,
            is_cached: bool,
            ttl: u64,
        ) -> kadmesh::Result<()> {
            if is_cached {
                self.store_calls.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.store(sender, key, value, is_cached, ttl).await
        }
        async fn find_node(&self, sender: Contact, key: Id) -> kadmesh::Result<Vec<Contact>> {
            self.inner.find_node(sender, key).await
        }
        async fn find_value(
            &self,
            sender: Contact,
            key: Id,
        ) -> kadmesh::Result<kadmesh::protocol::LookupResponse> {
            self.inner.find_value(sender, key).await
        }
    }

    let seeker = peer(id_with_last_byte(1));
    let close_relay = peer(id_with_last_byte(2));
    let holder = peer(id_with_last_byte(3));

    link(&seeker, &close_relay).await;
    link(&close_relay, &holder).await;

    let key = id_with_last_byte(3);
    holder.node().storage().set(key, "v".to_string(), 86400).await;

    let store_calls = Arc::new(AtomicUsize::new(0));
    let counting_relay_protocol = Arc::new(CountingProtocol {
        inner: VirtualProtocol::new_weak(Arc::downgrade(close_relay.node())),
        store_calls: store_calls.clone(),
    });
    seeker
        .node()
        .bucket_list()
        .write()
        .await
        .add_contact(Contact::new(close_relay.node().id(), counting_relay_protocol))
        .await
        .unwrap();

    let result = seeker.find_value(key).await;
    assert!(result.found);
    assert_eq!(result.value, Some("v".to_string()));
    assert_eq!(
        store_calls.load(Ordering::SeqCst),
        1,
        "exactly one opportunistic cache store should reach the relay"
    );
}

/// Storing through one peer's `Dht::store` must replicate to the K closest
/// live contacts it can discover, not just write locally.
#[tokio::test]
async fn store_replicates_to_discovered_contacts() {
    let originator = peer(id_with_last_byte(1));
    let neighbor = peer(id_with_last_byte(2));
    link(&originator, &neighbor).await;

    let key = id_with_last_byte(2);
    originator.store(key, "replicated".to_string()).await.unwrap();

    assert_eq!(
        neighbor.node().storage().get(&key).await,
        Some("replicated".to_string())
    );
}

/// A lookup against a peer with an empty routing table finds nothing and
/// never panics or hangs.
#[tokio::test]
async fn lookup_on_an_isolated_peer_returns_empty() {
    let isolated = peer(id_with_last_byte(1));
    let result = isolated.find_value(id_with_last_byte(9)).await;
    assert!(!result.found);
    assert!(result.value.is_none());
}
