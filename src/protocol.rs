//! The outbound RPC capability: ping/store/find_node/find_value against a
//! remote peer. The core only ever sees this trait — it never interprets
//! a concrete transport's internals, only whether a call errored.

use crate::contact::Contact;
use crate::error::Error;
use crate::id::Id;
use crate::node::Node;
use async_trait::async_trait;
use std::sync::Weak;

/// Response to FIND_NODE / FIND_VALUE: the remote peer returns up to K
/// contacts, or (for FIND_VALUE) a value instead of contacts. Exactly one
/// of `contacts` / `value` is populated on a FIND_VALUE success.
pub struct LookupResponse {
    pub contacts: Vec<Contact>,
    pub value: Option<String>,
}

#[async_trait]
pub trait Protocol: Send + Sync {
    async fn ping(&self, sender: Contact) -> Result<(), Error>;

    async fn store(
        &self,
        sender: Contact,
        key: Id,
        value: String,
        is_cached: bool,
        expiration_time_sec: u64,
    ) -> Result<(), Error>;

    async fn find_node(&self, sender: Contact, key: Id) -> Result<Vec<Contact>, Error>;

    async fn find_value(&self, sender: Contact, key: Id) -> Result<LookupResponse, Error>;
}

/// In-memory protocol implementation used for tests: dispatches straight
/// into the peer's [`Node`] without any wire encoding. Holds a `Weak`
/// handle rather than an owning one, since a Contact built from this is
/// routinely handed to the very peer it points at (and to others) — an
/// owning handle would recreate the Node/BucketList/DHT back-reference
/// cycle the design notes call out, just one hop further out.
/// `responds = false` simulates an unreachable peer, to exercise the
/// timeout/eviction paths.
pub struct VirtualProtocol {
    node: Weak<Node>,
    responds: bool,
}

impl VirtualProtocol {
    pub fn new_weak(node: Weak<Node>) -> Self {
        VirtualProtocol {
            node,
            responds: true,
        }
    }

    pub fn unresponsive(node: std::sync::Arc<Node>) -> Self {
        VirtualProtocol {
            node: std::sync::Arc::downgrade(&node),
            responds: false,
        }
    }

    fn upgrade(&self) -> Result<std::sync::Arc<Node>, Error> {
        self.node
            .upgrade()
            .ok_or_else(|| Error::Rpc("peer is no longer reachable".into()))
    }
}

#[async_trait]
impl Protocol for VirtualProtocol {
    async fn ping(&self, sender: Contact) -> Result<(), Error> {
        if !self.responds {
            return Err(Error::Rpc("virtual protocol does not respond".into()));
        }
        self.upgrade()?.ping(sender).await
    }

    async fn store(
        &self,
        sender: Contact,
        key: Id,
        value: String,
        is_cached: bool,
        expiration_time_sec: u64,
    ) -> Result<(), Error> {
        if !self.responds {
            return Err(Error::Rpc("virtual protocol does not respond".into()));
        }
        self.upgrade()?
            .store(key, sender, value, is_cached, expiration_time_sec)
            .await
    }

    async fn find_node(&self, sender: Contact, key: Id) -> Result<Vec<Contact>, Error> {
        if !self.responds {
            return Err(Error::Rpc("virtual protocol does not respond".into()));
        }
        self.upgrade()?.find_node(key, sender).await
    }

    async fn find_value(&self, sender: Contact, key: Id) -> Result<LookupResponse, Error> {
        if !self.responds {
            return Err(Error::Rpc("virtual protocol does not respond".into()));
        }
        self.upgrade()?.find_value(key, sender).await
    }
}
