//! kadmesh - a Kademlia DHT peer.
//!
//! The routing and lookup engine ([`id`], [`kbucket`], [`bucket_list`],
//! [`router`]) and the orchestration layer ([`node`], [`dht`]) sit behind
//! two narrow capabilities, [`protocol::Protocol`] and [`storage::Storage`],
//! so the core never depends on a concrete wire format or persistence
//! backend.

pub mod bucket_list;
pub mod config;
pub mod constants;
pub mod contact;
pub mod dht;
pub mod error;
pub mod eviction;
pub mod id;
pub mod kbucket;
pub mod node;
pub mod protocol;
pub mod router;
pub mod storage;

pub use config::DhtConfig;
pub use contact::Contact;
pub use dht::{Dht, FindValueResult};
pub use error::{Error, Result};
pub use id::Id;
pub use node::Node;
pub use protocol::{Protocol, VirtualProtocol};
pub use storage::{InMemoryStorage, Storage};
