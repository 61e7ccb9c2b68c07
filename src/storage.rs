//! The key/value capability: a replaceable store behind `get`/`set`/`touch`.

use crate::id::Id;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Abstracts the storage mechanism for key-value pairs. Every method is
/// atomic with respect to every other method on the same store.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn contains(&self, key: &Id) -> bool;
    async fn get(&self, key: &Id) -> Option<String>;
    async fn try_get_value(&self, key: &Id) -> (bool, Option<String>);
    async fn set(&self, key: Id, value: String, expiration_time_sec: u64);
    async fn get_timestamp(&self, key: &Id) -> Option<u64>;
    async fn get_expiration_time_sec(&self, key: &Id) -> Option<u64>;
    async fn remove(&self, key: &Id);
    async fn get_keys(&self) -> Vec<Id>;
    async fn touch(&self, key: &Id);
}

struct Entry {
    value: String,
    created_at: u64,
    expiration_time_sec: u64,
}

/// In-memory reference implementation, used both as the production store
/// for a lone peer process and as the reference variant for tests.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<[u8; crate::id::BYTE_LEN], Entry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn contains(&self, key: &Id) -> bool {
        self.entries.read().await.contains_key(key.as_bytes())
    }

    async fn get(&self, key: &Id) -> Option<String> {
        self.entries
            .read()
            .await
            .get(key.as_bytes())
            .map(|e| e.value.clone())
    }

    async fn try_get_value(&self, key: &Id) -> (bool, Option<String>) {
        let value = self.get(key).await;
        (value.is_some(), value)
    }

    async fn set(&self, key: Id, value: String, expiration_time_sec: u64) {
        let entry = Entry {
            value,
            created_at: now_unix(),
            expiration_time_sec,
        };
        self.entries.write().await.insert(*key.as_bytes(), entry);
    }

    async fn get_timestamp(&self, key: &Id) -> Option<u64> {
        self.entries
            .read()
            .await
            .get(key.as_bytes())
            .map(|e| e.created_at)
    }

    async fn get_expiration_time_sec(&self, key: &Id) -> Option<u64> {
        self.entries
            .read()
            .await
            .get(key.as_bytes())
            .map(|e| e.expiration_time_sec)
    }

    async fn remove(&self, key: &Id) {
        self.entries.write().await.remove(key.as_bytes());
    }

    async fn get_keys(&self) -> Vec<Id> {
        self.entries
            .read()
            .await
            .keys()
            .map(|bytes| Id::from_bytes(*bytes))
            .collect()
    }

    async fn touch(&self, key: &Id) {
        if let Some(entry) = self.entries.write().await.get_mut(key.as_bytes()) {
            entry.created_at = now_unix();
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
