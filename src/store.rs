//! # Persistence
//!
//! Storage is four logical stores (`profile`, `zcap`, `queries` and
//! `config`) keyed by opaque IDs and holding JSON-serialized entities. The
//! contract is per-key atomicity only: no cross-key transactions, and
//! concurrent creations under distinct keys never interfere.
//! [`MemProvider`] ships for tests and single-process deployments; durable
//! providers are supplied by the embedder.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

/// A single logical store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
}

/// Opens logical stores by name.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Open the store with the given name, creating it if needed. Opening
    /// the same name twice yields the same store.
    async fn open_store(&self, name: &str) -> anyhow::Result<Arc<dyn Store>>;
}

/// In-memory store provider backed by concurrent maps.
#[derive(Default)]
pub struct MemProvider {
    stores: DashMap<String, Arc<MemStore>>,
}

impl MemProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreProvider for MemProvider {
    async fn open_store(&self, name: &str) -> anyhow::Result<Arc<dyn Store>> {
        let store =
            self.stores.entry(name.to_string()).or_insert_with(Arc::default).value().clone();
        Ok(store)
    }
}

#[derive(Default)]
struct MemStore {
    entries: DashMap<String, Vec<u8>>,
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}
