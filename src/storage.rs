// src/storage.rs
// Key-value store contract with change notification, plus the typed item
// wrapper the rest of the crate reads and writes through.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

/// Logical keys. Names keep the `area:` prefix of the extension storage
/// they mirror.
pub const KEY_RULES: &str = "sync:ruleItems";
pub const KEY_DEBUG: &str = "local:debugMode";
pub const KEY_POST_STATE: &str = "local:postState";

/// One change notification: the key plus new and old values.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
    pub new_value: Value,
    pub old_value: Value,
}

/// External key-value collaborator: durable map with per-key watch.
/// Watch delivery is at-least-once, in write order per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    fn watch(&self, key: &str) -> broadcast::Receiver<StoreChange>;
}

/// In-memory reference implementation.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    watchers: std::sync::Mutex<HashMap<String, broadcast::Sender<StoreChange>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, key: &str) -> broadcast::Sender<StoreChange> {
        let mut watchers = self.watchers.lock().expect("watcher registry poisoned");
        watchers
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let old_value = {
            let mut values = self.values.write().await;
            values.insert(key.to_string(), value.clone())
        }
        .unwrap_or(Value::Null);

        // no subscribers is fine; the send result only reports that
        let _ = self.sender_for(key).send(StoreChange {
            key: key.to_string(),
            new_value: value,
            old_value,
        });
        Ok(())
    }

    fn watch(&self, key: &str) -> broadcast::Receiver<StoreChange> {
        self.sender_for(key).subscribe()
    }
}

/// Typed view over one key with a default for the unset case.
/// Undecodable stored values degrade to the default rather than failing
/// the caller.
pub struct StoreItem<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    default: T,
}

impl<T> StoreItem<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str, default: T) -> Self {
        Self { store, key, default }
    }

    pub async fn get_value(&self) -> T {
        match self.store.get(self.key).await {
            Ok(Some(raw)) => serde_json::from_value(raw).unwrap_or_else(|e| {
                warn!("stored value under {} is undecodable: {e}", self.key);
                self.default.clone()
            }),
            Ok(None) => self.default.clone(),
            Err(e) => {
                warn!("store read for {} failed: {e:#}", self.key);
                self.default.clone()
            }
        }
    }

    pub async fn set_value(&self, value: &T) -> Result<()> {
        self.store.set(self.key, serde_json::to_value(value)?).await
    }

    pub fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.store.watch(self.key)
    }
}
