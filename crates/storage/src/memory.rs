use std::collections::HashMap;

use async_trait::async_trait;
use shared::domain::LineItem;
use tokio::sync::Mutex;

use crate::{decode_snapshot, encode_snapshot, CartStore, StoreError, DEFAULT_CART_KEY};

/// Process-local store holding raw snapshot strings, like a browser's local
/// storage. An optional byte quota rejects oversized writes.
pub struct MemoryCartStore {
    key: String,
    quota_bytes: Option<usize>,
    entries: Mutex<HashMap<String, String>>,
}

impl Default for MemoryCartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self {
            key: DEFAULT_CART_KEY.to_string(),
            quota_bytes: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn read_raw(&self) -> Option<String> {
        self.entries.lock().await.get(&self.key).cloned()
    }

    /// Writes a value without encoding or quota checks.
    pub async fn write_raw(&self, value: impl Into<String>) {
        self.entries
            .lock()
            .await
            .insert(self.key.clone(), value.into());
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn try_load(&self) -> Result<Option<Vec<LineItem>>, StoreError> {
        match self.read_raw().await {
            Some(raw) => decode_snapshot(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn try_save(&self, items: &[LineItem]) -> Result<(), StoreError> {
        let raw = encode_snapshot(items)?;
        if let Some(quota) = self.quota_bytes {
            if raw.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    needed: raw.len(),
                    quota,
                });
            }
        }
        self.write_raw(raw).await;
        Ok(())
    }
}
