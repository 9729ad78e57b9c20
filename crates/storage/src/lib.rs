use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{normalize_items, LineItem};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};

mod memory;

pub use memory::MemoryCartStore;

/// Key the storefront keeps its cart snapshot under.
pub const DEFAULT_CART_KEY: &str = "carrito";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored cart snapshot is malformed: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to encode cart snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cart snapshot of {needed} bytes exceeds storage quota of {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("cart storage backend failed: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Durable home of the cart snapshot.
///
/// Backends implement the fallible `try_*` pair. Callers use `load`/`save`,
/// which never fail: a missing or malformed snapshot loads as an empty cart and
/// a failed write is logged and dropped, leaving the in-memory cart as the
/// source of truth for the session.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn try_load(&self) -> Result<Option<Vec<LineItem>>, StoreError>;

    async fn try_save(&self, items: &[LineItem]) -> Result<(), StoreError>;

    async fn load(&self) -> Vec<LineItem> {
        match self.try_load().await {
            Ok(Some(items)) => items,
            Ok(None) => {
                debug!("no stored cart snapshot; starting with an empty cart");
                Vec::new()
            }
            Err(error) => {
                warn!(%error, "discarding unreadable cart snapshot; starting with an empty cart");
                Vec::new()
            }
        }
    }

    async fn save(&self, items: &[LineItem]) {
        if let Err(error) = self.try_save(items).await {
            warn!(
                %error,
                item_count = items.len(),
                "failed to persist cart snapshot; keeping in-memory cart"
            );
        }
    }
}

#[async_trait]
impl<T> CartStore for Arc<T>
where
    T: CartStore + ?Sized,
{
    async fn try_load(&self) -> Result<Option<Vec<LineItem>>, StoreError> {
        (**self).try_load().await
    }

    async fn try_save(&self, items: &[LineItem]) -> Result<(), StoreError> {
        (**self).try_save(items).await
    }
}

pub fn encode_snapshot(items: &[LineItem]) -> Result<String, StoreError> {
    serde_json::to_string(items).map_err(StoreError::Encode)
}

/// Parses a stored snapshot and restores the cart invariants on it.
pub fn decode_snapshot(raw: &str) -> Result<Vec<LineItem>, StoreError> {
    let items: Vec<LineItem> = serde_json::from_str(raw).map_err(StoreError::Corrupt)?;
    Ok(normalize_items(items))
}

/// Key-value table in a SQLite database, one row per key.
#[derive(Clone)]
pub struct SqliteCartStore {
    pool: Pool<Sqlite>,
    key: String,
}

impl SqliteCartStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_key(database_url, DEFAULT_CART_KEY).await
    }

    pub async fn with_key(database_url: &str, key: impl Into<String>) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid cart database url '{database_url}'"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open cart database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn read_raw(&self) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?1")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn write_raw(&self, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for SqliteCartStore {
    async fn try_load(&self) -> Result<Option<Vec<LineItem>>, StoreError> {
        match self.read_raw().await? {
            Some(raw) => decode_snapshot(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn try_save(&self, items: &[LineItem]) -> Result<(), StoreError> {
        let raw = encode_snapshot(items)?;
        self.write_raw(&raw).await
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
