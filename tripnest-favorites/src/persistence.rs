//! Durable local storage for the last server-confirmed favorite set
//!
//! Layout: a list of records (canonical key string, type, id, display
//! payload) in cache order.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};
use tripnest_common::{ItemType, Result};

use crate::model::{CanonicalKey, DisplayPayload, FavoriteRecord};

/// Serialized form of one favorite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedFavorite {
    /// `<itemType>:<normalizedId>`
    pub canonical_key: String,
    pub item_type: ItemType,
    pub item_id: String,
    #[serde(default)]
    pub payload: DisplayPayload,
}

impl From<&FavoriteRecord> for PersistedFavorite {
    fn from(record: &FavoriteRecord) -> Self {
        Self {
            canonical_key: record.key.to_string(),
            item_type: record.key.item_type(),
            item_id: record.key.normalized_id().to_string(),
            payload: record.payload.clone(),
        }
    }
}

impl PersistedFavorite {
    /// Rebuild a confirmed record; `None` if the stored key is inconsistent
    pub fn into_record(self) -> Option<FavoriteRecord> {
        let key = CanonicalKey::new(self.item_type, self.item_id.as_str()).ok()?;
        if key.to_string() != self.canonical_key {
            return None;
        }
        Some(FavoriteRecord::confirmed(key, self.payload))
    }
}

fn into_records(persisted: Vec<PersistedFavorite>) -> Vec<FavoriteRecord> {
    persisted
        .into_iter()
        .filter_map(|p| {
            let stored_key = p.canonical_key.clone();
            let record = p.into_record();
            if record.is_none() {
                warn!("Skipping persisted favorite with inconsistent key: {}", stored_key);
            }
            record
        })
        .collect()
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Last saved set, in saved order; empty when nothing was saved
    async fn load(&self) -> Result<Vec<FavoriteRecord>>;

    /// Replace the saved set
    async fn save(&self, records: &[FavoriteRecord]) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// In-memory adapter
// ============================================================================

/// Keeps the serialized list in process memory (tests, guest sessions)
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    blob: Mutex<Option<String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing serialized list
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    /// Currently saved serialized list
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().clone()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn load(&self) -> Result<Vec<FavoriteRecord>> {
        let Some(blob) = self.blob() else {
            return Ok(Vec::new());
        };
        let persisted: Vec<PersistedFavorite> = serde_json::from_str(&blob)?;
        Ok(into_records(persisted))
    }

    async fn save(&self, records: &[FavoriteRecord]) -> Result<()> {
        let persisted: Vec<PersistedFavorite> = records.iter().map(PersistedFavorite::from).collect();
        let blob = serde_json::to_string(&persisted)?;
        *self.blob.lock() = Some(blob);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.blob.lock() = None;
        Ok(())
    }
}

// ============================================================================
// SQLite adapter
// ============================================================================

/// Stores favorites in the local `favorites` table
///
/// The pool must have been opened with [`tripnest_common::db::init_database`]
/// (or the table created with `create_favorites_table`).
#[derive(Debug, Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceAdapter for SqlitePersistence {
    async fn load(&self) -> Result<Vec<FavoriteRecord>> {
        let rows = sqlx::query(
            "SELECT canonical_key, item_type, item_id, payload FROM favorites ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut persisted = Vec::with_capacity(rows.len());
        for row in rows {
            let canonical_key: String = row.try_get("canonical_key")?;
            let item_type: String = row.try_get("item_type")?;
            let item_id: String = row.try_get("item_id")?;
            let payload: String = row.try_get("payload")?;

            let Ok(item_type) = item_type.parse::<ItemType>() else {
                warn!("Skipping persisted favorite with unknown type: {}", canonical_key);
                continue;
            };
            let payload = match serde_json::from_str::<DisplayPayload>(&payload) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping unreadable payload for {}: {}", canonical_key, e);
                    DisplayPayload::default()
                }
            };

            persisted.push(PersistedFavorite {
                canonical_key,
                item_type,
                item_id,
                payload,
            });
        }

        debug!("Loaded {} persisted favorites", persisted.len());
        Ok(into_records(persisted))
    }

    async fn save(&self, records: &[FavoriteRecord]) -> Result<()> {
        let saved_at = tripnest_common::time::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM favorites").execute(&mut *tx).await?;

        for (position, record) in records.iter().enumerate() {
            let persisted = PersistedFavorite::from(record);
            let payload = serde_json::to_string(&persisted.payload)?;
            sqlx::query(
                r#"
                INSERT INTO favorites (canonical_key, item_type, item_id, payload, position, saved_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&persisted.canonical_key)
            .bind(persisted.item_type.as_str())
            .bind(&persisted.item_id)
            .bind(payload)
            .bind(position as i64)
            .bind(&saved_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Saved {} favorites", records.len());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM favorites").execute(&self.pool).await?;
        Ok(())
    }
}
