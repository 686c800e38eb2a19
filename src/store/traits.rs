//! Backend-agnostic store trait for checkable items.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::extract::ItemKind;
use crate::scanner::Verdict;

/// A persisted checkable item (`url` table row).
#[derive(Debug, Clone)]
pub struct CheckableItem {
    pub url_id: i64,
    /// Identity: the raw url for links, `file:<fileId>` for files.
    pub url: String,
    pub kind: ItemKind,
    /// Cached verdict; `None` means not yet checked.
    pub result: Option<Verdict>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence operations for items, verdicts and danger scores.
///
/// Concurrency safety lives entirely behind this interface: `ensure_item` and
/// `record_user_sighting` are single-round-trip atomic upserts, so callers
/// need no locking of their own.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Look up an item by its url identity.
    async fn find_item(&self, url: &str) -> Result<Option<CheckableItem>, DatabaseError>;

    /// Insert-if-absent, else return the existing row. Callers never observe
    /// a duplicate-key error, even when two first sightings race.
    async fn ensure_item(&self, url: &str, kind: ItemKind)
    -> Result<CheckableItem, DatabaseError>;

    /// Atomically create-or-increment the per-user occurrence counter and
    /// return the post-increment value.
    async fn record_user_sighting(&self, user_id: i64, url_id: i64)
    -> Result<i64, DatabaseError>;

    /// Cache a computed verdict. Set-once in the steady state; overwriting is
    /// not forbidden, just never done by the pipeline.
    async fn save_verdict(&self, url_id: i64, verdict: Verdict) -> Result<(), DatabaseError>;

    /// Sum of occurrence counters over the user's malicious items.
    async fn danger_score(&self, user_id: i64) -> Result<i64, DatabaseError>;

    /// Batch form of [`danger_score`](Self::danger_score). An empty id list
    /// returns an empty map without touching the database. Users with no
    /// dangerous sightings are absent from the map.
    async fn danger_scores(&self, user_ids: &[i64])
    -> Result<HashMap<i64, i64>, DatabaseError>;
}
