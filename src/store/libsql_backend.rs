//! libSQL backend — async `ItemStore` implementation.
//!
//! All race-sensitive writes are single statements with conflict handling
//! (`ON CONFLICT .. DO NOTHING` / `DO UPDATE`), so concurrent first sightings
//! and counter increments are safe without application-level locks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::extract::ItemKind;
use crate::scanner::Verdict;
use crate::store::migrations;
use crate::store::traits::{CheckableItem, ItemStore};

/// libSQL database backend.
///
/// Stores a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

const ITEM_COLUMNS: &str = "url_id, url, type, result, created_at, updated_at";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a row in `ITEM_COLUMNS` order to a [`CheckableItem`].
fn row_to_item(row: &libsql::Row) -> Result<CheckableItem, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("Failed to read url row: {e}"));

    let kind_str: String = row.get(2).map_err(map)?;
    // NULL and '' both mean "not yet checked".
    let result_str: Option<String> = row.get::<Option<String>>(3).map_err(map)?;
    let created_str: String = row.get(4).map_err(map)?;
    let updated_str: String = row.get(5).map_err(map)?;

    Ok(CheckableItem {
        url_id: row.get(0).map_err(map)?,
        url: row.get(1).map_err(map)?,
        kind: ItemKind::from_str_lossy(&kind_str),
        result: result_str
            .filter(|s| !s.is_empty())
            .map(|s| Verdict::from_str_lossy(&s)),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl ItemStore for LibSqlBackend {
    async fn find_item(&self, url: &str) -> Result<Option<CheckableItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM url WHERE url = ?1"),
                params![url],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_item failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_item read failed: {e}")))?
        {
            Some(row) => Ok(Some(row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn ensure_item(
        &self,
        url: &str,
        kind: ItemKind,
    ) -> Result<CheckableItem, DatabaseError> {
        // Compare-and-insert: a concurrent first sighting hits the unique
        // constraint and falls through to the re-read.
        self.conn()
            .execute(
                "INSERT INTO url (url, type) VALUES (?1, ?2) ON CONFLICT(url) DO NOTHING",
                params![url, kind.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_item insert failed: {e}")))?;

        self.find_item(url).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "url".to_string(),
            id: url.to_string(),
        })
    }

    async fn record_user_sighting(
        &self,
        user_id: i64,
        url_id: i64,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO user_url (max_user_id, url_id, number) VALUES (?1, ?2, 1)
                 ON CONFLICT(max_user_id, url_id) DO UPDATE SET number = number + 1
                 RETURNING number",
                params![user_id, url_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_user_sighting failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_user_sighting read failed: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("Failed to read counter: {e}"))),
            None => Err(DatabaseError::Query(
                "record_user_sighting returned no row".to_string(),
            )),
        }
    }

    async fn save_verdict(&self, url_id: i64, verdict: Verdict) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE url SET result = ?1, updated_at = datetime('now') WHERE url_id = ?2",
                params![verdict.as_str(), url_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_verdict failed: {e}")))?;
        Ok(())
    }

    async fn danger_score(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COALESCE(SUM(uu.number), 0)
                 FROM user_url uu
                 JOIN url u ON uu.url_id = u.url_id
                 WHERE uu.max_user_id = ?1 AND u.result = 'malicious'",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("danger_score failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("danger_score read failed: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("Failed to read score: {e}"))),
            None => Ok(0),
        }
    }

    async fn danger_scores(
        &self,
        user_ids: &[i64],
    ) -> Result<HashMap<i64, i64>, DatabaseError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = (1..=user_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT uu.max_user_id, SUM(uu.number)
             FROM user_url uu
             JOIN url u ON uu.url_id = u.url_id
             WHERE uu.max_user_id IN ({placeholders}) AND u.result = 'malicious'
             GROUP BY uu.max_user_id"
        );

        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(user_ids.to_vec()))
            .await
            .map_err(|e| DatabaseError::Query(format!("danger_scores failed: {e}")))?;

        let mut scores = HashMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let user_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("Failed to read user id: {e}")))?;
            let score: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("Failed to read score: {e}")))?;
            scores.insert(user_id, score);
        }
        Ok(scores)
    }
}
