//! SQLite ledger of stored blobs.
//!
//! Every write appends one row keyed by a fresh surrogate id. The ledger
//! answers "does this blob exist" without touching object storage, and gives
//! the cleanup sweep a queryable list of candidates. The `data` column is
//! always empty; the bytes live in object storage only.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row, Sqlite, SqliteConnection, Transaction,
};
use tracing::warn;
use uuid::Uuid;

use crate::blob_id::BlobId;
use crate::error::Result;

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Surrogate key of the row
    pub entry_id: Uuid,
    pub blob_id: BlobId,
    /// Always 0: blobs are never chunked in the ledger
    pub part_index: i64,
    pub created_at: DateTime<Utc>,
    /// Length of the placeholder payload; 0 for every row we write
    pub payload_len: i64,
}

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    ///
    /// Backed by a single connection that is never recycled, since every
    /// connection to `:memory:` is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction on the ledger database.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Record a write of `blob_id`, stamped with the current time.
    pub async fn insert_blob(&self, blob_id: &BlobId) -> Result<Uuid> {
        self.insert_blob_at(blob_id, Utc::now()).await
    }

    /// Record a write of `blob_id` with an explicit creation time.
    pub async fn insert_blob_at(&self, blob_id: &BlobId, created_at: DateTime<Utc>) -> Result<Uuid> {
        let entry_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO blobs (id, blob_id, part_index, created_at, data)
            VALUES (?, ?, 0, ?, x'')
            "#,
        )
        .bind(entry_id.to_string())
        .bind(blob_id.to_string())
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(entry_id)
    }

    /// Check if the ledger knows a blob.
    pub async fn has_blob(&self, blob_id: &BlobId) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM blobs WHERE blob_id = ? LIMIT 1
            "#,
        )
        .bind(blob_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// All ledger rows for a blob, oldest first.
    pub async fn entries(&self, blob_id: &BlobId) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, blob_id, part_index, created_at, length(data) AS payload_len
            FROM blobs
            WHERE blob_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(blob_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for r in rows {
            let entry_id: String = r.get("id");
            let Ok(entry_id) = entry_id.parse::<Uuid>() else {
                warn!(entry_id = %entry_id, "invalid entry id in ledger, skipping");
                continue;
            };
            entries.push(IndexEntry {
                entry_id,
                blob_id: *blob_id,
                part_index: r.get("part_index"),
                created_at: DateTime::from_timestamp_millis(r.get("created_at"))
                    .unwrap_or_default(),
                payload_len: r.get("payload_len"),
            });
        }
        Ok(entries)
    }

    /// List every blob the ledger knows, newest first.
    pub async fn list_blob_ids(&self) -> Result<Vec<BlobId>> {
        let rows = sqlx::query(
            r#"
            SELECT blob_id, MAX(created_at) AS newest
            FROM blobs
            GROUP BY blob_id
            ORDER BY newest DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                let s: String = r.get("blob_id");
                match s.parse::<BlobId>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!(blob_id = %s, "invalid blob id in ledger, skipping");
                        None
                    }
                }
            })
            .collect())
    }

    /// Count ledger rows.
    pub async fn count_entries(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM blobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }

    /// Delete every ledger row of a blob.
    pub async fn delete_blob(&self, blob_id: &BlobId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM blobs WHERE blob_id = ?
            "#,
        )
        .bind(blob_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Ledger statements run by the cleanup sweep on its own transaction.
///
/// They rely on the `blobs_in_use` temp table, which only exists on the
/// connection that created it and only until it is dropped.
impl Database {
    pub(crate) async fn create_in_use_table(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("CREATE TEMP TABLE blobs_in_use (id TEXT PRIMARY KEY NOT NULL)")
            .execute(conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn mark_in_use(conn: &mut SqliteConnection, blob_id: &BlobId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO blobs_in_use (id) VALUES (?)")
            .bind(blob_id.to_string())
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Blobs that are not in use and have no ledger row newer than `cutoff`.
    pub(crate) async fn unused_blobs(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BlobId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT blob_id
            FROM blobs
            WHERE blob_id NOT IN (SELECT id FROM blobs_in_use)
            GROUP BY blob_id
            HAVING MAX(created_at) <= ?
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .fetch_all(conn)
        .await?;

        Ok(ids
            .into_iter()
            .filter_map(|s| match s.parse::<BlobId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(blob_id = %s, "invalid blob id in ledger, skipping");
                    None
                }
            })
            .collect())
    }

    /// Delete the rows selected by [`Database::unused_blobs`] for the same cutoff.
    pub(crate) async fn delete_unused_blobs(
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM blobs
            WHERE blob_id NOT IN (SELECT id FROM blobs_in_use)
              AND blob_id NOT IN (SELECT blob_id FROM blobs WHERE created_at > ?)
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn drop_in_use_table(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("DROP TABLE blobs_in_use").execute(conn).await?;
        Ok(())
    }
}
