//! Enumerates the blobs referenced by live content.

use std::collections::{BTreeSet, HashSet};

use sqlx::SqliteConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::blob_id::BlobId;
use crate::content::{ContentModel, FieldTable};
use crate::database::Database;
use crate::error::Result;

/// Outcome of a reference scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Blobs referenced by at least one blob field value
    pub references: HashSet<BlobId>,
    /// Non-empty blob field values that did not parse as a blob id
    pub malformed: usize,
}

/// Walks the blob fields of every template and collects the blob ids stored
/// in them, across all field tables.
///
/// Field ids are matched in their hyphenated lowercase form. Malformed values
/// are counted and skipped; a blob referenced only by a malformed value is
/// therefore not protected from the sweep.
pub struct ReferenceScanner<'a> {
    content: &'a dyn ContentModel,
}

impl<'a> ReferenceScanner<'a> {
    pub fn new(content: &'a dyn ContentModel) -> Self {
        Self { content }
    }

    /// Scan on a pooled connection of `db`.
    pub async fn scan(&self, db: &Database) -> Result<ScanReport> {
        let mut conn = db.pool().acquire().await?;
        self.scan_on(&mut conn).await
    }

    /// Scan on an existing connection, typically a sweep's transaction.
    pub(crate) async fn scan_on(&self, conn: &mut SqliteConnection) -> Result<ScanReport> {
        let templates = self.content.templates().await?;

        // Templates commonly share fields through inheritance
        let field_ids: BTreeSet<Uuid> = templates
            .iter()
            .flat_map(|t| t.blob_fields().map(|f| f.id))
            .collect();

        let mut report = ScanReport::default();
        for field_id in &field_ids {
            for table in FieldTable::ALL {
                let sql = format!(
                    "SELECT DISTINCT value FROM {} \
                     WHERE field_id = ? AND value IS NOT NULL AND value != ''",
                    table.table_name()
                );
                let values: Vec<String> = sqlx::query_scalar(&sql)
                    .bind(field_id.to_string())
                    .fetch_all(&mut *conn)
                    .await?;

                for value in values {
                    match BlobId::from_reference(&value) {
                        Some(id) => {
                            report.references.insert(id);
                        }
                        None => {
                            report.malformed += 1;
                            warn!(
                                field_id = %field_id,
                                table = table.table_name(),
                                value = %value,
                                "blob field value is not a blob id, skipping"
                            );
                        }
                    }
                }
            }
        }

        debug!(
            templates = templates.len(),
            blob_fields = field_ids.len(),
            references = report.references.len(),
            malformed = report.malformed,
            "scanned blob references"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, TestContent};

    #[tokio::test]
    async fn test_scan_collects_references_from_every_table() {
        let db = Database::in_memory().await.unwrap();
        let content = TestContent::new();

        let mut expected = HashSet::new();
        for table in FieldTable::ALL {
            let id = BlobId::new();
            testkit::set_field(&db, table, content.blob_field, &id.to_string()).await;
            expected.insert(id);
        }

        let report = ReferenceScanner::new(&content.model).scan(&db).await.unwrap();
        assert_eq!(report.references, expected);
        assert_eq!(report.malformed, 0);
    }

    #[tokio::test]
    async fn test_scan_ignores_non_blob_fields_and_empty_values() {
        let db = Database::in_memory().await.unwrap();
        let content = TestContent::new();

        let plain = BlobId::new();
        testkit::set_field(&db, FieldTable::Shared, content.text_field, &plain.to_string()).await;
        testkit::set_field(&db, FieldTable::Shared, content.blob_field, "").await;

        let report = ReferenceScanner::new(&content.model).scan(&db).await.unwrap();
        assert!(report.references.is_empty());
        assert_eq!(report.malformed, 0);
    }

    #[tokio::test]
    async fn test_scan_truncates_long_values() {
        let db = Database::in_memory().await.unwrap();
        let content = TestContent::new();

        let id = BlobId::new();
        let value = format!("{{{}}}|extra1", id.to_string().to_uppercase());
        assert_eq!(value.len(), 45);
        testkit::set_field(&db, FieldTable::Versioned, content.blob_field, &value).await;

        let report = ReferenceScanner::new(&content.model).scan(&db).await.unwrap();
        assert_eq!(report.references, HashSet::from([id]));
    }

    #[tokio::test]
    async fn test_scan_counts_malformed_values_without_failing() {
        let db = Database::in_memory().await.unwrap();
        let content = TestContent::new();

        let good = BlobId::new();
        testkit::set_field(&db, FieldTable::Shared, content.blob_field, &good.to_string()).await;
        testkit::set_field(&db, FieldTable::Unversioned, content.blob_field, "not-a-blob").await;
        testkit::set_field(&db, FieldTable::Archived, content.blob_field, "{6F9619FF-8B86").await;

        let report = ReferenceScanner::new(&content.model).scan(&db).await.unwrap();
        assert_eq!(report.references, HashSet::from([good]));
        assert_eq!(report.malformed, 2);
    }

    #[tokio::test]
    async fn test_scan_deduplicates_shared_fields() {
        let db = Database::in_memory().await.unwrap();
        let content = TestContent::with_duplicate_template();

        let id = BlobId::new();
        testkit::set_field(&db, FieldTable::Shared, content.blob_field, &id.to_string()).await;
        testkit::set_field(&db, FieldTable::Shared, content.blob_field, &id.to_string()).await;

        let report = ReferenceScanner::new(&content.model).scan(&db).await.unwrap();
        assert_eq!(report.references.len(), 1);
    }
}
