//! Recording database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// One taped source of a show. A recording referenced by more than one show
/// is stored once per referencing show.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RecordingRecord {
    pub identifier: String,
    pub show_id: String,
    /// Source classification: soundboard, audience, matrix, etc.
    pub source_type: String,
    pub rating: f64,
    pub raw_rating: f64,
    pub review_count: i64,
    pub confidence: f64,
    pub high_ratings: i64,
    pub low_ratings: i64,
    pub taper: String,
    pub source: String,
    pub lineage: String,
    pub collected_at: DateTime<Utc>,
}

const RECORDING_COLUMNS: &str = r#"
    identifier, show_id, source_type, rating, raw_rating, review_count,
    confidence, high_ratings, low_ratings, taper, source, lineage, collected_at
"#;

pub struct RecordingRepository {
    pool: SqlitePool,
}

impl RecordingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a batch of recordings in one transaction
    pub async fn insert_batch(&self, rows: &[RecordingRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let sql = r#"
            INSERT OR REPLACE INTO recordings (
                identifier, show_id, source_type, rating, raw_rating, review_count,
                confidence, high_ratings, low_ratings, taper, source, lineage, collected_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        for recording in rows {
            sqlx::query(sql)
                .bind(&recording.identifier)
                .bind(&recording.show_id)
                .bind(&recording.source_type)
                .bind(recording.rating)
                .bind(recording.raw_rating)
                .bind(recording.review_count)
                .bind(recording.confidence)
                .bind(recording.high_ratings)
                .bind(recording.low_ratings)
                .bind(&recording.taper)
                .bind(&recording.source)
                .bind(&recording.lineage)
                .bind(recording.collected_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count all persisted recordings
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recordings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// List all recordings for a show, best rated first
    pub async fn list_for_show(&self, show_id: &str) -> Result<Vec<RecordingRecord>> {
        let records = sqlx::query_as::<_, RecordingRecord>(&format!(
            r#"
            SELECT {RECORDING_COLUMNS} FROM recordings
            WHERE show_id = ?
            ORDER BY rating DESC, identifier
            "#
        ))
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Delete every recording row
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM recordings")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
