//! Show database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// One dated performance, independent of which taped sources exist for it
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ShowRecord {
    pub id: String,
    pub date: String,
    // Derived from the date string at import time
    pub year: i32,
    pub month: i32,
    pub year_month: String,
    // Venue and location
    pub band: String,
    pub venue: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub location_raw: String,
    // Setlist / lineup text
    pub setlist_raw: String,
    pub setlist_status: String,
    pub lineup_raw: String,
    pub lineup_status: String,
    // Recording aggregates
    pub recording_count: i64,
    pub best_recording_id: Option<String>,
    pub avg_rating: f64,
    pub review_count: i64,
    // The only field mutated after import
    pub in_library: bool,
    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SHOW_COLUMNS: &str = r#"
    id, date, year, month, year_month, band, venue, city, state, country,
    location_raw, setlist_raw, setlist_status, lineup_raw, lineup_status,
    recording_count, best_recording_id, avg_rating, review_count, in_library,
    created_at, updated_at
"#;

pub struct ShowRepository {
    pool: SqlitePool,
}

impl ShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a batch of shows with their pre-generated search text in one transaction
    pub async fn insert_batch(&self, rows: &[(ShowRecord, String)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let sql = r#"
            INSERT OR REPLACE INTO shows (
                id, date, year, month, year_month, band, venue, city, state, country,
                location_raw, setlist_raw, setlist_status, lineup_raw, lineup_status,
                recording_count, best_recording_id, avg_rating, review_count, in_library,
                search_text, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        for (show, search_text) in rows {
            sqlx::query(sql)
                .bind(&show.id)
                .bind(&show.date)
                .bind(show.year)
                .bind(show.month)
                .bind(&show.year_month)
                .bind(&show.band)
                .bind(&show.venue)
                .bind(&show.city)
                .bind(&show.state)
                .bind(&show.country)
                .bind(&show.location_raw)
                .bind(&show.setlist_raw)
                .bind(&show.setlist_status)
                .bind(&show.lineup_raw)
                .bind(&show.lineup_status)
                .bind(show.recording_count)
                .bind(&show.best_recording_id)
                .bind(show.avg_rating)
                .bind(show.review_count)
                .bind(show.in_library)
                .bind(search_text)
                .bind(show.created_at)
                .bind(show.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Count all persisted shows
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shows")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Get a show by ID
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ShowRecord>> {
        let record = sqlx::query_as::<_, ShowRecord>(&format!(
            "SELECT {SHOW_COLUMNS} FROM shows WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Full-text search against the generated search text column
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<ShowRecord>> {
        let records = sqlx::query_as::<_, ShowRecord>(&format!(
            r#"
            SELECT {SHOW_COLUMNS} FROM shows
            WHERE search_text LIKE '%' || ? || '%'
            ORDER BY date
            LIMIT ?
            "#
        ))
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Flip library membership for a show. This is the only post-import mutation.
    pub async fn set_in_library(&self, id: &str, in_library: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE shows SET in_library = ?, updated_at = ? WHERE id = ?")
            .bind(in_library)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every show row
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM shows").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
