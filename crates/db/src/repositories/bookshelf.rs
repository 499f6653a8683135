use chrono::{DateTime, Utc};
use sqlx::Row;

use shelfmate_core::domain::book::{BookId, BookLog, BookRecord, RecommendationSummary};
use shelfmate_core::domain::topic::Topic;

use super::{BookshelfRepository, RecordOutcome, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT user_id, book_id, title, author, publisher, pub_year, excerpt,
        cover_image, topic, user_concern, recommendation_reason, user_review,
        recommended_at, updated_at
 FROM book_log";

pub struct SqlBookshelfRepository {
    pool: DbPool,
}

impl SqlBookshelfRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> Result<BookLog, RepositoryError> {
    let topic_key: String = decode(row.try_get("topic"))?;
    let topic = Topic::from_label(&topic_key)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown topic `{topic_key}`")))?;
    let recommended_at: String = decode(row.try_get("recommended_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    Ok(BookLog {
        user_id: decode(row.try_get("user_id"))?,
        book: BookRecord {
            id: BookId(decode(row.try_get("book_id"))?),
            title: decode(row.try_get("title"))?,
            author: decode(row.try_get("author"))?,
            publisher: decode(row.try_get("publisher"))?,
            pub_year: decode(row.try_get("pub_year"))?,
            excerpt: decode(row.try_get("excerpt"))?,
            cover_image: decode(row.try_get("cover_image"))?,
        },
        summary: RecommendationSummary {
            topic,
            user_concern: decode(row.try_get("user_concern"))?,
            recommendation_reason: decode(row.try_get("recommendation_reason"))?,
        },
        user_review: decode(row.try_get("user_review"))?,
        recommended_at: parse_timestamp("recommended_at", &recommended_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl BookshelfRepository for SqlBookshelfRepository {
    async fn record(&self, log: BookLog) -> Result<RecordOutcome, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO book_log (user_id, book_id, title, author, publisher, pub_year, excerpt,
                                   cover_image, topic, user_concern, recommendation_reason,
                                   user_review, recommended_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, book_id) DO NOTHING",
        )
        .bind(&log.user_id)
        .bind(&log.book.id.0)
        .bind(&log.book.title)
        .bind(&log.book.author)
        .bind(&log.book.publisher)
        .bind(&log.book.pub_year)
        .bind(&log.book.excerpt)
        .bind(&log.book.cover_image)
        .bind(log.summary.topic.as_str())
        .bind(&log.summary.user_concern)
        .bind(&log.summary.recommendation_reason)
        .bind(&log.user_review)
        .bind(log.recommended_at.to_rfc3339())
        .bind(log.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyShelved)
        } else {
            Ok(RecordOutcome::Inserted)
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookLog>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ? ORDER BY recommended_at DESC, book_id ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log).collect::<Result<Vec<_>, _>>()
    }

    async fn find(
        &self,
        user_id: &str,
        book_id: &BookId,
    ) -> Result<Option<BookLog>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE user_id = ? AND book_id = ?"))
            .bind(user_id)
            .bind(&book_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_log(r)?)),
            None => Ok(None),
        }
    }

    async fn update_review(
        &self,
        user_id: &str,
        book_id: &BookId,
        review: &str,
    ) -> Result<Option<BookLog>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE book_log SET user_review = ?, updated_at = ?
             WHERE user_id = ? AND book_id = ?",
        )
        .bind(review)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .bind(&book_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(user_id, book_id).await
    }
}
