use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use shelfmate_core::domain::book::{BookId, BookLog};

use super::{BookshelfRepository, RecordOutcome, RepositoryError};

type ShelfKey = (String, String);

#[derive(Default)]
pub struct InMemoryBookshelfRepository {
    logs: RwLock<HashMap<ShelfKey, BookLog>>,
}

fn key(user_id: &str, book_id: &BookId) -> ShelfKey {
    (user_id.to_string(), book_id.0.clone())
}

#[async_trait::async_trait]
impl BookshelfRepository for InMemoryBookshelfRepository {
    async fn record(&self, log: BookLog) -> Result<RecordOutcome, RepositoryError> {
        let mut logs = self.logs.write().await;
        let key = key(&log.user_id, &log.book.id);
        if logs.contains_key(&key) {
            return Ok(RecordOutcome::AlreadyShelved);
        }
        logs.insert(key, log);
        Ok(RecordOutcome::Inserted)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookLog>, RepositoryError> {
        let logs = self.logs.read().await;
        let mut shelf: Vec<BookLog> =
            logs.values().filter(|log| log.user_id == user_id).cloned().collect();
        shelf.sort_by(|a, b| {
            b.recommended_at.cmp(&a.recommended_at).then_with(|| a.book.id.0.cmp(&b.book.id.0))
        });
        Ok(shelf)
    }

    async fn find(
        &self,
        user_id: &str,
        book_id: &BookId,
    ) -> Result<Option<BookLog>, RepositoryError> {
        let logs = self.logs.read().await;
        Ok(logs.get(&key(user_id, book_id)).cloned())
    }

    async fn update_review(
        &self,
        user_id: &str,
        book_id: &BookId,
        review: &str,
    ) -> Result<Option<BookLog>, RepositoryError> {
        let mut logs = self.logs.write().await;
        Ok(logs.get_mut(&key(user_id, book_id)).map(|log| {
            log.user_review = review.to_string();
            log.updated_at = Utc::now();
            log.clone()
        }))
    }
}
