use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shelfmate_core::domain::book::{BookLog, BookRecord, RecommendationSummary};
use shelfmate_core::errors::ApplicationError;

/// Bookshelf side of a successful presentation. Never reads conversation history.
#[async_trait]
pub trait RecommendationRecorder: Send + Sync {
    async fn record(
        &self,
        user_id: &str,
        book: &BookRecord,
        summary: &RecommendationSummary,
    ) -> Result<(), ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryRecorder {
    logs: Arc<Mutex<Vec<BookLog>>>,
}

impl InMemoryRecorder {
    pub fn logs(&self) -> Vec<BookLog> {
        match self.logs.lock() {
            Ok(logs) => logs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RecommendationRecorder for InMemoryRecorder {
    async fn record(
        &self,
        user_id: &str,
        book: &BookRecord,
        summary: &RecommendationSummary,
    ) -> Result<(), ApplicationError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| ApplicationError::Persistence("recorder lock poisoned".to_string()))?;
        let exists = logs.iter().any(|log| log.user_id == user_id && log.book.id == book.id);
        if !exists {
            logs.push(BookLog::new(user_id, book.clone(), summary.clone()));
        }
        Ok(())
    }
}
