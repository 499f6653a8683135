use std::sync::Arc;

use tracing::{debug, info};

use shelfmate_agent::recorder::RecommendationRecorder;
use shelfmate_core::audit::{AuditEvent, AuditSink};
use shelfmate_core::domain::book::{BookLog, BookRecord, RecommendationSummary};
use shelfmate_core::errors::ApplicationError;
use shelfmate_db::{BookshelfRepository, RecordOutcome};

/// Writes presented books to the user's shelf.
pub struct BookshelfRecorder {
    repository: Arc<dyn BookshelfRepository>,
}

impl BookshelfRecorder {
    pub fn new(repository: Arc<dyn BookshelfRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl RecommendationRecorder for BookshelfRecorder {
    async fn record(
        &self,
        user_id: &str,
        book: &BookRecord,
        summary: &RecommendationSummary,
    ) -> Result<(), ApplicationError> {
        let outcome = self
            .repository
            .record(BookLog::new(user_id, book.clone(), summary.clone()))
            .await?;
        if outcome == RecordOutcome::AlreadyShelved {
            debug!(
                event_name = "bookshelf.already_shelved",
                user_id,
                book_id = %book.id.0,
                "book already on shelf"
            );
        }
        Ok(())
    }
}

/// Forwards audit events to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.event",
            audit_event_type = %event.event_type,
            category = %event.category,
            outcome = %event.outcome,
            session_id = event.session_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            "audit event"
        );
    }
}
