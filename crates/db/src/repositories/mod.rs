use async_trait::async_trait;
use thiserror::Error;

use shelfmate_core::domain::book::{BookId, BookLog};
use shelfmate_core::errors::ApplicationError;

pub mod bookshelf;
pub mod memory;

pub use bookshelf::SqlBookshelfRepository;
pub use memory::InMemoryBookshelfRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// The user already has this book; the existing log is left untouched.
    AlreadyShelved,
}

/// Per-user book log. A user holds at most one log per book id.
#[async_trait]
pub trait BookshelfRepository: Send + Sync {
    async fn record(&self, log: BookLog) -> Result<RecordOutcome, RepositoryError>;

    /// Newest recommendation first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookLog>, RepositoryError>;

    async fn find(&self, user_id: &str, book_id: &BookId)
        -> Result<Option<BookLog>, RepositoryError>;

    /// Returns the updated log, or `None` when the user has no such book.
    async fn update_review(
        &self,
        user_id: &str,
        book_id: &BookId,
        review: &str,
    ) -> Result<Option<BookLog>, RepositoryError>;
}
