//! SQLite persistence for the bookshelf: pool setup, embedded migrations and
//! the per-user book log repository.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use repositories::{
    BookshelfRepository, InMemoryBookshelfRepository, RecordOutcome, RepositoryError,
    SqlBookshelfRepository,
};
