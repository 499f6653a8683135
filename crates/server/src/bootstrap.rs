use std::sync::Arc;
use std::time::Duration;

use shelfmate_agent::books::BookSearch;
use shelfmate_agent::providers::{ProviderError, ProviderSet};
use shelfmate_agent::runtime::ConversationOrchestrator;
use shelfmate_core::config::{AppConfig, ConfigError};
use shelfmate_db::{connect_from_config, migrations, BookshelfRepository, DbPool, SqlBookshelfRepository};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;
use crate::sessions::{SessionLimits, SessionStore};
use crate::shelf::{BookshelfRecorder, TracingAuditSink};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        moderation_provider = ?config.moderation.provider,
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let providers = ProviderSet::from_config(&config)?;
    let books: Arc<dyn BookSearch> = providers.books.clone();
    info!(
        event_name = "system.bootstrap.providers_ready",
        correlation_id = "bootstrap",
        generation = providers.describe(),
        "conversation providers selected"
    );

    let bookshelf: Arc<dyn BookshelfRepository> =
        Arc::new(SqlBookshelfRepository::new(db_pool.clone()));
    let orchestrator = ConversationOrchestrator::from_config(&config, providers)
        .with_recorder(Arc::new(BookshelfRecorder::new(bookshelf.clone())))
        .with_audit_sink(Arc::new(TracingAuditSink));

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        sessions: SessionStore::new(SessionLimits::from_config(&config.server)),
        books,
        bookshelf,
        search_timeout: Duration::from_secs(config.llm.timeout_secs),
    };

    Ok(Application { config, db_pool, state })
}
