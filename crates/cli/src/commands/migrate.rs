use shelfmate_core::config::{AppConfig, LoadOptions};
use shelfmate_db::{connect_from_config, migrations};

use crate::commands::CommandResult;

enum MigrateFailure {
    Config(String),
    Runtime(String),
    Connect(String),
    Apply(String),
}

impl MigrateFailure {
    fn into_result(self) -> CommandResult {
        let (class, message, code) = match self {
            Self::Config(message) => ("config_validation", format!("configuration issue: {message}"), 2),
            Self::Runtime(message) => {
                ("runtime_init", format!("failed to initialize async runtime: {message}"), 3)
            }
            Self::Connect(message) => ("db_connectivity", message, 4),
            Self::Apply(message) => ("migration", message, 5),
        };
        CommandResult::failure("migrate", class, message, code)
    }
}

pub fn run() -> CommandResult {
    match apply() {
        Ok((applied, url)) => CommandResult::success(
            "migrate",
            format!("schema up to date at {url} ({applied} migration(s) applied)"),
        ),
        Err(failure) => failure.into_result(),
    }
}

fn apply() -> Result<(usize, String), MigrateFailure> {
    let config = AppConfig::load(LoadOptions::default())
        .map_err(|error| MigrateFailure::Config(error.to_string()))?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| MigrateFailure::Runtime(error.to_string()))?;

    let applied = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| MigrateFailure::Connect(error.to_string()))?;
        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| MigrateFailure::Apply(error.to_string()))?;
        let outcome = migrations::run_pending(&pool)
            .await
            .map_err(|error| MigrateFailure::Apply(error.to_string()));
        pool.close().await;
        outcome.map(|()| pending)
    })?;

    Ok((applied, config.database.url))
}
