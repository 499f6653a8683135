use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use shelfmate_db::{migrations, DbPool};
use tracing::warn;

use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub sessions: SessionStore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub status: Readiness,
    pub detail: String,
}

impl CheckResult {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub active_sessions: usize,
    pub database: CheckResult,
    pub schema: CheckResult,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, sessions: SessionStore) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, sessions })
}

/// Ready only when the database answers and no migration is pending.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = check_database(&state.db_pool).await;
    let schema = if database.status == Readiness::Ready {
        check_schema(&state.db_pool).await
    } else {
        CheckResult::degraded("skipped: database unreachable")
    };

    let status = if database.status == Readiness::Ready && schema.status == Readiness::Ready {
        Readiness::Ready
    } else {
        Readiness::Degraded
    };

    let report = HealthReport {
        status,
        active_sessions: state.sessions.len().await,
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let code = match status {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

async fn check_database(pool: &DbPool) -> CheckResult {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => CheckResult::ready("database query succeeded"),
        Err(error) => {
            warn!(
                event_name = "system.health.database_degraded",
                error = %error,
                "database health check failed"
            );
            CheckResult::degraded(format!("database query failed: {error}"))
        }
    }
}

async fn check_schema(pool: &DbPool) -> CheckResult {
    match migrations::pending_count(pool).await {
        Ok(0) => CheckResult::ready("all migrations applied"),
        Ok(pending) => CheckResult::degraded(format!("{pending} migration(s) pending")),
        Err(error) => {
            warn!(
                event_name = "system.health.schema_unknown",
                error = %error,
                "could not read migration state"
            );
            CheckResult::degraded(format!("migration state unreadable: {error}"))
        }
    }
}
