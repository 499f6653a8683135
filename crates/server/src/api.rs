use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use shelfmate_agent::books::{BookQuery, BookSearch};
use shelfmate_agent::guardrails::SafetyGate;
use shelfmate_agent::providers::with_timeout;
use shelfmate_agent::runtime::{AgentTurnResult, ConversationOrchestrator};
use shelfmate_core::domain::book::{BookId, BookLog, BookRecord};
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::session::SessionId;
use shelfmate_core::errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
use shelfmate_db::BookshelfRepository;

use crate::sessions::SessionStore;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub sessions: SessionStore,
    pub books: Arc<dyn BookSearch>,
    pub bookshelf: Arc<dyn BookshelfRepository>,
    pub search_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{session_id}/messages", post(post_message))
        .route("/api/books/recommend", get(recommend_books))
        .route("/api/bookshelf/{user_id}", get(list_bookshelf))
        .route("/api/bookshelf/{user_id}/{book_id}/review", put(update_review))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

/// HTTP face of an `InterfaceError`. Internal details stay in the logs.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_app(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            FailureKind::Caller => StatusCode::BAD_REQUEST,
            FailureKind::Missing => StatusCode::NOT_FOUND,
            FailureKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
                message.clone()
            }
            other => {
                warn!(
                    event_name = "system.server.request_failed",
                    correlation_id = other.correlation_id(),
                    error = %other,
                    "request failed"
                );
                other.user_message().to_string()
            }
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            message,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub mode: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub mode: Mode,
    pub greeting: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let mode = body
        .mode
        .parse::<Mode>()
        .map_err(|error| ApiError::from_app(error.into(), &correlation_id))?;
    let user_id = body.user_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());

    let (session_id, greeting) = state.sessions.open(mode, user_id).await;
    info!(
        event_name = "conversation.session.opened",
        session_id = %session_id,
        correlation_id = %correlation_id,
        mode = mode.as_str(),
        "session opened"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id, mode, greeting: greeting.to_string() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<AgentTurnResult>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let session = state.sessions.get(&SessionId(session_id.clone())).await.ok_or_else(|| {
        ApiError::from_app(DomainError::UnknownSession(session_id).into(), &correlation_id)
    })?;

    let mut session = session.lock().await;
    let result = state
        .orchestrator
        .respond(&mut session, &body.text, &correlation_id)
        .await
        .map_err(|error| ApiError::from_app(error, &correlation_id))?;
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// Comma-separated titles.
    #[serde(default)]
    pub exclude: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub books: Vec<BookRecord>,
}

pub async fn recommend_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let query_text = params.query.trim();
    if query_text.is_empty() {
        return Err(ApiError::from_app(DomainError::EmptyQuery.into(), &correlation_id));
    }

    if let Some(verdict) = state.orchestrator.safety().flagged(query_text).await {
        warn!(
            event_name = "safety.input_flagged",
            correlation_id = %correlation_id,
            surface = "book_search",
            "search query blocked"
        );
        return Err(ApiError::bad_request(SafetyGate::to_safe_response(&verdict), &correlation_id));
    }

    let mut query = BookQuery::new(query_text);
    if let Some(mode) = params.mode.as_deref().filter(|mode| !mode.trim().is_empty()) {
        let mode = mode
            .parse::<Mode>()
            .map_err(|error| ApiError::from_app(error.into(), &correlation_id))?;
        query = query.with_audience(mode);
    }
    if let Some(exclude) = params.exclude.as_deref() {
        let titles: Vec<String> = exclude
            .split(',')
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .collect();
        query = query.excluding(&titles);
    }

    let books = with_timeout(state.search_timeout, state.books.search(&query))
        .await
        .map_err(|error| {
            ApiError::from_app(ApplicationError::Integration(error.to_string()), &correlation_id)
        })?;
    Ok(Json(RecommendResponse { books }))
}

pub async fn list_bookshelf(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookLog>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let logs = state
        .bookshelf
        .list_for_user(&user_id)
        .await
        .map_err(|error| ApiError::from_app(error.into(), &correlation_id))?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub review: String,
}

pub async fn update_review(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<BookLog>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let updated = state
        .bookshelf
        .update_review(&user_id, &BookId(book_id.clone()), &body.review)
        .await
        .map_err(|error| ApiError::from_app(error.into(), &correlation_id))?;

    updated.map(Json).ok_or_else(|| {
        ApiError::from_app(
            ApplicationError::NotFound(format!("book `{book_id}` on shelf of `{user_id}`")),
            &correlation_id,
        )
    })
}
