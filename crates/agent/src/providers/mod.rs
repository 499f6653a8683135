pub mod openai;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use shelfmate_core::config::{AppConfig, LlmProvider, ModerationProvider};

use crate::books::{BookSearch, StaticCatalog};
use crate::llm::LlmClient;
use crate::moderation::{KeywordModerator, ModerationClient};

pub use openai::{LlmBookRecommender, OpenAiClient};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed upstream payload: {0}")]
    MalformedResponse(String),
    #[error("upstream call exceeded {0:?}")]
    Timeout(Duration),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::Unavailable(_) => false,
        }
    }
}

/// Collaborators chosen by configuration. Offline settings fall back to local implementations.
#[derive(Clone)]
pub struct ProviderSet {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub moderation: Arc<dyn ModerationClient>,
    pub books: Arc<dyn BookSearch>,
}

impl ProviderSet {
    pub fn offline() -> Self {
        Self { llm: None, moderation: Arc::new(KeywordModerator), books: Arc::new(StaticCatalog) }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let chat = OpenAiClient::from_config(&config.llm)?;
        let recommender = OpenAiClient::for_model(&config.llm, &config.llm.recommendation_model)?;

        let moderation: Arc<dyn ModerationClient> = match config.moderation.provider {
            ModerationProvider::Offline => Arc::new(KeywordModerator),
            ModerationProvider::OpenAi => {
                let client = OpenAiClient::new(
                    moderation_base_url(config),
                    config.llm.api_key.clone(),
                    "omni-moderation-latest",
                    Duration::from_secs(config.moderation.timeout_secs),
                )?;
                Arc::new(client)
            }
        };

        let books: Arc<dyn BookSearch> = match recommender {
            Some(client) => Arc::new(LlmBookRecommender::new(
                Arc::new(client),
                config.llm.recommendation_temperature,
            )),
            None => Arc::new(StaticCatalog),
        };

        Ok(Self { llm: chat.map(|client| Arc::new(client) as Arc<dyn LlmClient>), moderation, books })
    }

    pub fn describe(&self) -> &'static str {
        if self.llm.is_some() {
            "live"
        } else {
            "offline"
        }
    }
}

/// Moderation always speaks the OpenAI API. A custom `llm.base_url` is only honoured when
/// chat also goes to OpenAI; an Ollama endpoint has no `/moderations` route.
fn moderation_base_url(config: &AppConfig) -> String {
    match (config.llm.provider, config.llm.base_url.as_deref()) {
        (LlmProvider::OpenAi, Some(url)) if !url.trim().is_empty() => url.to_string(),
        _ => openai::OPENAI_BASE_URL.to_string(),
    }
}

/// Bounds an upstream call. Elapsed time is reported as `ProviderError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
