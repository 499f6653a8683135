//! OpenAI-compatible HTTP providers.
//!
//! The same client talks to api.openai.com and to any server exposing the
//! `/chat/completions` shape (Ollama's `/v1` endpoint included).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use shelfmate_core::config::{LlmConfig, LlmProvider};
use shelfmate_core::domain::book::{BookId, BookRecord};
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::moderation::{ModerationVerdict, SELF_HARM_CATEGORY};

use crate::books::{BookQuery, BookSearch};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::moderation::ModerationClient;
use crate::providers::ProviderError;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::Unavailable(format!("http client: {error}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
            max_retries: 0,
        })
    }

    /// Chat client for the configured provider, or `None` when running offline.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, ProviderError> {
        Self::for_model(config, &config.model)
    }

    pub fn for_model(config: &LlmConfig, model: &str) -> Result<Option<Self>, ProviderError> {
        let base_url = match config.provider {
            LlmProvider::Offline => return Ok(None),
            LlmProvider::OpenAi => config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            LlmProvider::Ollama => config
                .base_url
                .clone()
                .ok_or_else(|| ProviderError::Unavailable("ollama requires llm.base_url".to_string()))?,
        };
        let client = Self::new(
            base_url,
            config.api_key.clone(),
            model,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_max_retries(config.max_retries);
        Ok(Some(client))
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let mut attempt = 0;
        loop {
            match self.post_once(path, body).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(path, attempt, error = %error, "retrying upstream call");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn post_once<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body));
        }

        response.json::<R>().await.map_err(|error| ProviderError::MalformedResponse(error.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: request.json_object.then_some(ResponseFormat { kind: "json_object" }),
        };
        let response: ChatCompletionResponse = self.post_json("/chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("completion had no content".to_string()))
    }
}

#[async_trait]
impl ModerationClient for OpenAiClient {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict, ProviderError> {
        let response: ModerationResponse =
            self.post_json("/moderations", &ModerationRequest { input: text }).await?;
        let result = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("moderation had no results".to_string()))?;
        Ok(verdict_from(result))
    }
}

fn verdict_from(result: ModerationResult) -> ModerationVerdict {
    let mut categories: BTreeMap<String, bool> = result
        .categories
        .into_iter()
        .map(|(name, set)| (name, set.unwrap_or(false)))
        .collect();

    // sub-categories such as `self-harm/intent` count as self-harm
    let self_harm = categories
        .iter()
        .any(|(name, set)| *set && name.starts_with(SELF_HARM_CATEGORY));
    categories.insert(SELF_HARM_CATEGORY.to_string(), self_harm);

    ModerationVerdict { flagged: result.flagged, categories }
}

fn map_http_error(status: StatusCode, body: String) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    ProviderError::Status { status: status.as_u16(), message }
}

/// `BookSearch` backed by a generative model asked for one JSON book object.
#[derive(Clone)]
pub struct LlmBookRecommender {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl LlmBookRecommender {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    pub fn prompt(query: &BookQuery) -> String {
        let audience = if query.audience == Some(Mode::Child) {
            "어린이에게 적합한 동화책으로"
        } else {
            "사용자에게 도움이 될 만한"
        };
        let exclusion = if query.exclude.is_empty() {
            String::new()
        } else {
            let titles: Vec<String> = query.exclude.iter().map(|title| format!("'{title}'")).collect();
            format!("단, {}(은)는 제외하고 추천해주세요.\n", titles.join(", "))
        };

        format!(
            "사용자가 '{topic}' 주제와 관련된 감정을 느끼고 있습니다.\n\
             이 {audience} 실제 한국 출판 시장에 존재하는 책을 한 권 추천해주세요.\n\
             너무 뻔하거나 유명한 베스트셀러만 추천하지 말고, 사용자에게 정말 도움이 될 만한 다양한 관점의 책을 추천해주세요.\n\
             {exclusion}\
             응답은 다른 말 없이, 오직 다음의 JSON 형식만을 따라야 합니다:\n\
             {{\"title\": \"책 제목\", \"author\": \"저자\", \"publisher\": \"출판사\", \
             \"pubYear\": \"출판 연도 (YYYY 형식)\", \"excerpt\": \"책의 핵심 내용이나 인상적인 구절 1~2 문장\"}}",
            topic = query.query.trim(),
        )
    }
}

#[async_trait]
impl BookSearch for LlmBookRecommender {
    async fn search(&self, query: &BookQuery) -> Result<Vec<BookRecord>, ProviderError> {
        let request =
            CompletionRequest::new(vec![ChatMessage::user(Self::prompt(query))], self.temperature).json();
        let content = self.llm.complete(&request).await?;

        match parse_book(&content) {
            Some(book) if !query.is_excluded(&book.title) => Ok(vec![book]),
            Some(book) => {
                debug!(title = %book.title, "recommender returned an excluded title");
                Ok(Vec::new())
            }
            None => {
                warn!(
                    event_name = "recommendation.malformed_payload",
                    payload_chars = content.chars().count(),
                    "recommender payload was not a usable book object"
                );
                Ok(Vec::new())
            }
        }
    }
}

fn parse_book(content: &str) -> Option<BookRecord> {
    let payload: BookPayload = serde_json::from_str(content.trim()).ok()?;
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return None;
    }
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{title}\u{1f}{}", payload.author).as_bytes());

    Some(BookRecord {
        id: BookId(format!("llm-{id}")),
        title,
        author: payload.author,
        publisher: payload.publisher,
        pub_year: payload.pub_year,
        excerpt: payload.excerpt,
        cover_image: None,
    })
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, Option<bool>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct BookPayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    publisher: String,
    #[serde(default, rename = "pubYear", alias = "pub_year")]
    pub_year: String,
    #[serde(default)]
    excerpt: String,
}
