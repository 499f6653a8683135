use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use shelfmate_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env: &'static [&'static str], value: impl ToString) -> Self {
        Self { key, env, value: value.to_string() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let base_url = config.llm.base_url.clone().unwrap_or_else(|| "<provider default>".to_string());

    vec![
        Field::new("database.url", &["SHELFMATE_DATABASE_URL"], &config.database.url),
        Field::new(
            "database.max_connections",
            &["SHELFMATE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections,
        ),
        Field::new(
            "database.timeout_secs",
            &["SHELFMATE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs,
        ),
        Field::new("llm.provider", &["SHELFMATE_LLM_PROVIDER"], config.llm.provider.as_str()),
        Field::new("llm.api_key", &["SHELFMATE_LLM_API_KEY", "OPENAI_API_KEY"], api_key),
        Field::new("llm.base_url", &["SHELFMATE_LLM_BASE_URL"], base_url),
        Field::new("llm.model", &["SHELFMATE_LLM_MODEL"], &config.llm.model),
        Field::new(
            "llm.recommendation_model",
            &["SHELFMATE_LLM_RECOMMENDATION_MODEL"],
            &config.llm.recommendation_model,
        ),
        Field::new("llm.temperature", &["SHELFMATE_LLM_TEMPERATURE"], config.llm.temperature),
        Field::new(
            "llm.recommendation_temperature",
            &["SHELFMATE_LLM_RECOMMENDATION_TEMPERATURE"],
            config.llm.recommendation_temperature,
        ),
        Field::new("llm.timeout_secs", &["SHELFMATE_LLM_TIMEOUT_SECS"], config.llm.timeout_secs),
        Field::new("llm.max_retries", &["SHELFMATE_LLM_MAX_RETRIES"], config.llm.max_retries),
        Field::new(
            "moderation.provider",
            &["SHELFMATE_MODERATION_PROVIDER"],
            config.moderation.provider.as_str(),
        ),
        Field::new(
            "moderation.timeout_secs",
            &["SHELFMATE_MODERATION_TIMEOUT_SECS"],
            config.moderation.timeout_secs,
        ),
        Field::new(
            "conversation.policy",
            &["SHELFMATE_CONVERSATION_POLICY"],
            config.conversation.policy.as_str(),
        ),
        Field::new(
            "conversation.consent_turn_threshold",
            &["SHELFMATE_CONVERSATION_CONSENT_TURN_THRESHOLD"],
            config.conversation.consent_turn_threshold,
        ),
        Field::new(
            "conversation.fixed_recommendation_turn",
            &["SHELFMATE_CONVERSATION_FIXED_RECOMMENDATION_TURN"],
            config.conversation.fixed_recommendation_turn,
        ),
        Field::new(
            "conversation.cooldown_turns",
            &["SHELFMATE_CONVERSATION_COOLDOWN_TURNS"],
            config.conversation.cooldown_turns,
        ),
        Field::new(
            "conversation.max_excluded_titles",
            &["SHELFMATE_CONVERSATION_MAX_EXCLUDED_TITLES"],
            config.conversation.max_excluded_titles,
        ),
        Field::new(
            "server.bind_address",
            &["SHELFMATE_SERVER_BIND_ADDRESS"],
            &config.server.bind_address,
        ),
        Field::new("server.port", &["SHELFMATE_SERVER_PORT"], config.server.port),
        Field::new(
            "server.graceful_shutdown_secs",
            &["SHELFMATE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs,
        ),
        Field::new(
            "server.max_sessions",
            &["SHELFMATE_SERVER_MAX_SESSIONS"],
            config.server.max_sessions,
        ),
        Field::new(
            "server.session_idle_secs",
            &["SHELFMATE_SERVER_SESSION_IDLE_SECS"],
            config.server.session_idle_secs,
        ),
        Field::new(
            "logging.level",
            &["SHELFMATE_LOGGING_LEVEL", "SHELFMATE_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["SHELFMATE_LOGGING_FORMAT", "SHELFMATE_LOG_FORMAT"],
            config.logging.format.as_str(),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_hit = env_keys
        .iter()
        .find(|key| env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false));
    if let Some(env_key) = env_hit {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(doc: &Value, key_path: &str) -> bool {
    let mut current = doc;
    for segment in key_path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

/// Keeps a recognisable prefix (`sk-`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
