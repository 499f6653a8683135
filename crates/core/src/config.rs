use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub moderation: ModerationConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub recommendation_model: String,
    pub temperature: f32,
    pub recommendation_temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub provider: ModerationProvider,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub policy: RecommendationPolicy,
    pub consent_turn_threshold: u32,
    pub fixed_recommendation_turn: u32,
    pub cooldown_turns: u32,
    pub max_excluded_titles: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Open conversations kept in memory; the least recently used is evicted beyond this.
    pub max_sessions: usize,
    /// Conversations untouched for longer than this are dropped.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// `Offline` means no live generative backend: replies come from the template bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Offline,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationProvider {
    Offline,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPolicy {
    /// Ask permission first, recommend only on an affirmative answer.
    Consent,
    /// Recommend unconditionally on one fixed user turn.
    FixedTurn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub moderation_provider: Option<ModerationProvider>,
    pub conversation_policy: Option<RecommendationPolicy>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://shelfmate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Offline,
                api_key: None,
                base_url: None,
                model: "gpt-3.5-turbo".to_string(),
                recommendation_model: "gpt-3.5-turbo-1106".to_string(),
                temperature: 0.7,
                recommendation_temperature: 0.9,
                timeout_secs: 30,
                max_retries: 2,
            },
            moderation: ModerationConfig { provider: ModerationProvider::Offline, timeout_secs: 10 },
            conversation: ConversationConfig {
                policy: RecommendationPolicy::Consent,
                consent_turn_threshold: 2,
                fixed_recommendation_turn: 3,
                cooldown_turns: 3,
                max_excluded_titles: 5,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3001,
                graceful_shutdown_secs: 15,
                max_sessions: 10_000,
                session_idle_secs: 1800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl ModerationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::OpenAi => "openai",
        }
    }
}

impl RecommendationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::FixedTurn => "fixed_turn",
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" | "mock" => Ok(Self::Offline),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected offline|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for ModerationProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported moderation provider `{other}` (expected offline|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for RecommendationPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consent" => Ok(Self::Consent),
            "fixed_turn" | "fixed-turn" => Ok(Self::FixedTurn),
            other => Err(ConfigError::Validation(format!(
                "unsupported recommendation policy `{other}` (expected consent|fixed_turn)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("shelfmate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            overlay(&mut self.database.url, database.url);
            overlay(&mut self.database.max_connections, database.max_connections);
            overlay(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            overlay(&mut self.llm.provider, llm.provider);
            if let Some(key) = llm.api_key {
                self.llm.api_key = Some(secret_value(key));
            }
            if llm.base_url.is_some() {
                self.llm.base_url = llm.base_url;
            }
            overlay(&mut self.llm.model, llm.model);
            overlay(&mut self.llm.recommendation_model, llm.recommendation_model);
            overlay(&mut self.llm.temperature, llm.temperature);
            overlay(&mut self.llm.recommendation_temperature, llm.recommendation_temperature);
            overlay(&mut self.llm.timeout_secs, llm.timeout_secs);
            overlay(&mut self.llm.max_retries, llm.max_retries);
        }

        if let Some(moderation) = patch.moderation {
            overlay(&mut self.moderation.provider, moderation.provider);
            overlay(&mut self.moderation.timeout_secs, moderation.timeout_secs);
        }

        if let Some(conversation) = patch.conversation {
            let target = &mut self.conversation;
            overlay(&mut target.policy, conversation.policy);
            overlay(&mut target.consent_turn_threshold, conversation.consent_turn_threshold);
            overlay(&mut target.fixed_recommendation_turn, conversation.fixed_recommendation_turn);
            overlay(&mut target.cooldown_turns, conversation.cooldown_turns);
            overlay(&mut target.max_excluded_titles, conversation.max_excluded_titles);
        }

        if let Some(server) = patch.server {
            overlay(&mut self.server.bind_address, server.bind_address);
            overlay(&mut self.server.port, server.port);
            overlay(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
            overlay(&mut self.server.max_sessions, server.max_sessions);
            overlay(&mut self.server.session_idle_secs, server.session_idle_secs);
        }

        if let Some(logging) = patch.logging {
            overlay(&mut self.logging.level, logging.level);
            overlay(&mut self.logging.format, logging.format);
        }
    }

    /// `SHELFMATE_<SECTION>_<FIELD>` variables win over the file.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        overlay(&mut self.database.url, read_env("SHELFMATE_DATABASE_URL"));
        env_number(&mut self.database.max_connections, "SHELFMATE_DATABASE_MAX_CONNECTIONS")?;
        env_number(&mut self.database.timeout_secs, "SHELFMATE_DATABASE_TIMEOUT_SECS")?;

        env_choice(&mut self.llm.provider, "SHELFMATE_LLM_PROVIDER")?;
        if let Some(key) = read_env("SHELFMATE_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY")) {
            self.llm.api_key = Some(secret_value(key));
        }
        if let Some(base_url) = read_env("SHELFMATE_LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        overlay(&mut self.llm.model, read_env("SHELFMATE_LLM_MODEL"));
        overlay(
            &mut self.llm.recommendation_model,
            read_env("SHELFMATE_LLM_RECOMMENDATION_MODEL"),
        );
        env_number(&mut self.llm.temperature, "SHELFMATE_LLM_TEMPERATURE")?;
        env_number(
            &mut self.llm.recommendation_temperature,
            "SHELFMATE_LLM_RECOMMENDATION_TEMPERATURE",
        )?;
        env_number(&mut self.llm.timeout_secs, "SHELFMATE_LLM_TIMEOUT_SECS")?;
        env_number(&mut self.llm.max_retries, "SHELFMATE_LLM_MAX_RETRIES")?;

        env_choice(&mut self.moderation.provider, "SHELFMATE_MODERATION_PROVIDER")?;
        env_number(&mut self.moderation.timeout_secs, "SHELFMATE_MODERATION_TIMEOUT_SECS")?;

        let conversation = &mut self.conversation;
        env_choice(&mut conversation.policy, "SHELFMATE_CONVERSATION_POLICY")?;
        env_number(
            &mut conversation.consent_turn_threshold,
            "SHELFMATE_CONVERSATION_CONSENT_TURN_THRESHOLD",
        )?;
        env_number(
            &mut conversation.fixed_recommendation_turn,
            "SHELFMATE_CONVERSATION_FIXED_RECOMMENDATION_TURN",
        )?;
        env_number(&mut conversation.cooldown_turns, "SHELFMATE_CONVERSATION_COOLDOWN_TURNS")?;
        env_number(
            &mut conversation.max_excluded_titles,
            "SHELFMATE_CONVERSATION_MAX_EXCLUDED_TITLES",
        )?;

        overlay(&mut self.server.bind_address, read_env("SHELFMATE_SERVER_BIND_ADDRESS"));
        env_number(&mut self.server.port, "SHELFMATE_SERVER_PORT")?;
        env_number(
            &mut self.server.graceful_shutdown_secs,
            "SHELFMATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        )?;
        env_number(&mut self.server.max_sessions, "SHELFMATE_SERVER_MAX_SESSIONS")?;
        env_number(&mut self.server.session_idle_secs, "SHELFMATE_SERVER_SESSION_IDLE_SECS")?;

        overlay(
            &mut self.logging.level,
            read_env("SHELFMATE_LOGGING_LEVEL").or_else(|| read_env("SHELFMATE_LOG_LEVEL")),
        );
        if let Some(format) =
            read_env("SHELFMATE_LOGGING_FORMAT").or_else(|| read_env("SHELFMATE_LOG_FORMAT"))
        {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        overlay(&mut self.database.url, overrides.database_url);
        overlay(&mut self.logging.level, overrides.log_level);
        overlay(&mut self.llm.provider, overrides.llm_provider);
        overlay(&mut self.llm.model, overrides.llm_model);
        if let Some(key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(key));
        }
        if overrides.llm_base_url.is_some() {
            self.llm.base_url = overrides.llm_base_url;
        }
        overlay(&mut self.moderation.provider, overrides.moderation_provider);
        overlay(&mut self.conversation.policy, overrides.conversation_policy);
        overlay(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_moderation(&self.moderation, &self.llm)?;
        validate_conversation(&self.conversation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `load` would read: the explicit path if it exists, else the first default location.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("shelfmate.toml"), PathBuf::from("config/shelfmate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    require(
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
        "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
    )?;
    require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
    require(
        (1..=300).contains(&database.timeout_secs),
        "database.timeout_secs must be in range 1..=300",
    )
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    require((1..=300).contains(&llm.timeout_secs), "llm.timeout_secs must be in range 1..=300")?;
    for (key, value) in [
        ("llm.temperature", llm.temperature),
        ("llm.recommendation_temperature", llm.recommendation_temperature),
    ] {
        require((0.0..=2.0).contains(&value), format!("{key} must be in range 0.0..=2.0"))?;
    }

    match llm.provider {
        LlmProvider::Offline => Ok(()),
        LlmProvider::OpenAi => {
            require(has_api_key(llm), "llm.api_key is required for the openai provider")
        }
        LlmProvider::Ollama => require(
            llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
            "llm.base_url is required for ollama provider",
        ),
    }
}

fn validate_moderation(moderation: &ModerationConfig, llm: &LlmConfig) -> Result<(), ConfigError> {
    require(
        (1..=60).contains(&moderation.timeout_secs),
        "moderation.timeout_secs must be in range 1..=60",
    )?;
    require(
        moderation.provider != ModerationProvider::OpenAi || has_api_key(llm),
        "llm.api_key is required when moderation.provider is openai",
    )
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    require(
        conversation.consent_turn_threshold > 0,
        "conversation.consent_turn_threshold must be greater than zero",
    )?;
    require(
        conversation.fixed_recommendation_turn > 0,
        "conversation.fixed_recommendation_turn must be greater than zero",
    )?;
    require(
        (1..=20).contains(&conversation.max_excluded_titles),
        "conversation.max_excluded_titles must be in range 1..=20",
    )
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    require(server.port > 0, "server.port must be greater than zero")?;
    require(
        server.graceful_shutdown_secs > 0,
        "server.graceful_shutdown_secs must be greater than zero",
    )?;
    require(server.max_sessions > 0, "server.max_sessions must be greater than zero")?;
    require(server.session_idle_secs > 0, "server.session_idle_secs must be greater than zero")
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    require(
        matches!(
            logging.level.trim().to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ),
        "logging.level must be one of trace|debug|info|warn|error",
    )
}

fn has_api_key(llm: &LlmConfig) -> bool {
    llm.api_key.as_ref().map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn env_number<T: std::str::FromStr>(slot: &mut T, key: &str) -> Result<(), ConfigError> {
    if let Some(value) = read_env(key) {
        *slot = value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.clone(),
        })?;
    }
    Ok(())
}

fn env_choice<T>(slot: &mut T, key: &str) -> Result<(), ConfigError>
where
    T: std::str::FromStr<Err = ConfigError>,
{
    if let Some(value) = read_env(key) {
        *slot = value.parse()?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    moderation: Option<ModerationPatch>,
    conversation: Option<ConversationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    recommendation_model: Option<String>,
    temperature: Option<f32>,
    recommendation_temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ModerationPatch {
    provider: Option<ModerationProvider>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    policy: Option<RecommendationPolicy>,
    consent_turn_threshold: Option<u32>,
    fixed_recommendation_turn: Option<u32>,
    cooldown_turns: Option<u32>,
    max_excluded_titles: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    max_sessions: Option<usize>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        RecommendationPolicy,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_run_fully_offline() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["OPENAI_API_KEY", "SHELFMATE_LLM_API_KEY"]);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Offline, "default provider is offline")?;
        ensure(
            config.conversation.policy == RecommendationPolicy::Consent,
            "default policy asks for consent",
        )?;
        ensure(config.conversation.consent_turn_threshold == 2, "default threshold is two turns")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SHELFMATE_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shelfmate.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_SHELFMATE_KEY}"

[conversation]
policy = "fixed_turn"
fixed_recommendation_turn = 4
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(
                config.conversation.policy == RecommendationPolicy::FixedTurn,
                "policy should come from the file",
            )?;
            ensure(
                config.conversation.fixed_recommendation_turn == 4,
                "fixed turn should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SHELFMATE_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHELFMATE_LOG_LEVEL", "warn");
        env::set_var("SHELFMATE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SHELFMATE_LOG_LEVEL", "SHELFMATE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHELFMATE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SHELFMATE_CONVERSATION_COOLDOWN_TURNS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shelfmate.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[conversation]
cooldown_turns = 1

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.conversation.cooldown_turns == 5,
                "env cooldown should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["SHELFMATE_DATABASE_URL", "SHELFMATE_CONVERSATION_COOLDOWN_TURNS"]);
        result
    }

    #[test]
    fn openai_provider_without_key_fails_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["OPENAI_API_KEY", "SHELFMATE_LLM_API_KEY"]);

        env::set_var("SHELFMATE_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["SHELFMATE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHELFMATE_LLM_TEMPERATURE", "warm");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid override error".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "SHELFMATE_LLM_TEMPERATURE"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["SHELFMATE_LLM_TEMPERATURE"]);
        result
    }

    #[test]
    fn session_limits_follow_env_and_reject_zero() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHELFMATE_SERVER_MAX_SESSIONS", "250");
        env::set_var("SHELFMATE_SERVER_SESSION_IDLE_SECS", "90");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.server.max_sessions == 250, "max_sessions comes from env")?;
            ensure(config.server.session_idle_secs == 90, "idle ttl comes from env")?;

            env::set_var("SHELFMATE_SERVER_MAX_SESSIONS", "0");
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("server.max_sessions")
            );
            ensure(rejected, "a zero session cap is rejected")
        })();

        clear_vars(&["SHELFMATE_SERVER_MAX_SESSIONS", "SHELFMATE_SERVER_SESSION_IDLE_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHELFMATE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["SHELFMATE_LLM_API_KEY"]);
        result
    }
}
