use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use shelfmate_agent::providers::ProviderSet;
use shelfmate_agent::runtime::ConversationOrchestrator;
use shelfmate_agent::session::ConversationSession;
use shelfmate_cli::commands::{chat, config, doctor, migrate};
use shelfmate_core::config::AppConfig;
use shelfmate_core::domain::mode::Mode;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SHELFMATE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_openai_without_key() {
    with_env(&[("SHELFMATE_LLM_PROVIDER", "openai")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_after_migrating_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("shelf.db").display());

    with_env(&[("SHELFMATE_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1, "fresh database has pending migrations");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "doctor output: {}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, vec!["config_validation", "provider_selection", "database_connectivity"]);
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("SHELFMATE_CONVERSATION_POLICY", "whenever")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("[fail] config_validation"));
        assert!(result.output.contains("[skip] database_connectivity"));
    });
}

#[test]
fn config_redacts_api_key_and_attributes_env_sources() {
    with_env(
        &[
            ("SHELFMATE_LLM_PROVIDER", "openai"),
            ("SHELFMATE_LLM_API_KEY", "sk-very-secret-value"),
            ("SHELFMATE_SERVER_PORT", "8088"),
        ],
        || {
            let output = config::run();
            assert!(!output.contains("very-secret"), "secret leaked: {output}");
            assert!(output.contains("- llm.api_key = sk-*** (source: env (SHELFMATE_LLM_API_KEY))"));
            assert!(output.contains("- server.port = 8088 (source: env (SHELFMATE_SERVER_PORT))"));
            assert!(output.contains("- conversation.policy = consent (source: default)"));
        },
    );
}

#[test]
fn chat_rejects_unknown_mode() {
    let result = chat::run("toddler");
    assert_eq!(result.exit_code, 2);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_mode");
}

#[tokio::test]
async fn offline_chat_loop_reaches_a_recommendation() {
    let orchestrator =
        ConversationOrchestrator::from_config(&AppConfig::default(), ProviderSet::offline());
    let mut session = ConversationSession::open(Mode::Adult, None);
    let input = "요즘 너무 힘들어요\n\n계속 지쳐요\n네\n/quit\n이 줄은 읽지 않아요\n";
    let mut output = Vec::new();

    let summary = chat::converse(&orchestrator, &mut session, input.as_bytes(), &mut output)
        .await
        .expect("conversation");

    assert_eq!(summary.turns, 3);
    assert_eq!(summary.recommendations, 1);
    let transcript = String::from_utf8(output).expect("utf8 transcript");
    assert!(transcript.starts_with(session.greeting()));
    assert_eq!(session.state().turn_count(), 3);
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHELFMATE_DATABASE_URL",
        "SHELFMATE_DATABASE_MAX_CONNECTIONS",
        "SHELFMATE_DATABASE_TIMEOUT_SECS",
        "SHELFMATE_LLM_PROVIDER",
        "SHELFMATE_LLM_API_KEY",
        "OPENAI_API_KEY",
        "SHELFMATE_LLM_BASE_URL",
        "SHELFMATE_LLM_MODEL",
        "SHELFMATE_LLM_TIMEOUT_SECS",
        "SHELFMATE_LLM_MAX_RETRIES",
        "SHELFMATE_MODERATION_PROVIDER",
        "SHELFMATE_CONVERSATION_POLICY",
        "SHELFMATE_SERVER_BIND_ADDRESS",
        "SHELFMATE_SERVER_PORT",
        "SHELFMATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SHELFMATE_SERVER_MAX_SESSIONS",
        "SHELFMATE_SERVER_SESSION_IDLE_SECS",
        "SHELFMATE_LOGGING_LEVEL",
        "SHELFMATE_LOGGING_FORMAT",
        "SHELFMATE_LOG_LEVEL",
        "SHELFMATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
