pub mod chat;
pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;

/// Exit code plus what gets printed. Non-interactive commands print one JSON line.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    command: &'a str,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let report = Report { command, status: Status::Ok, error_class: None, message: &message };
        Self { exit_code: 0, output: render(&report) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let message = message.into();
        let report = Report {
            command,
            status: Status::Error,
            error_class: Some(error_class),
            message: &message,
        };
        Self { exit_code: exit_code.max(1), output: render(&report) }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

fn render(report: &Report<'_>) -> String {
    serde_json::to_string(report).unwrap_or_else(|error| {
        serde_json::json!({
            "command": report.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}
