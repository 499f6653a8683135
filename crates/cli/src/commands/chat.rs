use anyhow::Context;
use shelfmate_agent::providers::ProviderSet;
use shelfmate_agent::runtime::ConversationOrchestrator;
use shelfmate_agent::session::ConversationSession;
use shelfmate_core::config::{AppConfig, LoadOptions};
use shelfmate_core::domain::mode::Mode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::CommandResult;

/// Lines that end the conversation.
pub const EXIT_COMMANDS: &[&str] = &["/quit", "/exit", "종료"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub turns: u32,
    pub recommendations: u32,
}

pub fn run(mode: &str) -> CommandResult {
    let mode = match mode.parse::<Mode>() {
        Ok(mode) => mode,
        Err(error) => return CommandResult::failure("chat", "invalid_mode", error.to_string(), 2),
    };
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let providers =
            ProviderSet::from_config(&config).context("failed to set up conversation providers")?;
        let orchestrator = ConversationOrchestrator::from_config(&config, providers);
        let mut session = ConversationSession::open(mode, None);
        converse(
            &orchestrator,
            &mut session,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await
    });

    match result {
        Ok(summary) => CommandResult::success(
            "chat",
            format!(
                "conversation ended after {} turn(s) with {} recommendation(s)",
                summary.turns, summary.recommendations
            ),
        ),
        Err(error) => CommandResult::failure("chat", "conversation", format!("{error:#}"), 4),
    }
}

/// Reads one user message per line until EOF or an exit command.
pub async fn converse<R, W>(
    orchestrator: &ConversationOrchestrator,
    session: &mut ConversationSession,
    input: R,
    mut output: W,
) -> anyhow::Result<ChatSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ChatSummary::default();
    let mut lines = input.lines();

    output.write_all(format!("{}\n", session.greeting()).as_bytes()).await?;
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&text) {
            break;
        }

        let correlation_id = format!("cli-{}-{}", session.id(), summary.turns + 1);
        let result = orchestrator
            .respond(session, text, &correlation_id)
            .await
            .with_context(|| format!("turn {} failed", summary.turns + 1))?;
        summary.turns += 1;

        output.write_all(format!("{}\n", result.reply_text).as_bytes()).await?;
        if let Some(book) = &result.recommended_book {
            summary.recommendations += 1;
            let line = format!(
                "  [{} / {} / {} {}]\n",
                book.title, book.author, book.publisher, book.pub_year
            );
            output.write_all(line.as_bytes()).await?;
        }
    }

    output.flush().await?;
    Ok(summary)
}
