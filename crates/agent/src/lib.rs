//! Conversation runtime for shelfmate.
//!
//! Each user turn flows through `ConversationOrchestrator::respond`:
//! 1. The input goes through the `SafetyGate` (`guardrails`), which fails closed.
//! 2. A topic is classified (`classifier`) and the `RecommendationTrigger`
//!    decides between asking consent, presenting a book, or plain conversation.
//! 3. Replies come from the generative backend (`llm`) or from the
//!    `ResponseTemplateBank` when running offline.
//! 4. The reply is gated again before it is returned.
//!
//! External capabilities are traits (`LlmClient`, `ModerationClient`,
//! `BookSearch`, `RecommendationRecorder`); `providers` holds the HTTP-backed
//! implementations and `ProviderSet` picks them from configuration.

pub mod books;
pub mod classifier;
pub mod guardrails;
pub mod llm;
pub mod moderation;
pub mod personas;
pub mod providers;
pub mod recorder;
pub mod runtime;
pub mod session;
pub mod templates;
pub mod trigger;

pub use books::{BookQuery, BookSearch, StaticCatalog};
pub use classifier::TopicClassifier;
pub use guardrails::SafetyGate;
pub use llm::{ChatMessage, ChatRole, CompletionRequest, LlmClient};
pub use moderation::{KeywordModerator, ModerationClient};
pub use providers::{ProviderError, ProviderSet};
pub use recorder::RecommendationRecorder;
pub use runtime::{AgentTurnResult, ConversationOrchestrator, OrchestratorSettings, TurnOutcome};
pub use session::ConversationSession;
pub use templates::ResponseTemplateBank;
pub use trigger::RecommendationTrigger;
