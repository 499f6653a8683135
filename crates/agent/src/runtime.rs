use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use shelfmate_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use shelfmate_core::config::AppConfig;
use shelfmate_core::domain::book::{BookRecord, RecommendationSummary};
use shelfmate_core::domain::message::Message;
use shelfmate_core::domain::moderation::ModerationVerdict;
use shelfmate_core::domain::session::RecommendationPhase;
use shelfmate_core::domain::topic::Topic;
use shelfmate_core::errors::{ApplicationError, DomainError};

use crate::books::{BookQuery, BookSearch};
use crate::classifier::TopicClassifier;
use crate::guardrails::SafetyGate;
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::personas;
use crate::providers::{with_timeout, ProviderSet};
use crate::recorder::RecommendationRecorder;
use crate::session::ConversationSession;
use crate::templates::ResponseTemplateBank;
use crate::trigger::{
    consent_question, not_found_text, presentation_text, RecommendationTrigger, TriggerDecision,
    TriggerSettings, FETCH_FAILED_TEXT,
};

pub const GENERATION_FAILED_TEXT: &str = "죄송합니다, 대화 응답을 생성하는 중에 오류가 발생했어요.";

const LOG_PREVIEW_CHARS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Conversation,
    SafetyBlocked,
    ConsentRequested,
    Recommended,
    RecommendationNotFound,
    RecommendationFailed,
    GenerationFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurnResult {
    pub reply_text: String,
    pub recommended_book: Option<BookRecord>,
    pub pending_topic: Option<Topic>,
    pub outcome: TurnOutcome,
    pub phase: RecommendationPhase,
}

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub trigger: TriggerSettings,
    pub chat_temperature: f32,
    pub llm_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            trigger: TriggerSettings::default(),
            chat_temperature: 0.7,
            llm_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(30),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
        Self {
            trigger: TriggerSettings::from(&config.conversation),
            chat_temperature: config.llm.temperature,
            llm_timeout,
            search_timeout: llm_timeout,
        }
    }
}

/// What to do when a recommendation fetch yields nothing usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MissPolicy {
    Apologize,
    FallThrough,
}

/// Per-turn entry point. Shared across sessions; all mutable conversation state lives
/// in the `ConversationSession` passed to `respond`.
pub struct ConversationOrchestrator {
    classifier: TopicClassifier,
    safety: SafetyGate,
    trigger: RecommendationTrigger,
    templates: ResponseTemplateBank,
    books: Arc<dyn BookSearch>,
    llm: Option<Arc<dyn LlmClient>>,
    recorder: Option<Arc<dyn RecommendationRecorder>>,
    audit: Arc<dyn AuditSink>,
    rng: Mutex<StdRng>,
    settings: OrchestratorSettings,
}

impl ConversationOrchestrator {
    pub fn new(
        safety: SafetyGate,
        books: Arc<dyn BookSearch>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            classifier: TopicClassifier,
            safety,
            trigger: RecommendationTrigger::new(settings.trigger.clone()),
            templates: ResponseTemplateBank::builtin(),
            books,
            llm: None,
            recorder: None,
            audit: Arc::new(NoopAuditSink),
            rng: Mutex::new(StdRng::from_entropy()),
            settings,
        }
    }

    pub fn from_config(config: &AppConfig, providers: ProviderSet) -> Self {
        let safety = SafetyGate::new(
            providers.moderation,
            Duration::from_secs(config.moderation.timeout_secs),
        );
        let orchestrator =
            Self::new(safety, providers.books, OrchestratorSettings::from_config(config));
        match providers.llm {
            Some(llm) => orchestrator.with_llm(llm),
            None => orchestrator,
        }
    }

    /// Without an LLM, conversational replies come from the template bank.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RecommendationRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_templates(mut self, templates: ResponseTemplateBank) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn safety(&self) -> &SafetyGate {
        &self.safety
    }

    pub fn uses_live_generation(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn respond(
        &self,
        session: &mut ConversationSession,
        text: &str,
        correlation_id: &str,
    ) -> Result<AgentTurnResult, ApplicationError> {
        if text.trim().is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }

        session.history_mut().push(Message::user(text));
        let turn = session.state_mut().record_user_turn();
        let context = AuditContext::new(Some(session.id().clone()), correlation_id, "orchestrator");

        info!(
            event_name = "conversation.turn.started",
            session_id = %session.id(),
            correlation_id,
            turn,
            mode = session.mode().as_str(),
            text_preview = %preview(text),
            "conversation turn started"
        );

        if let Some(verdict) = self.safety.flagged(text).await {
            warn!(
                event_name = "safety.input_flagged",
                session_id = %session.id(),
                correlation_id,
                categories = ?verdict.flagged_categories(),
                "user message blocked by safety gate"
            );
            self.emit_safety(&context, "safety.input_flagged", &verdict);
            let reply = SafetyGate::to_safe_response(&verdict).to_string();
            return Ok(finish(session, reply, None, TurnOutcome::SafetyBlocked));
        }

        let topic = self.classifier.classify(text);
        let decision = self.trigger.decide(session.state(), text, topic);

        let result = match decision {
            TriggerDecision::ResolveConsent { topic: pending, accepted } => {
                self.trigger.resolve(session.state_mut());
                self.audit.emit(
                    AuditEvent::new(
                        &context,
                        "recommendation.consent_resolved",
                        AuditCategory::Recommendation,
                        if accepted { AuditOutcome::Success } else { AuditOutcome::Rejected },
                    )
                    .with_metadata("topic", pending.as_str()),
                );
                if accepted {
                    let exclude = self.trigger.exclusions_for(session.state(), pending);
                    self.present(session, pending, exclude, MissPolicy::Apologize, &context).await
                } else {
                    // a decline is answered as ordinary talk about what was just said
                    self.converse(session, topic, &context).await
                }
            }
            TriggerDecision::Retry { topic, exclude } => {
                self.present(session, topic, exclude, MissPolicy::Apologize, &context).await
            }
            TriggerDecision::AskConsent { topic } => self.ask(session, topic, &context).await?,
            TriggerDecision::FetchUnconditionally { topic } => {
                self.present(session, topic, Vec::new(), MissPolicy::FallThrough, &context).await
            }
            TriggerDecision::Converse => self.converse(session, topic, &context).await,
        };

        Ok(result)
    }

    async fn ask(
        &self,
        session: &mut ConversationSession,
        topic: Topic,
        context: &AuditContext,
    ) -> Result<AgentTurnResult, ApplicationError> {
        let question = consent_question(session.mode(), topic);
        if let Some(verdict) = self.safety.flagged(&question).await {
            return Ok(self.blocked_output(session, &verdict, context));
        }

        self.trigger.ask(session.state_mut(), topic)?;
        info!(
            event_name = "recommendation.consent_requested",
            session_id = %session.id(),
            correlation_id = %context.correlation_id,
            topic = topic.as_str(),
            "asking permission to recommend a book"
        );
        self.audit.emit(
            AuditEvent::new(
                context,
                "recommendation.consent_requested",
                AuditCategory::Recommendation,
                AuditOutcome::Success,
            )
            .with_metadata("topic", topic.as_str()),
        );

        Ok(finish(session, question, None, TurnOutcome::ConsentRequested))
    }

    async fn present(
        &self,
        session: &mut ConversationSession,
        topic: Topic,
        exclude: Vec<String>,
        on_miss: MissPolicy,
        context: &AuditContext,
    ) -> AgentTurnResult {
        let query = BookQuery::for_topic(topic).with_audience(session.mode()).excluding(&exclude);
        let search = with_timeout(self.settings.search_timeout, self.books.search(&query)).await;

        let candidates = match search {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "recommendation.fetch_failed",
                    session_id = %session.id(),
                    correlation_id = %context.correlation_id,
                    topic = topic.as_str(),
                    error = %error,
                    "book search failed"
                );
                return match on_miss {
                    MissPolicy::FallThrough => self.converse(session, topic, context).await,
                    MissPolicy::Apologize => {
                        finish(
                            session,
                            FETCH_FAILED_TEXT.to_string(),
                            None,
                            TurnOutcome::RecommendationFailed,
                        )
                    }
                };
            }
        };

        let Some(book) = candidates.into_iter().find(|book| !query.is_excluded(&book.title)) else {
            info!(
                event_name = "recommendation.not_found",
                session_id = %session.id(),
                correlation_id = %context.correlation_id,
                topic = topic.as_str(),
                excluded = exclude.len(),
                "book search returned no usable candidate"
            );
            return match on_miss {
                MissPolicy::FallThrough => self.converse(session, topic, context).await,
                MissPolicy::Apologize => {
                    finish(
                        session,
                        not_found_text(topic),
                        None,
                        TurnOutcome::RecommendationNotFound,
                    )
                }
            };
        };

        let reply = presentation_text(&book.title);
        if let Some(verdict) = self.safety.flagged(&reply).await {
            return self.blocked_output(session, &verdict, context);
        }

        self.trigger.presented(session.state_mut(), topic, &book.title);
        info!(
            event_name = "recommendation.presented",
            session_id = %session.id(),
            correlation_id = %context.correlation_id,
            topic = topic.as_str(),
            book_id = %book.id.0,
            "book recommendation presented"
        );
        self.audit.emit(
            AuditEvent::new(
                context,
                "recommendation.presented",
                AuditCategory::Recommendation,
                AuditOutcome::Success,
            )
            .with_metadata("topic", topic.as_str())
            .with_metadata("book_id", book.id.0.clone()),
        );
        self.record(session, topic, &book, context).await;

        let mut result = finish(session, reply, Some(book), TurnOutcome::Recommended);
        result.phase = RecommendationPhase::Presenting;
        result
    }

    async fn record(
        &self,
        session: &ConversationSession,
        topic: Topic,
        book: &BookRecord,
        context: &AuditContext,
    ) {
        let (Some(recorder), Some(user_id)) = (&self.recorder, session.user_id()) else {
            return;
        };

        let summary = RecommendationSummary {
            topic,
            user_concern: self.user_concern(session, topic),
            recommendation_reason: format!(
                "'{}' 주제로 이야기를 나누다가 도움이 될 것 같아 추천했어요.",
                topic.label()
            ),
        };

        if let Err(error) = recorder.record(user_id, book, &summary).await {
            warn!(
                event_name = "recommendation.record_failed",
                session_id = %session.id(),
                correlation_id = %context.correlation_id,
                error = %error,
                "could not add recommendation to bookshelf"
            );
            self.audit.emit(
                AuditEvent::new(
                    context,
                    "recommendation.record_failed",
                    AuditCategory::Persistence,
                    AuditOutcome::Failed,
                )
                .with_metadata("book_id", book.id.0.clone()),
            );
        }
    }

    /// Most recent user message that speaks to `topic`, else the latest user message.
    fn user_concern(&self, session: &ConversationSession, topic: Topic) -> String {
        let user_messages = || session.history().messages().iter().rev().filter(|m| m.is_user());
        user_messages()
            .find(|message| self.classifier.classify(&message.text) == topic)
            .or_else(|| user_messages().next())
            .map(|message| message.text.clone())
            .unwrap_or_default()
    }

    async fn converse(
        &self,
        session: &mut ConversationSession,
        topic: Topic,
        context: &AuditContext,
    ) -> AgentTurnResult {
        let reply = match &self.llm {
            Some(llm) => match self.generate(llm.as_ref(), session).await {
                Some(reply) => reply,
                None => {
                    return finish(
                        session,
                        GENERATION_FAILED_TEXT.to_string(),
                        None,
                        TurnOutcome::GenerationFailed,
                    );
                }
            },
            None => {
                let mut rng = match self.rng.lock() {
                    Ok(rng) => rng,
                    Err(poisoned) => poisoned.into_inner(),
                };
                self.templates.reply(session.mode(), topic, &mut *rng)
            }
        };

        if let Some(verdict) = self.safety.flagged(&reply).await {
            return self.blocked_output(session, &verdict, context);
        }

        finish(session, reply, None, TurnOutcome::Conversation)
    }

    async fn generate(&self, llm: &dyn LlmClient, session: &ConversationSession) -> Option<String> {
        let mut messages = vec![ChatMessage::system(personas::system_instruction(session.mode()))];
        messages.extend(session.history().messages().iter().map(ChatMessage::from));
        let request = CompletionRequest::new(messages, self.settings.chat_temperature);

        match with_timeout(self.settings.llm_timeout, llm.complete(&request)).await {
            Ok(reply) if !reply.trim().is_empty() => Some(reply.trim().to_string()),
            Ok(_) => {
                warn!(
                    event_name = "generation.failed",
                    session_id = %session.id(),
                    "generative backend returned an empty reply"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "generation.failed",
                    session_id = %session.id(),
                    error = %error,
                    "generative backend call failed"
                );
                None
            }
        }
    }

    fn blocked_output(
        &self,
        session: &mut ConversationSession,
        verdict: &ModerationVerdict,
        context: &AuditContext,
    ) -> AgentTurnResult {
        warn!(
            event_name = "safety.output_flagged",
            session_id = %session.id(),
            correlation_id = %context.correlation_id,
            categories = ?verdict.flagged_categories(),
            "agent reply replaced by safety response"
        );
        self.emit_safety(context, "safety.output_flagged", verdict);
        let reply = SafetyGate::to_safe_response(verdict).to_string();
        finish(session, reply, None, TurnOutcome::SafetyBlocked)
    }

    fn emit_safety(&self, context: &AuditContext, event_type: &str, verdict: &ModerationVerdict) {
        self.audit.emit(
            AuditEvent::new(context, event_type, AuditCategory::Safety, AuditOutcome::Rejected)
                .with_metadata("categories", verdict.flagged_categories().join(","))
                .with_metadata("self_harm", verdict.is_self_harm().to_string()),
        );
    }
}

fn finish(
    session: &mut ConversationSession,
    reply_text: String,
    recommended_book: Option<BookRecord>,
    outcome: TurnOutcome,
) -> AgentTurnResult {
    session.history_mut().push(Message::agent(reply_text.clone()));
    AgentTurnResult {
        reply_text,
        recommended_book,
        pending_topic: session.state().pending_recommendation_topic(),
        outcome,
        phase: session.state().phase(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use shelfmate_core::audit::InMemoryAuditSink;
    use shelfmate_core::config::RecommendationPolicy;
    use shelfmate_core::domain::book::BookRecord;
    use shelfmate_core::domain::mode::Mode;
    use shelfmate_core::domain::moderation::ModerationVerdict;
    use shelfmate_core::domain::session::RecommendationPhase;
    use shelfmate_core::domain::topic::Topic;
    use shelfmate_core::errors::{ApplicationError, DomainError};

    use super::{
        AgentTurnResult, ConversationOrchestrator, OrchestratorSettings, TurnOutcome,
        GENERATION_FAILED_TEXT,
    };
    use crate::books::{BookQuery, BookSearch, StaticCatalog};
    use crate::guardrails::{SafetyGate, GENERIC_SAFETY_MESSAGE, SELF_HARM_SUPPORT_MESSAGE};
    use crate::llm::{ChatRole, CompletionRequest, LlmClient};
    use crate::moderation::{KeywordModerator, ModerationClient};
    use crate::providers::ProviderError;
    use crate::recorder::InMemoryRecorder;
    use crate::session::ConversationSession;
    use crate::trigger::{TriggerSettings, FETCH_FAILED_TEXT};

    const TIRED: &str = "요즘 너무 힘들고 지쳐요";

    struct EmptySearch;

    #[async_trait]
    impl BookSearch for EmptySearch {
        async fn search(&self, _query: &BookQuery) -> Result<Vec<BookRecord>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl BookSearch for FailingSearch {
        async fn search(&self, _query: &BookQuery) -> Result<Vec<BookRecord>, ProviderError> {
            Err(ProviderError::Status { status: 502, message: "bad gateway".to_string() })
        }
    }

    struct BrokenModerator;

    #[async_trait]
    impl ModerationClient for BrokenModerator {
        async fn moderate(&self, _text: &str) -> Result<ModerationVerdict, ProviderError> {
            Err(ProviderError::Transport("unreachable".to_string()))
        }
    }

    /// Replies with a fixed script and keeps every request it saw.
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn with_replies(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self { replies: Mutex::new(replies), requests: Mutex::default() }
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            self.requests.lock().expect("requests lock").push(request.clone());
            let mut replies = self.replies.lock().expect("replies lock");
            if replies.is_empty() {
                Ok("이야기 더 들려주세요.".to_string())
            } else {
                replies.remove(0)
            }
        }
    }

    fn gate(client: Arc<dyn ModerationClient>) -> SafetyGate {
        SafetyGate::new(client, Duration::from_millis(200))
    }

    fn offline(books: Arc<dyn BookSearch>) -> ConversationOrchestrator {
        ConversationOrchestrator::new(gate(Arc::new(KeywordModerator)), books, OrchestratorSettings::default())
            .with_rng(StdRng::seed_from_u64(7))
    }

    async fn say(
        orchestrator: &ConversationOrchestrator,
        session: &mut ConversationSession,
        text: &str,
    ) -> AgentTurnResult {
        orchestrator.respond(session, text, "req-test").await.expect("turn should succeed")
    }

    #[tokio::test]
    async fn consent_flow_recommends_after_affirmative_answer() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Adult, None);

        let first = say(&orchestrator, &mut session, TIRED).await;
        assert_eq!(first.outcome, TurnOutcome::Conversation);
        assert!(first.recommended_book.is_none());

        let second = say(&orchestrator, &mut session, TIRED).await;
        assert_eq!(second.outcome, TurnOutcome::ConsentRequested);
        assert!(second.reply_text.ends_with("책을 한 권 추천드려도 괜찮을까요?"));
        assert_eq!(second.pending_topic, Some(Topic::Healing));
        assert_eq!(second.phase, RecommendationPhase::AwaitingConsent);

        let third = say(&orchestrator, &mut session, "네").await;
        assert_eq!(third.outcome, TurnOutcome::Recommended);
        assert_eq!(third.phase, RecommendationPhase::Presenting);
        assert_eq!(third.pending_topic, None);
        let book = third.recommended_book.expect("a book should be presented");
        assert!(third.reply_text.contains(&book.title));
        assert_eq!(session.state().pending_recommendation_topic(), None);
    }

    #[tokio::test]
    async fn declined_offer_returns_to_conversation_without_reasking() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Adult, None);
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;

        let answer = say(&orchestrator, &mut session, "아니요, 오늘도 힘들어요").await;
        assert_eq!(answer.outcome, TurnOutcome::Conversation);
        assert!(answer.recommended_book.is_none());
        assert_eq!(answer.pending_topic, None);
        assert_eq!(answer.phase, RecommendationPhase::Idle);

        let next = say(&orchestrator, &mut session, TIRED).await;
        assert_eq!(next.outcome, TurnOutcome::Conversation);
    }

    #[tokio::test]
    async fn declined_offer_replies_to_the_topic_of_the_answer() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Teen, None);
        say(&orchestrator, &mut session, TIRED).await;
        let offer = say(&orchestrator, &mut session, TIRED).await;
        assert_eq!(offer.pending_topic, Some(Topic::Healing));

        let answer = say(&orchestrator, &mut session, "아니요, 사실 친구랑 싸웠어요").await;
        assert_eq!(answer.outcome, TurnOutcome::Conversation);
        assert!(answer.reply_text.starts_with("그런 일이 있었으면 속상했겠다."), "{}", answer.reply_text);
        assert!(!answer.reply_text.contains("지쳤구나"));
    }

    #[tokio::test]
    async fn turn_count_matches_user_messages_including_blocked_ones() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Teen, None);
        let texts = ["안녕", "병신 같은 날", "밥 먹었어", "산책했어", "자살하고 싶어"];
        for text in texts {
            say(&orchestrator, &mut session, text).await;
        }

        assert_eq!(session.state().turn_count(), texts.len() as u32);
        assert_eq!(session.history().user_turns(), texts.len());
        // greeting plus one reply per user message
        assert_eq!(session.history().len(), 1 + texts.len() * 2);
    }

    #[tokio::test]
    async fn flagged_input_short_circuits_and_keeps_pending_question() {
        let audit = InMemoryAuditSink::default();
        let orchestrator = offline(Arc::new(StaticCatalog)).with_audit_sink(Arc::new(audit.clone()));
        let mut session = ConversationSession::open(Mode::Adult, None);
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;

        let blocked = say(&orchestrator, &mut session, "차라리 죽고 싶어요").await;
        assert_eq!(blocked.outcome, TurnOutcome::SafetyBlocked);
        assert_eq!(blocked.reply_text, SELF_HARM_SUPPORT_MESSAGE);
        assert_eq!(blocked.pending_topic, Some(Topic::Healing));
        assert!(audit.event_types().contains(&"safety.input_flagged".to_string()));

        let answer = say(&orchestrator, &mut session, "네").await;
        assert_eq!(answer.outcome, TurnOutcome::Recommended);
    }

    #[tokio::test]
    async fn unreachable_moderation_blocks_every_turn() {
        let orchestrator = ConversationOrchestrator::new(
            gate(Arc::new(BrokenModerator)),
            Arc::new(StaticCatalog),
            OrchestratorSettings::default(),
        );
        let mut session = ConversationSession::open(Mode::Adult, None);

        let result = say(&orchestrator, &mut session, "안녕하세요").await;
        assert_eq!(result.outcome, TurnOutcome::SafetyBlocked);
        assert_eq!(result.reply_text, GENERIC_SAFETY_MESSAGE);
    }

    #[tokio::test]
    async fn empty_search_apologizes_naming_the_topic() {
        let orchestrator = offline(Arc::new(EmptySearch));
        let mut session = ConversationSession::open(Mode::Adult, None);
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;

        let result = say(&orchestrator, &mut session, "네 부탁해요").await;
        assert_eq!(result.outcome, TurnOutcome::RecommendationNotFound);
        assert!(result.reply_text.contains(Topic::Healing.label()));
        assert!(result.recommended_book.is_none());
        assert_eq!(result.phase, RecommendationPhase::Idle);
    }

    #[tokio::test]
    async fn failing_search_apologizes_generically() {
        let orchestrator = offline(Arc::new(FailingSearch));
        let mut session = ConversationSession::open(Mode::Adult, None);
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;

        let result = say(&orchestrator, &mut session, "네").await;
        assert_eq!(result.outcome, TurnOutcome::RecommendationFailed);
        assert_eq!(result.reply_text, FETCH_FAILED_TEXT);
        assert_eq!(result.pending_topic, None);
    }

    #[tokio::test]
    async fn retry_request_excludes_the_previous_title() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Adult, None);
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;
        let first = say(&orchestrator, &mut session, "네").await.recommended_book.expect("first book");

        let retry = say(&orchestrator, &mut session, "다시 추천해줘").await;
        assert_eq!(retry.outcome, TurnOutcome::Recommended);
        let second = retry.recommended_book.expect("second book");
        assert_ne!(first.title, second.title);
        assert_eq!(session.state().shown_titles(), [first.title, second.title]);
    }

    #[tokio::test]
    async fn generation_failure_degrades_to_apology_and_recovers() {
        let llm = Arc::new(ScriptedLlm::with_replies(vec![
            Err(ProviderError::Timeout(Duration::from_secs(1))),
            Ok("“괜찮아요” 천천히 이야기해요.".to_string()),
        ]));
        let orchestrator = offline(Arc::new(StaticCatalog)).with_llm(llm.clone());
        let mut session = ConversationSession::open(Mode::Senior, None);

        let failed = say(&orchestrator, &mut session, "오늘 날씨가 좋네").await;
        assert_eq!(failed.outcome, TurnOutcome::GenerationFailed);
        assert_eq!(failed.reply_text, GENERATION_FAILED_TEXT);

        let recovered = say(&orchestrator, &mut session, "산책을 다녀왔어").await;
        assert_eq!(recovered.outcome, TurnOutcome::Conversation);
        assert_eq!(recovered.reply_text, "“괜찮아요” 천천히 이야기해요.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let last = &requests[1];
        assert_eq!(last.messages[0].role, ChatRole::System);
        assert!(last.messages[0].content.contains("어르신"));
        assert_eq!(last.messages[1].role, ChatRole::Assistant);
        assert_eq!(last.messages.last().map(|m| m.role), Some(ChatRole::User));
        assert!((last.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn unsafe_generated_reply_is_replaced() {
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("병신 같은 소리네".to_string())]));
        let orchestrator = offline(Arc::new(StaticCatalog)).with_llm(llm);
        let mut session = ConversationSession::open(Mode::Adult, None);

        let result = say(&orchestrator, &mut session, "무슨 말을 해야 할지 모르겠어").await;
        assert_eq!(result.outcome, TurnOutcome::SafetyBlocked);
        assert_eq!(result.reply_text, GENERIC_SAFETY_MESSAGE);
        assert_eq!(session.history().last().map(|m| m.text.as_str()), Some(GENERIC_SAFETY_MESSAGE));
    }

    #[tokio::test]
    async fn presentation_is_recorded_for_signed_in_users() {
        let recorder = InMemoryRecorder::default();
        let orchestrator = offline(Arc::new(StaticCatalog)).with_recorder(Arc::new(recorder.clone()));
        let mut session = ConversationSession::open(Mode::Adult, Some("user-1".to_string()));
        say(&orchestrator, &mut session, TIRED).await;
        say(&orchestrator, &mut session, TIRED).await;
        let book = say(&orchestrator, &mut session, "네").await.recommended_book.expect("book");

        let logs = recorder.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id, "user-1");
        assert_eq!(logs[0].book.id, book.id);
        assert_eq!(logs[0].summary.topic, Topic::Healing);
        assert_eq!(logs[0].summary.user_concern, TIRED);
    }

    #[tokio::test]
    async fn fixed_turn_policy_recommends_on_third_turn_or_keeps_talking() {
        let settings = OrchestratorSettings {
            trigger: TriggerSettings { policy: RecommendationPolicy::FixedTurn, ..TriggerSettings::default() },
            ..OrchestratorSettings::default()
        };
        let with_books = ConversationOrchestrator::new(
            gate(Arc::new(KeywordModerator)),
            Arc::new(StaticCatalog),
            settings.clone(),
        );
        let mut session = ConversationSession::open(Mode::Adult, None);
        for text in ["안녕하세요", TIRED] {
            assert_eq!(say(&with_books, &mut session, text).await.outcome, TurnOutcome::Conversation);
        }
        let third = say(&with_books, &mut session, TIRED).await;
        assert_eq!(third.outcome, TurnOutcome::Recommended);

        let without_books =
            ConversationOrchestrator::new(gate(Arc::new(KeywordModerator)), Arc::new(EmptySearch), settings);
        let mut session = ConversationSession::open(Mode::Adult, None);
        for text in ["안녕하세요", TIRED, TIRED] {
            assert_eq!(say(&without_books, &mut session, text).await.outcome, TurnOutcome::Conversation);
        }
    }

    #[tokio::test]
    async fn blank_message_is_rejected_as_caller_error() {
        let orchestrator = offline(Arc::new(StaticCatalog));
        let mut session = ConversationSession::open(Mode::Child, None);

        let error = orchestrator.respond(&mut session, "  ", "req-blank").await;
        assert_eq!(error, Err(ApplicationError::Domain(DomainError::EmptyMessage)));
        assert_eq!(session.state().turn_count(), 0);
        assert_eq!(session.history().len(), 1);
    }
}
