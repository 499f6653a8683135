use shelfmate_core::config::{ConversationConfig, RecommendationPolicy};
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::session::ConversationState;
use shelfmate_core::domain::topic::Topic;
use shelfmate_core::errors::DomainError;

const AFFIRMATIVE_TOKENS: &[&str] = &[
    "네", "넵", "넹", "예", "응", "웅", "그래", "그래요", "좋아", "좋아요", "좋습니다", "ㅇㅇ",
    "ㅇㅋ", "오케이", "콜", "yes", "yeah", "yep", "ok", "okay", "sure",
];

const AFFIRMATIVE_PHRASES: &[&str] =
    &["추천해", "추천 해", "부탁", "알려줘", "알려주세요", "보여줘", "보여주세요", "괜찮", "궁금"];

const NEGATIVE_TOKENS: &[&str] = &["no", "nope", "nah"];

const NEGATIVE_PHRASES: &[&str] = &[
    "아니", "아뇨", "싫", "됐어", "됐습니다", "다음에", "안 돼", "안돼", "필요 없", "필요없", "안 좋",
    "안 괜찮", "별로",
];

const RETRY_PHRASES: &[&str] =
    &["다시 추천", "다른 책", "다른 거", "또 추천", "하나 더", "another one", "something else"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerSettings {
    pub policy: RecommendationPolicy,
    pub consent_turn_threshold: u32,
    pub fixed_recommendation_turn: u32,
    pub cooldown_turns: u32,
    pub max_excluded_titles: usize,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            policy: RecommendationPolicy::Consent,
            consent_turn_threshold: 2,
            fixed_recommendation_turn: 3,
            cooldown_turns: 3,
            max_excluded_titles: 5,
        }
    }
}

impl From<&ConversationConfig> for TriggerSettings {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            policy: config.policy,
            consent_turn_threshold: config.consent_turn_threshold,
            fixed_recommendation_turn: config.fixed_recommendation_turn,
            cooldown_turns: config.cooldown_turns,
            max_excluded_titles: config.max_excluded_titles,
        }
    }
}

/// What the current user turn should do about recommendations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerDecision {
    /// The previous agent turn asked permission; this turn answers it.
    ResolveConsent { topic: Topic, accepted: bool },
    /// The user asked for a different book for the last recommended topic.
    Retry { topic: Topic, exclude: Vec<String> },
    AskConsent { topic: Topic },
    /// Fixed-turn policy reached its turn; fetch without asking.
    FetchUnconditionally { topic: Topic },
    Converse,
}

#[derive(Clone, Debug, Default)]
pub struct RecommendationTrigger {
    settings: TriggerSettings,
}

impl RecommendationTrigger {
    pub fn new(settings: TriggerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    /// Pure decision over the state as it stands after the user turn was counted.
    pub fn decide(&self, state: &ConversationState, text: &str, topic: Topic) -> TriggerDecision {
        if let Some(pending) = state.pending_recommendation_topic() {
            return TriggerDecision::ResolveConsent { topic: pending, accepted: is_affirmative(text) };
        }

        if is_retry_request(text) {
            if let Some(last) = state.last_recommended_topic() {
                return TriggerDecision::Retry { topic: last, exclude: state.shown_titles().to_vec() };
            }
        }

        match self.settings.policy {
            RecommendationPolicy::Consent => {
                let ready = state.turn_count() >= self.settings.consent_turn_threshold
                    && !topic.is_default()
                    && !state.last_agent_asked_permission()
                    && !state.in_cooldown(self.settings.cooldown_turns);
                if ready {
                    return TriggerDecision::AskConsent { topic };
                }
            }
            RecommendationPolicy::FixedTurn => {
                if state.turn_count() == self.settings.fixed_recommendation_turn {
                    return TriggerDecision::FetchUnconditionally { topic };
                }
            }
        }

        TriggerDecision::Converse
    }

    pub fn ask(&self, state: &mut ConversationState, topic: Topic) -> Result<(), DomainError> {
        state.begin_consent(topic)
    }

    /// Clears the pending question. Returns the topic it was raised for.
    pub fn resolve(&self, state: &mut ConversationState) -> Option<Topic> {
        state.resolve_consent()
    }

    /// Titles already shown for `topic` in this session, oldest first.
    pub fn exclusions_for(&self, state: &ConversationState, topic: Topic) -> Vec<String> {
        if state.last_recommended_topic() == Some(topic) {
            state.shown_titles().to_vec()
        } else {
            Vec::new()
        }
    }

    pub fn presented(&self, state: &mut ConversationState, topic: Topic, title: &str) {
        state.record_presentation(topic, title, self.settings.max_excluded_titles);
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| ch.is_whitespace() || matches!(ch, ',' | '.' | '!' | '?' | '~' | '…'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

pub fn is_affirmative(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }

    let negative = NEGATIVE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
        || tokens(&lowered).any(|token| NEGATIVE_TOKENS.contains(&token.as_str()));
    if negative {
        return false;
    }

    tokens(&lowered).any(|token| AFFIRMATIVE_TOKENS.contains(&token.as_str()))
        || AFFIRMATIVE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

pub fn is_retry_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    RETRY_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

pub fn consent_question(mode: Mode, topic: Topic) -> String {
    let label = topic.label();
    match mode {
        Mode::Child => {
            format!("'{label}'에 관한 재미있는 책이 생각났어! 책을 한 권 추천해 줘도 될까?")
        }
        Mode::Teen => format!(
            "이야기를 듣다 보니 '{label}'에 관한 책이 도움이 될 것 같아요. 책을 한 권 추천해 드려도 괜찮을까요?"
        ),
        Mode::Adult | Mode::Senior => format!(
            "말씀을 듣다 보니 '{label}'에 관한 책이 도움이 될 것 같아요. 책을 한 권 추천드려도 괜찮을까요?"
        ),
    }
}

pub fn presentation_text(title: &str) -> String {
    format!(
        "대화에 도움이 될 것 같아서 '{title}'(이)라는 책을 한번 찾아봤어요. 한번 살펴보시고, 우리는 계속 이야기 나누면 좋겠어요."
    )
}

pub fn not_found_text(topic: Topic) -> String {
    format!(
        "죄송해요, '{}' 주제에 맞는 책을 지금은 찾지 못했어요. 대신 이야기를 조금 더 나눠 볼까요?",
        topic.label()
    )
}

pub const FETCH_FAILED_TEXT: &str =
    "죄송해요, 지금은 책 정보를 불러오지 못했어요. 잠시 후에 다시 부탁해 주세요.";

#[cfg(test)]
mod tests {
    use shelfmate_core::config::RecommendationPolicy;
    use shelfmate_core::domain::mode::Mode;
    use shelfmate_core::domain::session::ConversationState;
    use shelfmate_core::domain::topic::Topic;

    use super::{
        consent_question, is_affirmative, is_retry_request, RecommendationTrigger,
        TriggerDecision, TriggerSettings,
    };

    fn state_after_turns(turns: u32) -> ConversationState {
        let mut state = ConversationState::new();
        for _ in 0..turns {
            state.record_user_turn();
        }
        state
    }

    #[test]
    fn affirmative_answers_are_recognised() {
        for text in ["네", "네!", "응 좋아", "좋아요~", "추천해 주세요", "yes please", "괜찮아요"] {
            assert!(is_affirmative(text), "{text}");
        }
    }

    #[test]
    fn negative_and_unrelated_answers_are_not_affirmative() {
        for text in ["아니요", "싫어요", "다음에 할게요", "네가 뭘 알아", "no thanks", "", "별로 안 괜찮아요"] {
            assert!(!is_affirmative(text), "{text}");
        }
    }

    #[test]
    fn retry_phrases_are_recognised() {
        assert!(is_retry_request("다시 추천해줘"));
        assert!(is_retry_request("다른 책은 없어?"));
        assert!(!is_retry_request("책 좋네요"));
    }

    #[test]
    fn first_turn_never_asks() {
        let trigger = RecommendationTrigger::default();
        let state = state_after_turns(1);
        assert_eq!(trigger.decide(&state, "힘들어요", Topic::Healing), TriggerDecision::Converse);
    }

    #[test]
    fn second_turn_with_topic_asks_for_consent() {
        let trigger = RecommendationTrigger::default();
        let state = state_after_turns(2);
        assert_eq!(
            trigger.decide(&state, "힘들어요", Topic::Healing),
            TriggerDecision::AskConsent { topic: Topic::Healing }
        );
        assert_eq!(trigger.decide(&state, "밥 먹었어요", Topic::DEFAULT), TriggerDecision::Converse);
    }

    #[test]
    fn pending_question_is_resolved_before_anything_else() {
        let trigger = RecommendationTrigger::default();
        let mut state = state_after_turns(2);
        trigger.ask(&mut state, Topic::Healing).expect("ask");
        state.record_user_turn();

        assert_eq!(
            trigger.decide(&state, "네", Topic::DEFAULT),
            TriggerDecision::ResolveConsent { topic: Topic::Healing, accepted: true }
        );
        assert_eq!(
            trigger.decide(&state, "아니요 괜찮아요", Topic::Comfort),
            TriggerDecision::ResolveConsent { topic: Topic::Healing, accepted: false }
        );
    }

    #[test]
    fn declined_offer_is_not_repeated_during_cooldown() {
        let trigger = RecommendationTrigger::default();
        let mut state = state_after_turns(2);
        trigger.ask(&mut state, Topic::Healing).expect("ask");
        state.record_user_turn();
        assert_eq!(trigger.resolve(&mut state), Some(Topic::Healing));

        state.record_user_turn();
        assert_eq!(trigger.decide(&state, "아직도 힘들어요", Topic::Healing), TriggerDecision::Converse);

        state.record_user_turn();
        assert_eq!(
            trigger.decide(&state, "아직도 힘들어요", Topic::Healing),
            TriggerDecision::AskConsent { topic: Topic::Healing }
        );
    }

    #[test]
    fn retry_uses_shown_titles_without_asking() {
        let trigger = RecommendationTrigger::default();
        let mut state = state_after_turns(3);
        trigger.presented(&mut state, Topic::Healing, "마음의 안정");

        assert_eq!(
            trigger.decide(&state, "다시 추천해줘", Topic::DEFAULT),
            TriggerDecision::Retry { topic: Topic::Healing, exclude: vec!["마음의 안정".to_string()] }
        );
        assert_eq!(trigger.exclusions_for(&state, Topic::Healing), vec!["마음의 안정".to_string()]);
        assert!(trigger.exclusions_for(&state, Topic::Growth).is_empty());
    }

    #[test]
    fn fixed_turn_policy_fetches_on_exactly_one_turn() {
        let trigger = RecommendationTrigger::new(TriggerSettings {
            policy: RecommendationPolicy::FixedTurn,
            ..TriggerSettings::default()
        });

        assert_eq!(trigger.decide(&state_after_turns(2), "힘들어요", Topic::Healing), TriggerDecision::Converse);
        assert_eq!(
            trigger.decide(&state_after_turns(3), "밥 먹었어요", Topic::DEFAULT),
            TriggerDecision::FetchUnconditionally { topic: Topic::DEFAULT }
        );
        assert_eq!(trigger.decide(&state_after_turns(4), "힘들어요", Topic::Healing), TriggerDecision::Converse);
    }

    #[test]
    fn adult_question_ends_with_polite_permission_request() {
        assert!(consent_question(Mode::Adult, Topic::Healing).ends_with("책을 한 권 추천드려도 괜찮을까요?"));
        assert!(consent_question(Mode::Child, Topic::Growth).contains("성장"));
    }
}
