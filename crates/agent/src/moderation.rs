use async_trait::async_trait;

use shelfmate_core::domain::moderation::{ModerationVerdict, SELF_HARM_CATEGORY};

use crate::providers::ProviderError;

pub const HARASSMENT_CATEGORY: &str = "harassment";

#[async_trait]
pub trait ModerationClient: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict, ProviderError>;
}

const SELF_HARM_PHRASES: &[&str] = &[
    "죽고 싶",
    "죽고싶",
    "자살",
    "자해",
    "사라지고 싶",
    "살기 싫",
    "목숨을 끊",
    "kill myself",
    "suicide",
];

const HARASSMENT_WORDS: &[&str] = &["씨발", "시발", "병신", "개새끼", "좆", "fuck", "bitch"];

/// Local moderation used when no moderation backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordModerator;

impl KeywordModerator {
    pub fn evaluate(&self, text: &str) -> ModerationVerdict {
        let lowered = text.to_lowercase();
        let self_harm = SELF_HARM_PHRASES.iter().any(|phrase| lowered.contains(phrase));
        let harassment = HARASSMENT_WORDS.iter().any(|word| lowered.contains(word));

        let mut verdict = ModerationVerdict::clean();
        verdict.categories.insert(SELF_HARM_CATEGORY.to_string(), self_harm);
        verdict.categories.insert(HARASSMENT_CATEGORY.to_string(), harassment);
        verdict.flagged = self_harm || harassment;
        verdict
    }
}

#[async_trait]
impl ModerationClient for KeywordModerator {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict, ProviderError> {
        Ok(self.evaluate(text))
    }
}
