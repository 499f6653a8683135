use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::topic::Topic;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPhase {
    Idle,
    AwaitingConsent,
    Presenting,
}

/// Per-session recommendation bookkeeping. Owned by exactly one session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    turn_count: u32,
    pending_recommendation_topic: Option<Topic>,
    last_recommended_topic: Option<Topic>,
    shown_titles: Vec<String>,
    last_offer_turn: Option<u32>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn pending_recommendation_topic(&self) -> Option<Topic> {
        self.pending_recommendation_topic
    }

    /// The agent's latest reply was a consent question. Holds exactly while a topic is pending.
    pub fn last_agent_asked_permission(&self) -> bool {
        self.pending_recommendation_topic.is_some()
    }

    pub fn last_recommended_topic(&self) -> Option<Topic> {
        self.last_recommended_topic
    }

    pub fn shown_titles(&self) -> &[String] {
        &self.shown_titles
    }

    pub fn phase(&self) -> RecommendationPhase {
        if self.pending_recommendation_topic.is_some() {
            RecommendationPhase::AwaitingConsent
        } else {
            RecommendationPhase::Idle
        }
    }

    /// Counts one user-authored message. Never decremented.
    pub fn record_user_turn(&mut self) -> u32 {
        self.turn_count = self.turn_count.saturating_add(1);
        self.turn_count
    }

    pub fn begin_consent(&mut self, topic: Topic) -> Result<(), DomainError> {
        if let Some(pending) = self.pending_recommendation_topic {
            return Err(DomainError::ConsentAlreadyPending { pending });
        }
        self.pending_recommendation_topic = Some(topic);
        self.last_offer_turn = Some(self.turn_count);
        Ok(())
    }

    /// Clears the pending question and returns the topic it was raised for.
    pub fn resolve_consent(&mut self) -> Option<Topic> {
        self.pending_recommendation_topic.take()
    }

    /// Remembers a presented title so retries can exclude it. Oldest titles drop first.
    pub fn record_presentation(&mut self, topic: Topic, title: &str, max_titles: usize) {
        if self.last_recommended_topic != Some(topic) {
            self.shown_titles.clear();
        }
        self.last_recommended_topic = Some(topic);
        self.last_offer_turn = Some(self.turn_count);
        if !self.shown_titles.iter().any(|shown| shown == title) {
            self.shown_titles.push(title.to_string());
        }
        let max_titles = max_titles.max(1);
        if self.shown_titles.len() > max_titles {
            let overflow = self.shown_titles.len() - max_titles;
            self.shown_titles.drain(..overflow);
        }
    }

    /// True while fewer than `cooldown_turns` user turns have passed since the last offer.
    pub fn in_cooldown(&self, cooldown_turns: u32) -> bool {
        match self.last_offer_turn {
            Some(offered_at) => self.turn_count.saturating_sub(offered_at) < cooldown_turns,
            None => false,
        }
    }
}
