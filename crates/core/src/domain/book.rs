use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::topic::Topic;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(pub String);

/// Candidate returned by a bibliographic search. Read-only for the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub pub_year: String,
    pub excerpt: String,
    pub cover_image: Option<String>,
}

/// Why a book ended up on a user's shelf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub topic: Topic,
    pub user_concern: String,
    pub recommendation_reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLog {
    pub user_id: String,
    pub book: BookRecord,
    pub summary: RecommendationSummary,
    pub user_review: String,
    pub recommended_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookLog {
    pub fn new(user_id: impl Into<String>, book: BookRecord, summary: RecommendationSummary) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            book,
            summary,
            user_review: String::new(),
            recommended_at: now,
            updated_at: now,
        }
    }
}
