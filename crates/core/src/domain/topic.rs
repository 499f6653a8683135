use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse emotional category derived from a single user message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Healing,
    Relationship,
    Growth,
    Comfort,
    Empathy,
    SelfImprovement,
}

impl Topic {
    /// Returned when no keyword set matches.
    pub const DEFAULT: Topic = Topic::SelfImprovement;

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healing => "healing",
            Self::Relationship => "relationship",
            Self::Growth => "growth",
            Self::Comfort => "comfort",
            Self::Empathy => "empathy",
            Self::SelfImprovement => "self_improvement",
        }
    }

    /// User-facing label, also used as the bibliographic search query.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healing => "힐링",
            Self::Relationship => "인간관계",
            Self::Growth => "성장",
            Self::Comfort => "위로",
            Self::Empathy => "공감",
            Self::SelfImprovement => "자기계발",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        [
            Self::Healing,
            Self::Relationship,
            Self::Growth,
            Self::Comfort,
            Self::Empathy,
            Self::SelfImprovement,
        ]
        .into_iter()
        .find(|topic| topic.label() == label || topic.as_str() == label)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
