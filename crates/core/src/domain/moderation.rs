use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SELF_HARM_CATEGORY: &str = "self-harm";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub categories: BTreeMap<String, bool>,
}

impl ModerationVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    /// Verdict used when the moderation backend could not be consulted.
    pub fn fail_closed() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(SELF_HARM_CATEGORY.to_string(), false);
        Self { flagged: true, categories }
    }

    pub fn flagged_with(category: &str) -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(category.to_string(), true);
        Self { flagged: true, categories }
    }

    pub fn is_self_harm(&self) -> bool {
        self.categories.get(SELF_HARM_CATEGORY).copied().unwrap_or(false)
    }

    pub fn flagged_categories(&self) -> Vec<&str> {
        self.categories.iter().filter(|(_, set)| **set).map(|(name, _)| name.as_str()).collect()
    }
}
