use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Audience the agent speaks to. Chosen once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Child,
    Teen,
    Adult,
    Senior,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Child, Mode::Teen, Mode::Adult, Mode::Senior];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Teen => "teen",
            Self::Adult => "adult",
            Self::Senior => "senior",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "child" => Ok(Self::Child),
            "teen" => Ok(Self::Teen),
            "adult" => Ok(Self::Adult),
            "senior" => Ok(Self::Senior),
            "" => Err(DomainError::MissingMode),
            other => Err(DomainError::UnknownMode(other.to_string())),
        }
    }
}
