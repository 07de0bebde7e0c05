use serde::{Deserialize, Serialize};
use std::fmt;

/// Task rule shared by every trial of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Condition {
    OneBack,
    TwoBack,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::OneBack, Condition::TwoBack];

    /// How many trials back the current letter is compared against.
    pub fn lag(self) -> usize {
        match self {
            Condition::OneBack => 1,
            Condition::TwoBack => 2,
        }
    }

    /// Numeric code written to the `cond` column of session logs.
    pub fn code(self) -> u8 {
        self.lag() as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Condition::OneBack),
            2 => Some(Condition::TwoBack),
            _ => None,
        }
    }

    /// Text of the cue screen shown before a block starts.
    pub fn cue(self) -> &'static str {
        match self {
            Condition::OneBack => "Get ready for 1-back.",
            Condition::TwoBack => "Get ready for 2-back.",
        }
    }
}

impl TryFrom<u8> for Condition {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Condition::from_code(code).ok_or_else(|| format!("unknown condition code {code}"))
    }
}

impl From<Condition> for u8 {
    fn from(condition: Condition) -> u8 {
        condition.code()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-back", self.lag())
    }
}
