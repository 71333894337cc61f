//! Actions in the Prisoner's Dilemma and related games

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single choice in a social dilemma
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Cooperate,
    Defect,
}

pub const C: Action = Action::Cooperate;
pub const D: Action = Action::Defect;

impl Action {
    /// The opposite action. Used to inject noise.
    pub fn flip(self) -> Self {
        match self {
            Action::Cooperate => Action::Defect,
            Action::Defect => Action::Cooperate,
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'C' => Ok(Action::Cooperate),
            'D' => Ok(Action::Defect),
            other => Err(Error::UnknownAction(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Action::Cooperate => 'C',
            Action::Defect => 'D',
        }
    }

    pub fn is_cooperate(self) -> bool {
        self == Action::Cooperate
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parse a string such as `"CDDC"` into actions.
pub fn str_to_actions(s: &str) -> Result<Vec<Action>> {
    s.chars().map(Action::from_char).collect()
}

/// Render actions as a string such as `"CDDC"`.
pub fn actions_to_str<'a>(actions: impl IntoIterator<Item = &'a Action>) -> String {
    actions.into_iter().map(|a| a.as_char()).collect()
}
