//! Player capability interface
//!
//! The engine never looks inside a player beyond this trait. Histories are
//! owned by the match and lent to players each turn, so a player only keeps
//! whatever private state its strategy needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::game::Game;
use crate::random::SeededRng;

/// How many past turns a strategy consults
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryDepth {
    Finite(u32),
    Infinite,
}

/// Static metadata describing a strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifier {
    pub stochastic: bool,
    pub memory_depth: MemoryDepth,
    pub long_run_time: bool,
    /// Keeps state across matches; never reset, never cached.
    pub retains_state: bool,
}

impl Classifier {
    pub fn deterministic(memory_depth: MemoryDepth) -> Self {
        Self {
            stochastic: false,
            memory_depth,
            long_run_time: false,
            retains_state: false,
        }
    }

    pub fn stochastic(memory_depth: MemoryDepth) -> Self {
        Self {
            stochastic: true,
            ..Self::deterministic(memory_depth)
        }
    }

    /// Whether outcomes involving this player can be replayed from cache
    pub fn cacheable(&self) -> bool {
        !self.stochastic && !self.retains_state
    }
}

/// One player's visible plays within a match
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    plays: Vec<Action>,
    cooperations: usize,
    defections: usize,
}

impl History {
    pub fn with_capacity(turns: usize) -> Self {
        Self {
            plays: Vec::with_capacity(turns),
            ..Self::default()
        }
    }

    pub fn push(&mut self, action: Action) {
        match action {
            Action::Cooperate => self.cooperations += 1,
            Action::Defect => self.defections += 1,
        }
        self.plays.push(action);
    }

    pub fn plays(&self) -> &[Action] {
        &self.plays
    }

    pub fn last(&self) -> Option<Action> {
        self.plays.last().copied()
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn cooperations(&self) -> usize {
        self.cooperations
    }

    pub fn defections(&self) -> usize {
        self.defections
    }
}

impl From<&[Action]> for History {
    fn from(actions: &[Action]) -> Self {
        let mut history = History::with_capacity(actions.len());
        for a in actions {
            history.push(*a);
        }
        history
    }
}

/// What a player sees when choosing its next action
#[derive(Clone, Copy, Debug)]
pub struct View<'a> {
    pub own: &'a History,
    pub opponent: &'a History,
    pub game: &'a Game,
    /// Zero-based index of the turn being played
    pub turn: usize,
}

/// A strategy taking part in matches.
///
/// `Send` so that rosters can be cloned into worker threads.
pub trait Player: Send {
    fn name(&self) -> String;

    /// Type plus constructor configuration. Two players with the same identity
    /// must behave identically, since this is what the cache keys on.
    fn identity(&self) -> String {
        self.name()
    }

    fn classifier(&self) -> Classifier;

    /// Choose the next action. `rng` is a per-player, per-match stream.
    fn strategy(&mut self, view: View<'_>, rng: &mut SeededRng) -> Action;

    /// Clear match-local state. Called at the start of every simulated match.
    fn reset(&mut self) {}

    /// A fresh instance with the same configuration and no match state.
    fn clone_box(&self) -> Box<dyn Player>;
}

impl Clone for Box<dyn Player> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
