//! Payoff matrix for two-player social dilemmas

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Four payoffs of a symmetric 2x2 game.
///
/// The conventional dilemma ordering is T > R > P > S. It is not enforced
/// here since related games (hawk-dove, stag hunt) reorder it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Reward for mutual cooperation
    pub r: f64,
    /// Sucker's payoff
    pub s: f64,
    /// Temptation to defect
    pub t: f64,
    /// Punishment for mutual defection
    pub p: f64,
}

impl Game {
    pub fn new(r: f64, s: f64, t: f64, p: f64) -> Self {
        Self { r, s, t, p }
    }

    /// Payoffs as (row player, column player)
    pub fn score(&self, pair: (Action, Action)) -> (f64, f64) {
        match pair {
            (Action::Cooperate, Action::Cooperate) => (self.r, self.r),
            (Action::Cooperate, Action::Defect) => (self.s, self.t),
            (Action::Defect, Action::Cooperate) => (self.t, self.s),
            (Action::Defect, Action::Defect) => (self.p, self.p),
        }
    }

    /// Values in Press and Dyson order: (R, P, S, T)
    pub fn rpst(&self) -> (f64, f64, f64, f64) {
        (self.r, self.p, self.s, self.t)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new(3.0, 0.0, 5.0, 1.0)
    }
}
