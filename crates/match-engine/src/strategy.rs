//! Built-in strategies
//!
//! A small parameterised catalogue, enough to drive the engine and its
//! tests. Most classic strategies differ only by constructor arguments, so
//! they are one `Strategy` type over a `StrategyBase` plus tuning params,
//! and one four-vector `MemoryOne` kind.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::game::Game;
use crate::player::{Classifier, MemoryDepth, Player, View};
use crate::random::SeededRng;

/// Base strategy type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyBase {
    /// Copy opponent's last move. Start with cooperate.
    TitForTat,
    /// Always defect, never cooperate.
    AlwaysDefect,
    /// Always cooperate, never defect.
    AlwaysCooperate,
    /// Cooperate until opponent defects once, then always defect.
    GrimTrigger,
    /// Win-stay, lose-switch. Repeat move if good outcome.
    Pavlov,
    /// Tit-for-Tat but start with defect.
    SuspiciousTitForTat,
    /// Random choice each round.
    Random,
    /// Defect only if opponent defected twice in a row.
    TitForTwoTats,
    /// Retaliate with increasing defection streaks, then forgive.
    Gradual,
    /// Cooperate, defect, cooperate, defect...
    Alternator,
}

/// Strategy parameters for fine-tuning behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Percentage chance to cooperate after opponent defects (0-100)
    pub forgiveness: u8,
    /// Rounds to wait before retaliating (0-10)
    pub retaliation_delay: u8,
    /// Number of defections to ignore before retaliating (0-5)
    pub noise_tolerance: u8,
    /// Bitmask of first 8 moves (1 = defect, 0 = use strategy)
    pub initial_moves: u8,
    /// Bias toward cooperation for Random strategy (0-100)
    pub cooperate_bias: u8,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            forgiveness: 0,
            retaliation_delay: 0,
            noise_tolerance: 0,
            initial_moves: 0,
            cooperate_bias: 50,
        }
    }
}

/// Complete strategy with base type and parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strategy {
    pub base: StrategyBase,
    #[serde(default)]
    pub params: StrategyParams,
}

impl Strategy {
    /// Create a new strategy with default parameters
    pub fn new(base: StrategyBase) -> Self {
        Self {
            base,
            params: StrategyParams::default(),
        }
    }

    /// Create with custom parameters
    pub fn with_params(base: StrategyBase, params: StrategyParams) -> Self {
        Self { base, params }
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        let base_desc = match self.base {
            StrategyBase::TitForTat => "Copies opponent's last move. Starts by cooperating.",
            StrategyBase::AlwaysDefect => "Never cooperates. Always defects.",
            StrategyBase::AlwaysCooperate => "Never defects. Always cooperates.",
            StrategyBase::GrimTrigger => "Cooperates until betrayed, then always defects.",
            StrategyBase::Pavlov => "Repeats move if outcome was good, switches if bad.",
            StrategyBase::SuspiciousTitForTat => "Like Tit-for-Tat, but starts with defect.",
            StrategyBase::Random => "Randomly cooperates or defects each round.",
            StrategyBase::TitForTwoTats => "Only retaliates after two consecutive defections.",
            StrategyBase::Gradual => "Retaliates with increasing severity, then forgives.",
            StrategyBase::Alternator => "Alternates between cooperating and defecting.",
        };

        let mut desc = base_desc.to_string();

        if self.params.forgiveness > 0 {
            desc.push_str(&format!(" {}% chance to forgive.", self.params.forgiveness));
        }

        if self.params.noise_tolerance > 0 {
            desc.push_str(&format!(
                " Tolerates {} accidental defections.",
                self.params.noise_tolerance
            ));
        }

        desc
    }

    fn uses_forgiveness(&self) -> bool {
        matches!(
            self.base,
            StrategyBase::TitForTat | StrategyBase::SuspiciousTitForTat
        ) && self.params.forgiveness > 0
    }

    /// Execute the strategy for one round
    ///
    /// # Arguments
    /// * `opponent_history` - Opponent's past moves
    /// * `my_history` - Our past moves
    /// * `round` - Current round number (0-indexed)
    /// * `game` - Payoffs, consulted by outcome-driven strategies
    /// * `rng` - Random number generator for this player
    pub fn decide(
        &self,
        opponent_history: &[Action],
        my_history: &[Action],
        round: usize,
        game: &Game,
        rng: &mut SeededRng,
    ) -> Action {
        // initial_moves override (first 8 rounds)
        if round < 8 && (self.params.initial_moves >> round) & 1 == 1 {
            return Action::Defect;
        }

        match self.base {
            StrategyBase::TitForTat => {
                reciprocate(opponent_history, &self.params, Action::Cooperate, rng)
            }
            StrategyBase::AlwaysDefect => Action::Defect,
            StrategyBase::AlwaysCooperate => Action::Cooperate,
            StrategyBase::GrimTrigger => grim_trigger(opponent_history, &self.params),
            StrategyBase::Pavlov => pavlov(opponent_history, my_history, game),
            StrategyBase::SuspiciousTitForTat => {
                reciprocate(opponent_history, &self.params, Action::Defect, rng)
            }
            StrategyBase::Random => random(&self.params, rng),
            StrategyBase::TitForTwoTats => tit_for_two_tats(opponent_history),
            StrategyBase::Gradual => gradual(opponent_history, my_history),
            StrategyBase::Alternator => match my_history.last() {
                Some(Action::Cooperate) => Action::Defect,
                _ => Action::Cooperate,
            },
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::new(StrategyBase::TitForTat)
    }
}

impl Player for Strategy {
    fn name(&self) -> String {
        match self.base {
            StrategyBase::TitForTat => "Tit For Tat",
            StrategyBase::AlwaysDefect => "Defector",
            StrategyBase::AlwaysCooperate => "Cooperator",
            StrategyBase::GrimTrigger => "Grim Trigger",
            StrategyBase::Pavlov => "Win-Stay Lose-Shift",
            StrategyBase::SuspiciousTitForTat => "Suspicious Tit For Tat",
            StrategyBase::Random => "Random",
            StrategyBase::TitForTwoTats => "Tit For 2 Tats",
            StrategyBase::Gradual => "Gradual",
            StrategyBase::Alternator => "Alternator",
        }
        .to_string()
    }

    fn identity(&self) -> String {
        if self.params == StrategyParams::default() {
            self.name()
        } else {
            let p = &self.params;
            format!(
                "{}[f{} r{} n{} i{} b{}]",
                self.name(),
                p.forgiveness,
                p.retaliation_delay,
                p.noise_tolerance,
                p.initial_moves,
                p.cooperate_bias
            )
        }
    }

    fn classifier(&self) -> Classifier {
        let depth = match self.base {
            StrategyBase::AlwaysDefect | StrategyBase::AlwaysCooperate | StrategyBase::Random => {
                MemoryDepth::Finite(0)
            }
            StrategyBase::TitForTat | StrategyBase::SuspiciousTitForTat => {
                if self.params.retaliation_delay > 0 {
                    MemoryDepth::Finite(self.params.retaliation_delay as u32 + 1)
                } else {
                    MemoryDepth::Finite(1)
                }
            }
            StrategyBase::Pavlov | StrategyBase::Alternator => MemoryDepth::Finite(1),
            StrategyBase::TitForTwoTats => MemoryDepth::Finite(2),
            StrategyBase::GrimTrigger | StrategyBase::Gradual => MemoryDepth::Infinite,
        };
        // The opening override depends on the turn index, not on memory
        let depth = if self.params.initial_moves != 0 {
            MemoryDepth::Infinite
        } else {
            depth
        };
        let stochastic = match self.base {
            StrategyBase::Random => {
                self.params.cooperate_bias > 0 && self.params.cooperate_bias < 100
            }
            _ => self.uses_forgiveness(),
        };
        if stochastic {
            Classifier::stochastic(depth)
        } else {
            Classifier::deterministic(depth)
        }
    }

    fn strategy(&mut self, view: View<'_>, rng: &mut SeededRng) -> Action {
        self.decide(
            view.opponent.plays(),
            view.own.plays(),
            view.turn,
            view.game,
            rng,
        )
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(*self)
    }
}

/// Reactive memory-one strategy.
///
/// Cooperates with probability `four_vector[k]` after joint state k, in the
/// order CC, CD, DC, DD from this player's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryOne {
    pub four_vector: [f64; 4],
    /// Probability of cooperating on the first turn
    pub initial: f64,
}

impl MemoryOne {
    pub fn new(four_vector: [f64; 4], initial: f64) -> Self {
        Self {
            four_vector: four_vector.map(|p| p.clamp(0.0, 1.0)),
            initial: initial.clamp(0.0, 1.0),
        }
    }

    /// Generous tit for tat: forgives a defection with probability `g`
    pub fn generous_tit_for_tat(g: f64) -> Self {
        Self::new([1.0, g, 1.0, g], 1.0)
    }
}

impl Player for MemoryOne {
    fn name(&self) -> String {
        "Memory One".to_string()
    }

    fn identity(&self) -> String {
        let [a, b, c, d] = self.four_vector;
        format!("Memory One[{a}, {b}, {c}, {d}; {}]", self.initial)
    }

    fn classifier(&self) -> Classifier {
        let deterministic = self
            .four_vector
            .iter()
            .chain(std::iter::once(&self.initial))
            .all(|p| *p == 0.0 || *p == 1.0);
        if deterministic {
            Classifier::deterministic(MemoryDepth::Finite(1))
        } else {
            Classifier::stochastic(MemoryDepth::Finite(1))
        }
    }

    fn strategy(&mut self, view: View<'_>, rng: &mut SeededRng) -> Action {
        let p = match (view.own.last(), view.opponent.last()) {
            (Some(Action::Cooperate), Some(Action::Cooperate)) => self.four_vector[0],
            (Some(Action::Cooperate), Some(Action::Defect)) => self.four_vector[1],
            (Some(Action::Defect), Some(Action::Cooperate)) => self.four_vector[2],
            (Some(Action::Defect), Some(Action::Defect)) => self.four_vector[3],
            _ => self.initial,
        };
        // Certain outcomes must not consume randomness
        if p >= 1.0 || (p > 0.0 && rng.chance(p)) {
            Action::Cooperate
        } else {
            Action::Defect
        }
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(*self)
    }
}

// ──────────────────────────── Internal helpers ────────────────────────────

/// Tit-for-Tat family: copy the opponent's last move, opening with `opening`
fn reciprocate(
    opponent_history: &[Action],
    params: &StrategyParams,
    opening: Action,
    rng: &mut SeededRng,
) -> Action {
    match opponent_history.last() {
        None => opening,
        Some(Action::Cooperate) => Action::Cooperate,
        Some(Action::Defect) => {
            // Retaliation delay: wait N rounds after seeing defection
            if params.retaliation_delay > 0 {
                let last_defect_pos = opponent_history.iter().rposition(|m| *m == Action::Defect);
                if let Some(pos) = last_defect_pos {
                    let rounds_since = opponent_history.len() - 1 - pos;
                    if rounds_since < params.retaliation_delay as usize {
                        return Action::Cooperate;
                    }
                }
            }
            if params.forgiveness > 0 && rng.next_percent() < params.forgiveness {
                Action::Cooperate
            } else {
                Action::Defect
            }
        }
    }
}

/// Grim Trigger: Cooperate until opponent defects, then always defect
fn grim_trigger(opponent_history: &[Action], params: &StrategyParams) -> Action {
    let defection_count = opponent_history
        .iter()
        .filter(|m| **m == Action::Defect)
        .count();

    if defection_count > params.noise_tolerance as usize {
        Action::Defect
    } else {
        Action::Cooperate
    }
}

/// Pavlov: Win-stay, lose-switch
/// - If last round paid at least the reward, repeat move
/// - Otherwise switch move
fn pavlov(opponent_history: &[Action], my_history: &[Action], game: &Game) -> Action {
    match (my_history.last(), opponent_history.last()) {
        (Some(mine), Some(theirs)) => {
            let (my_score, _) = game.score((*mine, *theirs));
            if my_score >= game.r {
                *mine
            } else {
                mine.flip()
            }
        }
        _ => Action::Cooperate,
    }
}

/// Random: Random choice with configurable bias
fn random(params: &StrategyParams, rng: &mut SeededRng) -> Action {
    if rng.next_percent() < params.cooperate_bias {
        Action::Cooperate
    } else {
        Action::Defect
    }
}

/// Tit-for-Two-Tats: Only defect if opponent defected twice in a row
fn tit_for_two_tats(opponent_history: &[Action]) -> Action {
    match opponent_history {
        [.., Action::Defect, Action::Defect] => Action::Defect,
        _ => Action::Cooperate,
    }
}

/// Gradual: Escalating retaliation
/// After N opponent defections, player should have made N(N+1)/2 total defections
fn gradual(opponent_history: &[Action], my_history: &[Action]) -> Action {
    let their_defections = opponent_history
        .iter()
        .filter(|m| **m == Action::Defect)
        .count();

    let my_defections = my_history
        .iter()
        .filter(|m| **m == Action::Defect)
        .count();

    let expected = their_defections * (their_defections + 1) / 2;

    if my_defections < expected {
        Action::Defect
    } else {
        Action::Cooperate
    }
}
