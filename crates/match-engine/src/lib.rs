//! Match engine for Iterated Prisoner's Dilemma tournaments
//!
//! Simulates pairwise matches between pluggable players, replays
//! deterministic matchups from a shared cache, runs round robins serially
//! or on a worker pool, and reduces the repetitions into rankings, payoff
//! and cooperation matrices and eigenvector ratings.

mod action;
mod cache;
mod eigen;
mod error;
mod game;
mod generator;
mod interaction;
mod matches;
mod player;
mod random;
mod result_set;
mod strategy;
mod team;
mod tournament;

#[cfg(test)]
mod testing;

pub use action::{actions_to_str, str_to_actions, Action, C, D};
pub use cache::{CacheStats, CachedOutcome, DeterministicCache, Fingerprint, SharedCache};
pub use eigen::{Eigenpair, PowerIteration, DEFAULT_TOLERANCE};
pub use error::{Error, Result};
pub use game::Game;
pub use generator::{MatchDefinition, MatchGenerator};
pub use interaction::{
    read_interactions, state_index, write_interactions, InteractionRecord, MatchResult,
};
pub use matches::{Length, Match, MatchParams, MAX_SAMPLED_TURNS};
pub use player::{Classifier, History, MemoryDepth, Player, View};
pub use random::{entropy_seed, seed_from_u64, Seed, SeededRng};
pub use result_set::{
    Aggregator, Cell, PlayerSummary, RawRepetitionMatrix, ResultSet, Summary, RATING_ITERATIONS,
};
pub use strategy::{MemoryOne, Strategy, StrategyBase, StrategyParams};
pub use team::{Team, Vote};
pub use tournament::{Tournament, TournamentConfig};
