//! Cache of deterministic match outcomes
//!
//! For fixed-length, noise-free matches between two deterministic players the
//! sequence of plays is always the same, so it only has to be simulated once
//! per tournament. The key carries the turn count, which keeps entries for
//! different match lengths apart.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::game::Game;
use crate::player::Player;

/// Cache shared by every match of one tournament run
pub type SharedCache = Arc<RwLock<DeterministicCache>>;

/// Key identifying a cacheable matchup: (identity, identity, turns)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    player_a: String,
    player_b: String,
    turns: u32,
}

impl Fingerprint {
    /// Build a key, rejecting stochastic players and empty matches.
    pub fn new(player_a: &dyn Player, player_b: &dyn Player, turns: u32) -> Result<Self> {
        if !player_a.classifier().cacheable() || !player_b.classifier().cacheable() {
            return Err(Error::StochasticFingerprint {
                player_a: player_a.identity(),
                player_b: player_b.identity(),
            });
        }
        if turns == 0 {
            return Err(Error::InvalidTurns);
        }
        Ok(Self {
            player_a: player_a.identity(),
            player_b: player_b.identity(),
            turns,
        })
    }

    pub fn players(&self) -> (&str, &str) {
        (&self.player_a, &self.player_b)
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }
}

/// Recorded plays of one matchup with their summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedOutcome {
    pub actions: Vec<(Action, Action)>,
    pub scores: (f64, f64),
    pub cooperations: (u32, u32),
}

impl CachedOutcome {
    pub fn new(actions: Vec<(Action, Action)>, game: &Game) -> Self {
        let mut scores = (0.0, 0.0);
        let mut cooperations = (0, 0);
        for pair in &actions {
            let (a, b) = game.score(*pair);
            scores.0 += a;
            scores.1 += b;
            cooperations.0 += pair.0.is_cooperate() as u32;
            cooperations.1 += pair.1.is_cooperate() as u32;
        }
        Self {
            actions,
            scores,
            cooperations,
        }
    }
}

/// Snapshot of cache counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Validated mapping from fingerprint to outcome.
///
/// Lookups take `&self` so that concurrent readers only need a read lock;
/// the hit/miss counters are atomic for the same reason.
#[derive(Debug)]
pub struct DeterministicCache {
    entries: HashMap<Fingerprint, CachedOutcome>,
    mutable: bool,
    counters: Counters,
}

impl Default for DeterministicCache {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            mutable: true,
            counters: Counters::default(),
        }
    }
}

impl DeterministicCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap for sharing across matches and workers
    pub fn shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn set_mutable(&mut self, mutable: bool) {
        self.mutable = mutable;
    }

    pub fn get(&self, key: &Fingerprint) -> Option<&CachedOutcome> {
        let found = self.entries.get(key);
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    /// Store an outcome. Fails on an immutable cache.
    ///
    /// An existing entry is replaced; for a valid key both values are equal.
    pub fn insert(&mut self, key: Fingerprint, outcome: CachedOutcome) -> Result<()> {
        if !self.mutable {
            return Err(Error::ImmutableCache);
        }
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, outcome);
        Ok(())
    }

    /// Validate the players as a key and store the outcome.
    pub fn store(
        &mut self,
        player_a: &dyn Player,
        player_b: &dyn Player,
        outcome: CachedOutcome,
    ) -> Result<()> {
        let turns = u32::try_from(outcome.actions.len()).map_err(|_| Error::InvalidTurns)?;
        let key = Fingerprint::new(player_a, player_b, turns)?;
        self.insert(key, outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        if !self.mutable {
            return Err(Error::ImmutableCache);
        }
        self.entries.clear();
        Ok(())
    }

    /// Fold a privately built cache back in. Returns the number of new keys.
    pub fn merge(&mut self, other: DeterministicCache) -> Result<usize> {
        if !self.mutable {
            return Err(Error::ImmutableCache);
        }
        let mut added = 0;
        for (key, outcome) in other.entries {
            if !self.entries.contains_key(&key) {
                self.entries.insert(key, outcome);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }

    /// Serialise the entries as JSON
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let entries: Vec<(&Fingerprint, &CachedOutcome)> = self.entries.iter().collect();
        serde_json::to_writer(writer, &entries)?;
        Ok(())
    }

    /// Load entries previously written by `save`.
    ///
    /// Every key must name a positive turn count matching its recorded plays.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let entries: Vec<(Fingerprint, CachedOutcome)> = serde_json::from_reader(reader)?;
        for (key, outcome) in &entries {
            if key.turns == 0 || outcome.actions.len() != key.turns as usize {
                return Err(Error::InvalidTurns);
            }
        }
        Ok(Self {
            entries: entries.into_iter().collect(),
            ..Self::default()
        })
    }
}
