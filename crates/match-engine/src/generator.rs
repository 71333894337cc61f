//! Round-robin match generation
//!
//! Enumerates the pairings of one repetition, self-play included, and hands
//! out match definitions lazily, optionally grouped into chunks so that a
//! worker can run a batch at a time. Each definition owns an rng stream
//! derived from (repetition, pairing index), so the same seed yields the same
//! matches whichever worker plays them.

use std::collections::HashSet;

use crate::cache::SharedCache;
use crate::error::{Error, Result};
use crate::matches::{Match, MatchParams};
use crate::player::Player;
use crate::random::{Seed, SeededRng};

/// Everything needed to play one pairing of one repetition
#[derive(Clone, Debug)]
pub struct MatchDefinition {
    pub repetition: usize,
    /// Position of the pairing within the repetition
    pub index: usize,
    /// Roster indices, row player first
    pub pair: (usize, usize),
    pub params: MatchParams,
    pub cache: Option<SharedCache>,
    pub rng: SeededRng,
}

impl MatchDefinition {
    /// Effective length of this match, drawn from the definition's stream
    pub fn turns(&self) -> u32 {
        self.params.length().sample(&mut self.rng.fork(0))
    }

    /// Build the match from fresh clones of the two roster entries. Self-play
    /// gets two independent clones.
    pub fn build(&self, players: &[Box<dyn Player>]) -> Match {
        let (a, b) = self.pair;
        let m = Match::new(
            players[a].clone_box(),
            players[b].clone_box(),
            &self.params,
            self.rng.clone(),
        );
        match &self.cache {
            Some(cache) => m.with_cache(cache.clone()),
            None => m,
        }
    }
}

/// Schedule of pairings for a roster
#[derive(Clone, Debug)]
pub struct MatchGenerator {
    players: usize,
    pairings: Vec<(usize, usize)>,
    params: MatchParams,
    cache: Option<SharedCache>,
}

impl MatchGenerator {
    /// Complete graph with self-play: every (i, j) with i <= j,
    /// n(n+1)/2 pairings in row-major order.
    pub fn new(players: usize, params: MatchParams) -> Result<Self> {
        if players == 0 {
            return Err(Error::EmptyRoster);
        }
        let pairings = (0..players)
            .flat_map(|i| (i..players).map(move |j| (i, j)))
            .collect();
        Ok(Self {
            players,
            pairings,
            params,
            cache: None,
        })
    }

    /// Restrict play to an explicit edge list.
    ///
    /// Edges are undirected; `(j, i)` is stored as `(i, j)` and repeats are
    /// dropped. Every player must appear in at least one edge.
    pub fn with_edges(players: usize, edges: &[(usize, usize)], params: MatchParams) -> Result<Self> {
        if players == 0 {
            return Err(Error::EmptyRoster);
        }
        let mut seen = HashSet::new();
        let mut covered = vec![false; players];
        let mut pairings = Vec::with_capacity(edges.len());
        for &(a, b) in edges {
            if a >= players || b >= players {
                return Err(Error::EdgeOutOfRange {
                    edge: (a, b),
                    players,
                });
            }
            let edge = (a.min(b), a.max(b));
            if seen.insert(edge) {
                pairings.push(edge);
            }
            covered[a] = true;
            covered[b] = true;
        }
        if covered.iter().any(|c| !c) {
            return Err(Error::DisconnectedEdges);
        }
        Ok(Self {
            players,
            pairings,
            params,
            cache: None,
        })
    }

    /// Attach the tournament's shared cache to every definition
    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn players(&self) -> usize {
        self.players
    }

    /// Pairings per repetition
    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    pub fn pairings(&self) -> &[(usize, usize)] {
        &self.pairings
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Lazy sequence of the definitions for one repetition
    ///
    /// # Arguments
    /// * `seed` - Tournament seed
    /// * `repetition` - Zero-based repetition index
    pub fn repetition(
        &self,
        seed: Seed,
        repetition: usize,
    ) -> impl Iterator<Item = MatchDefinition> + '_ {
        let base = repetition * self.pairings.len();
        self.pairings
            .iter()
            .enumerate()
            .map(move |(index, &pair)| MatchDefinition {
                repetition,
                index,
                pair,
                params: self.params,
                cache: self.cache.clone(),
                rng: SeededRng::new(&seed, (base + index) as u64),
            })
    }

    /// The same definitions grouped into chunks of at most `chunk_size`
    pub fn chunks(
        &self,
        seed: Seed,
        repetition: usize,
        chunk_size: usize,
    ) -> impl Iterator<Item = Vec<MatchDefinition>> + '_ {
        let size = chunk_size.max(1);
        let mut definitions = self.repetition(seed, repetition);
        std::iter::from_fn(move || {
            let chunk: Vec<_> = definitions.by_ref().take(size).collect();
            (!chunk.is_empty()).then_some(chunk)
        })
    }
}
