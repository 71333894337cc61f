//! Match execution engine
//!
//! A `Match` plays one pairing for a fixed or sampled number of turns,
//! optionally flipping actions with noise, and consults the shared
//! deterministic cache when the outcome cannot vary.

use std::sync::PoisonError;

use serde::{Deserialize, Serialize};

use crate::cache::{CachedOutcome, Fingerprint, SharedCache};
use crate::error::{Error, Result};
use crate::game::Game;
use crate::interaction::MatchResult;
use crate::player::{History, Player, View};
use crate::random::SeededRng;

/// Upper bound on a sampled match length
pub const MAX_SAMPLED_TURNS: u32 = 100_000;

/// How long a match lasts
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Length {
    /// Exactly this many turns
    Fixed(u32),
    /// Each turn ends the match with this probability
    Probabilistic(f64),
}

impl Length {
    /// Build from the two optional knobs of a tournament configuration.
    /// Exactly one must be present.
    pub fn from_parts(turns: Option<u32>, prob_end: Option<f64>) -> Result<Self> {
        let length = match (turns, prob_end) {
            (Some(_), Some(_)) => return Err(Error::ConflictingLength),
            (None, None) => return Err(Error::MissingLength),
            (Some(turns), None) => Length::Fixed(turns),
            (None, Some(p)) => Length::Probabilistic(p),
        };
        length.validate()?;
        Ok(length)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Length::Fixed(0) => Err(Error::InvalidTurns),
            Length::Fixed(_) => Ok(()),
            Length::Probabilistic(p) if p > 0.0 && p <= 1.0 => Ok(()),
            Length::Probabilistic(p) => Err(Error::InvalidEndProbability(p)),
        }
    }

    /// Draw an effective number of turns
    pub fn sample(&self, rng: &mut SeededRng) -> u32 {
        match *self {
            Length::Fixed(turns) => turns,
            Length::Probabilistic(p) => sample_length(p, rng.next_f64()),
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Length::Fixed(_))
    }
}

/// Inverse-CDF draw from the geometric distribution: ceil(ln(1-u) / ln(1-p)).
/// A draw of zero turns becomes one.
fn sample_length(p: f64, u: f64) -> u32 {
    if p >= 1.0 {
        return 1;
    }
    let turns = ((1.0 - u).ln() / (1.0 - p).ln()).ceil();
    if turns.is_nan() || turns < 1.0 {
        1
    } else if turns >= MAX_SAMPLED_TURNS as f64 {
        MAX_SAMPLED_TURNS
    } else {
        turns as u32
    }
}

/// Everything a match needs besides its players.
///
/// Only constructed through [`MatchParams::new`], deserialization included,
/// so a value in hand always has a valid length and noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatchParams")]
pub struct MatchParams {
    length: Length,
    game: Game,
    noise: f64,
}

#[derive(Deserialize)]
struct RawMatchParams {
    length: Length,
    game: Game,
    noise: f64,
}

impl TryFrom<RawMatchParams> for MatchParams {
    type Error = Error;

    fn try_from(raw: RawMatchParams) -> Result<Self> {
        Self::new(raw.length, raw.game, raw.noise)
    }
}

impl MatchParams {
    pub fn new(length: Length, game: Game, noise: f64) -> Result<Self> {
        length.validate()?;
        if !(0.0..1.0).contains(&noise) {
            return Err(Error::InvalidNoise(noise));
        }
        Ok(Self {
            length,
            game,
            noise,
        })
    }

    /// Fixed length, default game, no noise
    pub fn fixed(turns: u32) -> Result<Self> {
        Self::new(Length::Fixed(turns), Game::default(), 0.0)
    }

    pub fn length(&self) -> Length {
        self.length
    }

    pub fn game(&self) -> Game {
        self.game
    }

    /// Probability of flipping each chosen action
    pub fn noise(&self) -> f64 {
        self.noise
    }
}

/// One pairing between two freshly cloned players
pub struct Match {
    players: [Box<dyn Player>; 2],
    turns: u32,
    game: Game,
    noise: f64,
    cache: Option<SharedCache>,
    rng: SeededRng,
}

impl Match {
    /// Create a match. The effective length is sampled here, once.
    ///
    /// # Arguments
    /// * `player_a` - Row player, already cloned for this match
    /// * `player_b` - Column player, already cloned for this match
    /// * `params` - Validated length, game and noise
    /// * `rng` - Stream for this match; forked for length, players and noise
    pub fn new(
        player_a: Box<dyn Player>,
        player_b: Box<dyn Player>,
        params: &MatchParams,
        rng: SeededRng,
    ) -> Self {
        let turns = params.length.sample(&mut rng.fork(0));
        Self {
            players: [player_a, player_b],
            turns,
            game: params.game,
            noise: params.noise,
            cache: None,
            rng,
        }
    }

    pub fn with_cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn players(&self) -> (&dyn Player, &dyn Player) {
        (self.players[0].as_ref(), self.players[1].as_ref())
    }

    /// Whether two plays of this match may differ
    pub fn is_stochastic(&self) -> bool {
        self.noise > 0.0
            || !self.players[0].classifier().cacheable()
            || !self.players[1].classifier().cacheable()
    }

    /// Play the match, replaying from cache when possible.
    ///
    /// Fresh outcomes of eligible matches are written back unless the cache
    /// has been marked immutable.
    pub fn play(&mut self) -> Result<MatchResult> {
        let key = match (&self.cache, self.is_stochastic()) {
            (Some(_), false) => Some(Fingerprint::new(
                self.players[0].as_ref(),
                self.players[1].as_ref(),
                self.turns,
            )?),
            _ => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            let guard = cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(outcome) = guard.get(key) {
                return Ok(MatchResult::new(outcome.actions.clone()));
            }
        }

        let result = self.simulate();

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
            // Another worker may have stored the same matchup since our lookup
            if guard.is_mutable() && !guard.contains(&key) {
                log::debug!("caching {:?}", key);
                guard.insert(key, CachedOutcome::new(result.actions.clone(), &self.game))?;
            }
        }

        Ok(result)
    }

    fn simulate(&mut self) -> MatchResult {
        let turns = self.turns as usize;
        let mut rng_a = self.rng.fork(1);
        let mut rng_b = self.rng.fork(2);
        let mut rng_noise = self.rng.fork(3);

        let [player_a, player_b] = &mut self.players;
        for player in [&mut *player_a, &mut *player_b] {
            if !player.classifier().retains_state {
                player.reset();
            }
        }

        let mut history_a = History::with_capacity(turns);
        let mut history_b = History::with_capacity(turns);
        let mut actions = Vec::with_capacity(turns);

        for turn in 0..turns {
            let mut move_a = player_a.strategy(
                View {
                    own: &history_a,
                    opponent: &history_b,
                    game: &self.game,
                    turn,
                },
                &mut rng_a,
            );
            let mut move_b = player_b.strategy(
                View {
                    own: &history_b,
                    opponent: &history_a,
                    game: &self.game,
                    turn,
                },
                &mut rng_b,
            );

            // Opponents observe, and the game scores, the flipped action
            if self.noise > 0.0 {
                if rng_noise.chance(self.noise) {
                    move_a = move_a.flip();
                }
                if rng_noise.chance(self.noise) {
                    move_b = move_b.flip();
                }
            }

            history_a.push(move_a);
            history_b.push(move_b);
            actions.push((move_a, move_b));
        }

        MatchResult::new(actions)
    }
}
