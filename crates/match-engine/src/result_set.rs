//! Tournament result aggregation
//!
//! Workers produce one `RawRepetitionMatrix` per repetition. The
//! `Aggregator` collects them in any arrival order and only hands out a
//! `ResultSet` once every repetition is in. Derived statistics are computed
//! on first access and kept.
//!
//! Conventions:
//! - self-play is simulated and stored on the diagonal, but never counts
//!   towards a player's score, wins or ratings
//! - per-turn values divide by the turns actually played
//! - pairs that were never scheduled (custom edges) are skipped, not zeroed

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::eigen::{PowerIteration, DEFAULT_TOLERANCE};
use crate::error::{Error, Result};
use crate::game::Game;
use crate::interaction::{InteractionRecord, MatchResult};

/// Iteration cap for the eigenvector ratings
pub const RATING_ITERATIONS: usize = 1000;

/// Outcome of one ordered pairing in one repetition, from the row player's side
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub payoff: f64,
    pub cooperations: u32,
    pub turns: u32,
    /// 1 if the row player opened by cooperating
    pub initial_cooperation: u32,
    /// CC, CD, DC, DD counts
    pub states: [u32; 4],
    /// Per state, the row player's next action as [C, D] counts
    pub transitions: [[u32; 2]; 4],
}

impl Cell {
    /// The first player's side of a match
    pub fn from_result(result: &MatchResult, game: &Game) -> Self {
        Self {
            payoff: result.final_score(game).map_or(0.0, |s| s.0),
            cooperations: result.cooperation().0,
            turns: result.len() as u32,
            initial_cooperation: result
                .actions
                .first()
                .map_or(0, |p| p.0.is_cooperate() as u32),
            states: result.state_distribution(),
            transitions: result.state_to_action_distribution(),
        }
    }

    fn per_turn_payoff(&self) -> Option<f64> {
        (self.turns > 0).then(|| self.payoff / self.turns as f64)
    }
}

/// Per-ordered-pair outcomes of one repetition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRepetitionMatrix {
    players: usize,
    cells: Vec<Option<Cell>>,
}

impl RawRepetitionMatrix {
    pub fn new(players: usize) -> Self {
        Self {
            players,
            cells: vec![None; players * players],
        }
    }

    pub fn players(&self) -> usize {
        self.players
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&Cell> {
        if i >= self.players || j >= self.players {
            return None;
        }
        self.cells[i * self.players + j].as_ref()
    }

    /// Store a match between roster entries `pair.0` and `pair.1`.
    ///
    /// Both ordered cells are filled. For self-play only the diagonal is
    /// written, holding the first clone's side.
    pub fn record(&mut self, pair: (usize, usize), result: &MatchResult, game: &Game) -> Result<()> {
        let (i, j) = pair;
        let n = self.players;
        if i >= n || j >= n {
            return Err(Error::ShapeMismatch {
                expected: n,
                found: i.max(j) + 1,
            });
        }
        self.cells[i * n + j] = Some(Cell::from_result(result, game));
        if i != j {
            self.cells[j * n + i] = Some(Cell::from_result(&result.mirrored(), game));
        }
        Ok(())
    }

    /// Rebuild one repetition from its logged interactions
    pub fn from_interactions<'a, I>(players: usize, game: &Game, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a InteractionRecord>,
    {
        let mut matrix = Self::new(players);
        for record in records {
            matrix.record(record.pair, &record.result()?, game)?;
        }
        Ok(matrix)
    }
}

/// Collects repetition matrices in any order
#[derive(Debug)]
pub struct Aggregator {
    names: Vec<String>,
    slots: Vec<Option<RawRepetitionMatrix>>,
    received: usize,
}

impl Aggregator {
    pub fn new(names: Vec<String>, repetitions: usize) -> Self {
        Self {
            names,
            slots: vec![None; repetitions],
            received: 0,
        }
    }

    /// Accept the matrix of one repetition. Each index is accepted once.
    pub fn record(&mut self, repetition: usize, matrix: RawRepetitionMatrix) -> Result<()> {
        let repetitions = self.slots.len();
        let slot = self
            .slots
            .get_mut(repetition)
            .ok_or(Error::RepetitionOutOfRange {
                repetition,
                repetitions,
            })?;
        if matrix.players() != self.names.len() {
            return Err(Error::ShapeMismatch {
                expected: self.names.len(),
                found: matrix.players(),
            });
        }
        if slot.is_some() {
            return Err(Error::DuplicateRepetition(repetition));
        }
        *slot = Some(matrix);
        self.received += 1;
        Ok(())
    }

    pub fn expected(&self) -> usize {
        self.slots.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.slots.len()
    }

    /// Produce the result set, refusing to finalise on partial data
    pub fn finalise(self) -> Result<ResultSet> {
        if !self.is_complete() {
            log::warn!(
                "tournament incomplete: {} of {} repetitions received",
                self.received,
                self.slots.len()
            );
            return Err(Error::IncompleteTournament {
                expected: self.slots.len(),
                received: self.received,
            });
        }
        ResultSet::new(self.names, self.slots.into_iter().flatten().collect())
    }
}

/// Per-player row of a `Summary`, in ranking order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub rank: usize,
    pub name: String,
    pub median_score: f64,
    pub cooperation_rating: f64,
    pub median_wins: f64,
    pub initial_cooperation_rate: f64,
    /// CC, CD, DC, DD rates over all non-self turns
    pub state_rates: [f64; 4],
    /// Share of cooperations on the turn after CC, CD, DC and DD
    pub cooperation_after_state: [f64; 4],
}

/// Serialisable bundle of the headline statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub repetitions: usize,
    pub players: Vec<PlayerSummary>,
    pub payoff_matrix: Vec<Vec<f64>>,
    pub payoff_stddev: Vec<Vec<f64>>,
    pub normalized_cooperation: Vec<Vec<f64>>,
    pub eigenvector_rating: Vec<f64>,
    pub vengeful_rating: Vec<f64>,
}

#[derive(Debug, Default)]
struct Derived {
    scores: OnceLock<Vec<Vec<f64>>>,
    normalized_scores: OnceLock<Vec<Vec<f64>>>,
    ranking: OnceLock<Vec<usize>>,
    ranked_names: OnceLock<Vec<String>>,
    wins: OnceLock<Vec<Vec<u32>>>,
    match_lengths: OnceLock<Vec<Vec<Vec<u32>>>>,
    payoff_matrix: OnceLock<Vec<Vec<f64>>>,
    payoff_stddev: OnceLock<Vec<Vec<f64>>>,
    score_diffs: OnceLock<Vec<Vec<Vec<f64>>>>,
    payoff_diffs_means: OnceLock<Vec<Vec<f64>>>,
    cooperation_matrix: OnceLock<Vec<Vec<u64>>>,
    normalized_cooperation: OnceLock<Vec<Vec<f64>>>,
    initial_cooperation_count: OnceLock<Vec<u64>>,
    initial_cooperation_rate: OnceLock<Vec<f64>>,
    cooperating_rating: OnceLock<Vec<f64>>,
    state_distribution: OnceLock<Vec<Vec<[u64; 4]>>>,
    normalized_state_distribution: OnceLock<Vec<Vec<[f64; 4]>>>,
    state_to_action_distribution: OnceLock<Vec<Vec<[[u64; 2]; 4]>>>,
    normalized_state_to_action_distribution: OnceLock<Vec<Vec<[[f64; 2]; 4]>>>,
    good_partner_matrix: OnceLock<Vec<Vec<u64>>>,
    good_partner_rating: OnceLock<Vec<f64>>,
    vengeful_cooperation: OnceLock<Vec<Vec<f64>>>,
    eigenvector_rating: OnceLock<Vec<f64>>,
    vengeful_rating: OnceLock<Vec<f64>>,
}

/// Complete history of a tournament and the statistics derived from it
#[derive(Debug)]
pub struct ResultSet {
    names: Vec<String>,
    /// Indexed by repetition
    history: Vec<RawRepetitionMatrix>,
    derived: Derived,
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.history == other.history
    }
}

impl ResultSet {
    /// Build from a complete, repetition-ordered history
    pub fn new(names: Vec<String>, history: Vec<RawRepetitionMatrix>) -> Result<Self> {
        if let Some(m) = history.iter().find(|m| m.players() != names.len()) {
            return Err(Error::ShapeMismatch {
                expected: names.len(),
                found: m.players(),
            });
        }
        Ok(Self {
            names,
            history,
            derived: Derived::default(),
        })
    }

    /// Replay a persisted interaction log. Every repetition in
    /// `0..repetitions` must have at least one record.
    pub fn from_interactions(
        names: Vec<String>,
        repetitions: usize,
        game: &Game,
        records: &[InteractionRecord],
    ) -> Result<Self> {
        let mut grouped: BTreeMap<usize, Vec<&InteractionRecord>> = BTreeMap::new();
        for record in records {
            if record.repetition >= repetitions {
                return Err(Error::RepetitionOutOfRange {
                    repetition: record.repetition,
                    repetitions,
                });
            }
            grouped.entry(record.repetition).or_default().push(record);
        }

        let players = names.len();
        let mut aggregator = Aggregator::new(names, repetitions);
        for (repetition, group) in grouped {
            let matrix = RawRepetitionMatrix::from_interactions(players, game, group)?;
            aggregator.record(repetition, matrix)?;
        }
        aggregator.finalise()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn players(&self) -> usize {
        self.names.len()
    }

    pub fn repetitions(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[RawRepetitionMatrix] {
        &self.history
    }

    /// `[player][repetition]` total payoff against every other player
    pub fn scores(&self) -> &Vec<Vec<f64>> {
        self.derived.scores.get_or_init(|| {
            self.per_player_repetition(|cells| cells.iter().map(|c| c.payoff).sum())
        })
    }

    /// `[player][repetition]` score per turn played against other players
    pub fn normalized_scores(&self) -> &Vec<Vec<f64>> {
        self.derived.normalized_scores.get_or_init(|| {
            self.per_player_repetition(|cells| {
                let (payoff, turns) = cells.iter().fold((0.0, 0u64), |(p, t), c| {
                    (p + c.payoff, t + c.turns as u64)
                });
                if turns == 0 {
                    0.0
                } else {
                    payoff / turns as f64
                }
            })
        })
    }

    /// Player indices by descending median normalised score. Ties keep
    /// roster order.
    pub fn ranking(&self) -> &Vec<usize> {
        self.derived.ranking.get_or_init(|| {
            let medians: Vec<f64> = self.normalized_scores().iter().map(|s| median(s)).collect();
            let mut order: Vec<usize> = (0..self.players()).collect();
            order.sort_by(|&a, &b| medians[b].total_cmp(&medians[a]));
            order
        })
    }

    pub fn ranked_names(&self) -> &Vec<String> {
        self.derived
            .ranked_names
            .get_or_init(|| self.ranking().iter().map(|&i| self.names[i].clone()).collect())
    }

    /// `[player][repetition]` matches won outright against other players
    pub fn wins(&self) -> &Vec<Vec<u32>> {
        self.derived.wins.get_or_init(|| {
            (0..self.players())
                .map(|i| {
                    self.history
                        .iter()
                        .map(|m| {
                            self.opponents(i)
                                .filter(|&j| match (m.get(i, j), m.get(j, i)) {
                                    (Some(a), Some(b)) => a.payoff > b.payoff,
                                    _ => false,
                                })
                                .count() as u32
                        })
                        .collect()
                })
                .collect()
        })
    }

    /// `[repetition][i][j]` turns played, 0 where no match took place
    pub fn match_lengths(&self) -> &Vec<Vec<Vec<u32>>> {
        self.derived.match_lengths.get_or_init(|| {
            self.history
                .iter()
                .map(|m| self.square(|i, j| m.get(i, j).map_or(0, |c| c.turns)))
                .collect()
        })
    }

    /// `[i][j]` mean per-turn payoff to i against j
    pub fn payoff_matrix(&self) -> &Vec<Vec<f64>> {
        self.derived.payoff_matrix.get_or_init(|| {
            self.square(|i, j| mean(&self.per_turn_payoffs(i, j)).unwrap_or(0.0))
        })
    }

    /// `[i][j]` population standard deviation of the per-turn payoff
    pub fn payoff_stddev(&self) -> &Vec<Vec<f64>> {
        self.derived.payoff_stddev.get_or_init(|| {
            self.square(|i, j| std_dev(&self.per_turn_payoffs(i, j)).unwrap_or(0.0))
        })
    }

    /// `[i][j][repetition]` per-turn payoff of i minus that of j
    pub fn score_diffs(&self) -> &Vec<Vec<Vec<f64>>> {
        self.derived.score_diffs.get_or_init(|| {
            self.square(|i, j| {
                self.history
                    .iter()
                    .map(|m| match (m.get(i, j), m.get(j, i)) {
                        (Some(a), Some(b)) if a.turns > 0 && i != j => {
                            (a.payoff - b.payoff) / a.turns as f64
                        }
                        _ => 0.0,
                    })
                    .collect()
            })
        })
    }

    /// `[i][j]` mean of `score_diffs` over repetitions
    pub fn payoff_diffs_means(&self) -> &Vec<Vec<f64>> {
        self.derived.payoff_diffs_means.get_or_init(|| {
            self.score_diffs()
                .iter()
                .map(|row| row.iter().map(|d| mean(d).unwrap_or(0.0)).collect())
                .collect()
        })
    }

    /// `[i][j]` cooperations by i against j, summed over repetitions
    pub fn cooperation_matrix(&self) -> &Vec<Vec<u64>> {
        self.derived.cooperation_matrix.get_or_init(|| {
            self.square(|i, j| self.cells(i, j).map(|c| c.cooperations as u64).sum())
        })
    }

    /// `[i][j]` mean over repetitions of the share of turns i cooperated
    pub fn normalized_cooperation(&self) -> &Vec<Vec<f64>> {
        self.derived.normalized_cooperation.get_or_init(|| {
            self.square(|i, j| {
                let rates: Vec<f64> = self
                    .cells(i, j)
                    .filter(|c| c.turns > 0)
                    .map(|c| c.cooperations as f64 / c.turns as f64)
                    .collect();
                mean(&rates).unwrap_or(0.0)
            })
        })
    }

    /// Opening cooperations against other players, over all repetitions
    pub fn initial_cooperation_count(&self) -> &Vec<u64> {
        self.derived.initial_cooperation_count.get_or_init(|| {
            (0..self.players())
                .map(|i| {
                    self.opponent_cells(i)
                        .map(|c| c.initial_cooperation as u64)
                        .sum()
                })
                .collect()
        })
    }

    pub fn initial_cooperation_rate(&self) -> &Vec<f64> {
        self.derived.initial_cooperation_rate.get_or_init(|| {
            (0..self.players())
                .map(|i| {
                    let played = self.opponent_cells(i).count();
                    if played == 0 {
                        0.0
                    } else {
                        self.initial_cooperation_count()[i] as f64 / played as f64
                    }
                })
                .collect()
        })
    }

    /// Share of all non-self turns in which the player cooperated
    pub fn cooperating_rating(&self) -> &Vec<f64> {
        self.derived.cooperating_rating.get_or_init(|| {
            (0..self.players())
                .map(|i| {
                    let (cooperations, turns) = self
                        .opponent_cells(i)
                        .fold((0u64, 0u64), |(c, t), cell| {
                            (c + cell.cooperations as u64, t + cell.turns as u64)
                        });
                    if turns == 0 {
                        0.0
                    } else {
                        cooperations as f64 / turns as f64
                    }
                })
                .collect()
        })
    }

    /// `[i][j]` CC, CD, DC, DD counts from i's perspective
    pub fn state_distribution(&self) -> &Vec<Vec<[u64; 4]>> {
        self.derived.state_distribution.get_or_init(|| {
            self.square(|i, j| {
                let mut total = [0u64; 4];
                for cell in self.cells(i, j) {
                    for (t, s) in total.iter_mut().zip(cell.states) {
                        *t += s as u64;
                    }
                }
                total
            })
        })
    }

    /// `[i][j]` share of turns spent in each state, from i's perspective
    pub fn normalized_state_distribution(&self) -> &Vec<Vec<[f64; 4]>> {
        self.derived.normalized_state_distribution.get_or_init(|| {
            self.state_distribution()
                .iter()
                .map(|row| row.iter().map(|states| shares(states)).collect())
                .collect()
        })
    }

    /// `[i][j][state]` i's next action as [C, D] counts, summed over
    /// repetitions
    pub fn state_to_action_distribution(&self) -> &Vec<Vec<[[u64; 2]; 4]>> {
        self.derived.state_to_action_distribution.get_or_init(|| {
            self.square(|i, j| {
                let mut total = [[0u64; 2]; 4];
                for cell in self.cells(i, j) {
                    for (t, s) in total.iter_mut().zip(cell.transitions) {
                        t[0] += s[0] as u64;
                        t[1] += s[1] as u64;
                    }
                }
                total
            })
        })
    }

    /// `state_to_action_distribution` with each state's counts scaled to
    /// sum to 1. States never reached stay at zero.
    pub fn normalized_state_to_action_distribution(&self) -> &Vec<Vec<[[f64; 2]; 4]>> {
        self.derived
            .normalized_state_to_action_distribution
            .get_or_init(|| {
                self.state_to_action_distribution()
                    .iter()
                    .map(|row| row.iter().map(|states| (*states).map(|next| shares(&next))).collect())
                    .collect()
            })
    }

    /// `[i][j]` repetitions in which i cooperated at least as often as j
    pub fn good_partner_matrix(&self) -> &Vec<Vec<u64>> {
        self.derived.good_partner_matrix.get_or_init(|| {
            self.square(|i, j| {
                if i == j {
                    return 0;
                }
                self.history
                    .iter()
                    .filter(|m| match (m.get(i, j), m.get(j, i)) {
                        (Some(a), Some(b)) => a.cooperations >= b.cooperations,
                        _ => false,
                    })
                    .count() as u64
            })
        })
    }

    /// Share of played non-self matches in which the player was a good
    /// partner
    pub fn good_partner_rating(&self) -> &Vec<f64> {
        self.derived.good_partner_rating.get_or_init(|| {
            (0..self.players())
                .map(|i| {
                    let played = self.opponent_cells(i).count();
                    if played == 0 {
                        0.0
                    } else {
                        self.good_partner_matrix()[i].iter().sum::<u64>() as f64 / played as f64
                    }
                })
                .collect()
        })
    }

    /// `2 * normalized_cooperation - 1`, mapping to [-1, 1]
    pub fn vengeful_cooperation(&self) -> &Vec<Vec<f64>> {
        self.derived.vengeful_cooperation.get_or_init(|| {
            self.normalized_cooperation()
                .iter()
                .map(|row| row.iter().map(|x| 2.0 * x - 1.0).collect())
                .collect()
        })
    }

    /// Principal eigenvector of the cooperation matrix
    pub fn eigenvector_rating(&self) -> &Vec<f64> {
        self.derived.eigenvector_rating.get_or_init(|| {
            let matrix: Vec<Vec<f64>> = self
                .cooperation_matrix()
                .iter()
                .map(|row| row.iter().map(|c| *c as f64).collect())
                .collect();
            principal_eigenvector(&matrix)
        })
    }

    /// Principal eigenvector of the vengeful cooperation matrix
    pub fn vengeful_rating(&self) -> &Vec<f64> {
        self.derived
            .vengeful_rating
            .get_or_init(|| principal_eigenvector(self.vengeful_cooperation()))
    }

    /// Headline statistics, players in ranking order
    pub fn summary(&self) -> Summary {
        let players = self
            .ranking()
            .iter()
            .enumerate()
            .map(|(rank, &i)| {
                let wins: Vec<f64> = self.wins()[i].iter().map(|w| *w as f64).collect();
                PlayerSummary {
                    rank,
                    name: self.names[i].clone(),
                    median_score: median(&self.normalized_scores()[i]),
                    cooperation_rating: self.cooperating_rating()[i],
                    median_wins: median(&wins),
                    initial_cooperation_rate: self.initial_cooperation_rate()[i],
                    state_rates: self.state_rates(i),
                    cooperation_after_state: self.cooperation_after_state(i),
                }
            })
            .collect();
        Summary {
            repetitions: self.repetitions(),
            players,
            payoff_matrix: self.payoff_matrix().clone(),
            payoff_stddev: self.payoff_stddev().clone(),
            normalized_cooperation: self.normalized_cooperation().clone(),
            eigenvector_rating: self.eigenvector_rating().clone(),
            vengeful_rating: self.vengeful_rating().clone(),
        }
    }

    // ──────────────────────────── Internal helpers ────────────────────────────

    fn opponents(&self, i: usize) -> impl Iterator<Item = usize> {
        (0..self.players()).filter(move |&j| j != i)
    }

    /// Cells of (i, j) over every repetition where the pair was played
    fn cells(&self, i: usize, j: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.history.iter().filter_map(move |m| m.get(i, j))
    }

    /// Every non-self cell of player i, over every repetition
    fn opponent_cells(&self, i: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.opponents(i).flat_map(move |j| self.cells(i, j))
    }

    fn per_turn_payoffs(&self, i: usize, j: usize) -> Vec<f64> {
        self.cells(i, j).filter_map(Cell::per_turn_payoff).collect()
    }

    fn square<T>(&self, f: impl Fn(usize, usize) -> T) -> Vec<Vec<T>> {
        let n = self.players();
        (0..n).map(|i| (0..n).map(|j| f(i, j)).collect()).collect()
    }

    /// `[player][repetition]` reduction over that repetition's non-self cells
    fn per_player_repetition(&self, f: impl Fn(&[&Cell]) -> f64) -> Vec<Vec<f64>> {
        (0..self.players())
            .map(|i| {
                self.history
                    .iter()
                    .map(|m| {
                        let cells: Vec<&Cell> =
                            self.opponents(i).filter_map(|j| m.get(i, j)).collect();
                        f(&cells)
                    })
                    .collect()
            })
            .collect()
    }

    fn state_rates(&self, i: usize) -> [f64; 4] {
        let mut counts = [0u64; 4];
        for j in self.opponents(i) {
            for (c, s) in counts.iter_mut().zip(self.state_distribution()[i][j]) {
                *c += s;
            }
        }
        shares(&counts)
    }

    fn cooperation_after_state(&self, i: usize) -> [f64; 4] {
        let mut counts = [[0u64; 2]; 4];
        for j in self.opponents(i) {
            for (c, s) in counts.iter_mut().zip(self.state_to_action_distribution()[i][j]) {
                c[0] += s[0];
                c[1] += s[1];
            }
        }
        counts.map(|next| shares(&next)[0])
    }
}

/// Each count over their sum, all zero when nothing was counted
fn shares<const N: usize>(counts: &[u64; N]) -> [f64; N] {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return [0.0; N];
    }
    counts.map(|c| c as f64 / total as f64)
}

fn principal_eigenvector(matrix: &[Vec<f64>]) -> Vec<f64> {
    let solver = PowerIteration::new(DEFAULT_TOLERANCE).with_max_iterations(RATING_ITERATIONS);
    match solver.solve(matrix) {
        Ok(pair) => pair.vector,
        Err(e) => {
            log::warn!("eigenvector rating unavailable: {}", e);
            vec![f64::NAN; matrix.len()]
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|x| (x - mu) * (x - mu)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::str_to_actions;
    use crate::generator::MatchGenerator;
    use crate::matches::MatchParams;
    use crate::player::Player;
    use crate::testing::roster;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn result(a: &str, b: &str) -> MatchResult {
        let a = str_to_actions(a).unwrap();
        let b = str_to_actions(b).unwrap();
        MatchResult::new(a.into_iter().zip(b).collect())
    }

    /// Alternator, Tit For Tat and Defector over 5 turns on the edges
    /// (0, 1), (0, 2), (1, 2): three identical repetitions.
    fn three_player() -> ResultSet {
        let game = Game::default();
        let names = vec![
            "Alternator".to_string(),
            "Tit For Tat".to_string(),
            "Defector".to_string(),
        ];
        let mut aggregator = Aggregator::new(names, 3);
        for repetition in 0..3 {
            let mut m = RawRepetitionMatrix::new(3);
            m.record((0, 1), &result("CDCDC", "CCDCD"), &game).unwrap();
            m.record((0, 2), &result("CDCDC", "DDDDD"), &game).unwrap();
            m.record((1, 2), &result("CDDDD", "DDDDD"), &game).unwrap();
            aggregator.record(repetition, m).unwrap();
        }
        aggregator.finalise().unwrap()
    }

    fn played(players: usize, repetitions: usize, seed: u8) -> (Vec<String>, Vec<RawRepetitionMatrix>) {
        let game = Game::default();
        let roster = roster(players);
        let names = roster.iter().map(|p| p.name()).collect();
        let generator = MatchGenerator::new(players, MatchParams::fixed(12).unwrap()).unwrap();
        let matrices = (0..repetitions)
            .map(|r| {
                let mut m = RawRepetitionMatrix::new(players);
                for d in generator.repetition([seed; 32], r) {
                    let res = d.build(&roster).play().unwrap();
                    m.record(d.pair, &res, &game).unwrap();
                }
                m
            })
            .collect();
        (names, matrices)
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_cell_from_result() {
        let cell = Cell::from_result(&result("CDCDC", "CCDCD"), &Game::default());
        assert_eq!(cell.payoff, 13.0);
        assert_eq!(cell.cooperations, 3);
        assert_eq!(cell.turns, 5);
        assert_eq!(cell.initial_cooperation, 1);
        assert_eq!(cell.states, [1, 2, 2, 0]);
        assert_eq!(cell.transitions, [[0, 1], [0, 1], [2, 0], [0, 0]]);
    }

    #[test]
    fn test_record_fills_both_sides() {
        let mut m = RawRepetitionMatrix::new(2);
        m.record((0, 1), &result("CC", "DD"), &Game::default()).unwrap();
        assert_eq!(m.get(0, 1).unwrap().payoff, 0.0);
        assert_eq!(m.get(1, 0).unwrap().payoff, 10.0);
        assert!(m.get(0, 0).is_none());

        m.record((1, 1), &result("CD", "DC"), &Game::default()).unwrap();
        assert_eq!(m.get(1, 1).unwrap().payoff, 5.0);

        assert!(matches!(
            m.record((0, 2), &result("C", "C"), &Game::default()),
            Err(Error::ShapeMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_match_lengths() {
        let rs = three_player();
        for lengths in rs.match_lengths() {
            assert_eq!(lengths, &vec![vec![0, 5, 5], vec![5, 0, 5], vec![5, 5, 0]]);
        }
    }

    #[test]
    fn test_scores() {
        let rs = three_player();
        assert_eq!(
            rs.scores(),
            &vec![vec![15.0; 3], vec![17.0; 3], vec![26.0; 3]]
        );
        assert_close(&rs.normalized_scores()[0], &[1.5; 3]);
        assert_close(&rs.normalized_scores()[1], &[(13.0 / 5.0 + 4.0 / 5.0) / 2.0; 3]);
        assert_close(&rs.normalized_scores()[2], &[(17.0 / 5.0 + 9.0 / 5.0) / 2.0; 3]);
    }

    #[test]
    fn test_ranking() {
        let rs = three_player();
        assert_eq!(rs.ranking(), &vec![2, 1, 0]);
        assert_eq!(
            rs.ranked_names(),
            &vec!["Defector".to_string(), "Tit For Tat".to_string(), "Alternator".to_string()]
        );
    }

    #[test]
    fn test_wins() {
        let rs = three_player();
        assert_eq!(rs.wins(), &vec![vec![0; 3], vec![0; 3], vec![2; 3]]);
    }

    #[test]
    fn test_payoff_matrix() {
        let rs = three_player();
        let expected = [
            [0.0, 13.0 / 5.0, 2.0 / 5.0],
            [13.0 / 5.0, 0.0, 4.0 / 5.0],
            [17.0 / 5.0, 9.0 / 5.0, 0.0],
        ];
        for (row, exp) in rs.payoff_matrix().iter().zip(expected) {
            assert_close(row, &exp);
        }
        for row in rs.payoff_stddev() {
            assert_close(row, &[0.0; 3]);
        }
    }

    #[test]
    fn test_score_diffs() {
        let rs = three_player();
        assert_close(&rs.score_diffs()[0][2], &[-3.0; 3]);
        assert_close(&rs.score_diffs()[2][1], &[1.0; 3]);
        assert_close(&rs.score_diffs()[1][1], &[0.0; 3]);
        assert_close(&rs.payoff_diffs_means()[2], &[3.0, 1.0, 0.0]);
        assert_close(&rs.payoff_diffs_means()[1], &[0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_cooperation() {
        let rs = three_player();
        assert_eq!(
            rs.cooperation_matrix(),
            &vec![vec![0, 9, 9], vec![9, 0, 3], vec![0, 0, 0]]
        );
        assert_close(&rs.normalized_cooperation()[0], &[0.0, 0.6, 0.6]);
        assert_close(&rs.normalized_cooperation()[1], &[0.6, 0.0, 0.2]);
        assert_close(&rs.vengeful_cooperation()[1], &[0.2, -1.0, -0.6]);
        assert_eq!(rs.initial_cooperation_count(), &vec![6, 6, 0]);
        assert_close(rs.initial_cooperation_rate(), &[1.0, 1.0, 0.0]);
        assert_close(rs.cooperating_rating(), &[18.0 / 30.0, 12.0 / 30.0, 0.0]);
    }

    #[test]
    fn test_state_distribution() {
        let rs = three_player();
        let states = rs.state_distribution();
        assert_eq!(states[0][1], [3, 6, 6, 0]);
        assert_eq!(states[0][2], [0, 9, 0, 6]);
        assert_eq!(states[1][2], [0, 3, 0, 12]);
        assert_eq!(states[2][1], [0, 0, 3, 12]);
        assert_eq!(states[0][0], [0; 4]);
    }

    #[test]
    fn test_normalized_state_distribution() {
        let rs = three_player();
        let states = rs.normalized_state_distribution();
        assert_close(&states[0][1], &[0.2, 0.4, 0.4, 0.0]);
        assert_close(&states[0][2], &[0.0, 0.6, 0.0, 0.4]);
        assert_close(&states[1][0], &[0.2, 0.4, 0.4, 0.0]);
        assert_close(&states[1][2], &[0.0, 0.2, 0.0, 0.8]);
        assert_close(&states[2][0], &[0.0, 0.0, 0.6, 0.4]);
        assert_close(&states[2][1], &[0.0, 0.0, 0.2, 0.8]);
        for i in 0..3 {
            assert_eq!(states[i][i], [0.0; 4]);
        }
    }

    #[test]
    fn test_state_to_action_distribution() {
        let rs = three_player();
        let counts = rs.state_to_action_distribution();
        assert_eq!(counts[0][1], [[0, 3], [0, 3], [6, 0], [0, 0]]);
        assert_eq!(counts[0][2], [[0, 0], [0, 6], [0, 0], [6, 0]]);
        assert_eq!(counts[1][0], [[3, 0], [0, 6], [3, 0], [0, 0]]);
        assert_eq!(counts[1][2], [[0, 0], [0, 3], [0, 0], [0, 9]]);
        assert_eq!(counts[2][0], [[0, 0], [0, 0], [0, 6], [0, 6]]);
        assert_eq!(counts[2][1], [[0, 0], [0, 0], [0, 3], [0, 9]]);
        assert_eq!(counts[1][1], [[0; 2]; 4]);

        let rates = rs.normalized_state_to_action_distribution();
        assert_eq!(rates[0][1], [[0.0, 1.0], [0.0, 1.0], [1.0, 0.0], [0.0, 0.0]]);
        assert_eq!(rates[1][0], [[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 0.0]]);
        assert_eq!(rates[2][1], [[0.0, 0.0], [0.0, 0.0], [0.0, 1.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_good_partner() {
        let rs = three_player();
        assert_eq!(
            rs.good_partner_matrix(),
            &vec![vec![0, 3, 3], vec![3, 0, 3], vec![0, 0, 0]]
        );
        assert_close(rs.good_partner_rating(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_eigen_ratings() {
        let rs = three_player();
        assert_close(rs.eigenvector_rating(), &[0.5547001962252291, 0.8320502943378436, 0.0]);
        assert_close(
            rs.vengeful_rating(),
            &[-0.4578520302117101, 0.7311328098872432, 0.5057828909101213],
        );
    }

    #[test]
    fn test_all_defectors_rating_is_nan() {
        let game = Game::default();
        let mut aggregator = Aggregator::new(vec!["a".into(), "b".into()], 1);
        let mut m = RawRepetitionMatrix::new(2);
        m.record((0, 1), &result("DDD", "DDD"), &game).unwrap();
        aggregator.record(0, m).unwrap();
        let rs = aggregator.finalise().unwrap();
        assert!(rs.eigenvector_rating().iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_summary() {
        let rs = three_player();
        let summary = rs.summary();
        assert_eq!(summary.repetitions, 3);
        let names: Vec<_> = summary.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Defector", "Tit For Tat", "Alternator"]);
        let defector = &summary.players[0];
        assert_eq!(defector.rank, 0);
        assert!((defector.median_score - 2.6).abs() < EPS);
        assert_eq!(defector.median_wins, 2.0);
        assert_eq!(defector.cooperation_rating, 0.0);
        assert_close(&defector.state_rates, &[0.0, 0.0, 0.4, 0.6]);
        assert_eq!(defector.cooperation_after_state, [0.0; 4]);
        assert_eq!(summary.players[1].cooperation_after_state, [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(summary.players[2].cooperation_after_state, [0.0, 0.0, 1.0, 1.0]);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"Tit For Tat\""));
    }

    #[test]
    fn test_derived_values_are_cached() {
        let rs = three_player();
        assert!(std::ptr::eq(rs.scores(), rs.scores()));
        assert!(std::ptr::eq(rs.ranking(), rs.ranking()));
        assert!(std::ptr::eq(rs.eigenvector_rating(), rs.eigenvector_rating()));
    }

    #[test]
    fn test_self_play_excluded_from_scores() {
        let game = Game::default();
        let mut aggregator = Aggregator::new(vec!["a".into(), "b".into()], 1);
        let mut m = RawRepetitionMatrix::new(2);
        m.record((0, 0), &result("CCC", "CCC"), &game).unwrap();
        m.record((0, 1), &result("CCC", "DDD"), &game).unwrap();
        m.record((1, 1), &result("DDD", "DDD"), &game).unwrap();
        aggregator.record(0, m).unwrap();
        let rs = aggregator.finalise().unwrap();

        assert_eq!(rs.scores(), &vec![vec![0.0], vec![15.0]]);
        assert_eq!(rs.normalized_scores(), &vec![vec![0.0], vec![5.0]]);
        // Diagonal still carries the self-play payoff
        assert_eq!(rs.payoff_matrix()[0][0], 3.0);
        assert_eq!(rs.payoff_matrix()[1][1], 1.0);
        assert_eq!(rs.cooperation_matrix()[0][0], 3);
    }

    #[test]
    fn test_single_player() {
        let game = Game::default();
        let mut aggregator = Aggregator::new(vec!["solo".into()], 2);
        for r in 0..2 {
            let mut m = RawRepetitionMatrix::new(1);
            m.record((0, 0), &result("CD", "CD"), &game).unwrap();
            aggregator.record(r, m).unwrap();
        }
        let rs = aggregator.finalise().unwrap();
        assert_eq!(rs.normalized_scores(), &vec![vec![0.0, 0.0]]);
        assert_eq!(rs.ranking(), &vec![0]);
    }

    #[test]
    fn test_aggregator_rejects_bad_records() {
        let mut aggregator = Aggregator::new(vec!["a".into(), "b".into()], 2);
        assert!(matches!(
            aggregator.record(2, RawRepetitionMatrix::new(2)),
            Err(Error::RepetitionOutOfRange { repetition: 2, repetitions: 2 })
        ));
        assert!(matches!(
            aggregator.record(0, RawRepetitionMatrix::new(3)),
            Err(Error::ShapeMismatch { expected: 2, found: 3 })
        ));
        aggregator.record(1, RawRepetitionMatrix::new(2)).unwrap();
        assert!(matches!(
            aggregator.record(1, RawRepetitionMatrix::new(2)),
            Err(Error::DuplicateRepetition(1))
        ));
        assert_eq!(aggregator.received(), 1);
        assert!(!aggregator.is_complete());
    }

    #[test]
    fn test_incomplete_tournament() {
        let mut aggregator = Aggregator::new(vec!["a".into()], 5);
        for r in [0, 1, 3, 4] {
            aggregator.record(r, RawRepetitionMatrix::new(1)).unwrap();
        }
        let err = aggregator.finalise().unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteTournament { expected: 5, received: 4 }
        ));
    }

    #[test]
    fn test_from_interactions() {
        let names = vec!["Alternator".to_string(), "Tit For Tat".to_string(), "Defector".to_string()];
        let mut records = Vec::new();
        for repetition in 0..3 {
            for (pair, a, b) in [
                ((0, 1), "CDCDC", "CCDCD"),
                ((0, 2), "CDCDC", "DDDDD"),
                ((1, 2), "CDDDD", "DDDDD"),
            ] {
                let pair_names = (names[pair.0].clone(), names[pair.1].clone());
                records.push(InteractionRecord::new(repetition, pair, pair_names, &result(a, b)));
            }
        }
        let rs = ResultSet::from_interactions(names.clone(), 3, &Game::default(), &records).unwrap();
        assert_eq!(rs, three_player());

        // A repetition with no rows is missing
        let partial: Vec<_> = records.iter().filter(|r| r.repetition != 1).cloned().collect();
        assert!(matches!(
            ResultSet::from_interactions(names.clone(), 3, &Game::default(), &partial),
            Err(Error::IncompleteTournament { expected: 3, received: 2 })
        ));

        assert!(matches!(
            ResultSet::from_interactions(names, 2, &Game::default(), &records),
            Err(Error::RepetitionOutOfRange { repetition: 2, repetitions: 2 })
        ));
    }

    #[test]
    fn test_played_tournament_shapes() {
        let (names, matrices) = played(4, 3, 5);
        let rs = ResultSet::new(names, matrices).unwrap();
        assert_eq!(rs.scores().len(), 4);
        assert!(rs.scores().iter().all(|s| s.len() == 3));
        assert_eq!(rs.score_diffs()[0][1].len(), 3);
        assert_eq!(rs.match_lengths().len(), 3);
        // Fixed length: normalised score is score / (turns * (N - 1))
        for (scores, normalised) in rs.scores().iter().zip(rs.normalized_scores()) {
            for (s, n) in scores.iter().zip(normalised) {
                assert!((s / 36.0 - n).abs() < EPS);
            }
        }
    }

    proptest! {
        #[test]
        fn test_arrival_order_is_irrelevant(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
            seed in any::<u8>(),
        ) {
            let (names, matrices) = played(5, 6, seed);

            let mut in_order = Aggregator::new(names.clone(), 6);
            for (r, m) in matrices.iter().enumerate() {
                in_order.record(r, m.clone()).unwrap();
            }
            let mut shuffled = Aggregator::new(names, 6);
            for &r in &order {
                shuffled.record(r, matrices[r].clone()).unwrap();
            }

            let a = in_order.finalise().unwrap();
            let b = shuffled.finalise().unwrap();
            prop_assert_eq!(a.scores(), b.scores());
            prop_assert_eq!(a.ranking(), b.ranking());
            prop_assert_eq!(a.payoff_matrix(), b.payoff_matrix());
            prop_assert_eq!(a.cooperation_matrix(), b.cooperation_matrix());
            prop_assert_eq!(a.wins(), b.wins());
            let (ea, eb) = (a.eigenvector_rating(), b.eigenvector_rating());
            prop_assert!(ea.iter().zip(eb).all(|(x, y)| x == y || (x.is_nan() && y.is_nan())));
        }
    }
}
