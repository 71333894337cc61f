//! Match results and the persisted interaction log
//!
//! A `MatchResult` is the turn-by-turn record of one match. The analysis
//! helpers here work on it directly; the tournament-level reductions live
//! in `result_set`. The log stores one `InteractionRecord` per pairing and
//! repetition as a line of JSON.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::action::{actions_to_str, str_to_actions, Action};
use crate::error::{Error, Result};
use crate::game::Game;

/// Index of a joint action in CC, CD, DC, DD order
pub fn state_index(pair: (Action, Action)) -> usize {
    match pair {
        (Action::Cooperate, Action::Cooperate) => 0,
        (Action::Cooperate, Action::Defect) => 1,
        (Action::Defect, Action::Cooperate) => 2,
        (Action::Defect, Action::Defect) => 3,
    }
}

/// Ordered plays of one match, one entry per turn
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub actions: Vec<(Action, Action)>,
}

impl MatchResult {
    pub fn new(actions: Vec<(Action, Action)>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Per-turn payoffs
    pub fn scores(&self, game: &Game) -> Vec<(f64, f64)> {
        self.actions.iter().map(|pair| game.score(*pair)).collect()
    }

    /// Total payoffs, `None` for an empty match
    pub fn final_score(&self, game: &Game) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        Some(self.scores(game).into_iter().fold((0.0, 0.0), |acc, s| {
            (acc.0 + s.0, acc.1 + s.1)
        }))
    }

    pub fn final_score_per_turn(&self, game: &Game) -> Option<(f64, f64)> {
        let turns = self.len() as f64;
        self.final_score(game).map(|(a, b)| (a / turns, b / turns))
    }

    /// Index of the higher scorer; `None` on a tie or an empty match
    pub fn winner(&self, game: &Game) -> Option<usize> {
        let (a, b) = self.final_score(game)?;
        if a > b {
            Some(0)
        } else if b > a {
            Some(1)
        } else {
            None
        }
    }

    pub fn cooperation(&self) -> (u32, u32) {
        self.actions.iter().fold((0, 0), |(a, b), (x, y)| {
            (a + x.is_cooperate() as u32, b + y.is_cooperate() as u32)
        })
    }

    pub fn normalised_cooperation(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let turns = self.len() as f64;
        let (a, b) = self.cooperation();
        Some((a as f64 / turns, b as f64 / turns))
    }

    /// Counts of CC, CD, DC, DD from the first player's perspective
    pub fn state_distribution(&self) -> [u32; 4] {
        let mut states = [0; 4];
        for pair in &self.actions {
            states[state_index(*pair)] += 1;
        }
        states
    }

    /// For each state (CC, CD, DC, DD) of one turn, how often the first
    /// player cooperated (`[0]`) or defected (`[1]`) on the next turn
    pub fn state_to_action_distribution(&self) -> [[u32; 2]; 4] {
        let mut counts = [[0; 2]; 4];
        for turn in self.actions.windows(2) {
            let next = if turn[1].0.is_cooperate() { 0 } else { 1 };
            counts[state_index(turn[0])][next] += 1;
        }
        counts
    }

    /// Two lines, one per player, drawing cooperations with `c` and
    /// defections with `d`
    pub fn sparklines(&self, c: char, d: char) -> String {
        let draw = |action: Action| if action.is_cooperate() { c } else { d };
        let top: String = self.actions.iter().map(|p| draw(p.0)).collect();
        let bottom: String = self.actions.iter().map(|p| draw(p.1)).collect();
        format!("{}\n{}", top, bottom)
    }

    /// Swap the two players' columns
    pub fn mirrored(&self) -> Self {
        Self::new(self.actions.iter().map(|(a, b)| (*b, *a)).collect())
    }
}

/// One row of the interaction log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub repetition: usize,
    /// Roster indices, row player first
    pub pair: (usize, usize),
    pub names: (String, String),
    /// Each player's plays as a `C`/`D` string
    pub actions: (String, String),
}

impl InteractionRecord {
    pub fn new(
        repetition: usize,
        pair: (usize, usize),
        names: (String, String),
        result: &MatchResult,
    ) -> Self {
        let actions = (
            actions_to_str(result.actions.iter().map(|p| &p.0)),
            actions_to_str(result.actions.iter().map(|p| &p.1)),
        );
        Self {
            repetition,
            pair,
            names,
            actions,
        }
    }

    /// Rebuild the match result, rejecting rows whose two sides differ in
    /// length or contain unknown characters
    pub fn result(&self) -> Result<MatchResult> {
        let a = str_to_actions(&self.actions.0)?;
        let b = str_to_actions(&self.actions.1)?;
        if a.len() != b.len() {
            return Err(Error::ShapeMismatch {
                expected: a.len(),
                found: b.len(),
            });
        }
        Ok(MatchResult::new(a.into_iter().zip(b).collect()))
    }
}

/// Write records as JSON lines
pub fn write_interactions<W: Write>(mut writer: W, records: &[InteractionRecord]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records written by `write_interactions`. Blank lines are skipped.
pub fn read_interactions<R: BufRead>(reader: R) -> Result<Vec<InteractionRecord>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
