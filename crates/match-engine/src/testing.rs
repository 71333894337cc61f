//! Instrumented players for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::action::Action;
use crate::player::{Classifier, MemoryDepth, Player, View};
use crate::random::SeededRng;
use crate::strategy::{MemoryOne, Strategy, StrategyBase};

/// Deterministic cooperator that counts every strategy call across clones
#[derive(Clone)]
pub struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Counting {
    pub fn new(calls: Arc<AtomicUsize>) -> Self {
        Self { calls }
    }
}

impl Player for Counting {
    fn name(&self) -> String {
        "Counting".to_string()
    }

    fn classifier(&self) -> Classifier {
        Classifier::deterministic(MemoryDepth::Finite(0))
    }

    fn strategy(&mut self, _view: View<'_>, _rng: &mut SeededRng) -> Action {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Action::Cooperate
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(self.clone())
    }
}

/// Cooperator that keeps the latest view of its opponent's plays
#[derive(Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Action>>>,
}

impl Recorder {
    pub fn new(seen: Arc<Mutex<Vec<Action>>>) -> Self {
        Self { seen }
    }
}

impl Player for Recorder {
    fn name(&self) -> String {
        "Recorder".to_string()
    }

    fn classifier(&self) -> Classifier {
        Classifier::deterministic(MemoryDepth::Infinite)
    }

    fn strategy(&mut self, view: View<'_>, _rng: &mut SeededRng) -> Action {
        if let Ok(mut seen) = self.seen.lock() {
            *seen = view.opponent.plays().to_vec();
        }
        Action::Cooperate
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(self.clone())
    }
}

/// Stochastic player that panics on one particular reset, counted across
/// every clone. Used to kill exactly one repetition of a tournament.
#[derive(Clone)]
pub struct Faulty {
    resets: Arc<AtomicUsize>,
    fail_at: usize,
}

impl Faulty {
    pub fn new(resets: Arc<AtomicUsize>, fail_at: usize) -> Self {
        Self { resets, fail_at }
    }
}

impl Player for Faulty {
    fn name(&self) -> String {
        "Faulty".to_string()
    }

    fn classifier(&self) -> Classifier {
        Classifier::stochastic(MemoryDepth::Finite(0))
    }

    fn strategy(&mut self, _view: View<'_>, rng: &mut SeededRng) -> Action {
        if rng.chance(0.5) {
            Action::Cooperate
        } else {
            Action::Defect
        }
    }

    fn reset(&mut self) {
        if self.resets.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            panic!("faulty player failed on reset {}", self.fail_at);
        }
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(self.clone())
    }
}

/// A mix of deterministic and stochastic built-ins, indexed for proptest
pub fn catalogue(index: usize) -> Box<dyn Player> {
    let base = match index % 11 {
        0 => StrategyBase::TitForTat,
        1 => StrategyBase::AlwaysDefect,
        2 => StrategyBase::AlwaysCooperate,
        3 => StrategyBase::GrimTrigger,
        4 => StrategyBase::Pavlov,
        5 => StrategyBase::SuspiciousTitForTat,
        6 => StrategyBase::Random,
        7 => StrategyBase::TitForTwoTats,
        8 => StrategyBase::Gradual,
        9 => StrategyBase::Alternator,
        _ => return Box::new(MemoryOne::generous_tit_for_tat(0.3)),
    };
    Box::new(Strategy::new(base))
}

/// Roster of `n` catalogue players
pub fn roster(n: usize) -> Vec<Box<dyn Player>> {
    (0..n).map(catalogue).collect()
}
