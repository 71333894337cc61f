//! Meta player that polls a team of strategies
//!
//! Every member sees the team's own history and chooses an action; the
//! team plays the action picked by the vote rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::player::{Classifier, MemoryDepth, Player, View};
use crate::random::SeededRng;

/// How member choices are reduced to one action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    /// Play what most members chose
    Majority,
    /// Play what fewest members chose
    Minority,
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Majority => write!(f, "Majority"),
            Vote::Minority => write!(f, "Minority"),
        }
    }
}

impl Vote {
    /// Ties cooperate
    pub fn decide(&self, cooperations: usize, members: usize) -> Action {
        let defections = members - cooperations.min(members);
        let cooperate = match self {
            Vote::Majority => cooperations >= defections,
            Vote::Minority => cooperations <= defections,
        };
        if cooperate {
            Action::Cooperate
        } else {
            Action::Defect
        }
    }
}

#[derive(Clone, Debug)]
pub struct Team {
    members: Vec<Box<dyn Player>>,
    rule: Vote,
}

impl Team {
    pub fn new(members: Vec<Box<dyn Player>>, rule: Vote) -> Self {
        Self { members, rule }
    }

    pub fn members(&self) -> &[Box<dyn Player>] {
        &self.members
    }

    pub fn rule(&self) -> Vote {
        self.rule
    }
}

impl Player for Team {
    fn name(&self) -> String {
        format!("{} Team", self.rule)
    }

    fn identity(&self) -> String {
        let members: Vec<String> = self.members.iter().map(|m| m.identity()).collect();
        format!("{} Team[{}]", self.rule, members.join(", "))
    }

    fn classifier(&self) -> Classifier {
        let mut classifier = Classifier::deterministic(MemoryDepth::Finite(0));
        for member in &self.members {
            let c = member.classifier();
            classifier.stochastic |= c.stochastic;
            classifier.long_run_time |= c.long_run_time;
            classifier.retains_state |= c.retains_state;
            classifier.memory_depth = classifier.memory_depth.max(c.memory_depth);
        }
        classifier
    }

    fn strategy(&mut self, view: View<'_>, rng: &mut SeededRng) -> Action {
        let cooperations = self
            .members
            .iter_mut()
            .map(|m| m.strategy(view, rng))
            .filter(|a| a.is_cooperate())
            .count();
        self.rule.decide(cooperations, self.members.len())
    }

    fn reset(&mut self) {
        for member in &mut self.members {
            if !member.classifier().retains_state {
                member.reset();
            }
        }
    }

    fn clone_box(&self) -> Box<dyn Player> {
        Box::new(Team {
            members: self.members.iter().map(|m| m.clone_box()).collect(),
            rule: self.rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{C, D};
    use crate::cache::DeterministicCache;
    use crate::matches::{Match, MatchParams};
    use crate::strategy::{MemoryOne, Strategy, StrategyBase};

    fn member(base: StrategyBase) -> Box<dyn Player> {
        Box::new(Strategy::new(base))
    }

    fn team(rule: Vote) -> Team {
        Team::new(
            vec![
                member(StrategyBase::TitForTat),
                member(StrategyBase::AlwaysDefect),
                member(StrategyBase::AlwaysCooperate),
            ],
            rule,
        )
    }

    #[test]
    fn test_vote() {
        assert_eq!(Vote::Majority.decide(2, 3), C);
        assert_eq!(Vote::Majority.decide(1, 3), D);
        assert_eq!(Vote::Minority.decide(2, 3), D);
        assert_eq!(Vote::Minority.decide(1, 3), C);
        // Ties cooperate
        assert_eq!(Vote::Majority.decide(1, 2), C);
        assert_eq!(Vote::Minority.decide(1, 2), C);
        assert_eq!(Vote::Majority.decide(0, 0), C);
    }

    #[test]
    fn test_majority_against_defector() {
        let params = MatchParams::fixed(4).unwrap();
        let mut m = Match::new(
            Box::new(team(Vote::Majority)),
            member(StrategyBase::AlwaysDefect),
            &params,
            SeededRng::new(&[1u8; 32], 0),
        );
        let result = m.play().unwrap();
        // TFT and Cooperator outvote on turn one; afterwards TFT defects
        let team_plays: Vec<_> = result.actions.iter().map(|p| p.0).collect();
        assert_eq!(team_plays, vec![C, D, D, D]);
    }

    #[test]
    fn test_minority_against_cooperator() {
        let params = MatchParams::fixed(3).unwrap();
        let mut m = Match::new(
            Box::new(team(Vote::Minority)),
            member(StrategyBase::AlwaysCooperate),
            &params,
            SeededRng::new(&[1u8; 32], 0),
        );
        let result = m.play().unwrap();
        assert!(result.actions.iter().all(|p| p.0 == D));
    }

    #[test]
    fn test_classifier() {
        let deterministic = team(Vote::Majority).classifier();
        assert!(!deterministic.stochastic);
        assert_eq!(deterministic.memory_depth, MemoryDepth::Finite(1));

        let mixed = Team::new(
            vec![
                member(StrategyBase::GrimTrigger),
                Box::new(MemoryOne::generous_tit_for_tat(0.5)),
            ],
            Vote::Majority,
        );
        let c = mixed.classifier();
        assert!(c.stochastic);
        assert_eq!(c.memory_depth, MemoryDepth::Infinite);
    }

    #[test]
    fn test_identity_names_members() {
        let t = team(Vote::Majority);
        assert_eq!(t.name(), "Majority Team");
        assert_eq!(
            t.identity(),
            "Majority Team[Tit For Tat, Defector, Cooperator]"
        );
        assert_ne!(t.identity(), team(Vote::Minority).identity());
    }

    #[test]
    fn test_team_is_cached_like_any_player() {
        let params = MatchParams::fixed(5).unwrap();
        let cache = DeterministicCache::new().shared();
        let t = team(Vote::Majority);
        for _ in 0..2 {
            Match::new(
                t.clone_box(),
                member(StrategyBase::Alternator),
                &params,
                SeededRng::new(&[1u8; 32], 0),
            )
            .with_cache(cache.clone())
            .play()
            .unwrap();
        }
        let stats = cache.read().unwrap().stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.hits, 1);
    }
}
