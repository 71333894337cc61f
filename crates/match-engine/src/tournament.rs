//! Tournament runner
//!
//! Plays `repetitions` independent round robins and aggregates them. The
//! serial path plays repetitions in order on the calling thread. The
//! parallel path feeds repetition indices through a bounded work queue to a
//! fixed pool of scoped worker threads, which push finished matrices to a
//! bounded result queue. Each worker sends a `Done` sentinel when the work
//! queue is drained; a worker that dies loses its repetition, and the
//! aggregator then refuses to finalise.

use std::any::Any;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::cache::{DeterministicCache, SharedCache};
use crate::error::{Error, Result};
use crate::game::Game;
use crate::generator::MatchGenerator;
use crate::interaction::InteractionRecord;
use crate::matches::{Length, MatchParams};
use crate::player::Player;
use crate::random::{entropy_seed, seed_from_u64, Seed};
use crate::result_set::{Aggregator, RawRepetitionMatrix, ResultSet};

/// Tournament settings, usually read from a JSON file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub name: String,
    /// Fixed match length; exclusive with `prob_end`
    pub turns: Option<u32>,
    /// Per-turn end probability; exclusive with `turns`
    pub prob_end: Option<f64>,
    pub repetitions: usize,
    pub noise: f64,
    /// Worker threads; 1 plays serially, 0 uses every core
    pub workers: usize,
    /// Absent means a fresh seed from the OS
    pub seed: Option<u64>,
    pub game: Game,
    /// Whether matches may write to the cache
    pub cache_mutable: bool,
    /// Keep every match for the interaction log
    pub keep_interactions: bool,
    /// Match definitions materialised at a time while a worker plays one
    /// repetition. A memory bound only: repetitions are the unit of work
    /// handed to workers, and results do not depend on it.
    pub chunk_size: usize,
    /// Custom pairing graph instead of the full round robin
    pub edges: Option<Vec<(usize, usize)>>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            name: "tournament".to_string(),
            turns: None,
            prob_end: None,
            repetitions: 10,
            noise: 0.0,
            workers: 1,
            seed: None,
            game: Game::default(),
            cache_mutable: true,
            keep_interactions: false,
            chunk_size: 64,
            edges: None,
        }
    }
}

impl TournamentConfig {
    /// Check every setting and build the match parameters
    pub fn validate(&self) -> Result<MatchParams> {
        if self.repetitions == 0 {
            return Err(Error::InvalidRepetitions);
        }
        let length = Length::from_parts(self.turns, self.prob_end)?;
        MatchParams::new(length, self.game, self.noise)
    }

    /// Worker count after clamping to the machine and to `repetitions`
    pub fn effective_workers(&self) -> usize {
        let available = num_cpus::get().max(1);
        let requested = if self.workers == 0 {
            available
        } else {
            self.workers.min(available)
        };
        requested.min(self.repetitions).max(1)
    }
}

/// One finished repetition
#[derive(Debug)]
struct RepetitionOutcome {
    repetition: usize,
    matrix: RawRepetitionMatrix,
    interactions: Vec<InteractionRecord>,
}

enum Message {
    Outcome(RepetitionOutcome),
    Failed { repetition: usize, error: Error },
    Done { worker: usize },
}

/// Read-only state shared by every repetition
#[derive(Clone, Copy)]
struct Job<'a> {
    generator: &'a MatchGenerator,
    names: &'a [String],
    seed: Seed,
    chunk_size: usize,
    keep_interactions: bool,
}

/// A configured roster ready to play
pub struct Tournament {
    config: TournamentConfig,
    players: Vec<Box<dyn Player>>,
    names: Vec<String>,
    generator: MatchGenerator,
    cache: SharedCache,
    seed: Seed,
    interactions: Vec<InteractionRecord>,
}

impl Tournament {
    /// Validate the configuration and schedule the round robin.
    ///
    /// # Arguments
    /// * `players` - Roster; every match plays fresh clones
    /// * `config` - Tournament settings
    pub fn new(players: Vec<Box<dyn Player>>, config: TournamentConfig) -> Result<Self> {
        if players.is_empty() {
            return Err(Error::EmptyRoster);
        }
        let params = config.validate()?;

        let mut cache = DeterministicCache::new();
        cache.set_mutable(config.cache_mutable);
        let cache = cache.shared();

        let generator = match &config.edges {
            Some(edges) => MatchGenerator::with_edges(players.len(), edges, params)?,
            None => MatchGenerator::new(players.len(), params)?,
        }
        .with_cache(cache.clone());

        let seed = config.seed.map_or_else(entropy_seed, seed_from_u64);
        let names = players.iter().map(|p| p.name()).collect();

        Ok(Self {
            config,
            players,
            names,
            generator,
            cache,
            seed,
            interactions: Vec::new(),
        })
    }

    /// Replace the empty cache with a prebuilt one. Its mutability is set
    /// from the configuration.
    pub fn with_cache(mut self, mut cache: DeterministicCache) -> Self {
        cache.set_mutable(self.config.cache_mutable);
        self.cache = cache.shared();
        self.generator = self.generator.with_cache(self.cache.clone());
        self
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn generator(&self) -> &MatchGenerator {
        &self.generator
    }

    /// Matches of the last run, ordered by repetition then pairing. Empty
    /// unless `keep_interactions` is set.
    pub fn interactions(&self) -> &[InteractionRecord] {
        &self.interactions
    }

    /// Play every repetition and aggregate the results
    pub fn play(&mut self) -> Result<ResultSet> {
        let workers = self.config.effective_workers();
        self.run(workers)
    }

    fn run(&mut self, workers: usize) -> Result<ResultSet> {
        let repetitions = self.config.repetitions;
        log::info!(
            "{}: {} players, {} pairings per repetition, {} repetitions, {} worker(s)",
            self.config.name,
            self.players.len(),
            self.generator.len(),
            repetitions,
            workers
        );

        let job = Job {
            generator: &self.generator,
            names: &self.names,
            seed: self.seed,
            chunk_size: self.config.chunk_size,
            keep_interactions: self.config.keep_interactions,
        };
        let mut outcomes = if workers <= 1 {
            play_serial(job, &self.players, repetitions)?
        } else {
            play_parallel(job, &self.players, repetitions, workers)?
        };
        outcomes.sort_by_key(|o| o.repetition);

        let mut aggregator = Aggregator::new(self.names.clone(), repetitions);
        let mut interactions = Vec::new();
        for outcome in outcomes {
            aggregator.record(outcome.repetition, outcome.matrix)?;
            interactions.extend(outcome.interactions);
        }
        self.interactions = interactions;

        let results = aggregator.finalise()?;
        let stats = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats();
        log::info!(
            "{}: finished; cache {} hits, {} misses, {} writes",
            self.config.name,
            stats.hits,
            stats.misses,
            stats.writes
        );
        Ok(results)
    }
}

// ──────────────────────────── Internal helpers ────────────────────────────

/// Play every pairing of one repetition on the calling thread, building
/// `chunk_size` definitions at a time
fn play_repetition(
    job: Job<'_>,
    players: &[Box<dyn Player>],
    repetition: usize,
) -> Result<RepetitionOutcome> {
    let game = job.generator.params().game();
    let mut matrix = RawRepetitionMatrix::new(players.len());
    let mut interactions = Vec::new();

    for chunk in job.generator.chunks(job.seed, repetition, job.chunk_size) {
        for definition in chunk {
            let result = definition.build(players).play()?;
            matrix.record(definition.pair, &result, &game)?;
            if job.keep_interactions {
                let (a, b) = definition.pair;
                interactions.push(InteractionRecord::new(
                    repetition,
                    definition.pair,
                    (job.names[a].clone(), job.names[b].clone()),
                    &result,
                ));
            }
        }
    }

    log::debug!("repetition {} complete", repetition);
    Ok(RepetitionOutcome {
        repetition,
        matrix,
        interactions,
    })
}

fn play_serial(
    job: Job<'_>,
    players: &[Box<dyn Player>],
    repetitions: usize,
) -> Result<Vec<RepetitionOutcome>> {
    (0..repetitions)
        .map(|repetition| play_repetition(job, players, repetition))
        .collect()
}

fn play_parallel(
    job: Job<'_>,
    players: &[Box<dyn Player>],
    repetitions: usize,
    workers: usize,
) -> Result<Vec<RepetitionOutcome>> {
    let (outcomes, mut failures) = thread::scope(|scope| {
        let (work_tx, work_rx) = mpsc::sync_channel::<usize>(workers);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, result_rx) = mpsc::sync_channel::<Message>(workers);

        // Stops early once every worker is gone and the queue has no reader
        scope.spawn(move || {
            for repetition in 0..repetitions {
                if work_tx.send(repetition).is_err() {
                    break;
                }
            }
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let work_rx = Arc::clone(&work_rx);
                let result_tx = result_tx.clone();
                let roster: Vec<Box<dyn Player>> = players.iter().map(|p| p.clone_box()).collect();
                scope.spawn(move || work(worker, job, roster, work_rx, result_tx))
            })
            .collect();
        drop(work_rx);
        drop(result_tx);

        let mut outcomes = Vec::with_capacity(repetitions);
        let mut failures = Vec::new();
        let mut done = 0;
        for message in result_rx {
            match message {
                Message::Outcome(outcome) => outcomes.push(outcome),
                Message::Failed { repetition, error } => {
                    log::warn!("repetition {} failed: {}", repetition, error);
                    failures.push((repetition, error));
                }
                Message::Done { worker } => {
                    log::debug!("worker {} drained the queue", worker);
                    done += 1;
                }
            }
        }

        for (worker, handle) in handles.into_iter().enumerate() {
            if let Err(panic) = handle.join() {
                log::warn!("worker {} panicked: {}", worker, panic_message(&*panic));
            }
        }
        if done < workers {
            log::warn!("{} of {} workers exited without finishing", workers - done, workers);
        }
        (outcomes, failures)
    });

    failures.sort_by_key(|(repetition, _)| *repetition);
    if let Some((repetition, error)) = failures.into_iter().next() {
        return Err(Error::WorkerFailed {
            repetition,
            reason: error.to_string(),
        });
    }
    Ok(outcomes)
}

/// Worker loop: pull repetition indices until the queue closes
fn work(
    worker: usize,
    job: Job<'_>,
    roster: Vec<Box<dyn Player>>,
    queue: Arc<Mutex<mpsc::Receiver<usize>>>,
    results: SyncSender<Message>,
) {
    loop {
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(repetition) = next else {
            break;
        };
        let message = match play_repetition(job, &roster, repetition) {
            Ok(outcome) => Message::Outcome(outcome),
            Err(error) => Message::Failed { repetition, error },
        };
        if results.send(message).is_err() {
            return;
        }
    }
    // Coordinator gone means nobody is listening for the sentinel either
    let _ = results.send(Message::Done { worker });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
