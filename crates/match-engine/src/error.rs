//! Error taxonomy for the engine
//!
//! Configuration errors fail fast before any match is played. Data errors
//! surface short or malformed result sets to the caller.

use std::fmt;

/// Errors raised by the match and tournament engine.
#[derive(Debug)]
pub enum Error {
    /// Both a fixed turn count and an end probability were supplied.
    ConflictingLength,
    /// Neither a fixed turn count nor an end probability was supplied.
    MissingLength,
    /// Fixed turn count must be positive.
    InvalidTurns,
    /// End probability outside (0, 1].
    InvalidEndProbability(f64),
    /// Noise outside [0, 1).
    InvalidNoise(f64),
    /// A tournament needs at least one repetition.
    InvalidRepetitions,
    /// A tournament needs at least one player.
    EmptyRoster,
    /// Some player appears in no edge of a custom pairing graph.
    DisconnectedEdges,
    /// An edge references a player index that does not exist.
    EdgeOutOfRange { edge: (usize, usize), players: usize },
    /// A character other than `C` or `D` was parsed as an action.
    UnknownAction(char),
    /// Cache keys must be built from two deterministic players.
    StochasticFingerprint { player_a: String, player_b: String },
    /// The cache was marked immutable and a write was attempted.
    ImmutableCache,
    /// Fewer repetitions were collected than the tournament was configured for.
    IncompleteTournament { expected: usize, received: usize },
    /// The same repetition index was recorded twice.
    DuplicateRepetition(usize),
    /// A repetition index outside `0..repetitions` was recorded.
    RepetitionOutOfRange { repetition: usize, repetitions: usize },
    /// A matrix does not match the roster size.
    ShapeMismatch { expected: usize, found: usize },
    /// The eigen solver was handed a non-square matrix.
    NotSquare,
    /// A worker reported a failure while playing a repetition.
    WorkerFailed { repetition: usize, reason: String },
    Io(std::io::Error),
    Serde(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConflictingLength => {
                write!(f, "match length given as both fixed turns and end probability")
            }
            Error::MissingLength => write!(f, "match length requires turns or an end probability"),
            Error::InvalidTurns => write!(f, "turns must be a positive integer"),
            Error::InvalidEndProbability(p) => {
                write!(f, "end probability {} outside (0, 1]", p)
            }
            Error::InvalidNoise(n) => write!(f, "noise {} outside [0, 1)", n),
            Error::InvalidRepetitions => write!(f, "repetitions must be at least 1"),
            Error::EmptyRoster => write!(f, "tournament has no players"),
            Error::DisconnectedEdges => write!(f, "the graph edges do not include all players"),
            Error::EdgeOutOfRange { edge, players } => write!(
                f,
                "edge ({}, {}) out of range for {} players",
                edge.0, edge.1, players
            ),
            Error::UnknownAction(c) => write!(f, "unknown action {:?}, expected 'C' or 'D'", c),
            Error::StochasticFingerprint { player_a, player_b } => write!(
                f,
                "cache key requires two deterministic players, got {} and {}",
                player_a, player_b
            ),
            Error::ImmutableCache => write!(f, "cannot update cache unless it is mutable"),
            Error::IncompleteTournament { expected, received } => write!(
                f,
                "tournament incomplete: {} of {} repetitions collected",
                received, expected
            ),
            Error::DuplicateRepetition(r) => write!(f, "repetition {} recorded twice", r),
            Error::RepetitionOutOfRange { repetition, repetitions } => write!(
                f,
                "repetition {} out of range for {} repetitions",
                repetition, repetitions
            ),
            Error::ShapeMismatch { expected, found } => {
                write!(f, "matrix of size {} does not match {} players", found, expected)
            }
            Error::NotSquare => write!(f, "matrix is not square"),
            Error::WorkerFailed { repetition, reason } => {
                write!(f, "repetition {} failed: {}", repetition, reason)
            }
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Serde(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e)
    }
}

impl Error {
    /// True for errors raised by contract violations at construction time.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ConflictingLength
                | Error::MissingLength
                | Error::InvalidTurns
                | Error::InvalidEndProbability(_)
                | Error::InvalidNoise(_)
                | Error::InvalidRepetitions
                | Error::EmptyRoster
                | Error::DisconnectedEdges
                | Error::EdgeOutOfRange { .. }
                | Error::StochasticFingerprint { .. }
                | Error::ImmutableCache
        )
    }
}
