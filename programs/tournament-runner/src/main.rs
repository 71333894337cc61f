//! Tournament runner
//!
//! Reads a JSON tournament file, plays the round robin and prints the
//! summary as JSON on stdout. Progress is logged to stderr.
//!
//! Usage: tournament-runner <tournament.json>

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use log::{error, info, LevelFilter};
use match_engine::{write_interactions, Player, Strategy, Tournament, TournamentConfig};
use serde::Deserialize;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Engine settings plus the roster
#[derive(Debug, Deserialize)]
struct TournamentFile {
    #[serde(flatten)]
    config: TournamentConfig,
    players: Vec<Strategy>,
    /// Where to write the JSON-lines interaction log, if anywhere
    #[serde(default)]
    interactions_path: Option<PathBuf>,
}

impl TournamentFile {
    fn load(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing tournament file {}", path))
    }

    fn roster(&self) -> Vec<Box<dyn Player>> {
        self.players
            .iter()
            .map(|s| Box::new(*s) as Box<dyn Player>)
            .collect()
    }
}

fn log() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    TermLogger::init(
        LevelFilter::Info,
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("initializing logger")
}

fn main() -> anyhow::Result<()> {
    log()?;
    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: tournament-runner <tournament.json>");
    };
    let mut file = TournamentFile::load(&path)?;
    file.config.keep_interactions |= file.interactions_path.is_some();

    for (i, strategy) in file.players.iter().enumerate() {
        info!("player {}: {} - {}", i, strategy.identity(), strategy.describe());
    }

    let mut tournament = match Tournament::new(file.roster(), file.config.clone()) {
        Ok(t) => t,
        Err(e) if e.is_configuration() => {
            error!("invalid tournament file {}: {}", path, e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    let results = tournament.play()?;

    if let Some(out) = &file.interactions_path {
        let writer = BufWriter::new(
            File::create(out).with_context(|| format!("creating {}", out.display()))?,
        );
        write_interactions(writer, tournament.interactions())?;
        info!(
            "wrote {} interactions to {}",
            tournament.interactions().len(),
            out.display()
        );
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &results.summary())?;
    writeln!(handle)?;
    Ok(())
}
