//! Game Review - batch accuracy reports for PGN collections.
//!
//! This crate runs a directory of PGN files through a pool of UCI engines
//! and appends one summary row per game to a tab-separated report. Runs are
//! resumable: games already in the report are skipped.
//!
//! # Modules
//!
//! - [`config`] - `review.toml` loading and run settings
//! - [`report`] - TSV report writer and reader
//! - [`scheduler`] - Worker pool and work distribution

pub mod config;
pub mod report;
pub mod scheduler;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chess_analysis::{AnalysisConfig, EngineLauncher, GameAnalyzer, PgnRules};
use chess_openings::{BookError, OpeningBook, PolyglotBook};
use thiserror::Error;

use config::{ConfigError, ReviewSettings};
use report::{ReportError, ReportWriter};
use scheduler::{RunSummary, Scheduler};

/// Errors that end a review run.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// No engine could be started.
    #[error("Failed to launch any engine: {0}")]
    EngineLaunch(String),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Book(#[from] BookError),
}

/// Loads the opening book, if one is configured.
///
/// A configured path that does not exist only produces a warning.
pub fn open_book(path: Option<&Path>) -> Result<Option<Arc<dyn OpeningBook>>, ReviewError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        tracing::warn!(
            "Opening book not found at {}, proceeding without book",
            path.display()
        );
        return Ok(None);
    }
    let book = PolyglotBook::open(path)?;
    tracing::info!("Using opening book {} ({} entries)", path.display(), book.len());
    Ok(Some(Arc::new(book)))
}

/// Reviews every pending game in `settings.pgn_dir`.
pub fn review<L: EngineLauncher>(
    settings: &ReviewSettings,
    launcher: L,
    stop: &AtomicBool,
) -> Result<RunSummary, ReviewError> {
    let all_games = scheduler::discover_games(&settings.pgn_dir)?;
    if all_games.is_empty() {
        tracing::info!("No PGN files found in {}", settings.pgn_dir.display());
        return Ok(RunSummary::default());
    }

    let processed = report::load_processed(&settings.output)?;
    if !processed.is_empty() {
        tracing::info!(
            "Found {} already-processed games in {}",
            processed.len(),
            settings.output.display()
        );
    }
    let pending = scheduler::pending_games(all_games, &processed);
    if pending.is_empty() {
        tracing::info!("All games have already been processed");
        return Ok(RunSummary::default());
    }

    let book = open_book(settings.book.as_deref())?;
    let analyzer = GameAnalyzer::new(
        Arc::new(PgnRules),
        book,
        AnalysisConfig {
            depth: settings.depth,
        },
    );

    let mut writer = ReportWriter::open(&settings.output)?;
    Scheduler::new(launcher, analyzer, settings.workers).run(pending, &mut writer, stop)
}
