//! Game Review - analyses a directory of PGN files with a UCI engine.
//!
//! Each game gets per-color accuracy and move-quality counts, appended to a
//! TSV report. Interrupted runs pick up where they left off.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chess_analysis::UciLauncher;
use clap::Parser;
use game_review::config::{default_workers, expand_home, ReviewConfig, ReviewSettings};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Analyse PGN files with a UCI engine.
#[derive(Parser, Debug)]
#[command(name = "game-review")]
#[command(about = "Analyse PGN files with a UCI engine and report accuracy per game")]
struct Cli {
    /// Directory containing PGN files
    pgn_directory: PathBuf,

    /// Path to the UCI engine executable
    engine_path: PathBuf,

    /// Output TSV file [default: analysis_results.tsv]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Search depth per position [default: 18]
    #[arg(short, long)]
    depth: Option<u32>,

    /// Number of parallel engine workers [default: CPU count - 4]
    #[arg(short = 'p', long, visible_alias = "processes")]
    workers: Option<usize>,

    /// Path to a Polyglot opening book (.bin)
    #[arg(short, long)]
    book: Option<PathBuf>,

    /// Configuration file [default: review.toml if present]
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges command-line values over the configuration file.
    fn settings(self, config: ReviewConfig, cpus: usize) -> ReviewSettings {
        ReviewSettings {
            pgn_dir: expand_home(&self.pgn_directory),
            engine_path: expand_home(&self.engine_path),
            output: expand_home(&self.output.unwrap_or(config.output)),
            depth: self.depth.unwrap_or(config.depth),
            workers: self
                .workers
                .or(config.workers)
                .unwrap_or_else(|| default_workers(cpus))
                .max(1),
            book: self.book.or(config.book).map(|path| expand_home(&path)),
            timeouts: config.timeouts.to_engine_timeouts(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = ReviewConfig::load(cli.config.as_deref())?;
    let settings = cli.settings(config, num_cpus::get());

    tracing::info!("Games: {}", settings.pgn_dir.display());
    tracing::info!("Engine: {}", settings.engine_path.display());
    tracing::info!("Report: {}", settings.output.display());

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing in-flight moves");
            stop_clone.store(true, Ordering::SeqCst);
        }
    });

    let launcher = UciLauncher::new(settings.engine_path.clone(), settings.timeouts);
    let run_settings = settings.clone();
    let summary = tokio::task::spawn_blocking(move || {
        game_review::review(&run_settings, launcher, &stop)
    })
    .await
    .context("review task panicked")??;

    for failed in &summary.failed {
        tracing::warn!("Failed: {} ({})", failed.file, failed.reason);
    }
    if summary.cancelled {
        tracing::info!(
            "Stopped early: {} of {} games analysed, rerun to continue",
            summary.completed,
            summary.total
        );
    } else {
        tracing::info!(
            "Analysis complete: {} of {} games analysed, {} failed. Results saved to {}",
            summary.completed,
            summary.total,
            summary.failed.len(),
            settings.output.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_analysis::EngineTimeouts;

    #[test]
    fn test_cli_parses_positionals_with_defaults() {
        let cli = Cli::try_parse_from(["game-review", "games", "/usr/bin/stockfish"]).unwrap();
        let settings = cli.settings(ReviewConfig::default(), 12);

        assert_eq!(settings.pgn_dir, PathBuf::from("games"));
        assert_eq!(settings.engine_path, PathBuf::from("/usr/bin/stockfish"));
        assert_eq!(settings.output, PathBuf::from("analysis_results.tsv"));
        assert_eq!(settings.depth, 18);
        assert_eq!(settings.workers, 8);
        assert!(settings.book.is_none());
        assert_eq!(settings.timeouts, EngineTimeouts::default());
    }

    #[test]
    fn test_cli_short_options() {
        let cli = Cli::try_parse_from([
            "game-review",
            "games",
            "sf",
            "-o",
            "out.tsv",
            "-d",
            "12",
            "-p",
            "3",
            "-b",
            "book.bin",
        ])
        .unwrap();
        let settings = cli.settings(ReviewConfig::default(), 2);

        assert_eq!(settings.output, PathBuf::from("out.tsv"));
        assert_eq!(settings.depth, 12);
        assert_eq!(settings.workers, 3);
        assert_eq!(settings.book, Some(PathBuf::from("book.bin")));
    }

    #[test]
    fn test_cli_processes_alias() {
        let cli =
            Cli::try_parse_from(["game-review", "games", "sf", "--processes", "5"]).unwrap();
        assert_eq!(cli.workers, Some(5));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let config = ReviewConfig {
            output: PathBuf::from("from_file.tsv"),
            depth: 25,
            workers: Some(6),
            book: Some(PathBuf::from("file.bin")),
            ..ReviewConfig::default()
        };

        let cli = Cli::try_parse_from(["game-review", "games", "sf", "-d", "10"]).unwrap();
        let settings = cli.settings(config, 64);

        assert_eq!(settings.depth, 10);
        assert_eq!(settings.output, PathBuf::from("from_file.tsv"));
        assert_eq!(settings.workers, 6);
        assert_eq!(settings.book, Some(PathBuf::from("file.bin")));
    }

    #[test]
    fn test_cli_requires_engine_path() {
        assert!(Cli::try_parse_from(["game-review", "games"]).is_err());
    }

    #[test]
    fn test_zero_workers_is_raised_to_one() {
        let cli = Cli::try_parse_from(["game-review", "games", "sf", "-p", "0"]).unwrap();
        assert_eq!(cli.settings(ReviewConfig::default(), 8).workers, 1);
    }
}
