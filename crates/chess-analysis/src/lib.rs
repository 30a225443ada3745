//! Move-by-move game review against a UCI engine.
//!
//! This crate replays recorded games, scores every non-book move with an
//! engine and summarises each color's play.
//!
//! # Overview
//!
//! - [`Evaluation`] - Position evaluation (centipawn or mate score)
//! - [`win_percent`] / [`move_accuracy`] - Lichess-style accuracy model
//! - [`MoveQuality`] - Best, Good, Inaccuracy, Mistake or Blunder
//! - [`EngineSession`] - A UCI engine process behind the [`Evaluator`] trait
//! - [`PgnRules`] - Default [`RulesEngine`], backed by `pgn-reader` and `shakmaty`
//! - [`GameAnalyzer`] - Turns one PGN into a [`GameAnalysis`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::{atomic::AtomicBool, Arc};
//! use chess_analysis::{AnalysisConfig, EngineSession, EngineTimeouts, GameAnalyzer, PgnRules};
//!
//! let analyzer = GameAnalyzer::new(Arc::new(PgnRules), None, AnalysisConfig::default());
//! let mut engine = EngineSession::open("stockfish", EngineTimeouts::default())?;
//! let analysis = analyzer.analyze(&mut engine, "game.pgn", &pgn, &AtomicBool::new(false))?;
//! println!("White accuracy: {:.1}%", analysis.white.accuracy);
//! ```

pub mod accuracy;
pub mod analyzer;
pub mod engine;
pub mod evaluation;
pub mod quality;
pub mod replay;

pub use accuracy::{move_accuracy, win_percent};
pub use analyzer::{AnalysisConfig, AnalyzerError, GameAnalyzer};
pub use engine::{
    EngineError, EngineLauncher, EngineSession, EngineTimeouts, Evaluator, SearchPosition,
    UciLauncher,
};
pub use evaluation::Evaluation;
pub use quality::{GameAnalysis, GameStats, MoveAssessment, MoveQuality, MoveScore, StatsTally};
pub use replay::{
    BoardSnapshot, GameOutcome, GameRecord, PgnRules, ReplayError, ReplayStep, ReplayedGame,
    RulesEngine, Side, TimeControlClass,
};
