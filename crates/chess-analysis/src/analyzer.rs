//! Game analysis with move quality classification.
//!
//! This module provides the [`GameAnalyzer`], which replays a game, skips
//! opening-book moves and asks an [`Evaluator`] to score every other move.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chess_openings::OpeningBook;
use thiserror::Error;

use crate::accuracy::{move_accuracy, win_percent};
use crate::engine::{EngineError, Evaluator, SearchPosition};
use crate::quality::{GameAnalysis, MoveAssessment, MoveQuality, MoveScore, StatsTally};
use crate::replay::{ReplayError, ReplayStep, ReplayedGame, RulesEngine, Side};

/// Default search depth per position.
pub const DEFAULT_DEPTH: u32 = 18;

/// Errors that can occur during game analysis.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Error from the analysis engine.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    /// The game could not be read or replayed.
    #[error("Invalid game: {0}")]
    Replay(#[from] ReplayError),
    /// The stop flag was raised before the game finished.
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Configuration for game analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Search depth for every evaluated position.
    pub depth: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
        }
    }
}

/// Analyzes complete games. Shared by all workers; each call brings its own
/// evaluator.
#[derive(Clone)]
pub struct GameAnalyzer {
    rules: Arc<dyn RulesEngine>,
    book: Option<Arc<dyn OpeningBook>>,
    config: AnalysisConfig,
}

impl GameAnalyzer {
    pub fn new(
        rules: Arc<dyn RulesEngine>,
        book: Option<Arc<dyn OpeningBook>>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            rules,
            book,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyzes the game in `pgn`, read from the file `source`.
    ///
    /// For each ply, a move listed in the opening book for the position
    /// before it is counted as a book move. Every other move is scored by
    /// evaluating the position before and after it from the mover's point of
    /// view and converting both to winning chances.
    ///
    /// # Errors
    ///
    /// - [`AnalyzerError::Replay`] if the PGN cannot be replayed
    /// - [`AnalyzerError::Engine`] if any evaluation fails; the game is abandoned
    /// - [`AnalyzerError::Cancelled`] if `stop` is raised between plies
    pub fn analyze<E: Evaluator>(
        &self,
        engine: &mut E,
        source: &str,
        pgn: &str,
        stop: &AtomicBool,
    ) -> Result<GameAnalysis, AnalyzerError> {
        let game = self.rules.replay(source, pgn)?;
        engine.new_game()?;

        let mut white = StatsTally::new();
        let mut black = StatsTally::new();
        let mut moves = Vec::with_capacity(game.steps.len());

        for (index, step) in game.steps.iter().enumerate() {
            if stop.load(Ordering::Relaxed) {
                return Err(AnalyzerError::Cancelled);
            }

            let tally = match step.mover {
                Side::White => &mut white,
                Side::Black => &mut black,
            };

            let score = if self.is_book_move(step) {
                tally.record_book_move();
                None
            } else {
                let score = self.score_move(engine, &game, index)?;
                tally.record(&score);
                Some(score)
            };

            moves.push(MoveAssessment {
                ply: step.ply,
                mover: step.mover,
                san: step.san.clone(),
                score,
            });
        }

        let analysis = GameAnalysis {
            record: game.record,
            white: white.finish(),
            black: black.finish(),
            moves,
        };
        tracing::debug!(
            "Analyzed {}: {} plies, white {:.1}%, black {:.1}%",
            source,
            analysis.moves.len(),
            analysis.white.accuracy,
            analysis.black.accuracy
        );
        Ok(analysis)
    }

    fn is_book_move(&self, step: &ReplayStep) -> bool {
        self.book
            .as_ref()
            .is_some_and(|book| book.is_book_move(step.before.book_key, &step.book_uci))
    }

    fn score_move<E: Evaluator>(
        &self,
        engine: &mut E,
        game: &ReplayedGame,
        index: usize,
    ) -> Result<MoveScore, EngineError> {
        let history = game.uci_prefix(index + 1);
        let start_fen = game.start_fen.as_deref();

        let before = engine.evaluate(
            &SearchPosition {
                start_fen,
                moves: &history[..index],
            },
            self.config.depth,
        )?;
        let after = engine.evaluate(
            &SearchPosition {
                start_fen,
                moves: &history,
            },
            self.config.depth,
        )?;

        // `after` is from the opponent's point of view.
        let cp_before = before.to_centipawns();
        let cp_after = after.to_centipawns().saturating_neg();
        let cp_loss = cp_before.saturating_sub(cp_after).max(0);
        let accuracy = move_accuracy(win_percent(cp_before), win_percent(cp_after));

        Ok(MoveScore {
            cp_before,
            cp_after,
            cp_loss,
            accuracy,
            quality: MoveQuality::from_cp_loss(cp_loss),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::PgnRules;
    use crate::Evaluation;

    /// Scores every position 0 and counts requests.
    #[derive(Default)]
    struct FlatEvaluator {
        calls: usize,
        new_games: usize,
    }

    impl Evaluator for FlatEvaluator {
        fn evaluate(
            &mut self,
            _position: &SearchPosition<'_>,
            _depth: u32,
        ) -> Result<Evaluation, EngineError> {
            self.calls += 1;
            Ok(Evaluation::Centipawns(0))
        }

        fn new_game(&mut self) -> Result<(), EngineError> {
            self.new_games += 1;
            Ok(())
        }

        fn is_poisoned(&self) -> bool {
            false
        }

        fn close(self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn analyzer() -> GameAnalyzer {
        GameAnalyzer::new(Arc::new(PgnRules), None, AnalysisConfig::default())
    }

    #[test]
    fn test_analysis_config_default() {
        assert_eq!(AnalysisConfig::default().depth, 18);
    }

    #[test]
    fn test_two_evaluations_per_move() {
        let mut engine = FlatEvaluator::default();
        let stop = AtomicBool::new(false);
        let analysis = analyzer()
            .analyze(&mut engine, "g.pgn", "1. e4 e5 2. Nf3 *", &stop)
            .unwrap();

        assert_eq!(engine.calls, 6);
        assert_eq!(engine.new_games, 1);
        assert_eq!(analysis.white.total_moves, 2);
        assert_eq!(analysis.black.total_moves, 1);
        assert_eq!(analysis.white.best_moves, 2);
        assert!(analysis.moves.iter().all(|m| !m.is_book()));
    }

    #[test]
    fn test_stop_flag_cancels_before_first_ply() {
        let mut engine = FlatEvaluator::default();
        let stop = AtomicBool::new(true);
        let result = analyzer().analyze(&mut engine, "g.pgn", "1. e4 e5 *", &stop);
        assert!(matches!(result, Err(AnalyzerError::Cancelled)));
        assert_eq!(engine.calls, 0);
    }

    #[test]
    fn test_replay_error_is_reported_before_engine_use() {
        let mut engine = FlatEvaluator::default();
        let stop = AtomicBool::new(false);
        let result = analyzer().analyze(&mut engine, "g.pgn", "1. e5 *", &stop);
        assert!(matches!(result, Err(AnalyzerError::Replay(_))));
        assert_eq!(engine.new_games, 0);
    }

    #[test]
    fn test_analyzer_error_display() {
        let engine_err = AnalyzerError::Engine(EngineError::Launch("stockfish".to_string()));
        let display = format!("{}", engine_err);
        assert!(display.contains("Engine error"));
        assert!(display.contains("stockfish"));

        assert_eq!(AnalyzerError::Cancelled.to_string(), "Analysis cancelled");
    }
}
