//! Move quality classification and game analysis.

use crate::replay::{GameRecord, Side};

/// Classification of move quality based on centipawn loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveQuality {
    /// At most 10 cp lost
    Best,
    /// At most 25 cp lost
    Good,
    /// At most 50 cp lost
    Inaccuracy,
    /// At most 100 cp lost
    Mistake,
    /// More than 100 cp lost
    Blunder,
}

impl MoveQuality {
    /// Buckets a centipawn loss. Negative losses count as zero.
    pub fn from_cp_loss(cp_loss: i32) -> Self {
        match cp_loss.max(0) {
            0..=10 => MoveQuality::Best,
            11..=25 => MoveQuality::Good,
            26..=50 => MoveQuality::Inaccuracy,
            51..=100 => MoveQuality::Mistake,
            _ => MoveQuality::Blunder,
        }
    }
}

/// Engine verdict on a move that was not in the opening book.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveScore {
    /// Evaluation before the move, from the mover's point of view.
    pub cp_before: i32,
    /// Evaluation after the move, from the mover's point of view.
    pub cp_after: i32,
    pub cp_loss: i32,
    pub accuracy: f64,
    pub quality: MoveQuality,
}

/// Assessment of a single ply.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAssessment {
    pub ply: usize,
    pub mover: Side,
    pub san: String,
    /// `None` for book moves.
    pub score: Option<MoveScore>,
}

impl MoveAssessment {
    pub fn is_book(&self) -> bool {
        self.score.is_none()
    }
}

/// Per-color summary of a game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameStats {
    pub best_moves: u32,
    pub good_moves: u32,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
    pub book_moves: u32,
    /// Book moves plus scored moves.
    pub total_moves: u32,
    /// Mean accuracy over scored moves, 0.0 when there are none.
    pub accuracy: f64,
}

impl GameStats {
    /// Moves that were scored by the engine.
    pub fn scored_moves(&self) -> u32 {
        self.total_moves - self.book_moves
    }
}

/// Running totals for one color while a game is analyzed.
#[derive(Debug, Clone, Default)]
pub struct StatsTally {
    stats: GameStats,
    accuracy_sum: f64,
}

impl StatsTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_book_move(&mut self) {
        self.stats.book_moves += 1;
        self.stats.total_moves += 1;
    }

    pub fn record(&mut self, score: &MoveScore) {
        match score.quality {
            MoveQuality::Best => self.stats.best_moves += 1,
            MoveQuality::Good => self.stats.good_moves += 1,
            MoveQuality::Inaccuracy => self.stats.inaccuracies += 1,
            MoveQuality::Mistake => self.stats.mistakes += 1,
            MoveQuality::Blunder => self.stats.blunders += 1,
        }
        self.stats.total_moves += 1;
        self.accuracy_sum += score.accuracy;
    }

    pub fn finish(self) -> GameStats {
        let mut stats = self.stats;
        let scored = stats.scored_moves();
        stats.accuracy = if scored == 0 {
            0.0
        } else {
            self.accuracy_sum / f64::from(scored)
        };
        stats
    }
}

/// Complete analysis of a chess game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameAnalysis {
    pub record: GameRecord,
    pub white: GameStats,
    pub black: GameStats,
    /// One entry per ply.
    pub moves: Vec<MoveAssessment>,
}

impl GameAnalysis {
    pub fn stats(&self, side: Side) -> &GameStats {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }
}
