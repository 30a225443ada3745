//! Chess position evaluation types.

use uci::Score;

/// Centipawn value of a mate in one.
pub const MATE_SCORE: i32 = 10_000;

/// Centipawns deducted per extra move needed to deliver mate.
pub const MATE_STEP: i32 = 50;

/// Mate distances beyond this are scored as this distance (1000 cp).
pub const MAX_MATE_DISTANCE: i32 = 181;

/// Represents a chess position evaluation, always from the perspective of
/// the side to move.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Centipawn evaluation (positive = side to move is better).
    Centipawns(i32),
    /// Mate in N full moves (positive = side to move mates, negative = side to
    /// move gets mated). `Mate(0)` is a position where the side to move is
    /// already checkmated.
    Mate(i32),
}

impl Evaluation {
    /// Converts a UCI `score` field.
    pub fn from_uci_score(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }

    /// Returns true for mate scores.
    pub fn is_mate(&self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }

    /// Collapses the evaluation onto the centipawn scale.
    ///
    /// Mate in `n` moves maps to `10000 - 50 * (n - 1)`: mate in 1 is 10000,
    /// mate in 3 is 9900. Being mated mirrors that below zero, and a position
    /// that is already checkmated is -10000.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp,
            Evaluation::Mate(0) => -MATE_SCORE,
            Evaluation::Mate(n) => {
                let distance = n.saturating_abs().min(MAX_MATE_DISTANCE);
                let value = MATE_SCORE - MATE_STEP * (distance - 1);
                if n > 0 {
                    value
                } else {
                    -value
                }
            }
        }
    }
}
