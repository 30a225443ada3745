//! Win-probability and move accuracy formulas.
//!
//! These follow the model published by Lichess
//! (<https://lichess.org/page/accuracy>): an evaluation is first mapped to a
//! winning chance, and a move's accuracy decays exponentially with the
//! winning chance it gives away.

/// Evaluations are clamped to this magnitude before conversion.
pub const WIN_PERCENT_CP_LIMIT: i32 = 10_000;

const WIN_PERCENT_SLOPE: f64 = -0.003_682_08;
const ACCURACY_SCALE: f64 = 103.1668;
const ACCURACY_DECAY: f64 = -0.04354;
const ACCURACY_OFFSET: f64 = 3.1669;

/// Winning chance in percent (0-100) for a centipawn evaluation.
///
/// `win_percent(0) == 50`, and the curve is non-decreasing.
pub fn win_percent(cp: i32) -> f64 {
    let cp = f64::from(cp.clamp(-WIN_PERCENT_CP_LIMIT, WIN_PERCENT_CP_LIMIT));
    let winning_chances = 2.0 / (1.0 + (WIN_PERCENT_SLOPE * cp).exp()) - 1.0;
    (50.0 + 50.0 * winning_chances).clamp(0.0, 100.0)
}

/// Accuracy (0-100) of a move given the mover's winning chance before and
/// after playing it.
pub fn move_accuracy(win_percent_before: f64, win_percent_after: f64) -> f64 {
    let win_percent_loss = win_percent_before - win_percent_after;
    let accuracy = ACCURACY_SCALE * (ACCURACY_DECAY * win_percent_loss).exp() - ACCURACY_OFFSET;
    accuracy.clamp(0.0, 100.0)
}
