//! Game metadata and legal replay of recorded games.
//!
//! The analyzer never touches chess rules directly; it asks a [`RulesEngine`]
//! to turn PGN text into a [`ReplayedGame`], a list of plies each carrying
//! the board before and after the move. [`PgnRules`] is the default
//! implementation on top of `pgn-reader` and `shakmaty`.

use std::fmt;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::zobrist::Zobrist64;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};
use thiserror::Error;

/// Value used for missing player names and opening codes.
pub const UNKNOWN: &str = "unknown";

/// Errors raised while reading or replaying a game.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The input did not contain a game.
    #[error("no game found in input")]
    NoGame,
    /// A move could not be played from the current position.
    #[error("illegal move {san} at ply {ply}: {reason}")]
    IllegalMove {
        ply: usize,
        san: String,
        reason: String,
    },
    /// The `FEN` tag does not describe a legal position.
    #[error("invalid FEN tag: {0}")]
    InvalidFen(String),
    /// The PGN text could not be read.
    #[error("failed to read PGN: {0}")]
    Io(#[from] std::io::Error),
}

/// A player color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// Speed class derived from the `TimeControl` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControlClass {
    Daily,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Unknown,
}

impl TimeControlClass {
    /// Classifies a `TimeControl` tag value such as `600+5` or `1/86400`.
    pub fn from_tag(tag: Option<&str>) -> Self {
        let tag = match tag.map(str::trim) {
            None | Some("") | Some("-") => return TimeControlClass::Unknown,
            Some(tag) => tag,
        };

        if tag.contains('/') {
            return TimeControlClass::Daily;
        }

        let base = tag.split('+').next().unwrap_or_default();
        match base.parse::<u32>() {
            Ok(seconds) if seconds < 180 => TimeControlClass::Bullet,
            Ok(seconds) if seconds <= 300 => TimeControlClass::Blitz,
            Ok(seconds) if seconds <= 3600 => TimeControlClass::Rapid,
            Ok(_) => TimeControlClass::Classical,
            Err(_) => TimeControlClass::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeControlClass::Daily => "daily",
            TimeControlClass::Bullet => "bullet",
            TimeControlClass::Blitz => "blitz",
            TimeControlClass::Rapid => "rapid",
            TimeControlClass::Classical => "classical",
            TimeControlClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TimeControlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    WhiteWin,
    BlackWin,
    Draw,
}

impl GameOutcome {
    /// Reads a `Result` tag. Unfinished or missing results count as a draw.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            Some("1-0") => GameOutcome::WhiteWin,
            Some("0-1") => GameOutcome::BlackWin,
            _ => GameOutcome::Draw,
        }
    }

    /// Result from White's point of view: 1, -1 or 0.
    pub fn score(self) -> i8 {
        match self {
            GameOutcome::WhiteWin => 1,
            GameOutcome::BlackWin => -1,
            GameOutcome::Draw => 0,
        }
    }
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.score())
    }
}

/// Metadata and move list of one input game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    /// File name the game was read from.
    pub source: String,
    pub white: String,
    pub black: String,
    pub white_rating: u32,
    pub black_rating: u32,
    pub time_control: TimeControlClass,
    /// ECO code of the opening.
    pub opening: String,
    pub outcome: GameOutcome,
    /// Moves in SAN, in the order played.
    pub moves: Vec<String>,
}

/// A board as seen by the engine and the opening book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub fen: String,
    /// Polyglot Zobrist key.
    pub book_key: u64,
}

/// One ply of a replayed game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    /// 1-based ply number.
    pub ply: usize,
    pub mover: Side,
    pub san: String,
    /// Standard UCI notation (`e1g1` for short castling).
    pub uci: String,
    /// Polyglot notation, castling written as king takes rook (`e1h1`).
    pub book_uci: String,
    pub before: BoardSnapshot,
    pub after: BoardSnapshot,
}

/// A game replayed move by move.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedGame {
    pub record: GameRecord,
    /// Set when the game starts from a `FEN` tag instead of the initial position.
    pub start_fen: Option<String>,
    pub steps: Vec<ReplayStep>,
}

impl ReplayedGame {
    /// UCI moves of the first `ply_count` plies.
    pub fn uci_prefix(&self, ply_count: usize) -> Vec<String> {
        self.steps
            .iter()
            .take(ply_count)
            .map(|step| step.uci.clone())
            .collect()
    }
}

/// Turns PGN text into a legal move sequence.
pub trait RulesEngine: Send + Sync {
    /// Replays the first game in `pgn`. `source` is recorded as the game's
    /// file name.
    fn replay(&self, source: &str, pgn: &str) -> Result<ReplayedGame, ReplayError>;
}

/// [`RulesEngine`] backed by `pgn-reader` and `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgnRules;

impl PgnRules {
    pub fn new() -> Self {
        Self
    }
}

impl RulesEngine for PgnRules {
    fn replay(&self, source: &str, pgn: &str) -> Result<ReplayedGame, ReplayError> {
        let mut reader = Reader::new(pgn.as_bytes());
        let raw = reader
            .read_game(&mut FirstGameVisitor)?
            .ok_or(ReplayError::NoGame)?;

        let (mut pos, start_fen) = match raw.headers.fen.as_deref() {
            Some(fen) => {
                let pos = parse_fen(fen)?;
                let normalized = fen_of(&pos);
                (pos, Some(normalized))
            }
            None => (Chess::default(), None),
        };

        let mut steps = Vec::with_capacity(raw.moves.len());
        let mut moves = Vec::with_capacity(raw.moves.len());
        for (index, san_plus) in raw.moves.into_iter().enumerate() {
            let ply = index + 1;
            let san = san_plus.to_string();
            let mv = san_plus
                .san
                .to_move(&pos)
                .map_err(|err| ReplayError::IllegalMove {
                    ply,
                    san: san.clone(),
                    reason: err.to_string(),
                })?;

            let mover = Side::from(pos.turn());
            let before = snapshot(&pos);
            let uci = mv.to_uci(CastlingMode::Standard).to_string();
            let book_uci = mv.to_uci(CastlingMode::Chess960).to_string();
            pos.play_unchecked(mv);

            steps.push(ReplayStep {
                ply,
                mover,
                san: san.clone(),
                uci,
                book_uci,
                before,
                after: snapshot(&pos),
            });
            moves.push(san);
        }

        let record = raw.headers.into_record(source, moves);
        Ok(ReplayedGame {
            record,
            start_fen,
            steps,
        })
    }
}

fn parse_fen(text: &str) -> Result<Chess, ReplayError> {
    let fen: Fen = text
        .trim()
        .parse()
        .map_err(|err| ReplayError::InvalidFen(format!("{text}: {err}")))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|err| ReplayError::InvalidFen(format!("{text}: {err}")))
}

fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

fn snapshot(pos: &Chess) -> BoardSnapshot {
    BoardSnapshot {
        fen: fen_of(pos),
        book_key: pos.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0,
    }
}

/// Tags of interest, first occurrence wins.
#[derive(Debug, Default)]
struct Headers {
    white: Option<String>,
    black: Option<String>,
    white_elo: Option<String>,
    black_elo: Option<String>,
    time_control: Option<String>,
    eco: Option<String>,
    result: Option<String>,
    fen: Option<String>,
}

impl Headers {
    fn set(&mut self, key: &[u8], value: RawTag<'_>) {
        let slot = match key {
            b"White" => &mut self.white,
            b"Black" => &mut self.black,
            b"WhiteElo" => &mut self.white_elo,
            b"BlackElo" => &mut self.black_elo,
            b"TimeControl" => &mut self.time_control,
            b"ECO" => &mut self.eco,
            b"Result" => &mut self.result,
            b"FEN" => &mut self.fen,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
    }

    fn into_record(self, source: &str, moves: Vec<String>) -> GameRecord {
        let (white_rating, black_rating) = parse_ratings(
            self.white_elo.as_deref(),
            self.black_elo.as_deref(),
        );
        GameRecord {
            source: source.to_string(),
            white: self.white.unwrap_or_else(|| UNKNOWN.to_string()),
            black: self.black.unwrap_or_else(|| UNKNOWN.to_string()),
            white_rating,
            black_rating,
            time_control: TimeControlClass::from_tag(self.time_control.as_deref()),
            opening: self.eco.unwrap_or_else(|| UNKNOWN.to_string()),
            outcome: GameOutcome::from_tag(self.result.as_deref()),
            moves,
        }
    }
}

/// Both ratings, or zero for both when either is missing or malformed.
fn parse_ratings(white: Option<&str>, black: Option<&str>) -> (u32, u32) {
    let parse = |value: Option<&str>| value.and_then(|v| v.trim().parse::<u32>().ok());
    match (parse(white), parse(black)) {
        (Some(white), Some(black)) => (white, black),
        _ => (0, 0),
    }
}

struct RawGame {
    headers: Headers,
    moves: Vec<SanPlus>,
}

/// Collects the tags and mainline of a single game.
struct FirstGameVisitor;

impl Visitor for FirstGameVisitor {
    type Tags = Headers;
    type Movetext = RawGame;
    type Output = RawGame;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Headers::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        tags.set(key, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(RawGame {
            headers: tags,
            moves: Vec::new(),
        })
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        movetext.moves.push(san);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        movetext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_KEY: u64 = 0x463b_9618_1691_fc9c;
    const AFTER_E4_KEY: u64 = 0x823c_9b50_fd11_4196;

    fn replay(pgn: &str) -> ReplayedGame {
        PgnRules.replay("game.pgn", pgn).unwrap()
    }

    #[test]
    fn test_time_control_classes() {
        let cases = [
            (Some("1/86400"), TimeControlClass::Daily),
            (Some("60"), TimeControlClass::Bullet),
            (Some("179+1"), TimeControlClass::Bullet),
            (Some("180+2"), TimeControlClass::Blitz),
            (Some("300"), TimeControlClass::Blitz),
            (Some("301"), TimeControlClass::Rapid),
            (Some("600+5"), TimeControlClass::Rapid),
            (Some("3600"), TimeControlClass::Rapid),
            (Some("5400+30"), TimeControlClass::Classical),
            (Some("-"), TimeControlClass::Unknown),
            (Some(""), TimeControlClass::Unknown),
            (Some("blitz"), TimeControlClass::Unknown),
            (None, TimeControlClass::Unknown),
        ];
        for (tag, expected) in cases {
            assert_eq!(TimeControlClass::from_tag(tag), expected, "tag {tag:?}");
        }
        assert_eq!(TimeControlClass::Classical.to_string(), "classical");
    }

    #[test]
    fn test_outcome_from_result_tag() {
        assert_eq!(GameOutcome::from_tag(Some("1-0")).score(), 1);
        assert_eq!(GameOutcome::from_tag(Some("0-1")).score(), -1);
        assert_eq!(GameOutcome::from_tag(Some("1/2-1/2")), GameOutcome::Draw);
        assert_eq!(GameOutcome::from_tag(Some("*")), GameOutcome::Draw);
        assert_eq!(GameOutcome::from_tag(None), GameOutcome::Draw);
        assert_eq!(GameOutcome::BlackWin.to_string(), "-1");
    }

    #[test]
    fn test_ratings_fall_back_together() {
        assert_eq!(parse_ratings(Some("1500"), Some("1620")), (1500, 1620));
        assert_eq!(parse_ratings(Some("1500"), Some("?")), (0, 0));
        assert_eq!(parse_ratings(None, Some("1620")), (0, 0));
    }

    #[test]
    fn test_headers_and_defaults() {
        let game = replay("[Result \"0-1\"]\n[TimeControl \"180+2\"]\n\n1. f3 e5 2. g4 Qh4# 0-1\n");
        let record = &game.record;
        assert_eq!(record.source, "game.pgn");
        assert_eq!(record.white, UNKNOWN);
        assert_eq!(record.black, UNKNOWN);
        assert_eq!(record.opening, UNKNOWN);
        assert_eq!((record.white_rating, record.black_rating), (0, 0));
        assert_eq!(record.time_control, TimeControlClass::Blitz);
        assert_eq!(record.outcome, GameOutcome::BlackWin);
        assert_eq!(record.moves, vec!["f3", "e5", "g4", "Qh4#"]);
    }

    #[test]
    fn test_steps_carry_keys_and_moves() {
        let game = replay(
            "[White \"alice\"]\n[Black \"bob\"]\n[WhiteElo \"1510\"]\n[BlackElo \"1498\"]\n[ECO \"B20\"]\n\n1. e4 c5 *\n",
        );
        assert_eq!(game.record.white, "alice");
        assert_eq!(game.record.white_rating, 1510);
        assert_eq!(game.record.opening, "B20");
        assert!(game.start_fen.is_none());

        let first = &game.steps[0];
        assert_eq!(first.ply, 1);
        assert_eq!(first.mover, Side::White);
        assert_eq!(first.uci, "e2e4");
        assert_eq!(first.before.book_key, START_KEY);
        assert_eq!(first.after.book_key, AFTER_E4_KEY);
        assert_eq!(game.steps[1].before, first.after);
        assert_eq!(game.steps[1].mover, Side::Black);
        assert_eq!(game.uci_prefix(1), vec!["e2e4"]);
    }

    #[test]
    fn test_castling_notations() {
        let game = replay("1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O *");
        let castle = game.steps.last().unwrap();
        assert_eq!(castle.san, "O-O");
        assert_eq!(castle.uci, "e1g1");
        assert_eq!(castle.book_uci, "e1h1");
    }

    #[test]
    fn test_variations_are_skipped() {
        let game = replay("1. e4 (1. d4 d5) 1... e5 2. Nf3 *");
        assert_eq!(game.record.moves, vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_fen_start() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1";
        let game = replay(&format!("[FEN \"{fen}\"]\n[SetUp \"1\"]\n\n1. e4 Kd7 *"));
        assert_eq!(game.start_fen.as_deref(), Some(fen));
        assert_eq!(game.steps[0].before.fen, fen);
        assert_eq!(game.steps.len(), 2);
    }

    #[test]
    fn test_illegal_move_is_reported() {
        let err = PgnRules.replay("bad.pgn", "1. e4 e5 2. Ke3 *").unwrap_err();
        match err {
            ReplayError::IllegalMove { ply, san, .. } => {
                assert_eq!(ply, 3);
                assert_eq!(san, "Ke3");
            }
            other => panic!("Expected IllegalMove, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_fen() {
        let err = PgnRules
            .replay("bad.pgn", "[FEN \"not a fen\"]\n\n1. e4 *")
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidFen(_)));
    }

    #[test]
    fn test_empty_input_has_no_game() {
        assert!(matches!(
            PgnRules.replay("empty.pgn", ""),
            Err(ReplayError::NoGame)
        ));
    }
}
