//! Commands sent from the analysing side to the engine.

use crate::UciError;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Start a new game; engines clear their hash tables.
    UciNewGame,
    /// Set up position.
    Position {
        /// Starting FEN, `None` for the standard starting position.
        fen: Option<String>,
        /// Moves played from the starting position, in UCI notation.
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search to this depth.
    pub depth: Option<u32>,
}

impl GoOptions {
    /// Fixed-depth search.
    pub fn depth(depth: u32) -> Self {
        Self { depth: Some(depth) }
    }
}

impl GuiCommand {
    /// Format the command as a single protocol line (without newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(fen) => format!("position fen {}", fen),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(opts) => {
                let mut parts = vec!["go".to_string()];
                if let Some(d) = opts.depth {
                    parts.push(format!("depth {}", d));
                }
                parts.join(" ")
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(GuiCommand::Uci),
            "isready" => Ok(GuiCommand::IsReady),
            "ucinewgame" => Ok(GuiCommand::UciNewGame),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "position" => Self::parse_position(parts),
            "go" => Ok(Self::parse_go(parts)),
            "" => Ok(GuiCommand::Unknown(String::new())),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let fen = match parts.next() {
            Some("startpos") => {
                // Skip ahead to the move list, if any.
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                }
                None
            }
            Some("fen") => {
                let mut fen_parts = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fen_parts.push(part);
                }
                if fen_parts.is_empty() {
                    return Err(UciError::ParseError("Empty FEN".to_string()));
                }
                Some(fen_parts.join(" "))
            }
            Some(other) => {
                return Err(UciError::ParseError(format!(
                    "Expected 'startpos' or 'fen', got '{}'",
                    other
                )));
            }
            None => {
                return Err(UciError::ParseError(
                    "Expected 'startpos' or 'fen'".to_string(),
                ));
            }
        };

        let moves = parts.map(|s| s.to_string()).collect();
        Ok(GuiCommand::Position { fen, moves })
    }

    fn parse_go<'a>(mut parts: impl Iterator<Item = &'a str>) -> Self {
        let mut opts = GoOptions::default();
        // Only depth-limited searches are issued; other limits are ignored.
        while let Some(part) = parts.next() {
            if part == "depth" {
                opts.depth = parts.next().and_then(|d| d.parse().ok());
            }
        }

        GuiCommand::Go(opts)
    }
}
