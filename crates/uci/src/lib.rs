//! UCI (Universal Chess Interface) protocol library.
//!
//! This crate provides types, formatting and parsing for both directions of
//! the UCI protocol used by chess engines.
//!
//! # Commands used by the analyser
//!
//! - `uci` / `uciok` - Initialize engine, get id
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Reset engine state between games
//! - `position startpos|fen <fen> [moves <move>...]` - Set position
//! - `go depth <d>` - Start a fixed-depth search
//! - `info ... score cp|mate ...` / `bestmove` - Search output
//! - `quit` - Exit engine

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, InfoBuilder, Score};

use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `mv` is `(none)` when the side to move has no legal move.
    BestMove { mv: String, ponder: Option<String> },
    /// Anything else (`option ...`, banners, copyright lines).
    Other(String),
}

impl EngineMessage {
    /// Format message for output.
    pub fn to_uci(&self) -> String {
        match self {
            EngineMessage::Id { name, author } => {
                let mut parts = Vec::new();
                if let Some(n) = name {
                    parts.push(format!("id name {}", n));
                }
                if let Some(a) = author {
                    parts.push(format!("id author {}", a));
                }
                parts.join("\n")
            }
            EngineMessage::UciOk => "uciok".to_string(),
            EngineMessage::ReadyOk => "readyok".to_string(),
            EngineMessage::Info(info) => info.to_uci(),
            EngineMessage::BestMove { mv, ponder } => match ponder {
                Some(p) => format!("bestmove {} ponder {}", mv, p),
                None => format!("bestmove {}", mv),
            },
            EngineMessage::Other(raw) => raw.clone(),
        }
    }

    /// Parse one line of engine output.
    ///
    /// Never fails: lines the analyser has no use for become [`EngineMessage::Other`].
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("uciok") => EngineMessage::UciOk,
            Some("readyok") => EngineMessage::ReadyOk,
            Some("info") => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Other(line.to_string()),
            },
            Some("bestmove") => {
                let mv = parts.next().unwrap_or("").to_string();
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(|p| p.to_string()),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            Some("id") => match parts.next() {
                Some("name") => EngineMessage::Id {
                    name: Some(parts.collect::<Vec<_>>().join(" ")),
                    author: None,
                },
                Some("author") => EngineMessage::Id {
                    name: None,
                    author: Some(parts.collect::<Vec<_>>().join(" ")),
                },
                _ => EngineMessage::Other(line.to_string()),
            },
            _ => EngineMessage::Other(line.to_string()),
        }
    }
}

/// Simple UCI engine wrapper for writing engines.
pub struct UciEngine<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> UciEngine<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read and parse the next command from GUI.
    ///
    /// Returns `Ok(None)` once the input is closed.
    pub fn read_command(&mut self) -> Result<Option<GuiCommand>, UciError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        GuiCommand::parse(&line).map(Some)
    }

    /// Send a message to the GUI.
    pub fn send(&mut self, msg: &EngineMessage) -> Result<(), UciError> {
        writeln!(self.writer, "{}", msg.to_uci())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send engine identification.
    pub fn send_id(&mut self, name: &str, author: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Id {
            name: Some(name.to_string()),
            author: Some(author.to_string()),
        })
    }

    /// Send uciok.
    pub fn send_uciok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::UciOk)
    }

    /// Send readyok.
    pub fn send_readyok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::ReadyOk)
    }

    /// Send best move.
    pub fn send_bestmove(&mut self, mv: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::BestMove {
            mv: mv.to_string(),
            ponder: None,
        })
    }

    /// Send search info.
    pub fn send_info(&mut self, info: EngineInfo) -> Result<(), UciError> {
        self.send(&EngineMessage::Info(info))
    }
}

/// Create a UCI engine using stdin/stdout.
pub fn stdio_engine() -> UciEngine<std::io::BufReader<std::io::Stdin>, std::io::Stdout> {
    UciEngine::new(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
}
