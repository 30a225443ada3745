//! UCI engine sessions used to evaluate positions.
//!
//! An [`EngineSession`] owns one engine process. A background thread reads
//! the engine's stdout and forwards every line over a channel, so each wait
//! for a reply can be bounded by a deadline while the conversation itself
//! stays strictly request/response.

use std::io::{self, BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use uci::{EngineMessage, GoOptions, GuiCommand, Score};

use crate::Evaluation;

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not be started or did not complete the handshake.
    #[error("failed to launch engine: {0}")]
    Launch(String),
    /// The engine broke the conversation: it exited, closed its output or
    /// answered without a score.
    #[error("engine protocol error: {0}")]
    Protocol(String),
    /// No `bestmove` arrived in time.
    #[error("engine did not finish depth {depth} within {waited:?}")]
    Timeout { depth: u32, waited: Duration },
    /// Waiting for or killing the engine process failed.
    #[error("engine process error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deadlines for each kind of engine reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimeouts {
    /// `uciok` / `readyok`.
    pub handshake: Duration,
    /// Fixed part of the search deadline.
    pub base: Duration,
    /// Added to the search deadline for every ply of depth.
    pub per_depth: Duration,
    /// Time the engine gets to exit after `quit` before it is killed.
    pub shutdown_grace: Duration,
}

impl EngineTimeouts {
    /// Deadline for a `go depth` search.
    pub fn search(&self, depth: u32) -> Duration {
        self.base + self.per_depth * depth
    }
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            base: Duration::from_secs(30),
            per_depth: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// A position to search, given as a start position plus the moves leading
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPosition<'a> {
    /// `None` for the standard initial position.
    pub start_fen: Option<&'a str>,
    /// UCI moves from the start position.
    pub moves: &'a [String],
}

impl SearchPosition<'_> {
    pub fn to_command(&self) -> GuiCommand {
        GuiCommand::Position {
            fen: self.start_fen.map(str::to_string),
            moves: self.moves.to_vec(),
        }
    }
}

/// Something that evaluates positions. Implemented by [`EngineSession`] and
/// by test doubles.
pub trait Evaluator {
    /// Evaluates `position` from the side to move's point of view.
    fn evaluate(
        &mut self,
        position: &SearchPosition<'_>,
        depth: u32,
    ) -> Result<Evaluation, EngineError>;

    /// Resets engine state between games.
    fn new_game(&mut self) -> Result<(), EngineError>;

    /// True once the session can no longer be trusted and should be replaced.
    fn is_poisoned(&self) -> bool;

    /// Shuts the evaluator down.
    fn close(self) -> Result<(), EngineError>
    where
        Self: Sized;
}

/// Opens evaluators, one per worker.
pub trait EngineLauncher: Send + Sync {
    type Session: Evaluator;

    fn launch(&self) -> Result<Self::Session, EngineError>;
}

/// Launches [`EngineSession`]s for an engine binary.
#[derive(Debug, Clone)]
pub struct UciLauncher {
    pub path: PathBuf,
    pub timeouts: EngineTimeouts,
}

impl UciLauncher {
    pub fn new(path: impl Into<PathBuf>, timeouts: EngineTimeouts) -> Self {
        Self {
            path: path.into(),
            timeouts,
        }
    }
}

impl EngineLauncher for UciLauncher {
    type Session = EngineSession;

    fn launch(&self) -> Result<EngineSession, EngineError> {
        EngineSession::open(&self.path, self.timeouts)
    }
}

/// Why a read from the engine produced nothing.
enum ReadFailure {
    TimedOut,
    Closed,
}

/// A running UCI engine process.
pub struct EngineSession {
    process: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    name: String,
    timeouts: EngineTimeouts,
    poisoned: bool,
    closed: bool,
}

impl EngineSession {
    /// Starts the engine and completes the `uci` / `isready` handshake.
    ///
    /// # Errors
    ///
    /// [`EngineError::Launch`] if the binary is missing, cannot be spawned,
    /// or does not acknowledge the handshake within `timeouts.handshake`.
    pub fn open(path: impl AsRef<Path>, timeouts: EngineTimeouts) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut command = Command::new(path);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Terminal signals go to the review process only; engines stop via `quit`.
        #[cfg(unix)]
        command.process_group(0);

        let mut process = command
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => {
                    EngineError::Launch(format!("engine not found at {}", path.display()))
                }
                _ => EngineError::Launch(format!("{}: {err}", path.display())),
            })?;

        let (stdin, stdout) = match (process.stdin.take(), process.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(EngineError::Launch("engine pipes unavailable".to_string()));
            }
        };

        let (tx, lines) = mpsc::channel();
        let reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut session = Self {
            process,
            stdin,
            lines,
            reader: Some(reader),
            name: String::new(),
            timeouts,
            poisoned: false,
            closed: false,
        };

        session
            .handshake()
            .map_err(|err| EngineError::Launch(format!("{}: {err}", path.display())))?;
        tracing::debug!(
            "Engine '{}' ready ({}, pid {})",
            session.name,
            path.display(),
            session.pid()
        );
        Ok(session)
    }

    /// Returns the engine's name as reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id of the engine.
    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci)?;
        let deadline = Instant::now() + self.timeouts.handshake;
        loop {
            match self.read_message(deadline) {
                Ok(EngineMessage::Id {
                    name: Some(name), ..
                }) => self.name = name,
                Ok(EngineMessage::UciOk) => break,
                Ok(_) => {}
                Err(failure) => return Err(self.handshake_failure(failure, "uciok")),
            }
        }
        if self.name.is_empty() {
            self.name = "Unknown Engine".to_string();
        }
        self.wait_ready()
    }

    fn wait_ready(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::IsReady)?;
        let deadline = Instant::now() + self.timeouts.handshake;
        loop {
            match self.read_message(deadline) {
                Ok(EngineMessage::ReadyOk) => return Ok(()),
                Ok(_) => {}
                Err(failure) => return Err(self.handshake_failure(failure, "readyok")),
            }
        }
    }

    fn handshake_failure(&self, failure: ReadFailure, expected: &str) -> EngineError {
        match failure {
            ReadFailure::TimedOut => EngineError::Protocol(format!(
                "no {expected} within {:?}",
                self.timeouts.handshake
            )),
            ReadFailure::Closed => {
                EngineError::Protocol(format!("engine exited before {expected}"))
            }
        }
    }

    fn search(&mut self, position: &SearchPosition<'_>, depth: u32) -> Result<Evaluation, EngineError> {
        self.send(&position.to_command())?;
        self.send(&GuiCommand::Go(GoOptions::depth(depth)))?;

        let waited = self.timeouts.search(depth);
        let deadline = Instant::now() + waited;
        // Bound scores (lowerbound/upperbound) only stand in until an exact one arrives.
        let mut score: Option<(Score, bool)> = None;
        loop {
            match self.read_message(deadline) {
                Ok(EngineMessage::Info(info)) => {
                    if info.multipv.unwrap_or(1) != 1 {
                        continue;
                    }
                    if let Some(new) = info.score {
                        let have_exact = matches!(score, Some((_, false)));
                        if !info.bound || !have_exact {
                            score = Some((new, info.bound));
                        }
                    }
                }
                Ok(EngineMessage::BestMove { mv, .. }) => {
                    return match score {
                        Some((score, _)) => Ok(Evaluation::from_uci_score(score)),
                        None => Err(EngineError::Protocol(format!(
                            "bestmove {mv} without a score"
                        ))),
                    };
                }
                Ok(_) => {}
                Err(ReadFailure::TimedOut) => return Err(EngineError::Timeout { depth, waited }),
                Err(ReadFailure::Closed) => {
                    return Err(EngineError::Protocol(
                        "engine closed its output during search".to_string(),
                    ))
                }
            }
        }
    }

    fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        let line = command.to_uci();
        tracing::trace!("> {}", line);
        writeln!(self.stdin, "{}", line)
            .and_then(|()| self.stdin.flush())
            .map_err(|err| EngineError::Protocol(format!("failed to write to engine: {err}")))
    }

    fn read_message(&self, deadline: Instant) -> Result<EngineMessage, ReadFailure> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(timeout) {
            Ok(line) => {
                tracing::trace!("< {}", line);
                Ok(EngineMessage::parse(&line))
            }
            Err(RecvTimeoutError::Timeout) => Err(ReadFailure::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(ReadFailure::Closed),
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // The engine may already be gone.
        let _ = self.send(&GuiCommand::Quit);
        let exited = self.wait_for_exit();
        let killed = match exited {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    "Engine '{}' ignored quit for {:?}, killing it",
                    self.name,
                    self.timeouts.shutdown_grace
                );
                self.process
                    .kill()
                    .and_then(|()| self.process.wait().map(|_| ()))
                    .map_err(EngineError::from)
            }
            Err(err) => {
                let _ = self.process.kill();
                Err(err)
            }
        };

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        killed
    }

    fn wait_for_exit(&mut self) -> Result<bool, EngineError> {
        let deadline = Instant::now() + self.timeouts.shutdown_grace;
        loop {
            if self.process.try_wait()?.is_some() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Evaluator for EngineSession {
    fn evaluate(
        &mut self,
        position: &SearchPosition<'_>,
        depth: u32,
    ) -> Result<Evaluation, EngineError> {
        let result = self.search(position, depth);
        self.poison_on_error(result)
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        let result = self
            .send(&GuiCommand::UciNewGame)
            .and_then(|()| self.wait_ready());
        self.poison_on_error(result)
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn close(mut self) -> Result<(), EngineError> {
        self.shutdown()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
