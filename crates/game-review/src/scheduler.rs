//! Distributes PGN files over a pool of engine workers.
//!
//! Each worker is an OS thread that owns one engine session for its whole
//! life and pulls file paths from a shared FIFO queue. Finished games travel
//! back over a channel to the calling thread, which is the only writer of the
//! report.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;

use chess_analysis::{AnalyzerError, EngineLauncher, Evaluator, GameAnalysis, GameAnalyzer};

use crate::report::{sanitize, ReportWriter};
use crate::ReviewError;

/// `*.pgn` files directly inside `dir`, sorted by name.
pub fn discover_games(dir: &Path) -> Result<Vec<PathBuf>, ReviewError> {
    let pattern = format!("{}/*.pgn", glob::Pattern::escape(&dir.to_string_lossy()));
    tracing::debug!("Looking for games matching {}", pattern);

    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(std::io::Error::other)? {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// File name used as the game's key in the report, in the form it is
/// written there.
pub fn source_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());
    sanitize(&name)
}

/// Drops files whose name is already in the report.
pub fn pending_games(files: Vec<PathBuf>, processed: &HashSet<String>) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|path| !processed.contains(&source_name(path)))
        .collect()
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Evaluating,
    Shutdown,
}

/// Messages from workers to the writer.
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker's engine is up.
    Started { worker: usize },
    /// The engine could not be started; the worker has exited.
    LaunchFailed { worker: usize, error: String },
    Completed { worker: usize, analysis: GameAnalysis },
    Failed { worker: usize, file: String, error: String },
}

/// A game that could not be analyzed in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedGame {
    pub file: String,
    pub reason: String,
}

/// Outcome of [`Scheduler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files handed to the run.
    pub total: usize,
    pub completed: usize,
    pub failed: Vec<FailedGame>,
    /// True if the stop flag ended the run early.
    pub cancelled: bool,
}

/// Runs games on a pool of workers.
pub struct Scheduler<L: EngineLauncher> {
    launcher: L,
    analyzer: GameAnalyzer,
    workers: usize,
}

impl<L: EngineLauncher> Scheduler<L> {
    /// `workers` is an upper bound; at least one worker always runs.
    pub fn new(launcher: L, analyzer: GameAnalyzer, workers: usize) -> Self {
        Self {
            launcher,
            analyzer,
            workers: workers.max(1),
        }
    }

    /// Analyzes `files` and appends each finished game to `writer`.
    ///
    /// Games that fail are listed in the summary and left for the next run.
    ///
    /// # Errors
    ///
    /// - [`ReviewError::EngineLaunch`] if no worker could start its engine
    /// - [`ReviewError::Report`] if writing the report fails; the workers are
    ///   stopped first
    pub fn run(
        &self,
        files: Vec<PathBuf>,
        writer: &mut ReportWriter,
        stop: &AtomicBool,
    ) -> Result<RunSummary, ReviewError> {
        let mut summary = RunSummary {
            total: files.len(),
            ..RunSummary::default()
        };
        if files.is_empty() {
            return Ok(summary);
        }

        let worker_count = self.workers.min(files.len());
        tracing::info!(
            "Analysing {} games with {} workers at depth {}",
            files.len(),
            worker_count,
            self.analyzer.config().depth
        );

        let queue = Mutex::new(VecDeque::from(files));
        let (tx, rx) = mpsc::channel();

        let mut started = 0usize;
        let mut launch_errors = Vec::new();
        let mut report_error = None;

        thread::scope(|scope| {
            for id in 0..worker_count {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    Worker::new(id, tx).run(&self.launcher, &self.analyzer, queue, stop)
                });
            }
            drop(tx);

            for event in rx {
                match event {
                    WorkerEvent::Started { worker } => {
                        tracing::debug!("Worker {} ready", worker);
                        started += 1;
                    }
                    WorkerEvent::LaunchFailed { worker, error } => {
                        tracing::warn!("Worker {} could not start its engine: {}", worker, error);
                        launch_errors.push(error);
                    }
                    WorkerEvent::Completed { worker, analysis } => {
                        if report_error.is_some() {
                            continue;
                        }
                        if let Err(err) = writer.append(&analysis) {
                            tracing::error!("Failed to write report, stopping: {}", err);
                            stop.store(true, Ordering::SeqCst);
                            report_error = Some(err);
                            continue;
                        }
                        summary.completed += 1;
                        tracing::info!(
                            "[{}/{}] {} (worker {}): white {:.1}%, black {:.1}%",
                            summary.completed + summary.failed.len(),
                            summary.total,
                            analysis.record.source,
                            worker,
                            analysis.white.accuracy,
                            analysis.black.accuracy
                        );
                    }
                    WorkerEvent::Failed {
                        worker,
                        file,
                        error,
                    } => {
                        tracing::warn!("{} failed on worker {}: {}", file, worker, error);
                        summary.failed.push(FailedGame {
                            file,
                            reason: error,
                        });
                    }
                }
            }
        });

        if let Some(err) = report_error {
            return Err(err.into());
        }
        if started == 0 && summary.completed == 0 {
            let error = launch_errors
                .into_iter()
                .next()
                .unwrap_or_else(|| "no worker started".to_string());
            return Err(ReviewError::EngineLaunch(error));
        }

        summary.cancelled = stop.load(Ordering::SeqCst);
        let remaining = queue.into_inner().unwrap_or_else(PoisonError::into_inner).len();
        if remaining > 0 && !summary.cancelled {
            tracing::warn!("{} games were left unprocessed after engine failures", remaining);
        }
        Ok(summary)
    }
}

/// One worker thread's view of the run.
struct Worker {
    id: usize,
    state: WorkerState,
    events: Sender<WorkerEvent>,
}

impl Worker {
    fn new(id: usize, events: Sender<WorkerEvent>) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            events,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::trace!("Worker {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    fn send(&self, event: WorkerEvent) {
        // The writer only goes away once every worker has finished.
        let _ = self.events.send(event);
    }

    fn launch<L: EngineLauncher>(&mut self, launcher: &L) -> Option<L::Session> {
        match launcher.launch() {
            Ok(session) => Some(session),
            Err(err) => {
                self.transition(WorkerState::Shutdown);
                self.send(WorkerEvent::LaunchFailed {
                    worker: self.id,
                    error: err.to_string(),
                });
                None
            }
        }
    }

    fn run<L: EngineLauncher>(
        mut self,
        launcher: &L,
        analyzer: &GameAnalyzer,
        queue: &Mutex<VecDeque<PathBuf>>,
        stop: &AtomicBool,
    ) {
        let Some(mut session) = self.launch(launcher) else {
            return;
        };
        self.send(WorkerEvent::Started { worker: self.id });

        while !stop.load(Ordering::SeqCst) {
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(path) = next else { break };

            self.transition(WorkerState::Evaluating);
            let file = source_name(&path);
            let result = std::fs::read(&path)
                .map_err(|err| format!("failed to read {}: {err}", path.display()))
                .and_then(|bytes| {
                    let pgn = String::from_utf8_lossy(&bytes);
                    analyzer
                        .analyze(&mut session, &file, &pgn, stop)
                        .map_err(|err| match err {
                            AnalyzerError::Cancelled => String::new(),
                            other => other.to_string(),
                        })
                });
            self.transition(WorkerState::Idle);

            match result {
                Ok(analysis) => self.send(WorkerEvent::Completed {
                    worker: self.id,
                    analysis,
                }),
                Err(_) if stop.load(Ordering::SeqCst) => break,
                Err(error) => {
                    self.send(WorkerEvent::Failed {
                        worker: self.id,
                        file,
                        error,
                    });
                    if session.is_poisoned() {
                        tracing::warn!("Worker {}: restarting engine", self.id);
                        if let Err(err) = session.close() {
                            tracing::warn!("Worker {}: engine shutdown failed: {}", self.id, err);
                        }
                        session = match self.launch(launcher) {
                            Some(session) => session,
                            None => return,
                        };
                    }
                }
            }
        }

        self.transition(WorkerState::Shutdown);
        if let Err(err) = session.close() {
            tracing::warn!("Worker {}: engine shutdown failed: {}", self.id, err);
        }
    }
}
