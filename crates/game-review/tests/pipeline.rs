//! End-to-end tests of the review pipeline with in-process engines.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chess_analysis::{EngineError, EngineLauncher, EngineTimeouts, Evaluation, Evaluator, SearchPosition};
use game_review::config::ReviewSettings;
use game_review::report::{header, load_processed};
use game_review::{review, ReviewError};

const GOLDEN_PGN: &str = r#"[Event "Casual Rapid game"]
[White "alice"]
[Black "bob"]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "1450"]
[TimeControl "600+5"]
[ECO "C57"]

1. e4 e5 2. Nf3 Nc6 3. Bc4 Nf6 4. Ng5 d5 5. exd5 Na5 1-0
"#;

const GOLDEN_ROW: &str = "golden.pgn\talice\tbob\t1500\t1450\trapid\tC57\t1\t\
                          94.4\t4\t0\t0\t1\t0\t0\t5\t\
                          85.4\t2\t1\t1\t0\t1\t0\t5";

/// Side-to-move evaluation by number of plies played.
const EVALS: [Evaluation; 11] = [
    Evaluation::Centipawns(20),
    Evaluation::Centipawns(-15),
    Evaluation::Centipawns(30),
    Evaluation::Centipawns(-40),
    Evaluation::Centipawns(70),
    Evaluation::Centipawns(-10),
    Evaluation::Centipawns(200),
    Evaluation::Mate(-2),
    Evaluation::Centipawns(100),
    Evaluation::Centipawns(-90),
    Evaluation::Centipawns(95),
];

/// Move that makes the engine time out when it appears in a position.
const CURSED_MOVE: &str = "h2h4";

struct TableEngine {
    poisoned: bool,
}

impl Evaluator for TableEngine {
    fn evaluate(
        &mut self,
        position: &SearchPosition<'_>,
        depth: u32,
    ) -> Result<Evaluation, EngineError> {
        if position.moves.iter().any(|mv| mv == CURSED_MOVE) {
            self.poisoned = true;
            return Err(EngineError::Timeout {
                depth,
                waited: Duration::from_millis(1),
            });
        }
        Ok(EVALS[position.moves.len() % EVALS.len()])
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn close(self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Default)]
struct TableLauncher {
    launches: AtomicUsize,
    broken: bool,
}

impl EngineLauncher for TableLauncher {
    type Session = TableEngine;

    fn launch(&self) -> Result<TableEngine, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(EngineError::Launch("engine not found at /missing".to_string()));
        }
        Ok(TableEngine { poisoned: false })
    }
}

impl EngineLauncher for &TableLauncher {
    type Session = TableEngine;

    fn launch(&self) -> Result<TableEngine, EngineError> {
        (**self).launch()
    }
}

/// Engine that dies mid-game at the same moment a shutdown is requested.
struct InterruptedEngine<'a> {
    stop: &'a AtomicBool,
}

impl Evaluator for InterruptedEngine<'_> {
    fn evaluate(
        &mut self,
        _position: &SearchPosition<'_>,
        _depth: u32,
    ) -> Result<Evaluation, EngineError> {
        self.stop.store(true, Ordering::SeqCst);
        Err(EngineError::Protocol("engine closed its output".to_string()))
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_poisoned(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn close(self) -> Result<(), EngineError> {
        Ok(())
    }
}

struct InterruptedLauncher<'a> {
    stop: &'a AtomicBool,
    launches: AtomicUsize,
}

impl<'a> EngineLauncher for InterruptedLauncher<'a> {
    type Session = InterruptedEngine<'a>;

    fn launch(&self) -> Result<InterruptedEngine<'a>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(InterruptedEngine { stop: self.stop })
    }
}

impl<'a> EngineLauncher for &InterruptedLauncher<'a> {
    type Session = InterruptedEngine<'a>;

    fn launch(&self) -> Result<InterruptedEngine<'a>, EngineError> {
        (**self).launch()
    }
}

fn settings(dir: &Path, workers: usize) -> ReviewSettings {
    ReviewSettings {
        pgn_dir: dir.join("games"),
        engine_path: PathBuf::from("unused"),
        output: dir.join("report.tsv"),
        depth: 8,
        workers,
        book: None,
        timeouts: EngineTimeouts::default(),
    }
}

fn write_games(dir: &Path, games: &[(&str, &str)]) {
    let games_dir = dir.join("games");
    std::fs::create_dir_all(&games_dir).unwrap();
    for (name, pgn) in games {
        std::fs::write(games_dir.join(name), pgn).unwrap();
    }
}

fn sample_games() -> Vec<(&'static str, &'static str)> {
    vec![
        ("golden.pgn", GOLDEN_PGN),
        ("a.pgn", "[White \"carol\"]\n[Black \"dave\"]\n\n1. d4 d5 2. c4 e6 3. Nc3 *"),
        ("b.pgn", "[TimeControl \"1/86400\"]\n\n1. e4 c5 2. Nf3 d6 0-1"),
        ("c.pgn", "[TimeControl \"60\"]\n\n1. c4 e5 2. g3 Nf6 3. Bg2 d5 1/2-1/2"),
        ("d.pgn", "1. Nf3 Nf6 2. g3 g6 3. Bg2 Bg7 4. O-O O-O *"),
    ]
}

fn report_rows(path: &Path) -> BTreeSet<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[test]
fn test_golden_row() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &[("golden.pgn", GOLDEN_PGN)]);
    let settings = settings(dir.path(), 2);
    let stop = AtomicBool::new(false);

    let summary = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert_eq!((summary.total, summary.completed), (1, 1));
    assert!(summary.failed.is_empty());
    assert!(!summary.cancelled);

    let content = std::fs::read_to_string(&settings.output).unwrap();
    assert_eq!(content, format!("{}\n{}\n", header(), GOLDEN_ROW));
}

#[test]
fn test_rerun_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &sample_games());
    let settings = settings(dir.path(), 3);
    let stop = AtomicBool::new(false);

    let first = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert_eq!(first.completed, 5);
    let after_first = std::fs::read_to_string(&settings.output).unwrap();

    let launcher = TableLauncher::default();
    let second = review(&settings, &launcher, &stop).unwrap();
    assert_eq!(second.total, 0);
    assert_eq!(second.completed, 0);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_to_string(&settings.output).unwrap(), after_first);
}

#[cfg(unix)]
#[test]
fn test_file_name_with_tab_is_processed_once() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &[("a\tb.pgn", "1. e4 e5 2. Nf3 Nc6 *")]);
    let settings = settings(dir.path(), 1);
    let stop = AtomicBool::new(false);

    let first = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert_eq!(first.completed, 1);
    let second = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert_eq!(second.total, 0);

    let rows = report_rows(&settings.output);
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(|row| row.starts_with("a b.pgn\t")));
}

#[test]
fn test_worker_count_does_not_change_results() {
    let single = tempfile::tempdir().unwrap();
    let pool = tempfile::tempdir().unwrap();
    write_games(single.path(), &sample_games());
    write_games(pool.path(), &sample_games());
    let stop = AtomicBool::new(false);

    review(&settings(single.path(), 1), TableLauncher::default(), &stop).unwrap();
    review(&settings(pool.path(), 4), TableLauncher::default(), &stop).unwrap();

    let single_rows = report_rows(&single.path().join("report.tsv"));
    assert_eq!(single_rows.len(), 5);
    assert_eq!(single_rows, report_rows(&pool.path().join("report.tsv")));
}

#[test]
fn test_new_games_are_picked_up_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let games = sample_games();
    write_games(dir.path(), &games[..2]);
    let settings = settings(dir.path(), 2);
    let stop = AtomicBool::new(false);

    review(&settings, TableLauncher::default(), &stop).unwrap();
    write_games(dir.path(), &games[2..]);
    let summary = review(&settings, TableLauncher::default(), &stop).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(load_processed(&settings.output).unwrap().len(), 5);
    let content = std::fs::read_to_string(&settings.output).unwrap();
    assert_eq!(content.matches("filename\t").count(), 1);
}

#[test]
fn test_failed_games_are_isolated_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut games = sample_games();
    games.push(("cursed.pgn", "1. e4 e5 2. h4 Nc6 *"));
    games.push(("illegal.pgn", "1. e4 e5 2. Ke3 *"));
    write_games(dir.path(), &games);
    let settings = settings(dir.path(), 1);
    let stop = AtomicBool::new(false);

    let launcher = TableLauncher::default();
    let summary = review(&settings, &launcher, &stop).unwrap();

    assert_eq!(summary.total, 7);
    assert_eq!(summary.completed, 5);
    let failed: BTreeSet<&str> = summary.failed.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(failed, BTreeSet::from(["cursed.pgn", "illegal.pgn"]));
    // The timed-out engine was replaced; the illegal game did not touch it.
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);

    let processed = load_processed(&settings.output).unwrap();
    assert!(!processed.contains("cursed.pgn"));
    assert!(!processed.contains("illegal.pgn"));

    // Failed games are attempted again on the next run.
    let retry = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert_eq!(retry.total, 2);
    assert_eq!(retry.failed.len(), 2);
}

#[test]
fn test_launch_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &sample_games());
    let settings = settings(dir.path(), 3);
    let stop = AtomicBool::new(false);

    let launcher = TableLauncher {
        broken: true,
        ..TableLauncher::default()
    };
    match review(&settings, &launcher, &stop) {
        Err(ReviewError::EngineLaunch(message)) => assert!(message.contains("/missing")),
        other => panic!("Expected EngineLaunch, got {other:?}"),
    }
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
    assert!(report_rows(&settings.output).is_empty());
}

#[test]
fn test_stop_flag_cancels_run() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &sample_games());
    let settings = settings(dir.path(), 2);
    let stop = AtomicBool::new(true);

    let summary = review(&settings, TableLauncher::default(), &stop).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.completed, 0);
    assert!(summary.failed.is_empty());
    assert!(report_rows(&settings.output).is_empty());
}

#[test]
fn test_engine_lost_during_shutdown_is_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &sample_games());
    let settings = settings(dir.path(), 1);
    let stop = AtomicBool::new(false);
    let launcher = InterruptedLauncher {
        stop: &stop,
        launches: AtomicUsize::new(0),
    };

    let summary = review(&settings, &launcher, &stop).unwrap();
    assert!(summary.cancelled);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.completed, 0);
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_games(dir.path(), &[]);
    let summary = review(&settings(dir.path(), 2), TableLauncher::default(), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(summary.total, 0);
    assert!(!dir.path().join("report.tsv").exists());
}
