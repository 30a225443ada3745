//! Tab-separated report of analyzed games.
//!
//! The report is append-only: one header line, then one row per game. The
//! first column is the PGN file name, which is also how a later run knows
//! which games are already done.

use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chess_analysis::{GameAnalysis, GameStats};
use thiserror::Error;

/// Column names, in order.
pub const COLUMNS: [&str; 24] = [
    "filename",
    "white_player",
    "black_player",
    "white_elo",
    "black_elo",
    "time_control",
    "opening",
    "result",
    "white_accuracy",
    "white_best_moves",
    "white_good_moves",
    "white_inaccuracies",
    "white_mistakes",
    "white_blunders",
    "white_book_moves",
    "white_total_moves",
    "black_accuracy",
    "black_best_moves",
    "black_good_moves",
    "black_inaccuracies",
    "black_mistakes",
    "black_blunders",
    "black_book_moves",
    "black_total_moves",
];

/// Errors raised while reading or writing the report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ReportError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
        move |source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The header line, without a trailing newline.
pub fn header() -> String {
    COLUMNS.join("\t")
}

/// One game rendered as a report line (without the trailing newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow(String);

impl ReportRow {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&GameAnalysis> for ReportRow {
    fn from(analysis: &GameAnalysis) -> Self {
        let record = &analysis.record;
        let mut fields = vec![
            sanitize(&record.source),
            sanitize(&record.white),
            sanitize(&record.black),
            record.white_rating.to_string(),
            record.black_rating.to_string(),
            record.time_control.to_string(),
            sanitize(&record.opening),
            record.outcome.to_string(),
        ];
        push_stats(&mut fields, &analysis.white);
        push_stats(&mut fields, &analysis.black);
        ReportRow(fields.join("\t"))
    }
}

impl fmt::Display for ReportRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_stats(fields: &mut Vec<String>, stats: &GameStats) {
    fields.push(format!("{:.1}", stats.accuracy));
    for count in [
        stats.best_moves,
        stats.good_moves,
        stats.inaccuracies,
        stats.mistakes,
        stats.blunders,
        stats.book_moves,
        stats.total_moves,
    ] {
        fields.push(count.to_string());
    }
}

/// Replaces characters that would break the row layout.
pub fn sanitize(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

/// Appends rows to the report file.
#[derive(Debug)]
pub struct ReportWriter {
    file: File,
    path: PathBuf,
}

impl ReportWriter {
    /// Opens the report for appending, creating it with a header if needed.
    ///
    /// A file left without a final newline (an interrupted write) gets one
    /// first, so the torn row stays on a line of its own.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(ReportError::io(path))?;

        let len = file.metadata().map_err(ReportError::io(path))?.len();
        if len == 0 {
            file.write_all(format!("{}\n", header()).as_bytes())
                .and_then(|()| file.flush())
                .map_err(ReportError::io(path))?;
        } else {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .and_then(|_| file.read_exact(&mut last))
                .map_err(ReportError::io(path))?;
            if last[0] != b'\n' {
                tracing::warn!("{} ends with a partial row; starting a new line", path.display());
                file.write_all(b"\n").map_err(ReportError::io(path))?;
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one complete row and flushes it.
    pub fn append(&mut self, analysis: &GameAnalysis) -> Result<(), ReportError> {
        let line = format!("{}\n", ReportRow::from(analysis));
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(ReportError::io(&self.path))
    }
}

/// File names already present in the report.
///
/// Rows without the full set of columns are skipped so those games are
/// analyzed again. A missing report yields an empty set.
pub fn load_processed(path: impl AsRef<Path>) -> Result<HashSet<String>, ReportError> {
    let path = path.as_ref();
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(err) => return Err(ReportError::io(path)(err)),
    };

    let mut processed = HashSet::new();
    let mut torn = 0usize;
    for line in content.lines().skip(1) {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != COLUMNS.len() {
            torn += 1;
            continue;
        }
        processed.insert(fields[0].to_string());
    }
    if torn > 0 {
        tracing::warn!("Ignoring {} incomplete rows in {}", torn, path.display());
    }
    Ok(processed)
}
