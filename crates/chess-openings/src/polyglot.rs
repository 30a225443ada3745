//! Polyglot opening book storage and lookup.

use std::path::Path;

use thiserror::Error;

use crate::entry::BookMove;

/// Size in bytes of one Polyglot entry: key u64, move u16, weight u16, learn u32.
pub const ENTRY_SIZE: usize = 16;

/// Errors that can occur when loading an opening book.
#[derive(Debug, Error)]
pub enum BookError {
    /// Failed to read the opening book file.
    #[error("failed to read opening book: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a whole number of 16-byte entries.
    #[error("malformed opening book: {0} bytes is not a multiple of 16")]
    Malformed(usize),
}

/// Position-keyed lookup of established opening moves.
///
/// Implementations must be shareable between worker threads.
pub trait OpeningBook: Send + Sync {
    /// Returns true if `uci` is listed for the position with this Polyglot key.
    fn is_book_move(&self, key: u64, uci: &str) -> bool;
}

/// An in-memory Polyglot book.
///
/// Entries are kept sorted by key so a lookup is a binary search followed by
/// a scan over the entries for that position.
#[derive(Debug, Clone, Default)]
pub struct PolyglotBook {
    entries: Vec<(u64, BookMove)>,
}

impl PolyglotBook {
    /// Creates a new empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a `.bin` book from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BookError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let book = Self::from_bytes(&bytes)?;
        tracing::debug!("Loaded {} book entries from {}", book.len(), path.display());
        Ok(book)
    }

    /// Parses the raw contents of a `.bin` book.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BookError> {
        if bytes.len() % ENTRY_SIZE != 0 {
            return Err(BookError::Malformed(bytes.len()));
        }

        let mut entries: Vec<(u64, BookMove)> = bytes
            .chunks_exact(ENTRY_SIZE)
            .map(|chunk| {
                let mut key = [0u8; 8];
                key.copy_from_slice(&chunk[0..8]);
                let raw_move = u16::from_be_bytes([chunk[8], chunk[9]]);
                let weight = u16::from_be_bytes([chunk[10], chunk[11]]);
                (u64::from_be_bytes(key), BookMove::decode(raw_move, weight))
            })
            .collect();

        // Books are written sorted, but don't rely on it.
        entries.sort_by_key(|(key, _)| *key);

        Ok(Self { entries })
    }

    /// Returns the number of entries in the book.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the book has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up all book moves for a position.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Vec<&BookMove> {
        let start = self.entries.partition_point(|(k, _)| *k < key);
        self.entries[start..]
            .iter()
            .take_while(|(k, _)| *k == key)
            .map(|(_, mv)| mv)
            .collect()
    }
}

impl OpeningBook for PolyglotBook {
    fn is_book_move(&self, key: u64, uci: &str) -> bool {
        self.lookup(key).iter().any(|mv| mv.uci == uci)
    }
}
