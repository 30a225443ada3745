//! Chess opening book lookup.
//!
//! This crate reads opening books in the Polyglot `.bin` format and answers
//! one question: is a given move "theory" in a given position? Positions are
//! identified by their Polyglot Zobrist key, which the caller computes with
//! whatever board representation it uses.

pub mod entry;
pub mod polyglot;

pub use entry::BookMove;
pub use polyglot::{BookError, OpeningBook, PolyglotBook};
