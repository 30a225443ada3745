//! Book move decoding.

/// A single move from an opening book with its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMove {
    /// The move in UCI notation. Castling keeps the Polyglot convention of
    /// the king capturing its own rook (`e1h1`, `e8a8`).
    pub uci: String,
    /// Weight/frequency of this move (higher = more common).
    pub weight: u16,
}

const PROMOTIONS: [Option<char>; 8] = [
    None,
    Some('n'),
    Some('b'),
    Some('r'),
    Some('q'),
    None,
    None,
    None,
];

impl BookMove {
    /// Creates a new book move with the given UCI notation and weight.
    #[must_use]
    pub fn new(uci: impl Into<String>, weight: u16) -> Self {
        Self {
            uci: uci.into(),
            weight,
        }
    }

    /// Decodes the 16-bit Polyglot move field.
    ///
    /// Bits 0-2 hold the destination file, 3-5 the destination rank, 6-8 the
    /// origin file, 9-11 the origin rank and 12-14 the promotion piece.
    #[must_use]
    pub fn decode(raw: u16, weight: u16) -> Self {
        let to_file = raw & 0x7;
        let to_rank = (raw >> 3) & 0x7;
        let from_file = (raw >> 6) & 0x7;
        let from_rank = (raw >> 9) & 0x7;
        let promotion = PROMOTIONS[usize::from((raw >> 12) & 0x7)];

        let mut uci = String::with_capacity(5);
        uci.push(square_char(from_file, b'a'));
        uci.push(square_char(from_rank, b'1'));
        uci.push(square_char(to_file, b'a'));
        uci.push(square_char(to_rank, b'1'));
        if let Some(piece) = promotion {
            uci.push(piece);
        }

        Self { uci, weight }
    }
}

fn square_char(index: u16, base: u8) -> char {
    // index is masked to 0..8
    char::from(base + index as u8)
}
