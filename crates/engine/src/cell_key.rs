//! Cell addressing.
//!
//! A `CellKey` is the canonical form of an `A1` style address: `$` anchors
//! stripped and column letters upper-cased. Two spellings of the same cell
//! (`a$1`, `$A1`, `A1`) compare equal once parsed.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Number of addressable columns (`A` to `XFD`).
pub const MAX_COLS: usize = 16_384;

/// Number of addressable rows.
pub const MAX_ROWS: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid cell key: {0}")]
pub struct InvalidKey(pub String);

/// Address of a single cell.
///
/// Ordering is column-major (`A1 < A2 < B1`), which is the order range
/// members are enumerated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    /// Column index (0-based)
    pub col: usize,
    /// Row index (0-based)
    pub row: usize,
}

impl CellKey {
    #[inline]
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// Parse an address such as `A1`, `$b$2` or `AA10`.
    pub fn parse(s: &str) -> Option<Self> {
        parse_address(s.trim()).map(|addr| Self::new(addr.col, addr.row))
    }

    /// Neighbouring cell across the given edge, `None` when it would fall
    /// off the top or left of the grid or overflow the index.
    pub fn sibling(&self, edge: CoordEdge) -> Option<Self> {
        match edge {
            CoordEdge::N => self.row.checked_sub(1).map(|row| Self::new(self.col, row)),
            CoordEdge::S => self.row.checked_add(1).map(|row| Self::new(self.col, row)),
            CoordEdge::W => self.col.checked_sub(1).map(|col| Self::new(col, self.row)),
            CoordEdge::E => self.col.checked_add(1).map(|col| Self::new(col, self.row)),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidKey(s.to_string()))
    }
}

/// Canonical form of a cell key (`$a$1` → `A1`), `None` if it is not a
/// single-cell address.
pub fn canonicalize(key: &str) -> Option<String> {
    CellKey::parse(key).map(|k| k.to_string())
}

/// Canonical form when `key` is a cell address, otherwise the trimmed input
/// unchanged.
pub(crate) fn normalize(key: &str) -> String {
    canonicalize(key).unwrap_or_else(|| key.trim().to_string())
}

/// Edge of a cell or range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CoordEdge {
    N,
    E,
    S,
    W,
}

impl CoordEdge {
    pub fn opposite(self) -> Self {
        match self {
            CoordEdge::N => CoordEdge::S,
            CoordEdge::S => CoordEdge::N,
            CoordEdge::E => CoordEdge::W,
            CoordEdge::W => CoordEdge::E,
        }
    }
}

/// A parsed address with its `$` anchor flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Address {
    pub col: usize,
    pub row: usize,
    pub col_abs: bool,
    pub row_abs: bool,
}

/// Parse `[$]LETTERS[$]DIGITS`. Letters are case-insensitive, rows are 1-based.
pub(crate) fn parse_address(s: &str) -> Option<Address> {
    let mut chars = s.chars().peekable();

    let col_abs = chars.next_if_eq(&'$').is_some();

    let mut col_str = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_alphabetic()) {
        col_str.push(c.to_ascii_uppercase());
    }
    if col_str.is_empty() {
        return None;
    }

    let row_abs = chars.next_if_eq(&'$').is_some();

    let row_str: String = chars.collect();
    if row_str.is_empty() || !row_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row: usize = row_str.parse().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }

    Some(Address {
        col: letters_to_col(&col_str)?,
        row: row - 1,
        col_abs,
        row_abs,
    })
}

/// Parse a column-only reference (`C`, `$C`) → (col, abs).
pub(crate) fn parse_column(s: &str) -> Option<(usize, bool)> {
    let (abs, letters) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    letters_to_col(&letters.to_ascii_uppercase()).map(|col| (col, abs))
}

/// Parse a row-only reference (`3`, `$3`) → (0-based row, abs).
pub(crate) fn parse_row(s: &str) -> Option<(usize, bool)> {
    let (abs, digits) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row: usize = digits.parse().ok()?;
    if row > MAX_ROWS {
        return None;
    }
    row.checked_sub(1).map(|row| (row, abs))
}

/// Convert upper-case column letters to a 0-based index (A=0, Z=25, AA=26).
/// `None` past `XFD`.
fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.len() > 3 {
        return None;
    }
    letters
        .chars()
        .try_fold(0usize, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c as usize - 'A' as usize + 1)
        })
        .and_then(|n| n.checked_sub(1))
        .filter(|col| *col < MAX_COLS)
}

/// Convert column index to letter(s): 0 -> A, 25 -> Z, 26 -> AA, etc.
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col + 1;
    while n > 0 {
        n -= 1;
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    result
}
