use std::fmt;
use std::sync::OnceLock;

use serde::{Serialize, Serializer};

use crate::cell_key::{col_to_letters, parse_address, parse_column, parse_row, CellKey, CoordEdge, MAX_COLS, MAX_ROWS};

use super::RangeError;

/// Shape of a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeKind {
    /// Bounded on both axes (`A1:B9`)
    Cell,
    /// Whole columns (`A:C`)
    Column,
    /// Whole rows (`1:3`)
    Row,
}

/// One corner of a range. Column ranges carry no row, row ranges no column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeBound {
    pub col: Option<usize>,
    pub row: Option<usize>,
}

impl RangeBound {
    pub fn cell(key: CellKey) -> Self {
        Self { col: Some(key.col), row: Some(key.row) }
    }

    fn in_grid(&self) -> bool {
        self.col.map_or(true, |col| col < MAX_COLS) && self.row.map_or(true, |row| row < MAX_ROWS)
    }

    fn kind(&self) -> Option<RangeKind> {
        match (self.col, self.row) {
            (Some(_), Some(_)) => Some(RangeKind::Cell),
            (Some(_), None) => Some(RangeKind::Column),
            (None, Some(_)) => Some(RangeKind::Row),
            (None, None) => None,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if let Some(addr) = parse_address(s) {
            return Some(Self { col: Some(addr.col), row: Some(addr.row) });
        }
        if let Some((col, _)) = parse_column(s) {
            return Some(Self { col: Some(col), row: None });
        }
        parse_row(s).map(|(row, _)| Self { col: None, row: Some(row) })
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            f.write_str(&col_to_letters(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{}", row + 1)?;
        }
        Ok(())
    }
}

/// A rectangular block of cells, or a run of whole columns or rows.
///
/// Member keys are computed on first use and cached on the instance.
#[derive(Clone)]
pub struct CellRange {
    start: RangeBound,
    end: RangeBound,
    kind: RangeKind,
    keys: OnceLock<Vec<String>>,
}

impl CellRange {
    fn new(start: RangeBound, end: RangeBound) -> Result<Self, RangeError> {
        let kind = start.kind().ok_or_else(|| RangeError::InvalidKey(format!("{start}:{end}")))?;
        if end.kind() != Some(kind) {
            return Err(RangeError::MixedBounds(format!("{start}:{end}")));
        }
        if !start.in_grid() || !end.in_grid() {
            return Err(RangeError::OutOfBounds(format!("{start}:{end}")));
        }
        Ok(Self { start, end, kind, keys: OnceLock::new() })
    }

    /// Parse `A1:B9`, `$A$1:B9`, `A:C`, `1:3`, or a single cell `A1`
    /// (treated as `A1:A1`).
    pub fn from_key(key: &str) -> Result<Self, RangeError> {
        let key = key.trim();
        let invalid = || RangeError::InvalidKey(key.to_string());
        match key.split_once(':') {
            Some((left, right)) => {
                let start = RangeBound::parse(left.trim()).ok_or_else(invalid)?;
                let end = RangeBound::parse(right.trim()).ok_or_else(invalid)?;
                Self::new(start, end)
            }
            None => {
                let cell = CellKey::parse(key).ok_or_else(invalid)?;
                Self::new(RangeBound::cell(cell), RangeBound::cell(cell))
            }
        }
    }

    /// Range spanning two cell keys.
    pub fn from_cells(left: &str, right: &str) -> Result<Self, RangeError> {
        let start = CellKey::parse(left).ok_or_else(|| RangeError::InvalidKey(left.to_string()))?;
        let end = CellKey::parse(right).ok_or_else(|| RangeError::InvalidKey(right.to_string()))?;
        Self::new(RangeBound::cell(start), RangeBound::cell(end))
    }

    pub(crate) fn from_bounds(start: RangeBound, end: RangeBound) -> Result<Self, RangeError> {
        Self::new(start, end)
    }

    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    pub fn start(&self) -> RangeBound {
        self.start
    }

    pub fn end(&self) -> RangeBound {
        self.end
    }

    /// Copy normalised so `start` is the top-left and `end` the bottom-right.
    pub fn square(&self) -> Self {
        let min = |a: Option<usize>, b: Option<usize>| a.zip(b).map(|(a, b)| a.min(b));
        let max = |a: Option<usize>, b: Option<usize>| a.zip(b).map(|(a, b)| a.max(b));
        Self {
            start: RangeBound {
                col: min(self.start.col, self.end.col),
                row: min(self.start.row, self.end.row),
            },
            end: RangeBound {
                col: max(self.start.col, self.end.col),
                row: max(self.start.row, self.end.row),
            },
            kind: self.kind,
            keys: OnceLock::new(),
        }
    }

    /// Display key (`A1:B9`, `A:C`, `1:3`).
    pub fn key(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }

    fn col_span(&self) -> Option<(usize, usize)> {
        let (a, b) = self.start.col.zip(self.end.col)?;
        Some((a.min(b), a.max(b)))
    }

    fn row_span(&self) -> Option<(usize, usize)> {
        let (a, b) = self.start.row.zip(self.end.row)?;
        Some((a.min(b), a.max(b)))
    }

    /// Sorted (column-major), unique member keys.
    ///
    /// Empty for `Column` and `Row` ranges, which have no finite member list.
    pub fn keys(&self) -> &[String] {
        self.keys.get_or_init(|| {
            let (Some((c0, c1)), Some((r0, r1))) = (self.col_span(), self.row_span()) else {
                return Vec::new();
            };
            let Some(count) = (c1 - c0 + 1).checked_mul(r1 - r0 + 1) else {
                return Vec::new();
            };
            let mut keys = Vec::with_capacity(count);
            for col in c0..=c1 {
                for row in r0..=r1 {
                    keys.push(CellKey::new(col, row).to_string());
                }
            }
            keys
        })
    }

    pub fn contains(&self, cell: CellKey) -> bool {
        let in_cols = self.col_span().map_or(true, |(c0, c1)| (c0..=c1).contains(&cell.col));
        let in_rows = self.row_span().map_or(true, |(r0, r1)| (r0..=r1).contains(&cell.row));
        in_cols && in_rows
    }

    /// Membership test by key; anything that is not a cell key is not a member.
    pub fn contains_key(&self, key: &str) -> bool {
        CellKey::parse(key).map_or(false, |cell| self.contains(cell))
    }

    /// The edges of this range the cell sits on, in `N E S W` order.
    /// Unbounded axes have no edges.
    pub fn edge(&self, cell: CellKey) -> Vec<CoordEdge> {
        if !self.contains(cell) {
            return Vec::new();
        }
        let mut edges = Vec::new();
        let rows = self.row_span();
        let cols = self.col_span();
        if rows.map_or(false, |(top, _)| cell.row == top) {
            edges.push(CoordEdge::N);
        }
        if cols.map_or(false, |(_, right)| cell.col == right) {
            edges.push(CoordEdge::E);
        }
        if rows.map_or(false, |(_, bottom)| cell.row == bottom) {
            edges.push(CoordEdge::S);
        }
        if cols.map_or(false, |(left, _)| cell.col == left) {
            edges.push(CoordEdge::W);
        }
        edges
    }
}

impl PartialEq for CellRange {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for CellRange {}

impl fmt::Debug for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellRange")
            .field("key", &self.key())
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl Serialize for CellRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CellKey {
        CellKey::parse(s).unwrap()
    }

    #[test]
    fn test_from_key_kinds() {
        assert_eq!(CellRange::from_key("A1:B9").unwrap().kind(), RangeKind::Cell);
        assert_eq!(CellRange::from_key("$A$1:b$9").unwrap().key(), "A1:B9");
        assert_eq!(CellRange::from_key("A:C").unwrap().kind(), RangeKind::Column);
        assert_eq!(CellRange::from_key("1:3").unwrap().kind(), RangeKind::Row);
        assert_eq!(CellRange::from_key("C3").unwrap().key(), "C3:C3");
        assert!(matches!(CellRange::from_key("A1:C"), Err(RangeError::MixedBounds(_))));
        assert!(CellRange::from_key("A1:").is_err());
        assert!(CellRange::from_key("foo").is_err());
    }

    #[test]
    fn test_out_of_grid_rejected() {
        assert!(CellRange::from_key("A1:XFD1048576").is_ok());
        assert!(CellRange::from_key("B1:ZZZZZZZZZZZZZ1000").is_err());
        assert!(CellRange::from_key("A1:A1048577").is_err());
        assert!(CellRange::from_key("1:2000000").is_err());

        let far = RangeBound { col: Some(MAX_COLS), row: Some(0) };
        let result = CellRange::from_bounds(RangeBound::cell(key("A1")), far);
        assert!(matches!(result, Err(RangeError::OutOfBounds(_))));
    }

    #[test]
    fn test_square() {
        let range = CellRange::from_key("B9:A1").unwrap();
        assert_eq!(range.key(), "B9:A1");
        assert_eq!(range.square().key(), "A1:B9");
        assert_eq!(CellRange::from_key("C:A").unwrap().square().key(), "A:C");
        assert_eq!(CellRange::from_cells("B2", "A1").unwrap().square().key(), "A1:B2");
    }

    #[test]
    fn test_keys_sorted_column_major() {
        let range = CellRange::from_key("B2:A1").unwrap();
        assert_eq!(range.keys(), ["A1", "A2", "B1", "B2"]);
    }

    #[test]
    fn test_keys_cached() {
        let range = CellRange::from_key("A1:A3").unwrap();
        let first = range.keys().as_ptr();
        let second = range.keys().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unbounded_keys_empty() {
        assert!(CellRange::from_key("A:C").unwrap().keys().is_empty());
        assert!(CellRange::from_key("1:3").unwrap().keys().is_empty());
    }

    #[test]
    fn test_contains() {
        let range = CellRange::from_key("B2:C3").unwrap();
        assert!(range.contains(key("B2")));
        assert!(range.contains(key("C3")));
        assert!(!range.contains(key("A1")));
        assert!(range.contains_key("$c$2"));
        assert!(!range.contains_key("B2:C3"));

        let cols = CellRange::from_key("A:B").unwrap();
        assert!(cols.contains(key("B500")));
        assert!(!cols.contains(key("C1")));

        let rows = CellRange::from_key("2:3").unwrap();
        assert!(rows.contains(key("ZZ3")));
        assert!(!rows.contains(key("A1")));
    }

    #[test]
    fn test_edge() {
        let range = CellRange::from_key("A1:C3").unwrap();
        assert_eq!(range.edge(key("A1")), vec![CoordEdge::N, CoordEdge::W]);
        assert!(range.edge(key("B2")).is_empty());
        assert_eq!(range.edge(key("C3")), vec![CoordEdge::E, CoordEdge::S]);
        assert!(range.edge(key("D1")).is_empty());

        let single = CellRange::from_key("B2").unwrap();
        assert_eq!(
            single.edge(key("B2")),
            vec![CoordEdge::N, CoordEdge::E, CoordEdge::S, CoordEdge::W]
        );

        let cols = CellRange::from_key("B:C").unwrap();
        assert_eq!(cols.edge(key("B1")), vec![CoordEdge::W]);
    }
}
