use std::sync::OnceLock;

use rustc_hash::FxHashSet;

use crate::cell_key::{CellKey, CoordEdge};

use super::{CellRange, RangeError};

/// A set of ranges treated as one shape (eg. a multi-range selection).
#[derive(Debug, Clone)]
pub struct CellRangeUnion {
    ranges: Vec<CellRange>,
    key: OnceLock<String>,
    keys: OnceLock<Vec<String>>,
}

impl CellRangeUnion {
    /// Build from a comma-joined key list (`"A1:B2, C3"`).
    ///
    /// Blank entries are skipped and every range squared; ranges that square
    /// to the same key are kept once.
    pub fn from_key(range_keys: &str) -> Result<Self, RangeError> {
        Self::from_keys(range_keys.trim().split(','))
    }

    pub fn from_keys<I, S>(range_keys: I) -> Result<Self, RangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        let mut ranges = Vec::new();
        for key in range_keys {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let range = CellRange::from_key(key)?.square();
            if seen.insert(range.key()) {
                ranges.push(range);
            }
        }
        Ok(Self { ranges, key: OnceLock::new(), keys: OnceLock::new() })
    }

    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Keys of all ranges, joined with `", "`.
    pub fn key(&self) -> &str {
        self.key.get_or_init(|| {
            self.ranges
                .iter()
                .map(CellRange::key)
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// Unique member keys across all ranges, in range order.
    pub fn keys(&self) -> &[String] {
        self.keys.get_or_init(|| {
            let mut seen = FxHashSet::default();
            self.ranges
                .iter()
                .flat_map(|range| range.keys().iter())
                .filter(|key| seen.insert(key.as_str()))
                .cloned()
                .collect()
        })
    }

    pub fn contains(&self, cell: CellKey) -> bool {
        self.ranges.iter().any(|range| range.contains(cell))
    }

    /// Edges of the combined shape the cell sits on.
    ///
    /// First pass collects each range's own edges for the cell. Second pass
    /// drops an edge when one of the ranges that did not report it continues
    /// past the cell on that side.
    pub fn edge(&self, cell: CellKey) -> Vec<CoordEdge> {
        if !self.contains(cell) {
            return Vec::new();
        }

        let mut within: Vec<(CoordEdge, Vec<usize>)> = Vec::new();
        for (index, range) in self.ranges.iter().enumerate() {
            for edge in range.edge(cell) {
                match within.iter_mut().find(|(e, _)| *e == edge) {
                    Some((_, members)) => members.push(index),
                    None => within.push((edge, vec![index])),
                }
            }
        }

        within
            .into_iter()
            .filter(|(edge, members)| {
                let member_keys: Vec<String> =
                    members.iter().map(|&i| self.ranges[i].key()).collect();
                let suppressed = self
                    .ranges
                    .iter()
                    .filter(|range| !member_keys.contains(&range.key()))
                    .any(|other| {
                        sibling_includes_cell_without_edge(other, cell, *edge)
                            || sibling_includes_opposite_edge(other, cell, *edge)
                    });
                !suppressed
            })
            .map(|(edge, _)| edge)
            .collect()
    }
}

fn sibling_edges(range: &CellRange, cell: CellKey, edge: CoordEdge) -> Option<Vec<CoordEdge>> {
    cell.sibling(edge).map(|sibling| range.edge(sibling))
}

/// The neighbouring cell starts `range` from the far side.
fn sibling_includes_opposite_edge(range: &CellRange, cell: CellKey, edge: CoordEdge) -> bool {
    sibling_edges(range, cell, edge).map_or(false, |edges| edges.contains(&edge.opposite()))
}

/// `range` covers the cell itself and does not end between it and its neighbour.
fn sibling_includes_cell_without_edge(range: &CellRange, cell: CellKey, edge: CoordEdge) -> bool {
    if !range.contains(cell) {
        return false;
    }
    let edges = sibling_edges(range, cell, edge).unwrap_or_default();
    edges.is_empty() || !edges.contains(&edge.opposite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use CoordEdge::{E, N, S, W};

    fn key(s: &str) -> CellKey {
        CellKey::parse(s).unwrap()
    }

    #[test]
    fn test_from_key_dedupes_and_squares() {
        let union = CellRangeUnion::from_key(" B2:A1, C3 ,, B2:A1").unwrap();
        assert_eq!(union.len(), 2);
        assert_eq!(union.key(), "A1:B2, C3:C3");
    }

    #[test]
    fn test_from_key_rejects_bad_entry() {
        assert!(CellRangeUnion::from_key("A1:B2, nope").is_err());
    }

    #[test]
    fn test_keys_unique_across_ranges() {
        let union = CellRangeUnion::from_key("A1:A2, A2:B2").unwrap();
        assert_eq!(union.keys(), ["A1", "A2", "B2"]);
        assert_eq!(union.keys().as_ptr(), union.keys().as_ptr());
    }

    #[test]
    fn test_contains() {
        let union = CellRangeUnion::from_key("A1:A2, C1:C2").unwrap();
        assert!(union.contains(key("A2")));
        assert!(union.contains(key("C1")));
        assert!(!union.contains(key("B1")));
    }

    #[test]
    fn test_edge_single_range() {
        let union = CellRangeUnion::from_key("A1:B2").unwrap();
        assert_eq!(union.edge(key("A1")), vec![N, W]);
        assert_eq!(union.edge(key("B2")), vec![E, S]);
        assert!(union.edge(key("C3")).is_empty());
    }

    #[test]
    fn test_edge_adjoining_ranges() {
        // A1:B2 sits directly left of C1:D2
        let union = CellRangeUnion::from_key("A1:B2, C1:D2").unwrap();
        assert_eq!(union.edge(key("B1")), vec![N]);
        assert_eq!(union.edge(key("C1")), vec![N]);
        assert_eq!(union.edge(key("D2")), vec![E, S]);
    }

    #[test]
    fn test_edge_overlapping_ranges() {
        let union = CellRangeUnion::from_key("A1:B2, B1:C2").unwrap();
        assert_eq!(union.edge(key("B1")), vec![N]);
        assert_eq!(union.edge(key("B2")), vec![S]);
        assert_eq!(union.edge(key("A1")), vec![N, W]);
        assert_eq!(union.edge(key("C2")), vec![E, S]);
    }

    #[test]
    fn test_edge_disjoint_ranges_keep_edges() {
        let union = CellRangeUnion::from_key("A1:A1, C1:C1").unwrap();
        assert_eq!(union.edge(key("A1")), vec![N, E, S, W]);
    }
}
