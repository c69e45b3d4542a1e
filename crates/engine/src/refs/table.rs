use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Serialize, Serializer};

use crate::cell_key::{normalize, CellKey};
use crate::range::CellRange;

use super::{outgoing, CellSource, OutgoingArgs, RefCache, RefError, RefIn, RefOut, RefOuts};

/// Resolved references for a set of cells, both directions.
///
/// # Edge Direction
///
/// ```text
/// out[B] = edges B resolves to        (B depends on the first hop of each)
/// in[A]  = cells whose first hop is A (A is a direct precedent of them)
/// ```
///
/// A range hop registers the dependent on every member of the range. Whole
/// column and row ranges have no finite member list and are kept aside,
/// matched on lookup instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefsTable {
    out: FxHashMap<String, RefOuts>,
    #[serde(rename = "in", serialize_with = "serialize_incoming")]
    incoming: FxHashMap<String, FxHashSet<String>>,
    #[serde(skip)]
    unbounded: Vec<(CellRange, String)>,
}

impl RefsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve outgoing edges for every key and derive the incoming map.
    ///
    /// A key whose own formula fails to parse is logged and left out; the
    /// calculation of that cell reports the parse error itself.
    pub async fn build<I, S>(keys: I, values: &dyn CellSource, cache: Option<&dyn RefCache>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for key in keys {
            let key = normalize(key.as_ref());
            match outgoing(OutgoingArgs { key: &key, values, cache }).await {
                Ok(refs) => table.insert(key, refs),
                Err(err) => log::warn!("Skipping refs for {}: {}", key, err),
            }
        }
        table
    }

    /// Record the outgoing edges of `key`, replacing any earlier entry.
    pub fn insert(&mut self, key: String, refs: RefOuts) {
        self.remove(&key);
        for hop in first_hops(&refs) {
            match CellRange::from_key(hop) {
                Ok(range) if hop.contains(':') => {
                    if range.keys().is_empty() {
                        self.unbounded.push((range, key.clone()));
                    } else {
                        for member in range.keys() {
                            self.add_incoming(member, &key);
                        }
                    }
                }
                _ => self.add_incoming(hop, &key),
            }
        }
        self.out.insert(key, refs);
    }

    /// Drop `key` and every incoming entry it contributed.
    pub fn remove(&mut self, key: &str) -> Option<RefOuts> {
        let refs = self.out.remove(key)?;
        self.incoming.retain(|_, cells| {
            cells.remove(key);
            !cells.is_empty()
        });
        self.unbounded.retain(|(_, cell)| cell != key);
        Some(refs)
    }

    fn add_incoming(&mut self, target: &str, cell: &str) {
        self.incoming.entry(target.to_string()).or_default().insert(cell.to_string());
    }

    pub fn outgoing(&self, key: &str) -> Option<&RefOuts> {
        self.out.get(&normalize(key))
    }

    /// Cells that directly depend on `key`, column-major.
    pub fn incoming(&self, key: &str) -> Vec<RefIn> {
        let key = normalize(key);
        let mut cells: FxHashSet<&str> =
            self.incoming.get(&key).into_iter().flatten().map(String::as_str).collect();
        if let Some(cell) = CellKey::parse(&key) {
            cells.extend(
                self.unbounded
                    .iter()
                    .filter(|(range, _)| range.contains(cell))
                    .map(|(_, dependent)| dependent.as_str()),
            );
        }
        sorted_ins(cells)
    }

    /// First circular error on any outgoing edge of `key`.
    pub fn circular_error(&self, key: &str) -> Option<&RefError> {
        self.outgoing(key)?.iter().filter_map(|r| r.error.as_ref()).find(|e| e.is_circular())
    }

    /// Cells `key` directly depends on. Range hops are expanded to their
    /// members; whole column or row ranges contribute nothing here.
    pub fn precedents(&self, key: &str) -> Vec<String> {
        let Some(refs) = self.outgoing(key) else {
            return Vec::new();
        };
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for hop in first_hops(refs) {
            let members = match CellRange::from_key(hop) {
                Ok(range) if hop.contains(':') => range.keys().to_vec(),
                _ => vec![hop.to_string()],
            };
            for member in members {
                if seen.insert(member.clone()) {
                    out.push(member);
                }
            }
        }
        out
    }

    /// `seeds` plus every cell that transitively depends on one of them.
    pub fn dependents_closure<I, S>(&self, seeds: I) -> FxHashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut visited = FxHashSet::default();
        let mut stack: Vec<String> = seeds.into_iter().map(|s| normalize(s.as_ref())).collect();
        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            for dependent in self.incoming(&key) {
                if !visited.contains(&dependent.cell) {
                    stack.push(dependent.cell);
                }
            }
        }
        visited
    }

    /// Keys of referenced ranges that cover `key`, sorted.
    pub fn ranges_containing(&self, key: &str) -> Vec<String> {
        let Some(cell) = CellKey::parse(key) else {
            return Vec::new();
        };
        let mut found: Vec<String> = self
            .out
            .values()
            .flat_map(|refs| first_hops(refs))
            .filter(|hop| hop.contains(':'))
            .filter_map(|hop| CellRange::from_key(hop).ok())
            .filter(|range| range.contains(cell))
            .map(|range| range.key())
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Keys with an outgoing entry, column-major.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.out.keys().cloned().collect();
        crate::sort_keys(&mut keys);
        keys
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }
}

/// Cells that directly depend on `key`.
pub fn incoming(key: &str, refs: &RefsTable) -> Vec<RefIn> {
    refs.incoming(key)
}

/// Dependents as `RefIn`s, column-major.
fn sorted_ins<'s>(cells: impl IntoIterator<Item = &'s str>) -> Vec<RefIn> {
    let mut keys: Vec<String> = cells.into_iter().map(str::to_string).collect();
    crate::sort_keys(&mut keys);
    keys.into_iter().map(|cell| RefIn { cell }).collect()
}

fn serialize_incoming<S: Serializer>(
    incoming: &FxHashMap<String, FxHashSet<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        incoming
            .iter()
            .map(|(key, cells)| (key, sorted_ins(cells.iter().map(String::as_str)))),
    )
}

fn first_hops(refs: &[RefOut]) -> impl Iterator<Item = &str> {
    refs.iter().filter_map(RefOut::first_hop)
}
