use std::time::Instant;

use cellgraph_config::EngineSettings;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use uuid::Uuid;

use crate::cell_key::{normalize, CellKey};
use crate::formula::FuncRegistry;
use crate::refs::{CellSource, RefsTable};

use super::{calculate, CalcItem, CalculateArgs};

/// Seed cells for [`many`]: one key or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKeys {
    One(String),
    Many(Vec<String>),
}

impl CellKeys {
    fn into_vec(self) -> Vec<String> {
        match self {
            CellKeys::One(key) => vec![key],
            CellKeys::Many(keys) => keys,
        }
    }
}

impl From<&str> for CellKeys {
    fn from(key: &str) -> Self {
        CellKeys::One(key.to_string())
    }
}

impl From<String> for CellKeys {
    fn from(key: String) -> Self {
        CellKeys::One(key)
    }
}

impl From<Vec<String>> for CellKeys {
    fn from(keys: Vec<String>) -> Self {
        CellKeys::Many(keys)
    }
}

impl From<Vec<&str>> for CellKeys {
    fn from(keys: Vec<&str>) -> Self {
        CellKeys::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CellKeys {
    fn from(keys: [&str; N]) -> Self {
        CellKeys::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

pub struct ManyArgs<'a> {
    pub cells: CellKeys,
    pub refs: &'a RefsTable,
    pub values: &'a dyn CellSource,
    pub funcs: &'a dyn FuncRegistry,
    pub settings: &'a EngineSettings,
}

/// Result of a [`many`] batch.
#[derive(Debug, Clone, Serialize)]
pub struct ManyResponse {
    /// False when any item failed
    pub ok: bool,
    pub eid: String,
    /// Wall-clock milliseconds for the whole batch
    pub elapsed: u64,
    /// Items in calculation order
    pub list: Vec<CalcItem>,
    pub map: FxHashMap<String, CalcItem>,
}

/// Recalculate the seed cells and every formula cell depending on them,
/// precedents first.
///
/// A failing cell does not stop the batch; its siblings are still calculated
/// and recorded, only `ok` turns false.
pub async fn many(args: ManyArgs<'_>) -> ManyResponse {
    let started = Instant::now();
    let eid = Uuid::new_v4().to_string();
    let seeds: Vec<String> = args.cells.into_vec().iter().map(|k| normalize(k)).collect();
    log::debug!("calc batch {} started with {} seed(s)", eid, seeds.len());

    let mut cells = Vec::new();
    for key in args.refs.dependents_closure(&seeds) {
        let value = args.values.get_value(&key).await;
        if value.as_ref().map_or(false, |v| v.is_formula()) {
            cells.push(key);
        }
    }
    crate::sort_keys(&mut cells);
    let order = calc_order(&cells, args.refs);

    let mut ok = true;
    let mut list = Vec::with_capacity(order.len());
    for cell in order {
        let cell_started = Instant::now();
        let response = calculate(CalculateArgs {
            cell: &cell,
            refs: args.refs,
            values: args.values,
            funcs: args.funcs,
            settings: args.settings,
        })
        .await;
        if let Some(error) = &response.error {
            ok = false;
            log::warn!("calc {} failed: {}", cell, error);
        }
        list.push(CalcItem {
            response,
            eid: eid.clone(),
            elapsed: cell_started.elapsed().as_millis() as u64,
        });
    }

    let map = list.iter().map(|item| (item.cell.clone(), item.clone())).collect();
    let elapsed = started.elapsed().as_millis() as u64;
    log::debug!("calc batch {} finished: {} cell(s) in {}ms", eid, list.len(), elapsed);
    if let Some(limit) = args.settings.recalc.slow_batch_ms {
        if elapsed > limit {
            log::warn!("calc batch {} took {}ms (limit {}ms)", eid, elapsed, limit);
        }
    }

    ManyResponse { ok, eid, elapsed, list, map }
}

/// Kahn's algorithm over the direct precedents inside `cells`.
///
/// `cells` must be sorted; ready cells are taken smallest key first so the
/// order is stable. Cells left on a cycle are appended in key order.
fn calc_order(cells: &[String], refs: &RefsTable) -> Vec<String> {
    let members: FxHashSet<&str> = cells.iter().map(String::as_str).collect();
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    let mut succs: FxHashMap<String, Vec<&str>> = FxHashMap::default();

    for cell in cells {
        let preds: Vec<String> = refs
            .precedents(cell)
            .into_iter()
            .filter(|p| members.contains(p.as_str()))
            .collect();
        in_degree.insert(cell.as_str(), preds.len());
        for pred in preds {
            succs.entry(pred).or_default().push(cell.as_str());
        }
    }

    // Descending so the smallest key is popped first
    let mut queue: Vec<&str> = cells
        .iter()
        .rev()
        .map(String::as_str)
        .filter(|c| in_degree.get(c) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(cells.len());
    let mut done: FxHashSet<&str> = FxHashSet::default();
    while let Some(cell) = queue.pop() {
        order.push(cell.to_string());
        done.insert(cell);

        let mut ready = Vec::new();
        for &dep in succs.get(cell).map(Vec::as_slice).unwrap_or_default() {
            if let Some(deg) = in_degree.get_mut(dep) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    ready.push(dep);
                }
            }
        }
        ready.sort_by_key(|key| CellKey::parse(key));
        queue.extend(ready.into_iter().rev());
    }

    if order.len() < cells.len() {
        let stuck: Vec<&str> = cells.iter().map(String::as_str).filter(|c| !done.contains(c)).collect();
        log::debug!("calc order: {} cell(s) on a cycle", stuck.len());
        order.extend(stuck.into_iter().map(str::to_string));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::CellTable;
    use crate::value::CellValue;

    fn refs_for(pairs: &[(&str, &str)]) -> RefsTable {
        let table = CellTable::from_pairs(pairs.iter().map(|(k, v)| (*k, CellValue::from(*v))));
        smol::block_on(RefsTable::build(table.keys(), &table, None))
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_order_precedents_first() {
        let refs = refs_for(&[("A1", "=SUM(A2,A3)"), ("A2", "=C1"), ("A3", "=A2 + 2")]);
        assert_eq!(calc_order(&keys(&["A1", "A2", "A3"]), &refs), keys(&["A2", "A3", "A1"]));
    }

    #[test]
    fn test_order_independent_cells_by_key() {
        let refs = refs_for(&[("A2", "=1+1"), ("A1", "=2+2"), ("B1", "=3")]);
        assert_eq!(calc_order(&keys(&["A1", "A2", "B1"]), &refs), keys(&["A1", "A2", "B1"]));
    }

    #[test]
    fn test_order_appends_cycle_members() {
        let refs = refs_for(&[("A1", "=B1"), ("B1", "=A1"), ("C1", "=1+1")]);
        assert_eq!(calc_order(&keys(&["A1", "B1", "C1"]), &refs), keys(&["C1", "A1", "B1"]));
    }

    #[test]
    fn test_cell_keys_from() {
        assert_eq!(CellKeys::from("A1"), CellKeys::One("A1".into()));
        assert_eq!(CellKeys::from(["A1", "A2"]).into_vec(), keys(&["A1", "A2"]));
    }
}
