//! Reference graph resolution.
//!
//! [`outgoing`] turns one cell's formula into the ordered list of
//! dependency edges ([`RefOut`]) it reaches, following reference chains
//! through other cells and flagging cycles and unknown names on the edge
//! that found them. [`RefsTable`] collects those lists for a set of cells
//! and derives the reverse (incoming) direction used for recalculation.

mod cache;
mod outgoing;
mod table;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cell_key::normalize;
use crate::formula::{parse, BoxFuture, Expr};
use crate::value::CellValue;

pub use cache::{MemoryCache, RefCache};
pub use outgoing::{outgoing, OutgoingArgs};
pub use table::{incoming, RefsTable};

/// What a dependency edge ends at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefTarget {
    /// Plain data (or a literal formula such as `=5`)
    Value,
    /// A function call or binary expression
    Func,
    /// A range, not expanded
    Range,
    /// A bare reference to another cell
    Ref,
    /// A name that is not a cell or range
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefErrorKind {
    Circular,
    Name,
}

/// Problem discovered while resolving an edge. Always attached to the edge,
/// never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefError {
    #[serde(rename = "type")]
    pub kind: RefErrorKind,
    pub message: String,
    pub path: String,
}

impl RefError {
    pub fn circular(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { kind: RefErrorKind::Circular, message: message.into(), path: path.into() }
    }

    pub fn name(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self { kind: RefErrorKind::Name, message: message.into(), path: path.into() }
    }

    pub fn is_circular(&self) -> bool {
        self.kind == RefErrorKind::Circular
    }
}

/// One outgoing dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefOut {
    pub target: RefTarget,
    /// `/`-joined chain from the origin cell to the target (`A1/A2/B1:B9`)
    pub path: String,
    /// Argument (or flattened operand) index at the origin formula
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RefError>,
}

impl RefOut {
    /// Path segments after the origin.
    pub fn hops(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').skip(1)
    }

    /// The key the origin cell references directly (a cell or range key).
    pub fn first_hop(&self) -> Option<&str> {
        self.hops().next()
    }

    pub fn is_circular(&self) -> bool {
        self.error.as_ref().map_or(false, RefError::is_circular)
    }
}

/// A cell that directly depends on the keyed cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RefIn {
    pub cell: String,
}

/// Resolved edges for one cell. Shared so cached reads hand back the same list.
pub type RefOuts = Arc<Vec<RefOut>>;

/// Source of raw cell content.
pub trait CellSource: Send + Sync {
    /// Raw content stored at `key` (canonical form), `None` when empty.
    fn get_value<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<CellValue>>;
}

/// In-memory [`CellSource`]. Keys are stored canonicalised, so `$A$1` and
/// `a1` address the same entry.
#[derive(Debug, Clone, Default)]
pub struct CellTable {
    cells: FxHashMap<String, CellValue>,
}

impl CellTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<CellValue>,
    {
        let mut table = Self::new();
        for (key, value) in pairs {
            table.set(key.as_ref(), value);
        }
        table
    }

    pub fn set(&mut self, key: &str, value: impl Into<CellValue>) {
        let value = value.into();
        let key = normalize(key);
        if value.is_empty() {
            self.cells.remove(&key);
        } else {
            self.cells.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.get(&normalize(key))
    }

    /// All non-empty keys, sorted column-major.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cells.keys().cloned().collect();
        crate::sort_keys(&mut keys);
        keys
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl CellSource for CellTable {
    fn get_value<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<CellValue>> {
        Box::pin(async move { self.get(key).cloned() })
    }
}

/// Structural type of raw cell content.
///
/// Non-formulas are `Value`. Formulas classify by their root node:
/// a bare cell reference is `Ref`, a range `Range`, a function or binary
/// expression `Func`, a bare name or unparseable text `Unknown`.
pub fn to_ref_target(value: Option<&CellValue>) -> RefTarget {
    match value.and_then(CellValue::as_formula) {
        None => RefTarget::Value,
        Some(formula) => match parse(formula) {
            Ok(expr) => expr_target(&expr),
            Err(_) => RefTarget::Unknown,
        },
    }
}

pub(crate) fn expr_target(expr: &Expr) -> RefTarget {
    match expr {
        Expr::CellRef { .. } => RefTarget::Ref,
        Expr::Range(_) => RefTarget::Range,
        Expr::Function { .. } | Expr::BinaryOp { .. } => RefTarget::Func,
        Expr::Name(_) => RefTarget::Unknown,
        Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Empty => RefTarget::Value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ref_target() {
        let target = |v: CellValue| to_ref_target(Some(&v));
        assert_eq!(to_ref_target(None), RefTarget::Value);
        assert_eq!(target(123.into()), RefTarget::Value);
        assert_eq!(target("1+2".into()), RefTarget::Value);
        assert_eq!(target("=5".into()), RefTarget::Value);
        assert_eq!(target("=A$2".into()), RefTarget::Ref);
        assert_eq!(target("=A1:B9".into()), RefTarget::Range);
        assert_eq!(target("=SUM(1)".into()), RefTarget::Func);
        assert_eq!(target("=A1+1".into()), RefTarget::Func);
        assert_eq!(target("=B".into()), RefTarget::Unknown);
        assert_eq!(target("=SUM(".into()), RefTarget::Unknown);
    }

    #[test]
    fn test_cell_table_normalises_keys() {
        let mut table = CellTable::from_pairs([("$a$1", CellValue::from(1)), ("B2", 2.into())]);
        assert_eq!(table.get("A1"), Some(&CellValue::Number(1.0)));
        assert_eq!(table.keys(), vec!["A1", "B2"]);
        table.set("A1", CellValue::Empty);
        assert!(table.get("A1").is_none());
        assert_eq!(smol::block_on(table.get_value("B2")), Some(CellValue::Number(2.0)));
    }

    #[test]
    fn test_ref_out_hops() {
        let out = RefOut {
            target: RefTarget::Value,
            path: "A1/A2/A3".to_string(),
            param: None,
            error: None,
        };
        assert_eq!(out.first_hop(), Some("A2"));
        assert_eq!(out.hops().collect::<Vec<_>>(), vec!["A2", "A3"]);
        assert!(!out.is_circular());
    }

    #[test]
    fn test_serialize_wire_names() {
        let out = RefOut {
            target: RefTarget::Range,
            path: "A1/A1:B9".to_string(),
            param: Some(1),
            error: Some(RefError::circular("loop", "A1/A1:B9")),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["target"], "RANGE");
        assert_eq!(json["param"], 1);
        assert_eq!(json["error"]["type"], "CIRCULAR");
    }
}
