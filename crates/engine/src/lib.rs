pub mod calc;
pub mod cell_key;
pub mod formula;
pub mod range;
pub mod refs;
pub mod value;

pub use calc::{calculate, many, CalcItem, CalculateArgs, FuncError, FuncErrorKind, FuncResponse, ManyArgs, ManyResponse};
pub use cell_key::{CellKey, CoordEdge};
pub use range::{CellRange, CellRangeUnion};
pub use refs::{outgoing, CellSource, CellTable, OutgoingArgs, RefOut, RefOuts, RefTarget, RefsTable};
pub use value::CellValue;

/// Column-major key order. Keys that are not single cells (range keys,
/// names) go last, in string order.
pub(crate) fn compare_keys(a: &str, b: &str) -> std::cmp::Ordering {
    match (CellKey::parse(a), CellKey::parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub(crate) fn sort_keys(keys: &mut [String]) {
    keys.sort_by(|a, b| compare_keys(a, b));
}
