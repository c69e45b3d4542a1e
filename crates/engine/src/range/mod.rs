//! Cell ranges and unions of ranges.

mod cell_range;
mod union;

pub use cell_range::{CellRange, RangeBound, RangeKind};
pub use union::CellRangeUnion;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Invalid range key: {0}")]
    InvalidKey(String),
    #[error("Range corners must be the same kind: {0}")]
    MixedBounds(String),
    #[error("Range is outside the grid: {0}")]
    OutOfBounds(String),
}
