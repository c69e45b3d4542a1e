//! Formula calculation.
//!
//! [`calculate`] evaluates one cell against a resolved [`RefsTable`], a value
//! source and a function registry. [`many`] recalculates a batch: the seed
//! cells plus everything that depends on them, in dependency order.
//!
//! [`RefsTable`]: crate::refs::RefsTable

mod calculate;
mod many;

use std::ops::Deref;

use serde::Serialize;

use crate::refs::RefTarget;
use crate::value::CellValue;

pub use calculate::{calculate, CalculateArgs};
pub use many::{many, CellKeys, ManyArgs, ManyResponse};

/// Why a calculation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FuncErrorKind {
    #[serde(rename = "NOT_FORMULA")]
    NotFormula,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "NOT_SUPPORTED/RANGE")]
    NotSupportedRange,
    #[serde(rename = "INVOKE")]
    Invoke,
    #[serde(rename = "CIRCULAR")]
    Circular,
}

/// The cell a [`FuncError`] was raised for, with its raw content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCell {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct FuncError {
    #[serde(rename = "type")]
    pub kind: FuncErrorKind,
    pub message: String,
    pub cell: ErrorCell,
}

impl FuncError {
    pub fn new(kind: FuncErrorKind, message: impl Into<String>, key: &str, value: &str) -> Self {
        Self {
            kind,
            message: message.into(),
            cell: ErrorCell { key: key.to_string(), value: value.to_string() },
        }
    }
}

/// Outcome of calculating one cell. `ok` is false exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncResponse {
    pub ok: bool,
    #[serde(rename = "type")]
    pub target: RefTarget,
    pub cell: String,
    pub formula: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FuncError>,
}

impl FuncResponse {
    pub(crate) fn succeeded(target: RefTarget, cell: &str, formula: &str, data: CellValue) -> Self {
        Self {
            ok: true,
            target,
            cell: cell.to_string(),
            formula: formula.to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub(crate) fn failed(target: RefTarget, cell: &str, formula: &str, error: FuncError) -> Self {
        Self {
            ok: false,
            target,
            cell: cell.to_string(),
            formula: formula.to_string(),
            data: None,
            error: Some(error),
        }
    }
}

/// One entry of a [`ManyResponse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcItem {
    #[serde(flatten)]
    pub response: FuncResponse,
    /// Batch id shared by every item of one [`many`] call
    pub eid: String,
    /// Milliseconds spent on this cell
    pub elapsed: u64,
}

impl Deref for CalcItem {
    type Target = FuncResponse;

    fn deref(&self) -> &FuncResponse {
        &self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_wire_names() {
        let error = FuncError::new(FuncErrorKind::NotSupportedRange, "nope", "A1", "=A1:B2");
        let response = FuncResponse::failed(RefTarget::Range, "A1", "=A1:B2", error);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["type"], "RANGE");
        assert_eq!(json["error"]["type"], "NOT_SUPPORTED/RANGE");
        assert_eq!(json["error"]["cell"]["key"], "A1");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_calc_item_flattens_response() {
        let item = CalcItem {
            response: FuncResponse::succeeded(RefTarget::Func, "A1", "=1+2", CellValue::Number(3.0)),
            eid: "e1".to_string(),
            elapsed: 0,
        };
        assert_eq!(item.data, Some(CellValue::Number(3.0)));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["cell"], "A1");
        assert_eq!(json["data"], 3.0);
        assert_eq!(json["eid"], "e1");
    }
}
