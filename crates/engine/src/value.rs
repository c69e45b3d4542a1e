//! Raw cell content and evaluation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value stored in a cell or produced by a calculation.
///
/// Serialises untagged, so `Empty` is `null` and `Number(5.0)` is `5.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
    /// Expanded range values, in range order
    Array(Vec<CellValue>),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// A value is a formula iff it is text whose trimmed form starts with `=`.
    pub fn is_formula(&self) -> bool {
        self.as_formula().is_some()
    }

    /// The formula text, trimmed, when this value is a formula.
    pub fn as_formula(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                trimmed.starts_with('=').then_some(trimmed)
            }
            _ => None,
        }
    }

    /// Coerce to a number for arithmetic. Empty is 0, booleans are 1/0 and
    /// text must parse as a number.
    pub fn to_number(&self) -> Result<f64, String> {
        match self {
            CellValue::Number(n) => Ok(*n),
            CellValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) if s.trim().is_empty() => Ok(0.0),
            CellValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Cannot convert '{}' to number", s)),
            CellValue::Empty => Ok(0.0),
            CellValue::Array(items) => match items.as_slice() {
                [single] => single.to_number(),
                _ => Err("Expected a single value but got a range".to_string()),
            },
        }
    }

    /// Number for aggregates: only numbers, booleans and numeric text count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::Empty | CellValue::Array(_) => None,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            CellValue::Empty => String::new(),
            CellValue::Array(items) => items
                .iter()
                .map(CellValue::to_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    pub fn to_bool(&self) -> Result<bool, String> {
        match self {
            CellValue::Boolean(b) => Ok(*b),
            CellValue::Number(n) => Ok(*n != 0.0),
            CellValue::Empty => Ok(false),
            CellValue::Text(s) => {
                let upper = s.trim().to_uppercase();
                if upper == "TRUE" {
                    Ok(true)
                } else if upper == "FALSE" {
                    Ok(false)
                } else {
                    Err(format!("Cannot convert '{}' to boolean", s))
                }
            }
            CellValue::Array(_) => Err("Expected a single value but got a range".to_string()),
        }
    }

    /// Depth-first flattening of nested arrays into scalars.
    pub fn flatten_into(self, out: &mut Vec<CellValue>) {
        match self {
            CellValue::Array(items) => items.into_iter().for_each(|v| v.flatten_into(out)),
            other => out.push(other),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<Vec<CellValue>> for CellValue {
    fn from(items: Vec<CellValue>) -> Self {
        CellValue::Array(items)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Boolean(b),
            Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
            Value::String(s) => CellValue::Text(s),
            Value::Array(items) => CellValue::Array(items.into_iter().map(Into::into).collect()),
            // Objects have no cell representation; keep their JSON text
            Value::Object(_) => CellValue::Text(value.to_string()),
        }
    }
}
