//! Outgoing reference resolution.
//!
//! Depth-first walk over the reference graph, materialised lazily from the
//! [`CellSource`]. Cycle detection compares against the current path only,
//! so the same cell may appear on two independent branches.
//!
//! # Edge rules
//!
//! ```text
//! top level     =A2           → edges of A2, param None
//!               =SUM(a, b)    → edges of each argument, param = argument index
//!               =a + b * c    → edges of each flattened operand, param = operand index
//! cell K        K on path     → one edge path/K, CIRCULAR
//!               K plain value → VALUE path/K
//!               K is =REF     → keep walking (chains are transparent)
//!               K is =FUNC    → FUNC path/K, internals walked for errors only
//! range R                     → RANGE path/R, CIRCULAR when R covers a path cell
//! name N                      → UNKNOWN path/N, NAME error
//! ```

use std::sync::Arc;

use crate::cell_key::{normalize, CellKey};
use crate::formula::parser::format_expr_inner;
use crate::formula::{parse, BoxFuture, Expr, ParseError, RangeRef};

use super::{expr_target, to_ref_target, CellSource, RefCache, RefError, RefOut, RefOuts, RefTarget};

pub struct OutgoingArgs<'a> {
    pub key: &'a str,
    pub values: &'a dyn CellSource,
    pub cache: Option<&'a dyn RefCache>,
}

/// Resolve the ordered outgoing edges of one cell.
///
/// Non-formula cells have no edges. Only a malformed formula in the cell
/// itself is an error; problems further along are attached to edges.
pub async fn outgoing(args: OutgoingArgs<'_>) -> Result<RefOuts, ParseError> {
    let key = normalize(args.key);

    if let Some(cache) = args.cache {
        if let Some(hit) = cache.get(&key) {
            log::debug!("refs cache hit for {}", key);
            return Ok(hit);
        }
    }

    let value = args.values.get_value(&key).await;
    let refs = match value.as_ref().and_then(|v| v.as_formula()) {
        None => Vec::new(),
        Some(formula) => {
            let expr = parse(formula)?;
            let resolver = Resolver { values: args.values };
            resolver.root(&key, &expr).await
        }
    };

    let refs = Arc::new(refs);
    if let Some(cache) = args.cache {
        cache.put(&key, refs.clone());
    }
    Ok(refs)
}

struct Resolver<'a> {
    values: &'a dyn CellSource,
}

impl<'a> Resolver<'a> {
    async fn root(&self, origin: &str, expr: &Expr) -> Vec<RefOut> {
        let path = vec![origin.to_string()];
        let mut out = Vec::new();
        match expr {
            Expr::Function { args, .. } => {
                for (index, arg) in args.iter().enumerate() {
                    out.extend(self.resolve(arg, &path, Some(index)).await);
                }
            }
            Expr::BinaryOp { .. } => {
                let mut operands = Vec::new();
                flatten_operands(expr, &mut operands);
                for (index, operand) in operands.into_iter().enumerate() {
                    out.extend(self.resolve(operand, &path, Some(index)).await);
                }
            }
            _ => out.extend(self.resolve(expr, &path, None).await),
        }
        out
    }

    /// Edges reachable from `expr`, evaluated against `path`.
    fn resolve<'b>(
        &'b self,
        expr: &'b Expr,
        path: &'b [String],
        param: Option<usize>,
    ) -> BoxFuture<'b, Vec<RefOut>> {
        Box::pin(async move {
            match expr {
                Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Empty => Vec::new(),
                Expr::CellRef { col, row, .. } => {
                    let key = CellKey::new(*col, *row).to_string();
                    self.resolve_cell(key, path, param, false).await
                }
                Expr::Range(range) => vec![range_edge(range, path, param)],
                Expr::Name(name) => vec![name_edge(name, path, param)],
                Expr::Function { args, .. } => {
                    let mut out = Vec::new();
                    for arg in args {
                        out.extend(self.resolve(arg, path, param).await);
                    }
                    out
                }
                Expr::BinaryOp { left, right, .. } => {
                    let mut out = self.resolve(left, path, param).await;
                    out.extend(self.resolve(right, path, param).await);
                    out
                }
            }
        })
    }

    /// Hop into cell `key`. `via_ref` is set when the hop continues a chain
    /// of bare references; a cycle closed that way is reported as `REF`.
    fn resolve_cell<'b>(
        &'b self,
        key: String,
        path: &'b [String],
        param: Option<usize>,
        via_ref: bool,
    ) -> BoxFuture<'b, Vec<RefOut>> {
        Box::pin(async move {
            let value = self.values.get_value(&key).await;
            let circular = path.contains(&key);
            let mut next = path.to_vec();
            next.push(key);
            let next_path = next.join("/");
            log::trace!("refs hop {}", next_path);

            if circular {
                let message = format!("Circular reference ({})", next_path);
                let target = if via_ref { RefTarget::Ref } else { to_ref_target(value.as_ref()) };
                return vec![RefOut {
                    target,
                    path: next_path.clone(),
                    param,
                    error: Some(RefError::circular(message, next_path)),
                }];
            }

            let Some(formula) = value.as_ref().and_then(|v| v.as_formula()) else {
                return vec![edge(RefTarget::Value, next_path, param, None)];
            };

            let expr = match parse(formula) {
                Ok(expr) => expr,
                Err(err) => {
                    let error = RefError::name(err.message, next_path.clone());
                    return vec![edge(RefTarget::Unknown, next_path, param, Some(error))];
                }
            };

            match &expr {
                Expr::CellRef { col, row, .. } => {
                    let target = CellKey::new(*col, *row).to_string();
                    self.resolve_cell(target, &next, param, true).await
                }
                Expr::Range(_) | Expr::Name(_) => self.resolve(&expr, &next, param).await,
                Expr::Function { .. } | Expr::BinaryOp { .. } => {
                    // Stop at the function; its internals only contribute errors
                    let error = self
                        .resolve(&expr, &next, param)
                        .await
                        .into_iter()
                        .find_map(|out| out.error);
                    vec![edge(expr_target(&expr), next_path, param, error)]
                }
                Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Empty => {
                    vec![edge(RefTarget::Value, next_path, param, None)]
                }
            }
        })
    }
}

fn edge(target: RefTarget, path: String, param: Option<usize>, error: Option<RefError>) -> RefOut {
    RefOut { target, path, param, error }
}

/// Leaves of a binary expression tree, left to right.
fn flatten_operands<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            flatten_operands(left, out);
            flatten_operands(right, out);
        }
        other => out.push(other),
    }
}

fn range_edge(range: &RangeRef, path: &[String], param: Option<usize>) -> RefOut {
    let range_key = match range.to_range() {
        Ok(range) => range,
        Err(err) => {
            let written = format_expr_inner(&Expr::Range(*range));
            let next_path = format!("{}/{}", path.join("/"), written);
            let error = RefError::name(err.to_string(), next_path.clone());
            return edge(RefTarget::Unknown, next_path, param, Some(error));
        }
    };
    let next_path = format!("{}/{}", path.join("/"), range_key.key());
    let loops_back = path
        .iter()
        .filter_map(|key| CellKey::parse(key))
        .any(|cell| range_key.contains(cell));
    let error = loops_back.then(|| {
        RefError::circular(
            format!("Range contains a cell that leads back to itself ({})", next_path),
            next_path.clone(),
        )
    });
    edge(RefTarget::Range, next_path, param, error)
}

fn name_edge(name: &str, path: &[String], param: Option<usize>) -> RefOut {
    let next_path = format!("{}/{}", path.join("/"), name);
    let error = RefError::name(format!("Unknown range: {}", name), next_path.clone());
    edge(RefTarget::Unknown, next_path, param, Some(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::{CellTable, MemoryCache};
    use crate::value::CellValue;

    fn resolve(table: &CellTable, key: &str) -> RefOuts {
        smol::block_on(outgoing(OutgoingArgs { key, values: table, cache: None })).unwrap()
    }

    #[test]
    fn test_flatten_operands_order() {
        let expr = parse("=A4 + A2 / (8 + A3 - A5 * 2 +A2)").unwrap();
        let mut leaves = Vec::new();
        flatten_operands(&expr, &mut leaves);
        let printed: Vec<String> = leaves
            .iter()
            .map(|e| format_expr_inner(e))
            .collect();
        assert_eq!(printed, vec!["A4", "A2", "8", "A3", "A5", "2", "A2"]);
    }

    #[test]
    fn test_key_is_canonicalised() {
        let table = CellTable::from_pairs([("A1", CellValue::from("=A2")), ("A2", 1.into())]);
        let refs = resolve(&table, "$a$1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, "A1/A2");
    }

    #[test]
    fn test_literal_formula_target_is_value() {
        let table = CellTable::from_pairs([("A1", CellValue::from("=A2")), ("A2", "=5".into())]);
        let refs = resolve(&table, "A1");
        assert_eq!(refs[0].target, RefTarget::Value);
        assert_eq!(refs[0].path, "A1/A2");
    }

    #[test]
    fn test_unparseable_target_is_unknown() {
        let table = CellTable::from_pairs([("A1", CellValue::from("=A2")), ("A2", "=SUM(".into())]);
        let refs = resolve(&table, "A1");
        assert_eq!(refs[0].target, RefTarget::Unknown);
        assert_eq!(refs[0].error.as_ref().map(|e| e.kind), Some(super::super::RefErrorKind::Name));
    }

    #[test]
    fn test_origin_parse_error_propagates() {
        let table = CellTable::from_pairs([("A1", CellValue::from("=SUM(1,"))]);
        let err = smol::block_on(outgoing(OutgoingArgs { key: "A1", values: &table, cache: None }));
        assert!(err.is_err());
    }

    #[test]
    fn test_non_formula_results_are_cached() {
        let table = CellTable::from_pairs([("A1", CellValue::from(1))]);
        let cache = MemoryCache::new();
        let args = || OutgoingArgs { key: "A1", values: &table, cache: Some(&cache) };
        let first = smol::block_on(outgoing(args())).unwrap();
        let second = smol::block_on(outgoing(args())).unwrap();
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&first, &second));
    }
}
