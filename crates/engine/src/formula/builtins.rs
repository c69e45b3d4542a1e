// Built-in `sys` functions: SUM, AVERAGE, MIN, MAX, COUNT, PRODUCT, ABS, ROUND,
// CONCAT, IF and the functions binary operators map onto (ADD, SUBTRACT, ...)

use std::cmp::Ordering;

use super::func::{InvokeError, Registry};
use crate::value::CellValue;

pub const SYS: &str = "sys";

pub(crate) fn register(registry: &mut Registry) {
    // Aggregates
    registry.register_fn(SYS, "SUM", |p| Ok(CellValue::Number(collect_numbers(p).iter().sum())));
    registry.register_fn(SYS, "AVERAGE", average);
    registry.register_fn(SYS, "MIN", |p| {
        let vals = collect_numbers(p);
        Ok(CellValue::Number(if vals.is_empty() { 0.0 } else { vals.iter().cloned().fold(f64::INFINITY, f64::min) }))
    });
    registry.register_fn(SYS, "MAX", |p| {
        let vals = collect_numbers(p);
        Ok(CellValue::Number(if vals.is_empty() { 0.0 } else { vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max) }))
    });
    registry.register_fn(SYS, "COUNT", |p| Ok(CellValue::Number(collect_numbers(p).len() as f64)));
    registry.register_fn(SYS, "PRODUCT", |p| {
        let vals = collect_numbers(p);
        Ok(CellValue::Number(if vals.is_empty() { 0.0 } else { vals.iter().product() }))
    });

    // Math
    registry.register_fn(SYS, "ABS", |p| {
        let [x] = exact::<1>("ABS", p)?;
        Ok(CellValue::Number(x.to_number()?.abs()))
    });
    registry.register_fn(SYS, "ROUND", round);

    // Text / logic
    registry.register_fn(SYS, "CONCAT", |p| {
        let mut flat = Vec::new();
        for v in p.iter().cloned() {
            v.flatten_into(&mut flat);
        }
        Ok(CellValue::Text(flat.iter().map(CellValue::to_text).collect()))
    });
    registry.register_fn(SYS, "IF", |p| {
        if p.is_empty() || p.len() > 3 {
            return Err(InvokeError::new("IF requires 1 to 3 arguments"));
        }
        let branch = if p[0].to_bool()? { p.get(1) } else { p.get(2) };
        Ok(branch.cloned().unwrap_or(CellValue::Boolean(false)))
    });

    // Operator functions
    registry.register_fn(SYS, "ADD", |p| arithmetic("ADD", p, |a, b| Ok(a + b)));
    registry.register_fn(SYS, "SUBTRACT", |p| arithmetic("SUBTRACT", p, |a, b| Ok(a - b)));
    registry.register_fn(SYS, "MULTIPLY", |p| arithmetic("MULTIPLY", p, |a, b| Ok(a * b)));
    registry.register_fn(SYS, "DIVIDE", |p| {
        arithmetic("DIVIDE", p, |a, b| {
            if b == 0.0 {
                Err(InvokeError::new("Division by zero"))
            } else {
                Ok(a / b)
            }
        })
    });
    registry.register_fn(SYS, "POWER", |p| {
        arithmetic("POWER", p, |a, b| {
            let result = a.powf(b);
            if result.is_finite() {
                Ok(result)
            } else {
                Err(InvokeError::new(format!("{a}^{b} is not a finite number")))
            }
        })
    });
    registry.register_fn(SYS, "EQ", |p| comparison("EQ", p, |o| o == Ordering::Equal));
    registry.register_fn(SYS, "NE", |p| comparison("NE", p, |o| o != Ordering::Equal));
    registry.register_fn(SYS, "LT", |p| comparison("LT", p, |o| o == Ordering::Less));
    registry.register_fn(SYS, "GT", |p| comparison("GT", p, |o| o == Ordering::Greater));
    registry.register_fn(SYS, "LTE", |p| comparison("LTE", p, |o| o != Ordering::Greater));
    registry.register_fn(SYS, "GTE", |p| comparison("GTE", p, |o| o != Ordering::Less));
}

/// Numbers across all params, ranges flattened. Empty cells and non-numeric
/// text are skipped.
fn collect_numbers(params: &[CellValue]) -> Vec<f64> {
    let mut flat = Vec::new();
    for v in params.iter().cloned() {
        v.flatten_into(&mut flat);
    }
    flat.iter().filter_map(CellValue::as_number).collect()
}

fn exact<'a, const N: usize>(name: &str, params: &'a [CellValue]) -> Result<&'a [CellValue; N], InvokeError> {
    params.try_into().map_err(|_| {
        InvokeError::new(format!("{name} requires exactly {N} argument{}", if N == 1 { "" } else { "s" }))
    })
}

fn average(params: &[CellValue]) -> Result<CellValue, InvokeError> {
    let vals = collect_numbers(params);
    if vals.is_empty() {
        return Err(InvokeError::new("AVERAGE requires at least one value"));
    }
    Ok(CellValue::Number(vals.iter().sum::<f64>() / vals.len() as f64))
}

fn round(params: &[CellValue]) -> Result<CellValue, InvokeError> {
    let (value, digits) = match params {
        [value] => (value.to_number()?, 0),
        [value, digits] => (value.to_number()?, digits.to_number()? as i32),
        _ => return Err(InvokeError::new("ROUND requires 1 or 2 arguments")),
    };
    let factor = 10f64.powi(digits);
    Ok(CellValue::Number((value * factor).round() / factor))
}

fn arithmetic<F>(name: &str, params: &[CellValue], op: F) -> Result<CellValue, InvokeError>
where
    F: Fn(f64, f64) -> Result<f64, InvokeError>,
{
    let [left, right] = exact::<2>(name, params)?;
    op(left.to_number()?, right.to_number()?).map(CellValue::Number)
}

fn comparison<F>(name: &str, params: &[CellValue], test: F) -> Result<CellValue, InvokeError>
where
    F: Fn(Ordering) -> bool,
{
    let [left, right] = exact::<2>(name, params)?;
    Ok(CellValue::Boolean(test(compare(left, right))))
}

/// Numbers compare numerically when both sides coerce, otherwise as
/// case-insensitive text.
fn compare(left: &CellValue, right: &CellValue) -> Ordering {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => left.to_text().to_lowercase().cmp(&right.to_text().to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, params: Vec<CellValue>) -> Result<CellValue, InvokeError> {
        let registry = Registry::with_builtins();
        let func = registry.get(SYS, name).unwrap();
        smol::block_on(func.invoke(params))
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    #[test]
    fn test_sum_flattens_ranges_and_skips_empty() {
        let range = CellValue::Array(vec![num(6.0), num(5.0), num(3.0), CellValue::Empty]);
        assert_eq!(call("SUM", vec![range]), Ok(num(14.0)));
        assert_eq!(call("SUM", vec![num(1.0), "2".into(), "x".into()]), Ok(num(3.0)));
        assert_eq!(call("SUM", vec![]), Ok(num(0.0)));
    }

    #[test]
    fn test_average_min_max_count_product() {
        let vals = vec![num(2.0), num(4.0), CellValue::Empty];
        assert_eq!(call("AVERAGE", vals.clone()), Ok(num(3.0)));
        assert_eq!(call("MIN", vals.clone()), Ok(num(2.0)));
        assert_eq!(call("MAX", vals.clone()), Ok(num(4.0)));
        assert_eq!(call("COUNT", vals.clone()), Ok(num(2.0)));
        assert_eq!(call("PRODUCT", vals), Ok(num(8.0)));
        assert!(call("AVERAGE", vec![CellValue::Empty]).is_err());
    }

    #[test]
    fn test_abs_round() {
        assert_eq!(call("ABS", vec![num(-3.0)]), Ok(num(3.0)));
        assert!(call("ABS", vec![]).is_err());
        assert_eq!(call("ROUND", vec![num(2.346), num(2.0)]), Ok(num(2.35)));
        assert_eq!(call("ROUND", vec![num(2.5)]), Ok(num(3.0)));
    }

    #[test]
    fn test_arithmetic_operators() {
        assert_eq!(call("ADD", vec![num(5.0), num(2.0)]), Ok(num(7.0)));
        assert_eq!(call("SUBTRACT", vec![num(5.0), num(2.0)]), Ok(num(3.0)));
        assert_eq!(call("MULTIPLY", vec!["3".into(), num(2.0)]), Ok(num(6.0)));
        assert_eq!(call("ADD", vec![CellValue::Empty, num(1.0)]), Ok(num(1.0)));
        assert_eq!(call("POWER", vec![num(2.0), num(3.0)]), Ok(num(8.0)));
    }

    #[test]
    fn test_arithmetic_errors() {
        let err = call("DIVIDE", vec![num(1.0), num(0.0)]).unwrap_err();
        assert_eq!(err.message, "Division by zero");
        assert!(call("ADD", vec!["abc".into(), num(1.0)]).is_err());
        assert!(call("ADD", vec![num(1.0)]).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("EQ", vec![num(1.0), "1".into()]), Ok(CellValue::Boolean(true)));
        assert_eq!(call("EQ", vec!["abc".into(), "ABC".into()]), Ok(CellValue::Boolean(true)));
        assert_eq!(call("LT", vec![num(1.0), num(2.0)]), Ok(CellValue::Boolean(true)));
        assert_eq!(call("GTE", vec![num(1.0), num(2.0)]), Ok(CellValue::Boolean(false)));
        assert_eq!(call("NE", vec!["a".into(), "b".into()]), Ok(CellValue::Boolean(true)));
    }

    #[test]
    fn test_concat_and_if() {
        assert_eq!(
            call("CONCAT", vec!["a".into(), num(1.0), CellValue::Array(vec![true.into()])]),
            Ok(CellValue::Text("a1TRUE".into()))
        );
        assert_eq!(call("IF", vec![true.into(), num(1.0), num(2.0)]), Ok(num(1.0)));
        assert_eq!(call("IF", vec![num(0.0), num(1.0), num(2.0)]), Ok(num(2.0)));
        assert_eq!(call("IF", vec![false.into(), num(1.0)]), Ok(CellValue::Boolean(false)));
    }
}
