use cellgraph_config::{EngineSettings, FormulaSettings};

use crate::cell_key::{normalize, CellKey};
use crate::formula::{parse, BoxFuture, Expr, FuncRegistry, Op, RangeRef};
use crate::refs::{to_ref_target, CellSource, RefsTable};
use crate::value::CellValue;

use super::{FuncError, FuncErrorKind, FuncResponse};

pub struct CalculateArgs<'a> {
    pub cell: &'a str,
    pub refs: &'a RefsTable,
    pub values: &'a dyn CellSource,
    pub funcs: &'a dyn FuncRegistry,
    pub settings: &'a EngineSettings,
}

/// Calculate the formula held in one cell.
///
/// Never fails outright: every problem is reported through
/// [`FuncResponse::error`] with the cell and formula it came from.
pub async fn calculate(args: CalculateArgs<'_>) -> FuncResponse {
    let cell = normalize(args.cell);
    let raw = args.values.get_value(&cell).await;
    let target = to_ref_target(raw.as_ref());
    let formula = raw.as_ref().map(CellValue::to_text).unwrap_or_default();
    let fail = |kind, message: String| {
        let error = FuncError::new(kind, message, &cell, &formula);
        FuncResponse::failed(target, &cell, &formula, error)
    };

    let Some(text) = raw.as_ref().and_then(CellValue::as_formula) else {
        let message = format!("The value of cell {} is not a formula. Must start with \"=\".", cell);
        return fail(FuncErrorKind::NotFormula, message);
    };

    let expr = match parse(text) {
        Ok(expr) => expr,
        Err(err) => return fail(FuncErrorKind::Invoke, err.to_string()),
    };

    // A range is fine as an argument but has no single value of its own
    if let Expr::Range(_) = expr {
        return fail(
            FuncErrorKind::NotSupportedRange,
            format!("The cell {} is a range which is not supported.", cell),
        );
    }

    let evaluator = Evaluator {
        refs: args.refs,
        values: args.values,
        funcs: args.funcs,
        settings: &args.settings.formula,
    };
    match evaluator.evaluate(&cell, &formula, &expr, &[]).await {
        Ok(data) => FuncResponse::succeeded(target, &cell, &formula, data),
        Err(error) => FuncResponse::failed(target, &cell, &formula, error),
    }
}

/// The formula being evaluated and the chain of cells that led to it.
struct Frame<'f> {
    cell: &'f str,
    formula: &'f str,
    stack: &'f [String],
}

impl Frame<'_> {
    fn error(&self, kind: FuncErrorKind, message: impl Into<String>) -> FuncError {
        FuncError::new(kind, message, self.cell, self.formula)
    }
}

struct Evaluator<'a> {
    refs: &'a RefsTable,
    values: &'a dyn CellSource,
    funcs: &'a dyn FuncRegistry,
    settings: &'a FormulaSettings,
}

impl<'a> Evaluator<'a> {
    /// Evaluate the parsed formula of `cell`. `stack` holds the cells whose
    /// evaluation is in progress above this one.
    fn evaluate<'b>(
        &'b self,
        cell: &'b str,
        formula: &'b str,
        expr: &'b Expr,
        stack: &'b [String],
    ) -> BoxFuture<'b, Result<CellValue, FuncError>> {
        Box::pin(async move {
            if let Some(err) = self.refs.circular_error(cell) {
                return Err(FuncError::new(FuncErrorKind::Circular, err.message.clone(), cell, formula));
            }
            let mut inner = stack.to_vec();
            inner.push(cell.to_string());
            let frame = Frame { cell, formula, stack: &inner };
            self.eval(&frame, expr).await
        })
    }

    /// Value of another cell, calculating it first when it holds a formula.
    fn evaluate_cell<'b>(&'b self, frame: &'b Frame<'b>, key: String) -> BoxFuture<'b, Result<CellValue, FuncError>> {
        Box::pin(async move {
            if frame.stack.contains(&key) {
                let mut chain = frame.stack.to_vec();
                chain.push(key);
                let message = format!("Circular reference ({})", chain.join("/"));
                return Err(frame.error(FuncErrorKind::Circular, message));
            }

            let raw = self.values.get_value(&key).await;
            let Some(text) = raw.as_ref().and_then(CellValue::as_formula) else {
                return Ok(raw.unwrap_or_default());
            };
            let formula = text.to_string();
            let expr = parse(&formula)
                .map_err(|err| FuncError::new(FuncErrorKind::Invoke, err.to_string(), &key, &formula))?;
            log::trace!("calc {} -> {}", frame.cell, key);
            self.evaluate(&key, &formula, &expr, frame.stack).await
        })
    }

    fn eval<'b>(&'b self, frame: &'b Frame<'b>, expr: &'b Expr) -> BoxFuture<'b, Result<CellValue, FuncError>> {
        Box::pin(async move {
            match expr {
                Expr::Number(n) => Ok(CellValue::Number(*n)),
                Expr::Text(s) => Ok(CellValue::Text(s.clone())),
                Expr::Boolean(b) => Ok(CellValue::Boolean(*b)),
                Expr::Empty => Ok(CellValue::Empty),
                Expr::CellRef { col, row, .. } => {
                    self.evaluate_cell(frame, CellKey::new(*col, *row).to_string()).await
                }
                Expr::Range(range) => self.eval_range(frame, range).await,
                Expr::Name(name) => Err(frame.error(FuncErrorKind::Invoke, format!("Unknown range: {}", name))),
                Expr::Function { namespace, name, args } => {
                    let namespace = namespace.as_deref().unwrap_or(&self.settings.default_namespace);
                    self.eval_function(frame, namespace, name, args).await
                }
                Expr::BinaryOp { op, left, right } => self.eval_binary(frame, *op, left, right).await,
            }
        })
    }

    async fn eval_function(
        &self,
        frame: &Frame<'_>,
        namespace: &str,
        name: &str,
        args: &[Expr],
    ) -> Result<CellValue, FuncError> {
        let Some(func) = self.funcs.get_func(namespace, name).await else {
            let message = format!("The function [{}.{}] was not found.", namespace, name);
            return Err(frame.error(FuncErrorKind::NotFound, message));
        };

        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            params.push(self.eval(frame, arg).await?);
        }

        func.invoke(params)
            .await
            .map_err(|err| frame.error(FuncErrorKind::Invoke, err.message))
    }

    async fn eval_binary(&self, frame: &Frame<'_>, op: Op, left: &Expr, right: &Expr) -> Result<CellValue, FuncError> {
        let Some(name) = self.settings.operators.get(op.symbol()) else {
            let message = format!(
                "Binary expression operator '{}' is not mapped to a corresponding function.",
                op.symbol()
            );
            return Err(frame.error(FuncErrorKind::Invoke, message));
        };
        let namespace = self.settings.default_namespace.as_str();
        let Some(func) = self.funcs.get_func(namespace, name).await else {
            let message = format!("The function [{}.{}] was not found.", namespace, name);
            return Err(frame.error(FuncErrorKind::NotFound, message));
        };

        let left = self.eval(frame, left).await?;
        let right = self.eval(frame, right).await?;
        func.invoke(vec![left, right])
            .await
            .map_err(|err| frame.error(FuncErrorKind::Invoke, err.message))
    }

    /// Member values in range order. Whole column or row ranges have no
    /// finite member list and evaluate to an empty array.
    async fn eval_range(&self, frame: &Frame<'_>, range: &RangeRef) -> Result<CellValue, FuncError> {
        let range = range
            .to_range()
            .map_err(|err| frame.error(FuncErrorKind::Invoke, err.to_string()))?;
        let mut values = Vec::with_capacity(range.keys().len());
        for member in range.keys() {
            values.push(self.evaluate_cell(frame, member.clone()).await?);
        }
        Ok(CellValue::Array(values))
    }
}
