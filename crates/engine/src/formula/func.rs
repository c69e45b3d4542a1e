//! Function lookup.
//!
//! The engine never calls functions directly: it asks a [`FuncRegistry`]
//! for a [`Func`] by namespace and name, then invokes it with the evaluated
//! parameters. Both traits are async so implementations may be backed by
//! anything (a plugin host, a remote service); [`Registry`] is the
//! in-memory implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::value::CellValue;

/// Boxed `Send` future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure raised by a function while it runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<String> for InvokeError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

pub trait Func: Send + Sync {
    fn invoke<'a>(&'a self, params: Vec<CellValue>) -> BoxFuture<'a, Result<CellValue, InvokeError>>;
}

pub trait FuncRegistry: Send + Sync {
    /// `None` when no function is registered under `namespace.name`.
    fn get_func<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, Option<Arc<dyn Func>>>;
}

/// Adapts a plain closure into a [`Func`].
pub struct FnFunc<F>(pub F);

impl<F> Func for FnFunc<F>
where
    F: Fn(&[CellValue]) -> Result<CellValue, InvokeError> + Send + Sync,
{
    fn invoke<'a>(&'a self, params: Vec<CellValue>) -> BoxFuture<'a, Result<CellValue, InvokeError>> {
        Box::pin(async move { (self.0)(&params) })
    }
}

/// In-memory function table keyed by (namespace, NAME).
///
/// Namespaces match case-insensitively, names are stored upper-case.
#[derive(Default, Clone)]
pub struct Registry {
    funcs: FxHashMap<(String, String), Arc<dyn Func>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `sys` namespace populated.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtins::register(&mut registry);
        registry
    }

    pub fn register(&mut self, namespace: &str, name: &str, func: Arc<dyn Func>) {
        self.funcs.insert(table_key(namespace, name), func);
    }

    pub fn register_fn<F>(&mut self, namespace: &str, name: &str, f: F)
    where
        F: Fn(&[CellValue]) -> Result<CellValue, InvokeError> + Send + Sync + 'static,
    {
        self.register(namespace, name, Arc::new(FnFunc(f)));
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<dyn Func>> {
        self.funcs.get(&table_key(namespace, name)).cloned()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.funcs.contains_key(&table_key(namespace, name))
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl FuncRegistry for Registry {
    fn get_func<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, Option<Arc<dyn Func>>> {
        Box::pin(async move { self.get(namespace, name) })
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .funcs
            .keys()
            .map(|(ns, name)| format!("{ns}.{name}"))
            .collect();
        names.sort();
        f.debug_struct("Registry").field("funcs", &names).finish()
    }
}

fn table_key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_lowercase(), name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register_fn("math", "double", |params| {
            let n = params.first().map_or(Ok(0.0), CellValue::to_number)?;
            Ok(CellValue::Number(n * 2.0))
        });
        assert!(registry.contains("MATH", "DOUBLE"));
        assert!(registry.get("sys", "DOUBLE").is_none());

        let func = smol::block_on(registry.get_func("Math", "Double")).unwrap();
        let result = smol::block_on(func.invoke(vec![CellValue::Number(4.0)]));
        assert_eq!(result, Ok(CellValue::Number(8.0)));
    }

    #[test]
    fn test_with_builtins_has_operator_functions() {
        let registry = Registry::with_builtins();
        for name in ["SUM", "ADD", "SUBTRACT", "MULTIPLY", "DIVIDE", "CONCAT", "EQ", "GTE"] {
            assert!(registry.contains("sys", name), "missing sys.{name}");
        }
    }
}
