// Formula parsing and function lookup

pub mod func;
pub mod parser;

pub(crate) mod builtins;

pub use func::{BoxFuture, FnFunc, Func, FuncRegistry, InvokeError, Registry};
pub use parser::{format_expr, parse, Expr, Op, ParseError, RangeRef, RefPart};
