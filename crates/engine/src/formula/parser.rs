// Formula parser - converts formula strings into AST
// Supports: numbers, strings, booleans, cell refs (A1, $A$1), ranges (A1:B9, A:C, 1:3),
// function calls with optional namespace (SUM, sys.SUM), binary operators (+ - * / ^ &),
// comparisons (< > = <= >= <>), unary +/- and postfix %.

use crate::cell_key::{col_to_letters, parse_address, parse_column, parse_row, CellKey, MAX_ROWS};
use crate::range::{CellRange, RangeBound, RangeError};

/// Formula expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Cell reference
    /// - col_abs/row_abs: true if that component is absolute ($A vs A, $1 vs 1)
    CellRef {
        col: usize,
        row: usize,
        col_abs: bool,
        row_abs: bool,
    },
    Range(RangeRef),
    /// Function call. `namespace` is `None` when written without one.
    Function {
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Identifier that is neither a function call nor a cell reference (`=B`)
    Name(String),
    /// Empty/omitted argument (e.g. the trailing slot in `=IF(a,b,)`)
    Empty,
}

/// One side of a range reference, with the `$` flags as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPart {
    pub col: Option<usize>,
    pub row: Option<usize>,
    pub col_abs: bool,
    pub row_abs: bool,
}

impl RefPart {
    fn bound(&self) -> RangeBound {
        RangeBound { col: self.col, row: self.row }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start: RefPart,
    pub end: RefPart,
}

impl RangeRef {
    /// The referenced range, squared.
    pub fn to_range(&self) -> Result<CellRange, RangeError> {
        CellRange::from_bounds(self.start.bound(), self.end.bound()).map(|r| r.square())
    }
}

impl Expr {
    /// Cell key of a `CellRef` node, anchors stripped.
    pub fn cell_key(&self) -> Option<CellKey> {
        match self {
            Expr::CellRef { col, row, .. } => Some(CellKey::new(*col, *row)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Comparison
    Lt,      // <
    Gt,      // >
    Eq,      // =
    LtEq,    // <=
    GtEq,    // >=
    NotEq,   // <>
    // String
    Concat,  // &
    // Exponentiation
    Pow,     // ^
}

impl Op {
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Eq => "=",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::NotEq => "<>",
            Op::Concat => "&",
            Op::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse formula '{formula}': {message}")]
pub struct ParseError {
    pub formula: String,
    pub message: String,
}

/// Parse a formula string (leading `=` required) into an expression tree.
pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    let trimmed = formula.trim();
    let fail = |message: String| ParseError {
        formula: trimmed.to_string(),
        message,
    };
    let Some(input) = trimmed.strip_prefix('=') else {
        return Err(fail("Formula must start with =".to_string()));
    };

    let tokens = tokenize(input).map_err(fail)?;
    if tokens.is_empty() {
        return Err(fail("Empty formula".to_string()));
    }
    let (expr, pos) = parse_comparison(&tokens, 0).map_err(fail)?;
    if pos < tokens.len() {
        return Err(fail(format!("Unexpected token at position {}", pos)));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    /// Cell reference with absolute/relative flags
    CellRef {
        col: usize,
        row: usize,
        col_abs: bool,
        row_abs: bool,
    },
    /// `$C` style column, only meaningful as a range side
    ColumnRef { col: usize, abs: bool },
    /// `$3` style row, only meaningful as a range side
    RowRef { row: usize, abs: bool },
    /// Identifier as written (function name, namespace.name, or bare name)
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Colon,
    Comma,
    // Comparison operators
    Lt,      // <
    Gt,      // >
    Eq,      // =
    LtEq,    // <=
    GtEq,    // >=
    NotEq,   // <>
    // String concatenation
    Ampersand, // &
    // Exponentiation and percent
    Caret,   // ^
    Percent, // %
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ':' => { tokens.push(Token::Colon); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            '&' => { tokens.push(Token::Ampersand); chars.next(); }
            '^' => { tokens.push(Token::Caret); chars.next(); }
            '%' => { tokens.push(Token::Percent); chars.next(); }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => { tokens.push(Token::LtEq); chars.next(); }
                    Some('>') => { tokens.push(Token::NotEq); chars.next(); }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => { tokens.push(Token::Eq); chars.next(); }
            '"' => {
                // String literal, "" inside is an escaped quote
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            s.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("Unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::StringLit(s));
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                // Cell reference (A1), function name (SUM), namespaced name (sys.SUM)
                let mut ident = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '$') {
                    ident.push(ch);
                }

                // Dotted segments (sys.SUM, STDEV.P) while a letter follows the dot
                while chars.peek() == Some(&'.') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some(ch) if ch.is_ascii_alphabetic() || *ch == '_' => {
                            chars.next();
                            ident.push('.');
                            while let Some(ch) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || *ch == '_') {
                                ident.push(ch);
                            }
                        }
                        _ => break,
                    }
                }

                if let Some(addr) = parse_address(&ident) {
                    tokens.push(Token::CellRef {
                        col: addr.col,
                        row: addr.row,
                        col_abs: addr.col_abs,
                        row_abs: addr.row_abs,
                    });
                } else if ident.contains('$') {
                    return Err(format!("Invalid cell reference: {}", ident));
                } else {
                    tokens.push(Token::Ident(ident));
                }
            }
            '$' => {
                // Absolute reference marker - collect with following letters/numbers
                let mut ident = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || *ch == '$') {
                    ident.push(ch);
                }
                if let Some(addr) = parse_address(&ident) {
                    tokens.push(Token::CellRef {
                        col: addr.col,
                        row: addr.row,
                        col_abs: addr.col_abs,
                        row_abs: addr.row_abs,
                    });
                } else if let Some((col, abs)) = parse_column(&ident) {
                    tokens.push(Token::ColumnRef { col, abs });
                } else if let Some((row, abs)) = parse_row(&ident) {
                    tokens.push(Token::RowRef { row, abs });
                } else {
                    return Err(format!("Invalid cell reference: {}", ident));
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    num_str.push(d);
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

// Lowest precedence: comparison operators
fn parse_comparison(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_concat(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Lt => Op::Lt,
            Token::Gt => Op::Gt,
            Token::Eq => Op::Eq,
            Token::LtEq => Op::LtEq,
            Token::GtEq => Op::GtEq,
            Token::NotEq => Op::NotEq,
            _ => break,
        };
        let (right, new_pos) = parse_concat(tokens, pos + 1)?;
        left = binary(op, left, right);
        pos = new_pos;
    }

    Ok((left, pos))
}

// String concatenation (&)
fn parse_concat(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_add_sub(tokens, pos)?;

    while pos < tokens.len() && tokens[pos] == Token::Ampersand {
        let (right, new_pos) = parse_add_sub(tokens, pos + 1)?;
        left = binary(Op::Concat, left, right);
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = binary(op, left, right);
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_power(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_power(tokens, pos + 1)?;
        left = binary(op, left, right);
        pos = new_pos;
    }

    Ok((left, pos))
}

// Exponentiation (^) - right-associative, higher precedence than * /
fn parse_power(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (base, pos) = parse_percent(tokens, pos)?;

    if pos < tokens.len() && tokens[pos] == Token::Caret {
        let (exponent, new_pos) = parse_power(tokens, pos + 1)?;
        return Ok((binary(Op::Pow, base, exponent), new_pos));
    }

    Ok((base, pos))
}

// Percent postfix (%) - desugars to * 0.01
fn parse_percent(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut expr, mut pos) = parse_primary(tokens, pos)?;

    while pos < tokens.len() && tokens[pos] == Token::Percent {
        expr = binary(Op::Mul, expr, Expr::Number(0.01));
        pos += 1;
    }

    Ok((expr, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    if pos >= tokens.len() {
        return Err("Unexpected end of expression".to_string());
    }

    // Any range side followed by `:`
    if pos + 1 < tokens.len() && tokens[pos + 1] == Token::Colon {
        if let Some(start) = range_part(&tokens[pos]) {
            let end = tokens
                .get(pos + 2)
                .and_then(range_part)
                .ok_or_else(|| "Expected range end after ':'".to_string())?;
            let same_kind = (start.col.is_some(), start.row.is_some())
                == (end.col.is_some(), end.row.is_some());
            if !same_kind {
                return Err("Range corners must be the same kind".to_string());
            }
            return Ok((Expr::Range(RangeRef { start, end }), pos + 3));
        }
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::StringLit(s) => Ok((Expr::Text(s.clone()), pos + 1)),
        Token::CellRef { col, row, col_abs, row_abs } => Ok((
            Expr::CellRef { col: *col, row: *row, col_abs: *col_abs, row_abs: *row_abs },
            pos + 1,
        )),
        Token::ColumnRef { .. } | Token::RowRef { .. } => {
            Err("Column or row reference must be part of a range".to_string())
        }
        Token::Ident(ident) => {
            let upper = ident.to_uppercase();
            if upper == "TRUE" {
                return Ok((Expr::Boolean(true), pos + 1));
            }
            if upper == "FALSE" {
                return Ok((Expr::Boolean(false), pos + 1));
            }
            // Function call
            if tokens.get(pos + 1) == Some(&Token::LParen) {
                let (args, new_pos) = parse_function_args(tokens, pos + 2)?;
                let (namespace, name) = match ident.split_once('.') {
                    Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
                        (Some(ns.to_string()), name.to_uppercase())
                    }
                    _ => (None, upper),
                };
                return Ok((Expr::Function { namespace, name, args }, new_pos));
            }
            // Not a function call - an unknown name (resolves to a NAME error)
            Ok((Expr::Name(ident.clone()), pos + 1))
        }
        Token::LParen => {
            let (expr, pos) = parse_comparison(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        Token::Plus => {
            // Unary plus (no-op, just parse the next expression)
            parse_primary(tokens, pos + 1)
        }
        Token::Minus => {
            // Unary minus
            let (expr, pos) = parse_primary(tokens, pos + 1)?;
            Ok((binary(Op::Sub, Expr::Number(0.0), expr), pos))
        }
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}

/// Token usable as one side of a range: a cell, a column or a row.
fn range_part(token: &Token) -> Option<RefPart> {
    match token {
        Token::CellRef { col, row, col_abs, row_abs } => Some(RefPart {
            col: Some(*col),
            row: Some(*row),
            col_abs: *col_abs,
            row_abs: *row_abs,
        }),
        Token::ColumnRef { col, abs } => Some(RefPart { col: Some(*col), row: None, col_abs: *abs, row_abs: false }),
        Token::RowRef { row, abs } => Some(RefPart { col: None, row: Some(*row), col_abs: false, row_abs: *abs }),
        Token::Ident(ident) => {
            parse_column(ident).map(|(col, _)| RefPart { col: Some(col), row: None, col_abs: false, row_abs: false })
        }
        Token::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= MAX_ROWS as f64 => Some(RefPart {
            col: None,
            row: Some(*n as usize - 1),
            col_abs: false,
            row_abs: false,
        }),
        _ => None,
    }
}

fn parse_function_args(tokens: &[Token], pos: usize) -> Result<(Vec<Expr>, usize), String> {
    let mut args = Vec::new();
    let mut pos = pos;

    // Handle empty function call SUM()
    if tokens.get(pos) == Some(&Token::RParen) {
        return Ok((args, pos + 1));
    }

    loop {
        // Empty argument: next token is , or ) immediately
        match tokens.get(pos) {
            Some(Token::RParen) => {
                args.push(Expr::Empty);
                return Ok((args, pos + 1));
            }
            Some(Token::Comma) => {
                args.push(Expr::Empty);
                pos += 1;
                continue;
            }
            _ => {}
        }

        let (arg, new_pos) = parse_comparison(tokens, pos)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(Token::Comma) => pos += 1,
            Some(_) => return Err("Expected comma or closing parenthesis".to_string()),
            None => return Err("Missing closing parenthesis in function call".to_string()),
        }
    }
}

fn binary(op: Op, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

// =============================================================================
// Formula Printing
// =============================================================================

/// Format an expression as a formula string (with leading '=').
pub fn format_expr(expr: &Expr) -> String {
    format!("={}", format_expr_inner(expr))
}

/// Format an expression without the leading '='.
pub fn format_expr_inner(expr: &Expr) -> String {
    match expr {
        Expr::Empty => String::new(),
        Expr::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Expr::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Expr::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Expr::Name(name) => name.clone(),
        Expr::CellRef { col, row, col_abs, row_abs } => {
            format_part(&RefPart { col: Some(*col), row: Some(*row), col_abs: *col_abs, row_abs: *row_abs })
        }
        Expr::Range(range) => format!("{}:{}", format_part(&range.start), format_part(&range.end)),
        Expr::Function { namespace, name, args } => {
            let args_str: Vec<String> = args.iter().map(format_expr_inner).collect();
            match namespace {
                Some(ns) => format!("{}.{}({})", ns, name, args_str.join(",")),
                None => format!("{}({})", name, args_str.join(",")),
            }
        }
        Expr::BinaryOp { op, left, right } => {
            format!("{}{}{}", format_operand(left), op.symbol(), format_operand(right))
        }
    }
}

// Nested binary operands are parenthesised so precedence survives a round-trip
fn format_operand(expr: &Expr) -> String {
    match expr {
        Expr::BinaryOp { .. } => format!("({})", format_expr_inner(expr)),
        _ => format_expr_inner(expr),
    }
}

/// Format one reference part in A1 notation, `$` anchors preserved
fn format_part(part: &RefPart) -> String {
    let mut out = String::new();
    if let Some(col) = part.col {
        if part.col_abs {
            out.push('$');
        }
        out.push_str(&col_to_letters(col));
    }
    if let Some(row) = part.row {
        if part.row_abs {
            out.push('$');
        }
        out.push_str(&(row + 1).to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Absolute reference ($) parsing tests
    // =========================================================================

    #[test]
    fn test_parse_absolute_both() {
        let expr = parse("=$A$1").unwrap();
        match expr {
            Expr::CellRef { col, row, col_abs, row_abs } => {
                assert_eq!(col, 0);
                assert_eq!(row, 0);
                assert!(col_abs, "col should be absolute");
                assert!(row_abs, "row should be absolute");
            }
            _ => panic!("Expected CellRef, got {:?}", expr),
        }
    }

    #[test]
    fn test_parse_absolute_row_only() {
        let expr = parse("=A$2").unwrap();
        match expr {
            Expr::CellRef { col, row, col_abs, row_abs } => {
                assert_eq!((col, row), (0, 1));
                assert!(!col_abs);
                assert!(row_abs);
            }
            _ => panic!("Expected CellRef, got {:?}", expr),
        }
        assert_eq!(parse("=a$2").unwrap().cell_key(), CellKey::parse("A2"));
    }

    #[test]
    fn test_parse_mixed_range() {
        let expr = parse("=$B1:B$9").unwrap();
        match &expr {
            Expr::Range(range) => {
                assert!(range.start.col_abs);
                assert!(!range.start.row_abs);
                assert!(!range.end.col_abs);
                assert!(range.end.row_abs);
                assert_eq!(range.to_range().unwrap().key(), "B1:B9");
            }
            _ => panic!("Expected Range, got {:?}", expr),
        }
    }

    #[test]
    fn test_parse_column_and_row_ranges() {
        let expr = parse("=SUM(A:C, $2:3)").unwrap();
        let Expr::Function { args, .. } = &expr else { panic!("Expected Function") };
        match (&args[0], &args[1]) {
            (Expr::Range(cols), Expr::Range(rows)) => {
                assert_eq!(cols.to_range().unwrap().key(), "A:C");
                assert_eq!(rows.to_range().unwrap().key(), "2:3");
                assert!(rows.start.row_abs);
            }
            other => panic!("Expected two ranges, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_mismatched_range_fails() {
        assert!(parse("=A1:C").is_err());
        assert!(parse("=A1:").is_err());
    }

    #[test]
    fn test_parse_range_past_grid_fails() {
        assert!(parse("=SUM(B1:ZZZZZZZZZZZZZ1000)").is_err());
        assert!(parse("=SUM(A1:A1048577)").is_err());
        assert!(parse("=SUM(1:2000000)").is_err());
        assert!(parse("=SUM(A1:XFD1048576)").is_ok());
        // Too wide to be a cell, so it reads as a name
        assert_eq!(parse("=ZZZZZZZZZZZZZ1000").unwrap(), Expr::Name("ZZZZZZZZZZZZZ1000".to_string()));
    }

    // =========================================================================
    // Functions and namespaces
    // =========================================================================

    #[test]
    fn test_function_without_namespace() {
        let expr = parse("=sum(1, 2)").unwrap();
        match &expr {
            Expr::Function { namespace, name, args } => {
                assert_eq!(namespace, &None);
                assert_eq!(name, "SUM");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("Expected Function, got {:?}", expr),
        }
    }

    #[test]
    fn test_function_with_namespace() {
        let expr = parse("=sys.sum(A1)").unwrap();
        match &expr {
            Expr::Function { namespace, name, .. } => {
                assert_eq!(namespace.as_deref(), Some("sys"));
                assert_eq!(name, "SUM");
            }
            _ => panic!("Expected Function, got {:?}", expr),
        }
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(parse("=B").unwrap(), Expr::Name("B".to_string()));
        assert_eq!(parse("=Total_2").unwrap(), Expr::Name("Total_2".to_string()));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(parse("=TRUE").unwrap(), Expr::Boolean(true));
        assert_eq!(parse("=false").unwrap(), Expr::Boolean(false));
    }

    // =========================================================================
    // Operators
    // =========================================================================

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 → Add(1, Mul(2, 3))
        let expr = parse("=1+2*3").unwrap();
        match &expr {
            Expr::BinaryOp { op: Op::Add, right, .. } => {
                assert!(matches!(right.as_ref(), Expr::BinaryOp { op: Op::Mul, .. }));
            }
            _ => panic!("Expected Add op, got {:?}", expr),
        }
    }

    #[test]
    fn test_power_right_associative() {
        let expr = parse("=2^3^2").unwrap();
        match &expr {
            Expr::BinaryOp { op: Op::Pow, left, right } => {
                assert_eq!(left.as_ref(), &Expr::Number(2.0));
                assert!(matches!(right.as_ref(), Expr::BinaryOp { op: Op::Pow, .. }));
            }
            _ => panic!("Expected Pow op, got {:?}", expr),
        }
    }

    #[test]
    fn test_percent() {
        let expr = parse("=50%").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: Op::Mul,
                left: Box::new(Expr::Number(50.0)),
                right: Box::new(Expr::Number(0.01)),
            }
        );
    }

    #[test]
    fn test_unary_plus_and_minus() {
        assert_eq!(parse("=+1").unwrap(), Expr::Number(1.0));
        match parse("=-A1").unwrap() {
            Expr::BinaryOp { op: Op::Sub, left, right } => {
                assert_eq!(*left, Expr::Number(0.0));
                assert_eq!(right.cell_key(), CellKey::parse("A1"));
            }
            other => panic!("Expected Sub op, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_and_concat() {
        let expr = parse("=A1&\"x\"<>\"y\"").unwrap();
        match &expr {
            Expr::BinaryOp { op: Op::NotEq, left, .. } => {
                assert!(matches!(left.as_ref(), Expr::BinaryOp { op: Op::Concat, .. }));
            }
            _ => panic!("Expected NotEq op, got {:?}", expr),
        }
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(parse("=1   +2").unwrap(), parse("=1+ 2").unwrap());
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(parse("=\"say \"\"hi\"\"\"").unwrap(), Expr::Text("say \"hi\"".to_string()));
    }

    // ── Empty argument tests ─────────────────────────────────────

    fn args_of(expr: &Expr) -> &[Expr] {
        match expr {
            Expr::Function { args, .. } => args,
            _ => panic!("Expected Function, got {:?}", expr),
        }
    }

    #[test]
    fn test_empty_args() {
        let expr = parse("=IF(A1,,C1)").unwrap();
        let args = args_of(&expr);
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[1], Expr::Empty));

        let expr = parse("=IF(A1,B1,)").unwrap();
        assert!(matches!(args_of(&expr)[2], Expr::Empty));

        let expr = parse("=SUM()").unwrap();
        assert!(args_of(&expr).is_empty());
    }

    // ── Errors ───────────────────────────────────────────────────

    #[test]
    fn test_parse_errors() {
        assert!(parse("1+2").is_err());
        assert!(parse("=").is_err());
        assert!(parse("=SUM(1,2").is_err());
        assert!(parse("=(1+2").is_err());
        assert!(parse("=\"open").is_err());
        assert!(parse("=1 2").is_err());
        assert!(parse("=#").is_err());

        let err = parse("=SUM(1,").unwrap_err();
        assert_eq!(err.formula, "=SUM(1,");
    }

    // ── Round-trip: parse → format_expr ──────────────────────────

    #[test]
    fn test_format_roundtrip() {
        for formula in [
            "=$A$1",
            "=A$1",
            "=$O$95:$O$100",
            "=SUM($A$1:$A$10)+B2",
            "=IF(A1,B1,)",
            "=sys.SUM(A:C)",
            "=A1^2",
            "=\"a\"&B1",
        ] {
            assert_eq!(format_expr(&parse(formula).unwrap()), formula);
        }
    }

    #[test]
    fn test_format_keeps_grouping() {
        let expr = parse("=(1+2)*3").unwrap();
        assert_eq!(format_expr(&expr), "=(1+2)*3");
        assert_eq!(parse(&format_expr(&expr)).unwrap(), expr);
    }
}
