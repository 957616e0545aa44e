//! Row filter language accepted by the table store.
//!
//! ```text
//! p1 = 3 and (name = 'adam' or lr in (0.1, 0.01)) and not done = true
//! ```
//!
//! The text is parsed as a SQL expression and lowered into [`Expr`]. Literals
//! are coerced to the type of the column they are compared with, so
//! `p = '1'` matches an integer column holding `1`.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use sqlparser::ast::{self as sql, BinaryOperator, UnaryOperator};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;

use crate::error::{ExplogError, Result};
use crate::models::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ord: Option<Ordering>) -> bool {
        match (self, ord) {
            (CmpOp::Ne, None) => true,
            (_, None) => false,
            (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
            (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
            (CmpOp::Lt, Some(o)) => o == Ordering::Less,
            (CmpOp::Le, Some(o)) => o != Ordering::Greater,
            (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
            (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }

    /// The same comparison with its operands swapped.
    fn flipped(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Parsed predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Cmp {
        column: String,
        op: CmpOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    /// A bare `true` or `false`.
    Const(bool),
}

impl Expr {
    /// Parses `src`. Blank input means "match every row" and yields `None`.
    pub fn parse(src: &str) -> Result<Option<Expr>> {
        if src.trim().is_empty() {
            return Ok(None);
        }
        let parsed = parse_sql(src)
            .map_err(|e| ExplogError::InvalidPredicate(format!("'{src}': {e}")))?;
        lower(parsed).map(Some)
    }

    /// Every column name the expression reads.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::Cmp { column, .. } | Expr::In { column, .. } => {
                out.insert(column.as_str());
            }
            Expr::Const(_) => {}
        }
    }

    /// Evaluates against one row; `cell` maps a column name to its value.
    pub fn eval<F>(&self, cell: &F) -> bool
    where
        F: Fn(&str) -> Value,
    {
        match self {
            Expr::And(items) => items.iter().all(|e| e.eval(cell)),
            Expr::Or(items) => items.iter().any(|e| e.eval(cell)),
            Expr::Not(inner) => !inner.eval(cell),
            Expr::Cmp { column, op, value } => op.holds(cell(column).compare_to(value)),
            Expr::In { column, values } => {
                let v = cell(column);
                values
                    .iter()
                    .any(|lit| v.compare_to(lit) == Some(Ordering::Equal))
            }
            Expr::Const(b) => *b,
        }
    }
}

// ─── Lowering ────────────────────────────────────────────────────────────────

fn parse_sql(src: &str) -> std::result::Result<sql::Expr, ParserError> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(src)?;
    let expr = parser.parse_expr()?;
    match parser.peek_token().token {
        Token::EOF => Ok(expr),
        tok => Err(ParserError::ParserError(format!(
            "unexpected '{tok}' after the expression"
        ))),
    }
}

/// True when `name` reads back as a plain, unquoted column reference.
pub(crate) fn is_identifier(name: &str) -> bool {
    matches!(
        parse_sql(name),
        Ok(sql::Expr::Identifier(ident)) if ident.quote_style.is_none() && ident.value == name
    )
}

fn unsupported(expr: &sql::Expr) -> ExplogError {
    ExplogError::InvalidPredicate(format!("unsupported expression '{expr}'"))
}

fn lower(expr: sql::Expr) -> Result<Expr> {
    match expr {
        sql::Expr::Nested(inner) => lower(*inner),
        sql::Expr::Value(sql::Value::Boolean(b)) => Ok(Expr::Const(b)),
        sql::Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Expr::Not(Box::new(lower(*expr)?))),
        sql::Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut items = Vec::new();
            for side in [*left, *right] {
                match lower(side)? {
                    Expr::And(inner) => items.extend(inner),
                    other => items.push(other),
                }
            }
            Ok(Expr::And(items))
        }
        sql::Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            let mut items = Vec::new();
            for side in [*left, *right] {
                match lower(side)? {
                    Expr::Or(inner) => items.extend(inner),
                    other => items.push(other),
                }
            }
            Ok(Expr::Or(items))
        }
        sql::Expr::BinaryOp { left, op, right } => {
            let op = cmp_op(&op).ok_or_else(|| {
                ExplogError::InvalidPredicate(format!("unsupported operator '{op}'"))
            })?;
            if let (Some(column), Some(value)) = (column(&left), literal(&right)) {
                return Ok(Expr::Cmp { column, op, value });
            }
            if let (Some(column), Some(value)) = (column(&right), literal(&left)) {
                let op = op.flipped();
                return Ok(Expr::Cmp { column, op, value });
            }
            Err(ExplogError::InvalidPredicate(format!(
                "'{left} {op_sql} {right}' must compare a column with a literal",
                op_sql = op.as_sql()
            )))
        }
        sql::Expr::InList {
            expr,
            list,
            negated,
        } => {
            let column = column(&expr).ok_or_else(|| unsupported(&expr))?;
            let values = list
                .iter()
                .map(|e| literal(e).ok_or_else(|| unsupported(e)))
                .collect::<Result<Vec<_>>>()?;
            let found = Expr::In { column, values };
            Ok(if negated {
                Expr::Not(Box::new(found))
            } else {
                found
            })
        }
        other => Err(unsupported(&other)),
    }
}

fn cmp_op(op: &BinaryOperator) -> Option<CmpOp> {
    Some(match op {
        BinaryOperator::Eq => CmpOp::Eq,
        BinaryOperator::NotEq => CmpOp::Ne,
        BinaryOperator::Lt => CmpOp::Lt,
        BinaryOperator::LtEq => CmpOp::Le,
        BinaryOperator::Gt => CmpOp::Gt,
        BinaryOperator::GtEq => CmpOp::Ge,
        _ => return None,
    })
}

fn column(expr: &sql::Expr) -> Option<String> {
    match expr {
        sql::Expr::Identifier(ident) if ident.quote_style != Some('"') => {
            Some(ident.value.clone())
        }
        _ => None,
    }
}

/// A double-quoted word on the literal side is read as text, not as a column.
fn literal(expr: &sql::Expr) -> Option<Value> {
    match expr {
        sql::Expr::Value(v) => match v {
            sql::Value::Number(n, _) => number(n),
            sql::Value::SingleQuotedString(s) | sql::Value::DoubleQuotedString(s) => {
                Some(Value::Text(s.clone()))
            }
            sql::Value::Boolean(b) => Some(Value::Bool(*b)),
            sql::Value::Null => Some(Value::Null),
            _ => None,
        },
        sql::Expr::Identifier(ident) if ident.quote_style == Some('"') => {
            Some(Value::Text(ident.value.clone()))
        }
        sql::Expr::Nested(inner) => literal(inner),
        sql::Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Value::Int(i) => Some(Value::Int(-i)),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        sql::Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        } => literal(expr).filter(|v| matches!(v, Value::Int(_) | Value::Float(_))),
        _ => None,
    }
}

fn number(text: &str) -> Option<Value> {
    text.parse::<i64>()
        .map(Value::Int)
        .or_else(|_| text.parse::<f64>().map(Value::Float))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, Value)]) -> impl Fn(&str) -> Value {
        let map: HashMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |c: &str| map.get(c).cloned().unwrap_or(Value::Null)
    }

    #[test]
    fn blank_means_match_all() {
        assert_eq!(Expr::parse("").unwrap(), None);
        assert_eq!(Expr::parse("   ").unwrap(), None);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = Expr::parse("a = 1 or b = 2 and c = 3").unwrap().unwrap();
        let Expr::Or(items) = &e else {
            panic!("expected Or, got {e:?}")
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Expr::And(_)));
    }

    #[test]
    fn quoted_literals_coerce_to_column_type() {
        let e = Expr::parse("p = '1' and name = 'it''s \\ \"x\"'").unwrap().unwrap();
        let name = Value::from("it's \\ \"x\"");
        assert!(e.eval(&row(&[("p", Value::Int(1)), ("name", name.clone())])));
        assert!(!e.eval(&row(&[("p", Value::Int(2)), ("name", name)])));

        let double = Expr::parse(r#"opt = "adam""#).unwrap().unwrap();
        assert!(double.eval(&row(&[("opt", Value::from("adam"))])));
    }

    #[test]
    fn in_lists_and_negation() {
        let e = Expr::parse("index in (1, 3, 5) and not (lr >= 0.5)").unwrap().unwrap();
        assert!(e.eval(&row(&[("index", Value::Int(3)), ("lr", Value::Float(0.1))])));
        assert!(!e.eval(&row(&[("index", Value::Int(2)), ("lr", Value::Float(0.1))])));
        assert!(!e.eval(&row(&[("index", Value::Int(3)), ("lr", Value::Float(0.7))])));

        let outside = Expr::parse("opt not in ('sgd')").unwrap().unwrap();
        assert!(outside.eval(&row(&[("opt", Value::from("adam"))])));
        assert!(!outside.eval(&row(&[("opt", Value::from("sgd"))])));
    }

    #[test]
    fn numbers_with_exponents_and_signs() {
        let e = Expr::parse("x > -1.5e-3 and y != +2").unwrap().unwrap();
        assert!(e.eval(&row(&[("x", Value::Float(0.0)), ("y", Value::Int(3))])));
        assert!(!e.eval(&row(&[("x", Value::Float(-1.0)), ("y", Value::Int(3))])));
    }

    #[test]
    fn literal_on_the_left_flips_the_comparison() {
        let e = Expr::parse("2 < step").unwrap().unwrap();
        assert_eq!(
            e,
            Expr::Cmp {
                column: "step".into(),
                op: CmpOp::Gt,
                value: Value::Int(2)
            }
        );
    }

    #[test]
    fn boolean_constants() {
        let never = Expr::parse("false").unwrap().unwrap();
        assert!(!never.eval(&row(&[])));
        assert!(never.columns().is_empty());
        assert!(Expr::parse("TRUE").unwrap().unwrap().eval(&row(&[])));
    }

    #[test]
    fn columns_are_collected() {
        let e = Expr::parse("a = 1 or (b in (2) and not c < 4)").unwrap().unwrap();
        assert_eq!(e.columns().into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_input_is_rejected() {
        for src in ["a =", "= 1", "a = 1 and", "(a = 1", "a ? 1", "a = 'open", "a = b", "a + 1"] {
            assert!(
                matches!(Expr::parse(src), Err(ExplogError::InvalidPredicate(_))),
                "{src} should not parse"
            );
        }
    }

    #[test]
    fn plain_identifiers() {
        for ok in ["lr", "param_1", "_x", "index"] {
            assert!(is_identifier(ok), "{ok}");
        }
        for bad in ["", "two words", "true", "null", "a.b", "a-b", "'a'"] {
            assert!(!is_identifier(bad), "{bad}");
        }
    }
}
