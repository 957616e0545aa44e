//! Configuration specifiers and their compilation into predicates.

use std::collections::BTreeMap;

use crate::error::{ExplogError, Result};
use crate::frame::INDEX_COLUMN;
use crate::models::{Fields, Value};
use crate::predicate;

/// How a caller names one or more configurations of an experiment folder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Specifier {
    /// Every configuration.
    #[default]
    All,
    /// A row index.
    Index(u64),
    /// A predicate string, passed through verbatim.
    Predicate(String),
    /// Parameter values; null values are ignored when matching.
    Fields(Fields),
    /// Each element resolved separately.
    Many(Vec<Specifier>),
}

const KEYWORDS: [&str; 7] = ["and", "or", "not", "in", "true", "false", "null"];

impl Specifier {
    pub fn fields<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Specifier::Fields(crate::models::fields(pairs))
    }

    pub fn indices(indices: impl IntoIterator<Item = u64>) -> Self {
        Specifier::Many(indices.into_iter().map(Specifier::Index).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Specifier::All)
    }

    /// Maps the empty mapping and the blank predicate onto [`Specifier::All`].
    pub fn normalized(&self) -> Specifier {
        match self {
            Specifier::Fields(f) if f.is_empty() => Specifier::All,
            Specifier::Predicate(p) if p.trim().is_empty() => Specifier::All,
            other => other.clone(),
        }
    }

    /// Compiles the specifier into a predicate string. `None` matches all rows.
    pub fn to_where(&self) -> Result<Option<String>> {
        match self {
            Specifier::All => Ok(None),
            Specifier::Predicate(p) => Ok(Some(p.clone())),
            Specifier::Index(i) => Ok(Some(format!("index = {i}"))),
            Specifier::Fields(fields) => {
                let mut terms = Vec::with_capacity(fields.len());
                for (k, v) in fields {
                    check_column_name(k)?;
                    if let Some(lit) = literal(v)? {
                        terms.push(format!("{k} = {lit}"));
                    }
                }
                Ok(Some(terms.join(" and ")))
            }
            Specifier::Many(items) => {
                if items.is_empty() {
                    return Ok(Some("false".to_string()));
                }
                if items.iter().all(|s| matches!(s, Specifier::Index(_))) {
                    let list: Vec<String> = items
                        .iter()
                        .filter_map(|s| match s {
                            Specifier::Index(i) => Some(i.to_string()),
                            _ => None,
                        })
                        .collect();
                    return Ok(Some(format!("index in ({})", list.join(", "))));
                }
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item.to_where()? {
                        Some(w) if !w.trim().is_empty() => parts.push(format!("({w})")),
                        // one alternative matches everything
                        _ => return Ok(None),
                    }
                }
                Ok(Some(parts.join(" or ")))
            }
        }
    }

    /// Converts a dynamically shaped JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;
        match value {
            J::Null => Ok(Specifier::All),
            J::String(s) => Ok(Specifier::Predicate(s.clone())),
            J::Number(n) => n.as_u64().map(Specifier::Index).ok_or_else(|| {
                ExplogError::InvalidSpecifier(format!("'{n}' is not a row index"))
            }),
            J::Object(map) => {
                let mut fields = BTreeMap::new();
                for (k, v) in map {
                    fields.insert(k.clone(), json_scalar(k, v)?);
                }
                Ok(Specifier::Fields(fields))
            }
            J::Array(items) => Ok(Specifier::Many(
                items.iter().map(Specifier::from_json).collect::<Result<_>>()?,
            )),
            J::Bool(b) => Err(ExplogError::InvalidSpecifier(format!(
                "Configuration format not understood for '{b}'."
            ))),
        }
    }
}

fn json_scalar(key: &str, v: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as J;
    match v {
        J::Null => Ok(Value::Null),
        J::Bool(b) => Ok(Value::Bool(*b)),
        J::String(s) => Ok(Value::Text(s.clone())),
        J::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .ok_or_else(|| ExplogError::InvalidSpecifier(format!("'{key}': bad number {n}"))),
        J::Array(_) | J::Object(_) => Err(ExplogError::InvalidSpecifier(format!(
            "value of '{key}' must be a scalar"
        ))),
    }
}

/// Column names must be plain identifiers to be usable in predicates, and
/// `index` names the row index.
pub(crate) fn check_column_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_alphanumeric() || c == '_');
    let reserved =
        name == INDEX_COLUMN || KEYWORDS.contains(&name.to_ascii_lowercase().as_str());
    if !head_ok || !tail_ok || reserved || !predicate::is_identifier(name) {
        return Err(ExplogError::InvalidSpecifier(format!(
            "'{name}' cannot be used as a parameter name"
        )));
    }
    Ok(())
}

fn literal(v: &Value) -> Result<Option<String>> {
    Ok(match v {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) if !f.is_finite() => {
            return Err(ExplogError::InvalidSpecifier(format!(
                "{f} cannot be matched in a predicate"
            )))
        }
        Value::Float(f) => Some(format!("{f:?}")),
        Value::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
    })
}

impl From<u64> for Specifier {
    fn from(i: u64) -> Self {
        Specifier::Index(i)
    }
}
impl From<&str> for Specifier {
    fn from(p: &str) -> Self {
        Specifier::Predicate(p.to_string())
    }
}
impl From<String> for Specifier {
    fn from(p: String) -> Self {
        Specifier::Predicate(p)
    }
}
impl From<Fields> for Specifier {
    fn from(f: Fields) -> Self {
        Specifier::Fields(f)
    }
}
impl From<Vec<Specifier>> for Specifier {
    fn from(items: Vec<Specifier>) -> Self {
        Specifier::Many(items)
    }
}
impl From<Vec<u64>> for Specifier {
    fn from(items: Vec<u64>) -> Self {
        Specifier::indices(items)
    }
}
impl<T: Into<Specifier>> From<Option<T>> for Specifier {
    fn from(s: Option<T>) -> Self {
        s.map(Into::into).unwrap_or(Specifier::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Expr;
    use serde_json::json;

    #[test]
    fn scalar_shapes() {
        assert_eq!(Specifier::All.to_where().unwrap(), None);
        assert_eq!(Specifier::Index(5).to_where().unwrap().unwrap(), "index = 5");
        assert_eq!(
            Specifier::from("test string").to_where().unwrap().unwrap(),
            "test string"
        );
    }

    #[test]
    fn integer_list_uses_in() {
        assert_eq!(
            Specifier::indices([1, 2, 4]).to_where().unwrap().unwrap(),
            "index in (1, 2, 4)"
        );
        assert_eq!(Specifier::Many(vec![]).to_where().unwrap().unwrap(), "false");
    }

    #[test]
    fn mapping_skips_nulls_and_quotes_text() {
        let spec = Specifier::fields([
            ("param1", Value::from("val1")),
            ("param2", Value::Null),
            ("param3", Value::Int(3)),
        ]);
        assert_eq!(
            spec.to_where().unwrap().unwrap(),
            "param1 = 'val1' and param3 = 3"
        );
        assert_eq!(Specifier::Fields(Fields::new()).to_where().unwrap().unwrap(), "");
    }

    #[test]
    fn mixed_container_joins_with_or() {
        let spec = Specifier::Many(vec![
            Specifier::Index(2),
            Specifier::fields([("a", 1.5)]),
            Specifier::from("b = 'x'"),
        ]);
        let w = spec.to_where().unwrap().unwrap();
        assert_eq!(w, "(index = 2) or (a = 1.5) or (b = 'x')");
        assert!(Expr::parse(&w).unwrap().is_some());

        let with_all = Specifier::Many(vec![Specifier::Index(2), Specifier::All]);
        assert_eq!(with_all.to_where().unwrap(), None);
    }

    #[test]
    fn compiled_text_round_trips_through_the_parser() {
        let text = "it's \"hi\" \\ bye";
        let spec = Specifier::fields([("name", text)]);
        let w = spec.to_where().unwrap().unwrap();
        assert_eq!(w, "name = 'it''s \"hi\" \\ bye'");
        let expr = Expr::parse(&w).unwrap().unwrap();
        assert!(expr.eval(&|_: &str| Value::from(text)));
    }

    #[test]
    fn unusable_names_and_values_are_invalid() {
        for bad in ["two words", "in", "1st", "", "index", "null"] {
            let spec = Specifier::fields([(bad, 1)]);
            assert!(matches!(
                spec.to_where(),
                Err(ExplogError::InvalidSpecifier(_))
            ));
        }
        let nan = Specifier::fields([("x", f64::NAN)]);
        assert!(matches!(nan.to_where(), Err(ExplogError::InvalidSpecifier(_))));
    }

    #[test]
    fn normalization_of_match_all_spellings() {
        assert!(Specifier::Fields(Fields::new()).normalized().is_all());
        assert!(Specifier::from("  ").normalized().is_all());
        assert!(!Specifier::Index(0).normalized().is_all());
    }

    #[test]
    fn json_shapes() {
        assert!(Specifier::from_json(&json!(null)).unwrap().is_all());
        assert_eq!(Specifier::from_json(&json!(3)).unwrap(), Specifier::Index(3));
        assert_eq!(
            Specifier::from_json(&json!({"p": 1, "q": null})).unwrap(),
            Specifier::fields([("p", Value::Int(1)), ("q", Value::Null)])
        );
        assert_eq!(
            Specifier::from_json(&json!([0, "a = 1"])).unwrap(),
            Specifier::Many(vec![Specifier::Index(0), Specifier::from("a = 1")])
        );
        for bad in [json!(-1), json!(1.5), json!(true), json!({"p": [1]})] {
            assert!(matches!(
                Specifier::from_json(&bad),
                Err(ExplogError::InvalidSpecifier(_))
            ));
        }
    }
}
