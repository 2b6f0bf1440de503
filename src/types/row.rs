//! Raw gateway rows and lenient field access
//!
//! Rows arrive as JSON objects whose column names differ between tables and
//! schema revisions (`NOM_ROBOT` vs `NOM_PROGRAMME`, upper vs lower case).
//! Lookups here are case-insensitive and take a list of candidate names.

use serde_json::{Map, Value};

/// One untyped row as returned by the query gateway.
pub type RawRow = Map<String, Value>;

/// Parse a numeric value that may use a decimal comma (`"2,5"`).
///
/// Unparseable or non-finite input yields 0; counters never propagate
/// a parse failure into a sum.
pub fn parse_decimal(raw: &str) -> f64 {
    let normalized = raw.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Numeric view of a JSON value (number, numeric string, or anything else as 0).
pub fn value_as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_decimal(s),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Text view of a JSON value; `null` and empty strings are `None`.
pub fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Case-insensitive column access on a [`RawRow`].
pub trait RowExt {
    /// First value whose column matches one of `names`.
    fn lookup(&self, names: &[&str]) -> Option<&Value>;

    fn text(&self, names: &[&str]) -> Option<String> {
        self.lookup(names).and_then(value_as_text)
    }

    fn number(&self, names: &[&str]) -> f64 {
        self.lookup(names).map_or(0.0, value_as_f64)
    }

    fn integer(&self, names: &[&str]) -> Option<i64> {
        match self.lookup(names)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl RowExt for RawRow {
    fn lookup(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| {
            self.get(*name).or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
        })
    }
}
