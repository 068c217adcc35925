//! Canonical scalar values and the coercion helpers shared by the normalizer,
//! the tie-break policy and the emitter.

use serde::{Serialize, Serializer};
use std::fmt;

/// Longest digit run accepted as a number; longer runs stay text.
const MAX_NUMERIC_DIGITS: usize = 15;

/// A normalized field value.
///
/// `Absent` means "no update": it never overwrites a previously known value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Absent,
    Number(i64),
    Boolean(bool),
    Text(String),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Counter activity as seen by the tie-break policy: any non-zero number or
    /// non-empty, non-zero text. Absent, booleans and literal zero are inactive.
    pub fn is_active(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0,
            Value::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return false;
                }
                !trimmed.bytes().all(|b| b == b'0')
            }
            Value::Boolean(_) | Value::Absent => false,
        }
    }

    /// Truthiness used for `SetTieBreakVisible(x)` style controls.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0,
            Value::Text(text) => {
                let lowered = text.trim().to_ascii_lowercase();
                !matches!(lowered.as_str(), "" | "0" | "false" | "off" | "no")
            }
            Value::Absent => false,
        }
    }

    /// Returns `self` unless it is absent, in which case `fallback` is used.
    pub fn or(self, fallback: Value) -> Value {
        if self.is_absent() {
            fallback
        } else {
            self
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "<absent>"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(text) => write!(f, "{:?}", text),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Absent => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_i64(*n),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

/// Parses a plain decimal integer. Zero-padded forms such as `"05"` are
/// rejected so codes like `"007"` keep their textual identity.
pub fn parse_plain_integer(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || digits.len() > MAX_NUMERIC_DIGITS {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    if negative && digits == "0" {
        return None;
    }
    let magnitude: i64 = digits.parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Literal `"true"` / `"false"` only.
pub fn parse_literal_bool(text: &str) -> Option<bool> {
    match text {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Builds a value from scalar text: empty becomes `Absent`, boolean literals
/// become `Boolean`, and plain integers become `Number` when `numeric` is set.
pub fn coerce_text(text: &str, numeric: bool) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Absent;
    }
    if let Some(b) = parse_literal_bool(trimmed) {
        return Value::Boolean(b);
    }
    if numeric {
        if let Some(n) = parse_plain_integer(trimmed) {
            return Value::Number(n);
        }
    }
    Value::Text(trimmed.to_string())
}

/// Renders a JSON number as canonical text when it is not an exact integer.
pub fn number_text(number: &serde_json::Number) -> String {
    match number.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => number.to_string(),
    }
}
