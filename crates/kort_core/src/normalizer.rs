//! Payload normalizer: raw field paths and arbitrarily shaped raw values in,
//! canonical `(CanonicalField, Value)` pairs out.
//!
//! ## Unwrap order
//! Applied repeatedly until a scalar remains or no rule matches:
//! 1. sequence → its last element (an empty sequence is `Absent`)
//! 2. object with `v` → that member
//! 3. object with `value` → that member
//! 4. object with `text` → that member
//!
//! Whatever is left that is still a container is stringified as JSON.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{RelayError, Result};
use crate::state::Player;
use crate::value::{coerce_text, number_text, Value};

const UNWRAP_KEYS: [&str; 3] = ["v", "value", "text"];

/// Guards against pathological nesting; anything deeper is stringified.
const MAX_UNWRAP_DEPTH: usize = 32;

/// The closed set of fields the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CanonicalField {
    Points(Player),
    TieBreak(Player),
    /// Games in set 1..=3.
    SetGames(u8, Player),
    CurrentSetGames(Player),
    CurrentSet,
    Serve,
    Name(Player),
    Flag(Player),
    TieVisible,
}

impl CanonicalField {
    pub fn all() -> Vec<CanonicalField> {
        let mut fields = Vec::new();
        for player in Player::BOTH {
            fields.push(CanonicalField::Points(player));
            fields.push(CanonicalField::TieBreak(player));
            for set in 1..=3 {
                fields.push(CanonicalField::SetGames(set, player));
            }
            fields.push(CanonicalField::CurrentSetGames(player));
            fields.push(CanonicalField::Name(player));
            fields.push(CanonicalField::Flag(player));
        }
        fields.push(CanonicalField::CurrentSet);
        fields.push(CanonicalField::Serve);
        fields.push(CanonicalField::TieVisible);
        fields
    }

    pub fn name(&self) -> String {
        match self {
            CanonicalField::Points(p) => format!("PointsPlayer{}", p.letter()),
            CanonicalField::TieBreak(p) => format!("TieBreakPlayer{}", p.letter()),
            CanonicalField::SetGames(set, p) => format!("Set{}Player{}", set, p.letter()),
            CanonicalField::CurrentSetGames(p) => format!("CurrentSetPlayer{}", p.letter()),
            CanonicalField::CurrentSet => "CurrentSet".to_string(),
            CanonicalField::Serve => "Serve".to_string(),
            CanonicalField::Name(p) => format!("NamePlayer{}", p.letter()),
            CanonicalField::Flag(p) => format!("FlagPlayer{}", p.letter()),
            CanonicalField::TieVisible => "TieVisible".to_string(),
        }
    }

    /// Default numeric allow-list: every counter-like field.
    pub fn is_numeric_by_default(&self) -> bool {
        matches!(
            self,
            CanonicalField::Points(_)
                | CanonicalField::TieBreak(_)
                | CanonicalField::SetGames(..)
                | CanonicalField::CurrentSetGames(_)
                | CanonicalField::CurrentSet
        )
    }

    /// Raw field names that resolve to this field, already folded (lowercase,
    /// no `_` or `-`).
    fn aliases(&self) -> Vec<String> {
        match self {
            CanonicalField::Points(p) => {
                let l = p.lower();
                vec![
                    format!("pointsplayer{l}"),
                    format!("points{l}"),
                    format!("player{l}points"),
                    format!("score{l}"),
                ]
            }
            CanonicalField::TieBreak(p) => {
                let l = p.lower();
                vec![
                    format!("tiebreakplayer{l}"),
                    format!("tiebreak{l}"),
                    format!("tbplayer{l}"),
                    format!("tb{l}"),
                    format!("player{l}tiebreak"),
                ]
            }
            CanonicalField::SetGames(set, p) => {
                let l = p.lower();
                vec![
                    format!("set{set}player{l}"),
                    format!("set{set}{l}"),
                    format!("setsplayer{l}{set}"),
                ]
            }
            CanonicalField::CurrentSetGames(p) => {
                let l = p.lower();
                vec![
                    format!("currentsetplayer{l}"),
                    format!("gamesplayer{l}"),
                    format!("games{l}"),
                ]
            }
            CanonicalField::CurrentSet => vec!["currentset".into(), "setnumber".into()],
            CanonicalField::Serve => vec!["serve".into(), "server".into(), "serving".into()],
            CanonicalField::Name(p) => {
                let l = p.lower();
                vec![
                    format!("nameplayer{l}"),
                    format!("name{l}"),
                    format!("player{l}name"),
                ]
            }
            CanonicalField::Flag(p) => {
                let l = p.lower();
                vec![
                    format!("flagplayer{l}"),
                    format!("flag{l}"),
                    format!("countryplayer{l}"),
                ]
            }
            CanonicalField::TieVisible => vec![
                "tievisible".into(),
                "tiebreakvisible".into(),
                "showtiebreak".into(),
            ],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for CanonicalField {
    type Error = RelayError;

    fn try_from(name: String) -> Result<Self> {
        CanonicalField::all()
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(name.trim()))
            .ok_or(RelayError::UnknownField { name })
    }
}

impl From<CanonicalField> for String {
    fn from(field: CanonicalField) -> Self {
        field.name()
    }
}

static ALIASES: Lazy<HashMap<String, CanonicalField>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for field in CanonicalField::all() {
        for alias in field.aliases() {
            table.insert(alias, field);
        }
    }
    table
});

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves a dotted raw path by its last segment. Unknown names yield `None`.
pub fn canonical_field(raw_path: &str) -> Option<CanonicalField> {
    let last = raw_path.rsplit('.').next()?;
    ALIASES.get(&fold_name(last)).copied()
}

/// Applies the unwrap rules and returns the innermost value, or `None` when an
/// empty sequence was reached.
pub fn unwrap_raw(raw: &JsonValue) -> Option<&JsonValue> {
    let mut current = raw;
    for _ in 0..MAX_UNWRAP_DEPTH {
        current = match current {
            JsonValue::Array(items) => items.last()?,
            JsonValue::Object(map) => match UNWRAP_KEYS.iter().find_map(|key| map.get(*key)) {
                Some(inner) => inner,
                None => return Some(current),
            },
            _ => return Some(current),
        };
    }
    Some(current)
}

/// Turns an unwrapped raw value into a canonical [`Value`].
pub fn decode_scalar(raw: &JsonValue, numeric: bool) -> Value {
    match raw {
        JsonValue::Null => Value::Absent,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(number) => {
            if numeric {
                if let Some(n) = number.as_i64() {
                    return Value::Number(n);
                }
                if let Some(f) = number.as_f64() {
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                        return Value::Number(f as i64);
                    }
                }
            }
            Value::Text(number_text(number))
        }
        JsonValue::String(text) => coerce_text(text, numeric),
        other => Value::Text(other.to_string()),
    }
}

/// Maps raw field updates onto canonical fields and values.
#[derive(Debug, Clone)]
pub struct Normalizer {
    numeric_fields: HashSet<CanonicalField>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        let numeric_fields = CanonicalField::all()
            .into_iter()
            .filter(CanonicalField::is_numeric_by_default)
            .collect();
        Self { numeric_fields }
    }

    /// Replaces the numeric allow-list.
    pub fn with_numeric_fields(fields: impl IntoIterator<Item = CanonicalField>) -> Self {
        Self { numeric_fields: fields.into_iter().collect() }
    }

    pub fn is_numeric(&self, field: CanonicalField) -> bool {
        self.numeric_fields.contains(&field)
    }

    pub fn decode(&self, field: CanonicalField, raw: &JsonValue) -> Value {
        match unwrap_raw(raw) {
            Some(inner) => decode_scalar(inner, self.is_numeric(field)),
            None => Value::Absent,
        }
    }

    /// `None` for field names with no canonical mapping; that is routine for
    /// upstream payloads and not an error.
    pub fn normalize(&self, raw_path: &str, raw: &JsonValue) -> Option<(CanonicalField, Value)> {
        let Some(field) = canonical_field(raw_path) else {
            log::debug!("Dropping unmapped raw field '{}'", raw_path);
            return None;
        };
        Some((field, self.decode(field, raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_aliases() {
        assert_eq!(canonical_field("PointsPlayerA"), Some(CanonicalField::Points(Player::A)));
        assert_eq!(canonical_field("score.points_b"), Some(CanonicalField::Points(Player::B)));
        assert_eq!(
            canonical_field("data.match.tie-break-a"),
            Some(CanonicalField::TieBreak(Player::A))
        );
        assert_eq!(canonical_field("Set2PlayerB"), Some(CanonicalField::SetGames(2, Player::B)));
        assert_eq!(canonical_field("state.TieBreakVisible"), Some(CanonicalField::TieVisible));
        assert_eq!(canonical_field("state.weather"), None);
        assert_eq!(canonical_field(""), None);
    }

    #[test]
    fn test_unwrap_priority() {
        assert_eq!(unwrap_raw(&json!([1, 2, 3])), Some(&json!(3)));
        assert_eq!(unwrap_raw(&json!({"v": [10, 15]})), Some(&json!(15)));
        // `v` wins over `value`, which wins over `text`.
        assert_eq!(unwrap_raw(&json!({"v": 1, "value": 2, "text": 3})), Some(&json!(1)));
        assert_eq!(unwrap_raw(&json!({"value": 2, "text": 3})), Some(&json!(2)));
        assert_eq!(unwrap_raw(&json!({"text": "AD"})), Some(&json!("AD")));
        assert_eq!(unwrap_raw(&json!([{"value": {"text": "30"}}])), Some(&json!("30")));
        assert_eq!(unwrap_raw(&json!([])), None);
    }

    #[test]
    fn test_decode_values() {
        let normalizer = Normalizer::new();
        let points = CanonicalField::Points(Player::A);
        let name = CanonicalField::Name(Player::A);
        assert_eq!(normalizer.decode(points, &json!("40")), Value::Number(40));
        assert_eq!(normalizer.decode(points, &json!("AD")), Value::Text("AD".into()));
        assert_eq!(normalizer.decode(points, &json!("")), Value::Absent);
        assert_eq!(normalizer.decode(points, &json!({"v": []})), Value::Absent);
        assert_eq!(normalizer.decode(points, &json!(15.0)), Value::Number(15));
        assert_eq!(normalizer.decode(name, &json!("0042")), Value::Text("0042".into()));
        assert_eq!(normalizer.decode(name, &json!(7)), Value::Text("7".into()));
        assert_eq!(normalizer.decode(name, &json!("false")), Value::Boolean(false));
    }

    #[test]
    fn test_unknown_shapes_are_stringified() {
        let normalizer = Normalizer::new();
        let value = normalizer.decode(CanonicalField::Name(Player::B), &json!({"first": "Ana"}));
        assert_eq!(value, Value::Text(r#"{"first":"Ana"}"#.into()));
    }

    #[test]
    fn test_normalize_drops_unknown_fields() {
        let normalizer = Normalizer::new();
        assert!(normalizer.normalize("meta.clock", &json!("12:00")).is_none());
        assert_eq!(
            normalizer.normalize("x.TieBreakPlayerB", &json!({"value": "3"})),
            Some((CanonicalField::TieBreak(Player::B), Value::Number(3)))
        );
    }

    #[test]
    fn test_custom_numeric_list() {
        let normalizer = Normalizer::with_numeric_fields([CanonicalField::Serve]);
        assert_eq!(normalizer.decode(CanonicalField::Serve, &json!("1")), Value::Number(1));
        assert_eq!(
            normalizer.decode(CanonicalField::Points(Player::A), &json!("15")),
            Value::Text("15".into())
        );
    }

    #[test]
    fn test_field_names_round_trip_through_serde() {
        let field: CanonicalField = serde_json::from_str(r#""set3playera""#).unwrap();
        assert_eq!(field, CanonicalField::SetGames(3, Player::A));
        assert_eq!(serde_json::to_string(&field).unwrap(), r#""Set3PlayerA""#);
        assert!(serde_json::from_str::<CanonicalField>(r#""Bogus""#).is_err());
    }
}
