//! Raw events as delivered by the transport adapters.
//!
//! ```json
//! {"type":"update","overlay":"12","kort":"2","rawFieldPath":"PointsPlayerA","rawValue":{"v":[15]}}
//! {"type":"control","overlay":"12","command":"ShowTieBreak"}
//! {"type":"snapshot","overlay":"12","fields":{"PointsPlayerA":"30","TieBreakPlayerA":0}}
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};

use crate::normalizer::{decode_scalar, unwrap_raw};
use crate::overlay::OverlayKey;
use crate::tiebreak::TieBreakControl;
use crate::value::{number_text, Value};

const EXTRA_OVERLAY_KEYS: [&str; 2] = ["overlay", "overlayId"];
const EXTRA_KORT_KEY: &str = "kort";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RawEvent {
    Update(RawUpdate),
    Control(RawControl),
    Snapshot(RawSnapshot),
}

/// Addressing fields common to every raw event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, alias = "overlay", alias = "overlayId", deserialize_with = "loose_string")]
    pub overlay_key_hint: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub kort: Option<String>,
    #[serde(default)]
    pub extras: Option<Map<String, JsonValue>>,
}

impl Envelope {
    pub fn new(hint: impl Into<String>) -> Self {
        Self { overlay_key_hint: Some(hint.into()), ..Self::default() }
    }

    pub fn with_kort(mut self, kort: impl Into<String>) -> Self {
        self.kort = Some(kort.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: JsonValue) -> Self {
        self.extras.get_or_insert_with(Map::new).insert(key.to_string(), value);
        self
    }

    fn extra_text(&self, key: &str) -> Option<String> {
        self.extras.as_ref()?.get(key).and_then(scalar_text)
    }

    /// Tries the explicit hint, then `extras.overlay`, then overlay-marked
    /// segments of the field path (right to left, excluding the field name).
    pub fn overlay_key(&self, field_path: Option<&str>) -> Option<OverlayKey> {
        if let Some(key) = self.overlay_key_hint.as_deref().and_then(OverlayKey::normalize) {
            return Some(key);
        }
        let from_extras = EXTRA_OVERLAY_KEYS
            .iter()
            .filter_map(|k| self.extra_text(k))
            .find_map(|hint| OverlayKey::normalize(&hint));
        if from_extras.is_some() {
            return from_extras;
        }
        let path = field_path?;
        let mut segments = path.rsplit('.');
        segments.next();
        segments.find_map(OverlayKey::normalize_marked)
    }

    /// Kort duplicated inside extras; the top-level `kort` takes precedence.
    pub fn extras_kort(&self) -> Option<String> {
        self.extra_text(EXTRA_KORT_KEY)
    }
}

/// A single raw field update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUpdate {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(alias = "field", alias = "path")]
    pub raw_field_path: String,
    #[serde(default, alias = "value")]
    pub raw_value: JsonValue,
}

impl RawUpdate {
    pub fn new(
        envelope: Envelope,
        raw_field_path: impl Into<String>,
        raw_value: JsonValue,
    ) -> Self {
        Self { envelope, raw_field_path: raw_field_path.into(), raw_value }
    }
}

/// `ShowTieBreak`, `HideTieBreak` or `SetTieBreakVisible(value)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawControl {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub command: String,
    #[serde(default)]
    pub value: JsonValue,
}

impl RawControl {
    pub fn new(envelope: Envelope, command: impl Into<String>, value: JsonValue) -> Self {
        Self { envelope, command: command.into(), value }
    }

    /// `None` for commands the tie-break policy does not know. A missing or
    /// null value decodes to `SetVisible(Value::Absent)`.
    pub fn to_control(&self) -> Option<TieBreakControl> {
        let folded: String = self
            .command
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "showtiebreak" => Some(TieBreakControl::Show),
            "hidetiebreak" => Some(TieBreakControl::Hide),
            "settiebreakvisible" | "settievisible" => {
                let value = unwrap_raw(&self.value)
                    .map(|inner| decode_scalar(inner, true))
                    .unwrap_or(Value::Absent);
                Some(TieBreakControl::SetVisible(value))
            }
            _ => None,
        }
    }
}

/// A polled full-state snapshot: many raw fields for one overlay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number_text(number)),
        _ => None,
    }
}

/// Accepts strings and numbers (`"kort": 2`) alike.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}
