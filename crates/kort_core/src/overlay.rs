//! Overlay key normalization and kort resolution.
//!
//! An overlay key identifies one match session of the scoring-control
//! application. Hints arrive as bare ids (`"123"`), prefixed ids
//! (`"OV-123"`, `"overlay:ab12"`) or free text with an embedded id
//! (`"https://host/overlay/123?view=1"`). All of them collapse to the
//! canonical `overlay-<id>` form.

use serde::Serialize;
use std::fmt;

const CANONICAL_PREFIX: &str = "overlay-";

/// Longest first, so `overlays` is tried before `overlay` and `ov` before `o`.
const MARKERS: [&str; 4] = ["overlays", "overlay", "ov", "o"];

const SEPARATORS: [u8; 6] = [b'-', b'_', b':', b'/', b'=', b'.'];

/// Minimum digit run accepted from free text that carries no marker.
const MIN_FREE_TEXT_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OverlayKey(String);

impl OverlayKey {
    /// Normalizes any hint into a canonical key. Idempotent and
    /// case-insensitive; `None` when no id fragment can be recognized.
    pub fn normalize(hint: &str) -> Option<Self> {
        let lowered = hint.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return None;
        }
        if lowered.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Self::from_id(&lowered));
        }
        if let Some(id) = prefixed_id(&lowered) {
            return Some(Self::from_id(&id));
        }
        if let Some(id) = last_marked_id(&lowered) {
            return Some(Self::from_id(&id));
        }
        last_digit_run(&lowered).map(|id| Self::from_id(&id))
    }

    /// Like [`OverlayKey::normalize`] but only accepts ids introduced by an
    /// overlay marker. Used for weak hint sources such as path segments, where a
    /// bare number is more likely a set index than an overlay id.
    pub fn normalize_marked(hint: &str) -> Option<Self> {
        let lowered = hint.trim().to_ascii_lowercase();
        prefixed_id(&lowered)
            .or_else(|| last_marked_id(&lowered))
            .map(|id| Self::from_id(&id))
    }

    fn from_id(id: &str) -> Self {
        Self(format!("{CANONICAL_PREFIX}{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare id without the canonical prefix.
    pub fn id(&self) -> &str {
        &self.0[CANONICAL_PREFIX.len()..]
    }
}

impl fmt::Display for OverlayKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_token(token: &str) -> bool {
    !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_alphanumeric())
        && token.bytes().any(|b| b.is_ascii_digit())
}

/// `<marker><sep><id>` covering the whole (lowercased) input.
fn prefixed_id(lowered: &str) -> Option<String> {
    MARKERS.iter().find_map(|marker| {
        let rest = lowered.strip_prefix(marker)?;
        let (&sep, id) = rest.as_bytes().split_first()?;
        if !SEPARATORS.contains(&sep) {
            return None;
        }
        let id = std::str::from_utf8(id).ok()?;
        is_id_token(id).then(|| id.to_string())
    })
}

/// The last `<marker><sep><id>` occurrence inside free text. Markers must start
/// at a word boundary so `photo-123` does not read as marker `o`.
fn last_marked_id(lowered: &str) -> Option<String> {
    let bytes = lowered.as_bytes();
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        let at_boundary = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        if at_boundary {
            for marker in MARKERS {
                let marker = marker.as_bytes();
                if !bytes[i..].starts_with(marker) {
                    continue;
                }
                let sep_at = i + marker.len();
                if sep_at >= bytes.len() || !SEPARATORS.contains(&bytes[sep_at]) {
                    continue;
                }
                let token: String = bytes[sep_at + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric())
                    .map(|&b| b as char)
                    .collect();
                if is_id_token(&token) {
                    found = Some(token);
                    break;
                }
            }
        }
        i += 1;
    }
    found
}

fn last_digit_run(lowered: &str) -> Option<String> {
    let mut best = None;
    let mut run = String::new();
    for c in lowered.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            run.push(c);
            continue;
        }
        if run.len() >= MIN_FREE_TEXT_DIGITS {
            best = Some(run.clone());
        }
        run.clear();
    }
    best
}

/// Picks the kort for an event: the first non-blank candidate in precedence
/// order, else `default_kort`.
pub fn resolve_kort<'a>(
    candidates: impl IntoIterator<Item = Option<&'a str>>,
    default_kort: &str,
) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|kort| !kort.is_empty())
        .unwrap_or(default_kort)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hint: &str) -> Option<String> {
        OverlayKey::normalize(hint).map(|k| k.as_str().to_string())
    }

    #[test]
    fn test_numeric_and_prefixed_ids() {
        assert_eq!(key("123"), Some("overlay-123".into()));
        assert_eq!(key("  OV-123 "), Some("overlay-123".into()));
        assert_eq!(key("overlay:AB12"), Some("overlay-ab12".into()));
        assert_eq!(key("Overlays/77"), Some("overlay-77".into()));
    }

    #[test]
    fn test_free_text_ids() {
        assert_eq!(
            key("https://app.example.com/overlay/4711?view=court"),
            Some("overlay-4711".into())
        );
        assert_eq!(key("photo-12 of match 98765"), Some("overlay-98765".into()));
        assert_eq!(key("court 12"), None);
        assert_eq!(key("no id here"), None);
        assert_eq!(key(""), None);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for hint in ["123", "OV-9x9", "see /overlay/55a", "id 000123"] {
            let once = OverlayKey::normalize(hint).unwrap();
            let twice = OverlayKey::normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "hint {hint}");
        }
    }

    #[test]
    fn test_marked_only_rejects_bare_numbers() {
        assert_eq!(OverlayKey::normalize_marked("1"), None);
        assert_eq!(
            OverlayKey::normalize_marked("overlay-42").map(|k| k.id().to_string()),
            Some("42".into())
        );
    }

    #[test]
    fn test_kort_precedence() {
        assert_eq!(resolve_kort([Some("2"), Some("3")], "0"), "2");
        assert_eq!(resolve_kort([None, Some(" "), Some("3")], "0"), "3");
        assert_eq!(resolve_kort([None, None], "0"), "0");
    }
}
