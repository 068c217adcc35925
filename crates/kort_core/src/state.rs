//! Match State Store
//!
//! One [`MatchState`] per overlay key, created lazily on the first event that
//! resolves to that key and never removed for the lifetime of the store.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::normalizer::CanonicalField;
use crate::overlay::OverlayKey;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Player {
    A,
    B,
}

impl Player {
    pub const BOTH: [Player; 2] = [Player::A, Player::B];

    pub fn other(self) -> Player {
        match self {
            Player::A => Player::B,
            Player::B => Player::A,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Player::A => 'A',
            Player::B => 'B',
        }
    }

    pub fn lower(self) -> char {
        self.letter().to_ascii_lowercase()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Player{}", self.letter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerPair<T> {
    #[serde(rename = "A")]
    pub a: T,
    #[serde(rename = "B")]
    pub b: T,
}

impl<T> PlayerPair<T> {
    pub fn get(&self, player: Player) -> &T {
        match player {
            Player::A => &self.a,
            Player::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, player: Player) -> &mut T {
        match player {
            Player::A => &mut self.a,
            Player::B => &mut self.b,
        }
    }
}

/// Tie-break policy state. `Auto` follows the counters; the forced modes come
/// from explicit show/hide controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreakMode {
    #[default]
    Auto,
    ForcedOn,
    ForcedOff,
}

impl fmt::Display for TieBreakMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TieBreakMode::Auto => write!(f, "Auto"),
            TieBreakMode::ForcedOn => write!(f, "ForcedOn"),
            TieBreakMode::ForcedOff => write!(f, "ForcedOff"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Regular-game point values, kept even while shadowed by the tie-break.
    pub points: PlayerPair<Value>,
    pub tie_break: PlayerPair<Value>,
    pub tie_break_visible: bool,
    pub tie_break_mode: TieBreakMode,
    pub sets: [PlayerPair<Value>; 3],
    pub current_set_games: PlayerPair<Value>,
    pub current_set: Value,
    pub serve: Value,
    pub names: PlayerPair<Value>,
    pub flags: PlayerPair<Value>,
    /// Last kort this overlay was reflected to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kort: Option<String>,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a canonical field. `TieVisible` reads the display mode.
    pub fn get(&self, field: CanonicalField) -> Value {
        match field {
            CanonicalField::TieVisible => Value::Boolean(self.tie_break_visible),
            other => self.slot(other).cloned().unwrap_or_default(),
        }
    }

    fn slot(&self, field: CanonicalField) -> Option<&Value> {
        match field {
            CanonicalField::Points(p) => Some(self.points.get(p)),
            CanonicalField::TieBreak(p) => Some(self.tie_break.get(p)),
            CanonicalField::SetGames(set, p) => set_index(set).map(|i| self.sets[i].get(p)),
            CanonicalField::CurrentSetGames(p) => Some(self.current_set_games.get(p)),
            CanonicalField::CurrentSet => Some(&self.current_set),
            CanonicalField::Serve => Some(&self.serve),
            CanonicalField::Name(p) => Some(self.names.get(p)),
            CanonicalField::Flag(p) => Some(self.flags.get(p)),
            CanonicalField::TieVisible => None,
        }
    }

    fn slot_mut(&mut self, field: CanonicalField) -> Option<&mut Value> {
        match field {
            CanonicalField::Points(p) => Some(self.points.get_mut(p)),
            CanonicalField::TieBreak(p) => Some(self.tie_break.get_mut(p)),
            CanonicalField::SetGames(set, p) => match set_index(set) {
                Some(i) => Some(self.sets[i].get_mut(p)),
                None => None,
            },
            CanonicalField::CurrentSetGames(p) => Some(self.current_set_games.get_mut(p)),
            CanonicalField::CurrentSet => Some(&mut self.current_set),
            CanonicalField::Serve => Some(&mut self.serve),
            CanonicalField::Name(p) => Some(self.names.get_mut(p)),
            CanonicalField::Flag(p) => Some(self.flags.get_mut(p)),
            CanonicalField::TieVisible => None,
        }
    }

    /// Stores `value` and returns the prior value. `Absent` leaves the field
    /// untouched; `TieVisible` has no slot here and is handled by the policy.
    pub fn write(&mut self, field: CanonicalField, value: Value) -> Value {
        let Some(slot) = self.slot_mut(field) else {
            return self.get(field);
        };
        if value.is_absent() {
            return slot.clone();
        }
        std::mem::replace(slot, value)
    }

    /// Zeroes regular points and tie-break counters for both players.
    pub fn zero_points_and_counters(&mut self) {
        for player in Player::BOTH {
            *self.points.get_mut(player) = Value::Number(0);
            *self.tie_break.get_mut(player) = Value::Number(0);
        }
    }
}

fn set_index(set: u8) -> Option<usize> {
    match set {
        1..=3 => Some(usize::from(set) - 1),
        _ => None,
    }
}

/// Owns every match state of one engine instance.
#[derive(Debug, Default)]
pub struct MatchStore {
    matches: BTreeMap<OverlayKey, MatchState>,
}

impl MatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: &OverlayKey) -> &mut MatchState {
        if !self.matches.contains_key(key) {
            log::debug!("Creating match state for {}", key);
        }
        self.matches.entry(key.clone()).or_default()
    }

    pub fn get(&self, key: &OverlayKey) -> Option<&MatchState> {
        self.matches.get(key)
    }

    /// Owned snapshot of one match.
    pub fn read(&self, key: &OverlayKey) -> Option<MatchState> {
        self.matches.get(key).cloned()
    }

    /// In-place field update returning the prior value; creates the match
    /// state when needed.
    pub fn write(&mut self, key: &OverlayKey, field: CanonicalField, value: Value) -> Value {
        self.get_or_create(key).write(field, value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &OverlayKey> {
        self.matches.keys()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
