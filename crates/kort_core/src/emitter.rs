//! Change detector / emitter
//!
//! Turns one applied update plus its policy outcome into the ordered reflect
//! commands for the dispatcher. Order within one update is fixed:
//! 1. the primary field's own command (only when the field changed)
//! 2. tie-break visibility
//! 3. re-reflected points for player A
//! 4. re-reflected points for player B

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::normalizer::CanonicalField;
use crate::overlay::OverlayKey;
use crate::state::{MatchState, Player};
use crate::tiebreak::{displayed_points, PolicyOutcome, TieBreakControl, VisibilityReason};
use crate::value::Value;

pub const EXTRA_REASON: &str = "reason";
pub const EXTRA_TIE_BREAK_FALLBACK: &str = "tieBreakFallback";
pub const EXTRA_SHADOWED: &str = "shadowed";

pub type Extras = BTreeMap<String, JsonValue>;

/// Canonical downstream command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    SetPoints(Player),
    SetTieBreak(Player),
    SetTieVisible,
    ShowTieBreak,
    HideTieBreak,
    SetSetGames(u8, Player),
    SetCurrentSetGames(Player),
    SetCurrentSet,
    SetServe,
    SetName(Player),
    SetFlag(Player),
}

impl CommandName {
    /// The command a stored field reflects to. `TieVisible` is a control, not
    /// a stored field, so it has none.
    pub fn for_field(field: CanonicalField) -> Option<CommandName> {
        Some(match field {
            CanonicalField::Points(p) => CommandName::SetPoints(p),
            CanonicalField::TieBreak(p) => CommandName::SetTieBreak(p),
            CanonicalField::SetGames(set, p) => CommandName::SetSetGames(set, p),
            CanonicalField::CurrentSetGames(p) => CommandName::SetCurrentSetGames(p),
            CanonicalField::CurrentSet => CommandName::SetCurrentSet,
            CanonicalField::Serve => CommandName::SetServe,
            CanonicalField::Name(p) => CommandName::SetName(p),
            CanonicalField::Flag(p) => CommandName::SetFlag(p),
            CanonicalField::TieVisible => return None,
        })
    }

    pub fn name(&self) -> String {
        match self {
            CommandName::SetPoints(p) => format!("SetPointsPlayer{}", p.letter()),
            CommandName::SetTieBreak(p) => format!("SetTieBreakPlayer{}", p.letter()),
            CommandName::SetTieVisible => "SetTieVisible".to_string(),
            CommandName::ShowTieBreak => "ShowTieBreak".to_string(),
            CommandName::HideTieBreak => "HideTieBreak".to_string(),
            CommandName::SetSetGames(set, p) => format!("SetSet{}Player{}", set, p.letter()),
            CommandName::SetCurrentSetGames(p) => format!("SetCurrentSetPlayer{}", p.letter()),
            CommandName::SetCurrentSet => "SetCurrentSet".to_string(),
            CommandName::SetServe => "SetServe".to_string(),
            CommandName::SetName(p) => format!("SetNamePlayer{}", p.letter()),
            CommandName::SetFlag(p) => format!("SetFlagPlayer{}", p.letter()),
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for CommandName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// One immutable downstream instruction. Delivering it twice is harmless.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectCommand {
    pub overlay: OverlayKey,
    pub kort: String,
    pub command: CommandName,
    pub value: Value,
    pub extras: Option<Extras>,
    pub reflected_at: DateTime<Utc>,
}

impl ReflectCommand {
    pub fn extra(&self, key: &str) -> Option<&JsonValue> {
        self.extras.as_ref()?.get(key)
    }

    /// Equality ignoring `reflected_at`.
    pub fn same_as(&self, other: &ReflectCommand) -> bool {
        self.overlay == other.overlay
            && self.kort == other.kort
            && self.command == other.command
            && self.value == other.value
            && self.extras == other.extras
    }
}

/// Addressing shared by every command of one update.
#[derive(Debug, Clone)]
pub struct Target {
    pub overlay: OverlayKey,
    pub kort: String,
    pub reflected_at: DateTime<Utc>,
}

/// What triggered the emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
    /// A stored field write; `changed` is false when the value was already known.
    Field { field: CanonicalField, changed: bool },
    Control(TieBreakControl),
    /// No command of its own; only the policy outcome is emitted.
    Policy,
}

struct Batch<'a> {
    target: &'a Target,
    commands: Vec<ReflectCommand>,
}

impl<'a> Batch<'a> {
    fn push(&mut self, command: CommandName, value: Value, extras: Option<Extras>) {
        if value.is_absent() {
            return;
        }
        self.commands.push(ReflectCommand {
            overlay: self.target.overlay.clone(),
            kort: self.target.kort.clone(),
            command,
            value,
            extras,
            reflected_at: self.target.reflected_at,
        });
    }

    fn points(&mut self, state: &MatchState, player: Player, shadowed: bool) {
        let shown = displayed_points(state, player);
        let mut extras = Extras::new();
        if shown.fallback {
            extras.insert(EXTRA_TIE_BREAK_FALLBACK.to_string(), JsonValue::Bool(true));
        }
        if shadowed {
            extras.insert(EXTRA_SHADOWED.to_string(), JsonValue::Bool(true));
        }
        let extras = (!extras.is_empty()).then_some(extras);
        self.push(CommandName::SetPoints(player), shown.value, extras);
    }
}

fn reason_extras(reason: VisibilityReason) -> Option<Extras> {
    let mut extras = Extras::new();
    extras.insert(EXTRA_REASON.to_string(), JsonValue::from(reason.as_str()));
    Some(extras)
}

/// Derives the ordered command list for one applied update. `state` must
/// already reflect the write and the policy outcome.
pub fn emit(
    target: &Target,
    state: &MatchState,
    primary: &Primary,
    outcome: &PolicyOutcome,
) -> Vec<ReflectCommand> {
    let mut batch = Batch { target, commands: Vec::new() };

    match primary {
        Primary::Field { field, changed: true } => match field {
            CanonicalField::Points(player) => {
                batch.points(state, *player, state.tie_break_visible);
            }
            other => {
                if let Some(command) = CommandName::for_field(*other) {
                    batch.push(command, state.get(*other), None);
                }
            }
        },
        Primary::Field { changed: false, .. } | Primary::Policy => {}
        Primary::Control(control) => {
            let explicit = reason_extras(VisibilityReason::Explicit);
            if control.target() {
                batch.push(CommandName::ShowTieBreak, Value::Boolean(true), explicit);
            } else {
                batch.push(CommandName::HideTieBreak, Value::Boolean(false), explicit);
            }
        }
    }

    if let Some(change) = outcome.visibility {
        let extras = reason_extras(change.reason);
        batch.push(CommandName::SetTieVisible, Value::Boolean(change.visible), extras.clone());
        if change.reason == VisibilityReason::Reset {
            batch.push(CommandName::HideTieBreak, Value::Boolean(false), extras);
        }
    }

    for player in outcome.reflect.players() {
        batch.points(state, player, false);
    }

    batch.commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiebreak::{apply_control, on_counter_update, Reflect};

    fn target() -> Target {
        Target {
            overlay: OverlayKey::normalize("42").unwrap(),
            kort: "1".to_string(),
            reflected_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn names(commands: &[ReflectCommand]) -> Vec<String> {
        commands.iter().map(|c| c.command.name()).collect()
    }

    #[test]
    fn test_unchanged_field_emits_nothing() {
        let state = MatchState::new();
        let primary = Primary::Field { field: CanonicalField::Serve, changed: false };
        assert!(emit(&target(), &state, &primary, &PolicyOutcome::default()).is_empty());
    }

    #[test]
    fn test_absent_value_emits_nothing() {
        let state = MatchState::new();
        let primary = Primary::Field { field: CanonicalField::Name(Player::A), changed: true };
        assert!(emit(&target(), &state, &primary, &PolicyOutcome::default()).is_empty());
    }

    #[test]
    fn test_counter_update_order() {
        let mut state = MatchState::new();
        state.write(CanonicalField::TieBreak(Player::A), Value::Number(1));
        let outcome = on_counter_update(&mut state, Player::A, true);
        let primary = Primary::Field { field: CanonicalField::TieBreak(Player::A), changed: true };

        let commands = emit(&target(), &state, &primary, &outcome);
        assert_eq!(
            names(&commands),
            vec!["SetTieBreakPlayerA", "SetTieVisible", "SetPointsPlayerA", "SetPointsPlayerB"]
        );
        assert_eq!(commands[1].extra(EXTRA_REASON), Some(&JsonValue::from("auto")));
        assert_eq!(commands[2].value, Value::Number(1));
        assert_eq!(commands[3].extra(EXTRA_TIE_BREAK_FALLBACK), Some(&JsonValue::Bool(true)));
    }

    #[test]
    fn test_control_order() {
        let mut state = MatchState::new();
        let control = TieBreakControl::Hide;
        let outcome = apply_control(&mut state, &control);
        assert_eq!(outcome.reflect, Reflect::Both);

        let commands = emit(&target(), &state, &Primary::Control(control), &outcome);
        assert_eq!(
            names(&commands),
            vec!["HideTieBreak", "SetTieVisible", "SetPointsPlayerA", "SetPointsPlayerB"]
        );
        assert_eq!(commands[1].value, Value::Boolean(false));
        assert_eq!(commands[2].value, Value::Number(0));
    }

    #[test]
    fn test_policy_primary_emits_outcome_only() {
        let mut state = MatchState::new();
        state.write(CanonicalField::TieBreak(Player::A), Value::Number(2));
        state.tie_break_visible = true;
        let outcome = PolicyOutcome { visibility: None, reflect: Reflect::Player(Player::A) };

        let commands = emit(&target(), &state, &Primary::Policy, &outcome);
        assert_eq!(names(&commands), vec!["SetPointsPlayerA"]);
        assert_eq!(commands[0].value, Value::Number(2));
    }

    #[test]
    fn test_wire_shape() {
        let state = {
            let mut s = MatchState::new();
            s.write(CanonicalField::Name(Player::B), Value::Text("Ana".into()));
            s
        };
        let primary = Primary::Field { field: CanonicalField::Name(Player::B), changed: true };
        let commands = emit(&target(), &state, &primary, &PolicyOutcome::default());
        let json = serde_json::to_value(&commands[0]).unwrap();
        assert_eq!(json["overlay"], "overlay-42");
        assert_eq!(json["kort"], "1");
        assert_eq!(json["command"], "SetNamePlayerB");
        assert_eq!(json["value"], "Ana");
        assert!(json["extras"].is_null());
        assert_eq!(json["reflectedAt"], "2026-01-01T00:00:00Z");
    }
}
