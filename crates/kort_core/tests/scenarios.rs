//! End-to-end tie-break scenarios through the public engine API.

use chrono::{TimeZone, Utc};
use kort_core::emitter::{EXTRA_REASON, EXTRA_SHADOWED, EXTRA_TIE_BREAK_FALLBACK};
use kort_core::{
    Engine, Envelope, FixedClock, OverlayKey, RawControl, RawEvent, RawUpdate, ReflectCommand,
    RelayConfig, TieBreakMode, Value,
};
use serde_json::{json, Value as JsonValue};

const OVERLAY: &str = "https://scores.example.com/overlay/4711";

fn engine() -> Engine<FixedClock> {
    let config = RelayConfig::from_yaml("korts:\n  \"4711\": \"3\"\n").unwrap();
    Engine::with_clock(&config, FixedClock(Utc.with_ymd_and_hms(2026, 6, 1, 14, 0, 0).unwrap()))
}

fn key() -> OverlayKey {
    OverlayKey::normalize(OVERLAY).unwrap()
}

fn update(engine: &mut Engine<FixedClock>, path: &str, value: JsonValue) -> Vec<ReflectCommand> {
    engine.process(&RawEvent::Update(RawUpdate::new(Envelope::new(OVERLAY), path, value)))
}

fn control(engine: &mut Engine<FixedClock>, command: &str) -> Vec<ReflectCommand> {
    let control = RawControl::new(Envelope::new(OVERLAY), command, JsonValue::Null);
    engine.process(&RawEvent::Control(control))
}

fn summary(commands: &[ReflectCommand]) -> Vec<(String, Value)> {
    commands.iter().map(|c| (c.command.name(), c.value.clone())).collect()
}

fn entry(name: &str, value: impl Into<Value>) -> (String, Value) {
    (name.to_string(), value.into())
}

#[test]
fn scenario_a_auto_counter_turns_tie_break_on() {
    let mut engine = engine();
    update(&mut engine, "PointsPlayerB", json!("30"));

    let commands = update(&mut engine, "match.TieBreakPlayerA", json!({"v": ["1"]}));
    assert_eq!(
        summary(&commands),
        vec![
            entry("SetTieBreakPlayerA", 1),
            entry("SetTieVisible", true),
            entry("SetPointsPlayerA", 1),
            entry("SetPointsPlayerB", 30),
        ]
    );
    assert_eq!(commands[1].extra(EXTRA_REASON), Some(&json!("auto")));
    assert_eq!(commands[3].extra(EXTRA_TIE_BREAK_FALLBACK), Some(&json!(true)));
    assert!(commands.iter().all(|c| c.kort == "3" && c.overlay == key()));
}

#[test]
fn scenario_a_without_known_b_points_shows_zero() {
    let mut engine = engine();
    let commands = update(&mut engine, "TieBreakPlayerA", json!(1));
    assert_eq!(commands[3], ReflectCommand { value: Value::Number(0), ..commands[3].clone() });
    assert_eq!(commands[3].command.name(), "SetPointsPlayerB");
}

#[test]
fn scenario_b_forced_on_ends_when_both_counters_reset() {
    let mut engine = engine();
    control(&mut engine, "ShowTieBreak");
    update(&mut engine, "TieBreakPlayerA", json!(2));
    update(&mut engine, "TieBreakPlayerB", json!(1));

    let commands = update(&mut engine, "TieBreakPlayerA", json!(0));
    assert_eq!(
        summary(&commands),
        vec![entry("SetTieBreakPlayerA", 0), entry("SetPointsPlayerA", 0)]
    );
    assert_eq!(engine.state(&key()).unwrap().tie_break_mode, TieBreakMode::ForcedOn);

    let commands = update(&mut engine, "TieBreakPlayerB", json!(0));
    assert_eq!(
        summary(&commands),
        vec![
            entry("SetTieBreakPlayerB", 0),
            entry("SetTieVisible", false),
            entry("HideTieBreak", false),
            entry("SetPointsPlayerA", 0),
            entry("SetPointsPlayerB", 0),
        ]
    );
    assert_eq!(commands[1].extra(EXTRA_REASON), Some(&json!("reset")));
    let state = engine.state(&key()).unwrap();
    assert_eq!(state.tie_break_mode, TieBreakMode::Auto);
    assert!(!state.tie_break_visible);
}

#[test]
fn scenario_c_points_are_shadowed_while_tie_break_visible() {
    let mut engine = engine();
    update(&mut engine, "TieBreakPlayerA", json!(3));

    let commands = update(&mut engine, "PointsPlayerA", json!("40"));
    assert_eq!(summary(&commands), vec![entry("SetPointsPlayerA", 3)]);
    assert_eq!(commands[0].extra(EXTRA_SHADOWED), Some(&json!(true)));
    assert_eq!(engine.state(&key()).unwrap().points.a, Value::Number(40));

    // Ending the tie-break brings the stored regular points back.
    let commands = update(&mut engine, "TieBreakPlayerA", json!(0));
    assert_eq!(
        summary(&commands),
        vec![
            entry("SetTieBreakPlayerA", 0),
            entry("SetTieVisible", false),
            entry("SetPointsPlayerA", 40),
            entry("SetPointsPlayerB", 0),
        ]
    );
}

#[test]
fn scenario_d_show_tie_break_zeroes_everything() {
    let mut engine = engine();
    update(&mut engine, "PointsPlayerA", json!("AD"));
    update(&mut engine, "PointsPlayerB", json!(40));

    let commands = control(&mut engine, "ShowTieBreak");
    assert_eq!(
        summary(&commands),
        vec![
            entry("ShowTieBreak", true),
            entry("SetTieVisible", true),
            entry("SetPointsPlayerA", 0),
            entry("SetPointsPlayerB", 0),
        ]
    );
    assert_eq!(commands[1].extra(EXTRA_REASON), Some(&json!("explicit")));

    let state = engine.state(&key()).unwrap();
    assert_eq!(state.tie_break_mode, TieBreakMode::ForcedOn);
    for value in [&state.points.a, &state.points.b, &state.tie_break.a, &state.tie_break.b] {
        assert_eq!(value, &Value::Number(0));
    }
}

#[test]
fn show_then_hide_round_trip() {
    let mut engine = engine();
    update(&mut engine, "PointsPlayerA", json!(15));
    update(&mut engine, "TieBreakPlayerB", json!(4));

    control(&mut engine, "ShowTieBreak");
    update(&mut engine, "TieBreakPlayerA", json!(5));
    let commands = control(&mut engine, "HideTieBreak");
    assert_eq!(commands[0].command.name(), "HideTieBreak");

    let state = engine.state(&key()).unwrap();
    assert_eq!(state.tie_break_mode, TieBreakMode::ForcedOff);
    assert!(!state.tie_break_visible);
    for value in [&state.points.a, &state.points.b, &state.tie_break.a, &state.tie_break.b] {
        assert_eq!(value, &Value::Number(0));
    }

    // Pinned off: later counters are stored but never shown.
    let commands = update(&mut engine, "TieBreakPlayerA", json!(1));
    assert_eq!(summary(&commands), vec![entry("SetTieBreakPlayerA", 1)]);
}

#[test]
fn repeated_update_emits_primary_once() {
    let mut engine = engine();
    let first = update(&mut engine, "Set1PlayerA", json!("6"));
    let second = update(&mut engine, "Set1PlayerA", json!(6));
    assert_eq!(summary(&first), vec![entry("SetSet1PlayerA", 6)]);
    assert!(second.is_empty());
}

#[test]
fn empty_values_never_overwrite() {
    let mut engine = engine();
    update(&mut engine, "NamePlayerA", json!("Iga"));
    assert!(update(&mut engine, "NamePlayerA", json!("")).is_empty());
    assert!(update(&mut engine, "NamePlayerA", json!({"value": []})).is_empty());
    assert_eq!(engine.state(&key()).unwrap().names.a, Value::Text("Iga".into()));
}
