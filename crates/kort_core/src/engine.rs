//! The single processing path: raw event → normalizer → store → tie-break
//! policy → emitter.
//!
//! Events are handled one at a time and completely; nothing here is async and
//! nothing here fails. Dispatching the returned commands is someone else's job.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::RelayConfig;
use crate::emitter::{emit, Primary, ReflectCommand, Target};
use crate::event::{Envelope, RawControl, RawEvent, RawSnapshot, RawUpdate};
use crate::normalizer::{CanonicalField, Normalizer};
use crate::overlay::{resolve_kort, OverlayKey};
use crate::state::{MatchState, MatchStore, Player};
use crate::tiebreak::{self, PolicyOutcome, TieBreakControl};
use crate::value::Value;

/// Source of `reflectedAt` timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A normalized input for one match.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Field(CanonicalField, Value),
    Control(TieBreakControl),
    /// Fields of one polled snapshot in application order.
    Snapshot(Vec<(CanonicalField, Value)>),
}

/// Applies one input to `state` in place and returns the commands it causes.
pub fn apply_input(state: &mut MatchState, input: &Input, target: &Target) -> Vec<ReflectCommand> {
    match input {
        Input::Field(field, value) => write_field(state, *field, value, target),
        Input::Control(TieBreakControl::SetVisible(Value::Absent)) => Vec::new(),
        Input::Control(control) => {
            let outcome = tiebreak::apply_control(state, control);
            emit(target, state, &Primary::Control(control.clone()), &outcome)
        }
        Input::Snapshot(fields) => apply_snapshot_fields(state, fields, target),
    }
}

fn write_field(
    state: &mut MatchState,
    field: CanonicalField,
    value: &Value,
    target: &Target,
) -> Vec<ReflectCommand> {
    if value.is_absent() {
        return Vec::new();
    }
    if field == CanonicalField::TieVisible {
        return reconcile(state, value.is_truthy(), &[], target);
    }
    let prior = state.write(field, value.clone());
    let changed = prior != *value;
    let outcome = match field {
        CanonicalField::TieBreak(player) => tiebreak::on_counter_update(state, player, changed),
        _ => PolicyOutcome::default(),
    };
    emit(target, state, &Primary::Field { field, changed }, &outcome)
}

/// With a reported `TieVisible`, counters are only stored while the fields are
/// written; visibility is decided once, from the counters and the report together.
fn apply_snapshot_fields(
    state: &mut MatchState,
    fields: &[(CanonicalField, Value)],
    target: &Target,
) -> Vec<ReflectCommand> {
    let reported = fields.iter().find_map(|(field, value)| match field {
        CanonicalField::TieVisible if !value.is_absent() => Some(value.is_truthy()),
        _ => None,
    });
    let Some(visible) = reported else {
        return fields
            .iter()
            .flat_map(|(field, value)| write_field(state, *field, value, target))
            .collect();
    };

    let mut commands = Vec::new();
    let mut moved = Vec::new();
    for (field, value) in fields {
        match field {
            CanonicalField::TieVisible => {}
            CanonicalField::TieBreak(player) if !value.is_absent() => {
                let changed = state.write(*field, value.clone()) != *value;
                if changed {
                    moved.push(*player);
                }
                let primary = Primary::Field { field: *field, changed };
                commands.extend(emit(target, state, &primary, &PolicyOutcome::default()));
            }
            _ => commands.extend(write_field(state, *field, value, target)),
        }
    }
    commands.extend(reconcile(state, visible, &moved, target));
    commands
}

fn reconcile(
    state: &mut MatchState,
    visible: bool,
    moved: &[Player],
    target: &Target,
) -> Vec<ReflectCommand> {
    let reconciled = tiebreak::reconcile_visibility(state, visible, moved);
    let primary = match reconciled.forced {
        Some(control) => Primary::Control(control),
        None => Primary::Policy,
    };
    emit(target, state, &primary, &reconciled.outcome)
}

/// Pure form of [`apply_input`]: `(state, input) -> (state', commands)`.
pub fn reduce(
    mut state: MatchState,
    input: &Input,
    target: &Target,
) -> (MatchState, Vec<ReflectCommand>) {
    let commands = apply_input(&mut state, input, target);
    (state, commands)
}

/// Snapshot application order: pass-through fields, regular points,
/// tie-break counters, then the reported visibility.
fn snapshot_rank(field: CanonicalField) -> u8 {
    match field {
        CanonicalField::Points(_) => 1,
        CanonicalField::TieBreak(_) => 2,
        CanonicalField::TieVisible => 3,
        _ => 0,
    }
}

/// Owns the match store for one relay process.
pub struct Engine<C: Clock = SystemClock> {
    store: MatchStore,
    normalizer: Normalizer,
    korts: BTreeMap<OverlayKey, String>,
    default_kort: String,
    clock: C,
}

impl Engine<SystemClock> {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for Engine<SystemClock> {
    fn default() -> Self {
        Self::new(&RelayConfig::default())
    }
}

impl<C: Clock> Engine<C> {
    /// Invalid kort mappings are skipped with a warning; use
    /// [`RelayConfig::validate`] to reject them up front.
    pub fn with_clock(config: &RelayConfig, clock: C) -> Self {
        let korts = match config.resolved_korts() {
            Ok(korts) => korts,
            Err(e) => {
                log::warn!("Ignoring invalid kort mapping: {}", e);
                config
                    .korts
                    .iter()
                    .filter_map(|(hint, kort)| Some((OverlayKey::normalize(hint)?, kort.clone())))
                    .collect()
            }
        };
        Self {
            store: MatchStore::new(),
            normalizer: config.normalizer(),
            korts,
            default_kort: config.default_kort.clone(),
            clock,
        }
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn state(&self, key: &OverlayKey) -> Option<&MatchState> {
        self.store.get(key)
    }

    pub fn process(&mut self, event: &RawEvent) -> Vec<ReflectCommand> {
        match event {
            RawEvent::Update(update) => self.apply_update(update),
            RawEvent::Control(control) => self.apply_control(control),
            RawEvent::Snapshot(snapshot) => self.apply_snapshot(snapshot),
        }
    }

    pub fn apply_update(&mut self, update: &RawUpdate) -> Vec<ReflectCommand> {
        let Some(key) = update.envelope.overlay_key(Some(update.raw_field_path.as_str())) else {
            log::debug!("Discarding update '{}': no overlay key", update.raw_field_path);
            return Vec::new();
        };
        let normalized = self.normalizer.normalize(&update.raw_field_path, &update.raw_value);
        let Some((field, value)) = normalized else {
            return Vec::new();
        };
        self.apply_inputs(&key, &update.envelope, &[Input::Field(field, value)])
    }

    pub fn apply_control(&mut self, control: &RawControl) -> Vec<ReflectCommand> {
        let Some(key) = control.envelope.overlay_key(None) else {
            log::debug!("Discarding control '{}': no overlay key", control.command);
            return Vec::new();
        };
        let Some(parsed) = control.to_control() else {
            log::debug!("Dropping unknown control '{}' for {}", control.command, key);
            return Vec::new();
        };
        if parsed == TieBreakControl::SetVisible(Value::Absent) {
            log::debug!("Dropping '{}' without a value for {}", control.command, key);
            return Vec::new();
        }
        self.apply_inputs(&key, &control.envelope, &[Input::Control(parsed)])
    }

    pub fn apply_snapshot(&mut self, snapshot: &RawSnapshot) -> Vec<ReflectCommand> {
        let Some(key) = snapshot.envelope.overlay_key(None) else {
            log::debug!(
                "Discarding snapshot with {} fields: no overlay key",
                snapshot.fields.len()
            );
            return Vec::new();
        };
        let mut inputs: Vec<(CanonicalField, Value)> = Vec::new();
        for (path, raw) in &snapshot.fields {
            let Some((field, value)) = self.normalizer.normalize(path, raw) else {
                continue;
            };
            match inputs.iter_mut().find(|(known, _)| *known == field) {
                Some(slot) if !value.is_absent() => slot.1 = value,
                Some(_) => {}
                None => inputs.push((field, value)),
            }
        }
        if inputs.is_empty() {
            return Vec::new();
        }
        inputs.sort_by_key(|(field, _)| (snapshot_rank(*field), *field));
        self.apply_inputs(&key, &snapshot.envelope, &[Input::Snapshot(inputs)])
    }

    fn apply_inputs(
        &mut self,
        key: &OverlayKey,
        envelope: &Envelope,
        inputs: &[Input],
    ) -> Vec<ReflectCommand> {
        let reflected_at = self.clock.now();
        let configured = self.korts.get(key).map(String::as_str);
        let extras_kort = envelope.extras_kort();
        let state = self.store.get_or_create(key);
        let candidates =
            [envelope.kort.as_deref(), extras_kort.as_deref(), configured, state.kort.as_deref()];
        let kort = resolve_kort(candidates, &self.default_kort);
        if !kort.is_empty() {
            state.kort = Some(kort.clone());
        }
        let target = Target { overlay: key.clone(), kort, reflected_at };
        inputs.iter().flat_map(|input| apply_input(state, input, &target)).collect()
    }
}
