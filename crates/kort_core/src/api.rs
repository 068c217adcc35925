//! JSON entry points for adapters that speak JSON lines.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RelayConfig;
use crate::dispatch::{JsonLinesDispatcher, Relay};
use crate::engine::{Clock, Engine};
use crate::error::{RelayError, Result};
use crate::event::RawEvent;
use crate::state::MatchState;
use crate::SCHEMA_VERSION;

/// Decodes JSON-lines raw events. Blank lines are skipped; each bad line
/// becomes a [`RelayError::MalformedEvent`] carrying its 1-based number.
pub fn decode_events(events_jsonl: &str) -> Vec<Result<RawEvent>> {
    events_jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| decode_event_line(index + 1, line))
        .collect()
}

pub fn decode_event_line(line_number: usize, line: &str) -> Result<RawEvent> {
    serde_json::from_str(line.trim())
        .map_err(|e| RelayError::MalformedEvent { line: line_number, message: e.to_string() })
}

/// Runs JSON-lines events through a fresh engine and returns the reflect
/// commands as JSON lines. A config (YAML or JSON) is optional; recoverable
/// decoding errors are logged and the line is skipped.
pub fn process_events_json(config: Option<&str>, events_jsonl: &str) -> Result<String> {
    let config = match config {
        Some(content) => RelayConfig::from_yaml(content)?,
        None => RelayConfig::default(),
    };
    let mut relay = Relay::new(Engine::new(&config), JsonLinesDispatcher::new(Vec::new()));

    for decoded in decode_events(events_jsonl) {
        match decoded {
            Ok(event) => {
                relay.handle(&event);
            }
            Err(e) if e.is_recoverable() => log::warn!("Skipping event: {}", e),
            Err(e) => return Err(e),
        }
    }

    let (_, dispatcher) = relay.into_parts();
    Ok(String::from_utf8_lossy(&dispatcher.into_inner()).into_owned())
}

#[derive(Debug, Serialize)]
pub struct StateDump<'a> {
    pub schema_version: u8,
    pub matches: BTreeMap<&'a str, &'a MatchState>,
}

/// Pretty JSON of every match state the engine holds.
pub fn dump_state_json<C: Clock>(engine: &Engine<C>) -> Result<String> {
    let store = engine.store();
    let matches = store
        .keys()
        .filter_map(|key| store.get(key).map(|state| (key.as_str(), state)))
        .collect();
    let dump = StateDump { schema_version: SCHEMA_VERSION, matches };
    Ok(serde_json::to_string_pretty(&dump)?)
}
