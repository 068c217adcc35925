//! # kort_core - Tennis Score Reconciliation Engine
//!
//! Normalizes raw score updates from the scoring-control application into one
//! canonical state per overlay and derives the ordered reflect commands that
//! keep downstream displays in sync.
//!
//! ## Pipeline
//! raw event → [`normalizer`] → [`state`] ↔ [`tiebreak`] → [`emitter`] → dispatcher
//!
//! - Single processing path, one event at a time ([`engine::Engine`])
//! - Local state always updates; dispatch is best-effort ([`dispatch`])
//! - Same ordered input, same ordered output (timestamps aside)

pub mod api;
pub mod config;
pub mod dispatch;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod overlay;
pub mod state;
pub mod tiebreak;
pub mod value;

pub use api::{decode_events, dump_state_json, process_events_json};
pub use config::{RelayConfig, CONFIG_PATH_ENV};
pub use dispatch::{Dispatcher, JsonLinesDispatcher, RecordingDispatcher, Relay};
pub use emitter::{CommandName, ReflectCommand};
pub use engine::{Clock, Engine, FixedClock, Input, SystemClock};
pub use error::{RelayError, Result};
pub use event::{Envelope, RawControl, RawEvent, RawSnapshot, RawUpdate};
pub use normalizer::{CanonicalField, Normalizer};
pub use overlay::OverlayKey;
pub use state::{MatchState, MatchStore, Player, TieBreakMode};
pub use tiebreak::{TieBreakControl, VisibilityReason};
pub use value::Value;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SCHEMA_VERSION: u8 = 1;
