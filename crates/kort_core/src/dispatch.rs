//! Dispatcher seam. The engine only produces commands; delivering them is
//! fire-and-forget from its point of view, so dispatchers swallow (and log)
//! their own failures.

use std::io::Write;

use crate::emitter::ReflectCommand;
use crate::engine::{Clock, Engine, SystemClock};
use crate::event::RawEvent;

pub trait Dispatcher {
    fn dispatch(&mut self, commands: &[ReflectCommand]);
}

/// Writes one JSON object per command per line.
pub struct JsonLinesDispatcher<W: Write> {
    writer: W,
    failures: usize,
}

impl<W: Write> JsonLinesDispatcher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, failures: 0 }
    }

    /// Commands that could not be written so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, command: &ReflectCommand) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, command)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> Dispatcher for JsonLinesDispatcher<W> {
    fn dispatch(&mut self, commands: &[ReflectCommand]) {
        for command in commands {
            if let Err(e) = self.write_line(command) {
                self.failures += 1;
                log::warn!("Failed to dispatch {} for {}: {}", command.command, command.overlay, e);
            }
        }
        if let Err(e) = self.writer.flush() {
            log::warn!("Failed to flush dispatched commands: {}", e);
        }
    }
}

/// Keeps every dispatched command in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub commands: Vec<ReflectCommand>,
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&mut self, commands: &[ReflectCommand]) {
        self.commands.extend_from_slice(commands);
    }
}

/// An engine wired to a dispatcher: process, then hand off. No retries.
pub struct Relay<D: Dispatcher, C: Clock = SystemClock> {
    engine: Engine<C>,
    dispatcher: D,
}

impl<D: Dispatcher, C: Clock> Relay<D, C> {
    pub fn new(engine: Engine<C>, dispatcher: D) -> Self {
        Self { engine, dispatcher }
    }

    /// Returns how many commands were handed to the dispatcher.
    pub fn handle(&mut self, event: &RawEvent) -> usize {
        let commands = self.engine.process(event);
        if !commands.is_empty() {
            self.dispatcher.dispatch(&commands);
        }
        commands.len()
    }

    pub fn engine(&self) -> &Engine<C> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn into_parts(self) -> (Engine<C>, D) {
        (self.engine, self.dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::event::{Envelope, RawUpdate};
    use serde_json::json;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn points_event(value: i64) -> RawEvent {
        RawEvent::Update(RawUpdate::new(Envelope::new("21"), "PointsPlayerA", json!(value)))
    }

    #[test]
    fn test_json_lines_output() {
        let mut relay = Relay::new(Engine::default(), JsonLinesDispatcher::new(Vec::new()));
        assert_eq!(relay.handle(&points_event(15)), 1);
        assert_eq!(relay.handle(&points_event(15)), 0);

        let (_, dispatcher) = relay.into_parts();
        let output = String::from_utf8(dispatcher.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["command"], "SetPointsPlayerA");
        assert_eq!(parsed["value"], 15);
    }

    #[test]
    fn test_dispatch_failure_does_not_affect_state() {
        let engine = Engine::new(&RelayConfig::default());
        let mut relay = Relay::new(engine, JsonLinesDispatcher::new(BrokenPipe));
        assert_eq!(relay.handle(&points_event(30)), 1);
        assert_eq!(relay.dispatcher().failures(), 1);

        let key = crate::overlay::OverlayKey::normalize("21").unwrap();
        assert_eq!(relay.engine().state(&key).unwrap().points.a, crate::value::Value::Number(30));
    }

    #[test]
    fn test_recording_dispatcher() {
        let mut relay = Relay::new(Engine::default(), RecordingDispatcher::default());
        relay.handle(&points_event(15));
        relay.handle(&points_event(30));
        assert_eq!(relay.dispatcher().commands.len(), 2);
    }
}
