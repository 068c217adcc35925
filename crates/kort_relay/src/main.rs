//! Kort Relay CLI
//!
//! Raw overlay events (JSON lines) in, reflect commands (JSON lines) out.
//!
//! ```text
//! kort_relay --config korts.yaml --input events.jsonl > commands.jsonl
//! tail -f events.jsonl | kort_relay --dump-state state.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use kort_core::api::decode_event_line;
use kort_core::{dump_state_json, Engine, JsonLinesDispatcher, Relay, RelayConfig, VERSION};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kort_relay", version = VERSION)]
#[command(about = "Reconcile live tennis scores into reflect commands", long_about = None)]
struct Cli {
    /// Relay config (YAML or JSON). Falls back to $KORT_RELAY_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines event file; stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write the final match states as JSON to this path
    #[arg(long)]
    dump_state: Option<PathBuf>,

    /// Abort on the first malformed event line instead of skipping it.
    /// Unrecoverable errors always abort.
    #[arg(long, default_value = "false")]
    strict: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config =
        RelayConfig::load(cli.config.as_deref()).context("Failed to load relay config")?;

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut relay = Relay::new(Engine::new(&config), JsonLinesDispatcher::new(stdout.lock()));
    let summary = run(&mut relay, reader, cli.strict)?;

    log::info!(
        "Processed {} events ({} skipped), dispatched {} commands for {} overlays",
        summary.events,
        summary.skipped,
        summary.commands,
        relay.engine().store().len()
    );
    if relay.dispatcher().failures() > 0 {
        log::warn!("{} commands could not be written", relay.dispatcher().failures());
    }

    if let Some(path) = &cli.dump_state {
        let json = dump_state_json(relay.engine())?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Match states written to {}", path.display());
    }

    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct RunSummary {
    events: usize,
    skipped: usize,
    commands: usize,
}

fn run<W: io::Write>(
    relay: &mut Relay<JsonLinesDispatcher<W>>,
    reader: impl BufRead,
    strict: bool,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event stream")?;
        if line.trim().is_empty() {
            continue;
        }
        match decode_event_line(index + 1, &line) {
            Ok(event) => {
                summary.events += 1;
                summary.commands += relay.handle(&event);
            }
            Err(e) if strict || !e.is_recoverable() => return Err(e.into()),
            Err(e) => {
                summary.skipped += 1;
                log::warn!("Skipping event: {}", e);
            }
        }
    }
    Ok(summary)
}
