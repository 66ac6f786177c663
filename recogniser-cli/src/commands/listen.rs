//! Live tuning from the default input device.

use anyhow::{Context, Result, bail};
use clap::Args;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use recogniser_core::{EngineEvent, PitchEngine, audio};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use super::{StrategyArg, apply_overrides, load_config};
use crate::output::{Format, format_event};

/// How long to wait for events before checking for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct ListenArgs {
    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Level threshold in dBFS
    #[arg(long, allow_hyphen_values = true)]
    threshold_db: Option<f32>,

    /// Pitch estimation strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Also print windows below the level threshold
    #[arg(long)]
    show_quiet: bool,
}

pub fn run(args: ListenArgs, format: Format) -> Result<()> {
    let config = apply_overrides(
        load_config(args.config.as_deref())?,
        args.threshold_db,
        args.strategy,
    )?;
    let sample_rate = config.sample_rate;

    let (mut engine, input) = PitchEngine::new(config).context("invalid engine configuration")?;
    let events = engine.events();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install Ctrl-C handler")?;

    let capture = audio::start_capture(input, sample_rate)?;
    info!(
        "[MAIN] listening on {} ({} Hz); press Ctrl-C to stop",
        capture.device_name(),
        capture.sample_rate()
    );
    engine.start()?;

    let outcome = print_events(&events, &shutdown_rx, format, args.show_quiet);

    engine.stop();
    if let Err(e) = capture.pause() {
        error!("[MAIN] error pausing stream: {:#}", e);
    }
    drop(capture);
    info!("[MAIN] stopped; {} windows dropped", engine.dropped_windows());

    outcome
}

/// Prints events until shutdown is requested or the engine reports an error.
fn print_events(
    events: &Receiver<EngineEvent>,
    shutdown: &Receiver<()>,
    format: Format,
    show_quiet: bool,
) -> Result<()> {
    loop {
        if shutdown.try_recv().is_ok() {
            info!("[MAIN] received shutdown signal");
            return Ok(());
        }
        let event = match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => bail!("engine event stream closed"),
        };

        if !show_quiet && matches!(event, EngineEvent::BelowThreshold { .. }) {
            continue;
        }
        println!("{}", format_event(&event, format));

        // The engine is idle now; restarting is left to the user.
        if let EngineEvent::EngineError { kind } = event {
            bail!("capture failed: {kind}");
        }
    }
}
