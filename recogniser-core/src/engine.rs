//! # Pitch Engine Module
//!
//! Runs the analysis pipeline off the capture thread and publishes results
//! as a stream of [`EngineEvent`]s.
//!
//! ## Architecture
//! - **Capture thread** (host owned): pushes samples into the
//!   [`SampleInput`], which cuts windows and hands them off through a
//!   bounded queue. It never blocks; when the queue is full the oldest
//!   window is dropped so the tuner stays current.
//! - **Analysis thread**: one worker per running period. It owns the
//!   [`Analyzer`] and is the only producer of events.
//! - **Control** ([`PitchEngine::start`] / [`PitchEngine::stop`]): any
//!   thread except the capture thread. `stop` lets the worker analyse the
//!   windows already queued, then joins it, so no event is emitted after
//!   `stop` returns.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::analyzer::Analyzer;
use crate::config::EngineConfig;
use crate::error::{CaptureError, ConfigError, EngineError};
use crate::tuning::TunedPitch;
use crate::window::{AudioWindow, FrameBuffer};

/// Capture errors that may wait for the worker at once.
const ERROR_QUEUE_CAPACITY: usize = 8;

/// Events published to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A pitch was found and mapped to a note.
    PitchDetected(TunedPitch),
    /// The window was too quiet to analyse.
    BelowThreshold { level_db: f32 },
    /// The host reported a capture failure; the engine is now idle.
    EngineError { kind: CaptureError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

/// State shared by the controller, the producer and the worker.
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    // Bumped on every start. The producer drops samples from a previous run
    // and the worker skips windows cut under one.
    generation: AtomicU64,
    dropped_windows: AtomicU64,
}

/// Reports capture failures from any thread.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    errors: Sender<CaptureError>,
}

impl ErrorReporter {
    /// Queues `error` for the analysis worker without blocking.
    pub fn report(&self, error: CaptureError) {
        if let Err(err) = self.errors.try_send(error) {
            warn!("[ENGINE] capture error not delivered: {}", err.into_inner());
        }
    }
}

/// A window tagged with the run it was cut under.
#[derive(Debug)]
struct QueuedWindow {
    generation: u64,
    window: AudioWindow,
}

/// Producer side of the engine, owned by the capture callback.
///
/// Samples pushed while the engine is idle are discarded.
#[derive(Debug)]
pub struct SampleInput {
    frame_buffer: FrameBuffer,
    window_tx: Sender<QueuedWindow>,
    // Held only to evict the oldest window when the queue is full.
    window_rx: Receiver<QueuedWindow>,
    shared: Arc<Shared>,
    reporter: ErrorReporter,
    generation: u64,
}

impl SampleInput {
    /// Feeds captured samples to the engine. Never blocks.
    pub fn push(&mut self, samples: &[f32]) {
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }
        let generation = self.shared.generation.load(Ordering::Acquire);
        if generation != self.generation {
            self.frame_buffer.reset();
            self.generation = generation;
        }

        let Self {
            frame_buffer,
            window_tx,
            window_rx,
            shared,
            generation,
            ..
        } = self;
        frame_buffer.push(samples, |window| {
            let queued = QueuedWindow {
                generation: *generation,
                window,
            };
            enqueue_latest(window_tx, window_rx, &shared.dropped_windows, queued)
        });
    }

    /// Reports a capture failure; see [`ErrorReporter::report`].
    pub fn report_error(&self, error: CaptureError) {
        self.reporter.report(error);
    }

    /// A cloneable handle for the host's error callback.
    pub fn error_reporter(&self) -> ErrorReporter {
        self.reporter.clone()
    }
}

/// Enqueues `window`, evicting the oldest queued window when full.
fn enqueue_latest<T>(tx: &Sender<T>, rx: &Receiver<T>, dropped: &AtomicU64, window: T) {
    match tx.try_send(window) {
        Ok(()) => {}
        Err(TrySendError::Full(window)) => {
            if rx.try_recv().is_ok() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            if tx.try_send(window).is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Handle of the running analysis thread.
#[derive(Debug)]
struct Worker {
    shutdown_tx: Sender<()>,
    thread_handle: JoinHandle<Analyzer>,
}

/// Real-time pitch engine controller.
#[derive(Debug)]
pub struct PitchEngine {
    config: EngineConfig,
    shared: Arc<Shared>,
    window_rx: Receiver<QueuedWindow>,
    error_rx: Receiver<CaptureError>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    analyzer: Option<Analyzer>,
    worker: Option<Worker>,
}

impl PitchEngine {
    /// Validates `config` and builds an idle engine.
    ///
    /// # Arguments
    /// * `config` - Engine settings; rejected before any channel or thread
    ///   is created
    ///
    /// # Returns
    /// The engine and the [`SampleInput`] the capture callback should own,
    /// or the first configuration error found
    pub fn new(config: EngineConfig) -> Result<(Self, SampleInput), ConfigError> {
        let analyzer = Analyzer::new(&config)?;

        let shared = Arc::new(Shared::default());
        let (window_tx, window_rx) = crossbeam_channel::bounded(config.queue_capacity);
        let (error_tx, error_rx) = crossbeam_channel::bounded(ERROR_QUEUE_CAPACITY);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let frame_buffer =
            FrameBuffer::new(config.window_size, config.hop_size, config.sample_rate)?;
        let input = SampleInput {
            frame_buffer,
            window_tx,
            window_rx: window_rx.clone(),
            shared: Arc::clone(&shared),
            reporter: ErrorReporter { errors: error_tx },
            generation: 0,
        };

        debug!(
            "[ENGINE] created: {} Hz, window {}, hop {}, {:?}",
            config.sample_rate, config.window_size, config.hop_size, config.strategy
        );

        let engine = Self {
            config,
            shared,
            window_rx,
            error_rx,
            event_tx,
            event_rx,
            analyzer: Some(analyzer),
            worker: None,
        };
        Ok((engine, input))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        if self.shared.running.load(Ordering::Acquire) {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    /// The event stream. Every clone receives from the same queue.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    /// Windows discarded because analysis fell behind.
    pub fn dropped_windows(&self) -> u64 {
        self.shared.dropped_windows.load(Ordering::Relaxed)
    }

    /// Starts analysis. Calling it while running does nothing.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state() == EngineState::Running {
            debug!("[ENGINE] start ignored: already running");
            return Ok(());
        }
        // A worker that stopped on a capture error is still waiting to be joined.
        self.reap_worker();

        // Windows and errors left from the previous run are stale. A push
        // still in flight from that run may enqueue more; the worker skips
        // those by generation.
        while self.window_rx.try_recv().is_ok() {}
        while self.error_rx.try_recv().is_ok() {}
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let analyzer = self
            .analyzer
            .take()
            .unwrap_or_else(|| Analyzer::from_validated(&self.config));
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let windows = self.window_rx.clone();
        let errors = self.error_rx.clone();
        let events = self.event_tx.clone();
        let shared = Arc::clone(&self.shared);

        self.shared.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name("pitch-analysis".into())
            .spawn(move || {
                run_worker(analyzer, generation, windows, errors, shutdown_rx, events, shared)
            });

        match spawned {
            Ok(thread_handle) => {
                self.worker = Some(Worker {
                    shutdown_tx,
                    thread_handle,
                });
                info!("[ENGINE] started");
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                error!("[ENGINE] failed to spawn analysis worker: {}", err);
                Err(EngineError::WorkerSpawn(err))
            }
        }
    }

    /// Stops analysis after draining queued windows. Calling it while idle
    /// does nothing.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            debug!("[ENGINE] stop ignored: already idle");
            return;
        };

        // The producer stops enqueueing before the worker drains.
        self.shared.running.store(false, Ordering::Release);
        // Fails only if the worker already exited on a capture error.
        let _ = worker.shutdown_tx.send(());
        self.join_worker(worker);
        info!("[ENGINE] stopped");
    }

    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.join_worker(worker);
        }
    }

    fn join_worker(&mut self, worker: Worker) {
        match worker.thread_handle.join() {
            Ok(analyzer) => self.analyzer = Some(analyzer),
            Err(_) => {
                error!("[ENGINE] analysis worker panicked; rebuilding analyzer");
                self.analyzer = Some(Analyzer::from_validated(&self.config));
            }
        }
    }
}

impl Drop for PitchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish(events: &Sender<EngineEvent>, event: EngineEvent) {
    // The engine holds a receiver, so the channel stays connected.
    let _ = events.send(event);
}

/// Analysis loop of one running period. Returns the analyzer for reuse.
fn run_worker(
    mut analyzer: Analyzer,
    generation: u64,
    windows: Receiver<QueuedWindow>,
    errors: Receiver<CaptureError>,
    shutdown: Receiver<()>,
    events: Sender<EngineEvent>,
    shared: Arc<Shared>,
) -> Analyzer {
    debug!("[AUDIO-THREAD] analysis worker running (generation {})", generation);
    let mut analyze = |queued: QueuedWindow| {
        if queued.generation != generation {
            debug!("[AUDIO-THREAD] skipped window from generation {}", queued.generation);
            return;
        }
        if let Some(event) = analyzer.analyze(&queued.window) {
            publish(&events, event);
        }
    };
    loop {
        crossbeam_channel::select! {
            recv(windows) -> msg => match msg {
                Ok(queued) => analyze(queued),
                Err(_) => {
                    warn!("[AUDIO-THREAD] window channel closed");
                    break;
                }
            },
            recv(errors) -> msg => {
                if let Ok(kind) = msg {
                    error!("[AUDIO-THREAD] capture failed: {}", kind);
                    // Idle before the event is visible, so listeners that
                    // react to it observe the final state.
                    shared.running.store(false, Ordering::Release);
                    publish(&events, EngineEvent::EngineError { kind });
                    break;
                }
            },
            recv(shutdown) -> _ => {
                let mut drained = 0;
                while let Ok(queued) = windows.try_recv() {
                    analyze(queued);
                    drained += 1;
                }
                debug!("[AUDIO-THREAD] drained {} queued windows", drained);
                break;
            },
        }
    }
    debug!("[AUDIO-THREAD] analysis worker finished");
    analyzer
}
