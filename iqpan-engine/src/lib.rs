pub mod acquire;
pub mod axis;
pub mod config;
pub mod correct;
pub mod error;
pub mod palette;
pub mod process;
pub mod rig;
pub mod ring;
pub mod source;
pub mod spectrum;
pub mod waterfall;

pub use config::{PanConfig, RigConfig, SourceConfig};
pub use error::{PanError, PanResult, RigError};

use acquire::Acquisition;
use anyhow::{Result, anyhow};
use flume::{Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError};
use iqpan_messages::{Command, DisplayFrame, EngineState, Event, Kilohertz, RigState, RigStatus};
use log::{debug, info, warn};
use process::Processor;
use rig::{FrequencyBackend, RigReader, RigSynchronizer, RigWriter};
use ring::{Pop, RingConsumer};
use source::SourceFactory;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How long the processing loop waits for a block before checking commands.
const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// How long a frame carrying a waterfall line waits for room in the event
/// channel before it is dropped like any other frame.
const LINE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the processing loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Stop command, or the command channel closed
    Stopped,
    /// The source ended and the ring is empty
    Drained,
    /// Nobody is listening for events any more
    DisplayGone,
}

/// The panadapter engine.
/// Owns the pipeline threads and processes commands from the display.
pub struct Engine {
    cmd_rx: Receiver<Command>,
    event_tx: Sender<Event>,
    config: Arc<PanConfig>,
    factory: SourceFactory,
    rig_backend: Option<Box<dyn FrequencyBackend>>,
    rig_writer: RigWriter,
    rig_reader: RigReader,
}

impl Engine {
    /// Create a new Engine for a configuration, with the source and rig
    /// backend it names.
    ///
    /// A WAV source runs at the rate in its header, whatever the configured
    /// sample rate; the state snapshot reports the rate in effect.
    pub fn new(
        cmd_rx: Receiver<Command>,
        event_tx: Sender<Event>,
        mut config: PanConfig,
    ) -> PanResult<Self> {
        debug!("Constructing a new engine");
        source::resolve_sample_rate(&mut config);
        config.validate()?;

        let (rig_writer, rig_reader) = rig::rig_cell(RigState::default());
        let rig_backend = match rig::open_backend(&config.rig) {
            Ok(backend) => backend,
            Err(e) => {
                // The spectrum still works without a frequency
                warn!("Frequency backend unavailable: {}", e);
                rig_writer.update(|state| state.status = RigStatus::Disconnected);
                None
            }
        };

        Ok(Self {
            cmd_rx,
            event_tx,
            factory: source::source_factory(&config),
            config: Arc::new(config),
            rig_backend,
            rig_writer,
            rig_reader,
        })
    }

    /// Replace the configured sample source.
    pub fn with_source(mut self, factory: SourceFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Replace the configured frequency backend.
    pub fn with_rig_backend(mut self, backend: Box<dyn FrequencyBackend>) -> Self {
        self.rig_writer.update(|state| *state = RigState::default());
        self.rig_backend = Some(backend);
        self
    }

    /// A read handle on the rig state, for callers outside the display.
    pub fn rig_reader(&self) -> RigReader {
        self.rig_reader.clone()
    }

    pub fn config(&self) -> &PanConfig {
        &self.config
    }

    fn state_snapshot(&self) -> EngineState {
        let config = &self.config;
        let (sp_min, sp_max) = config.sp_range();
        let (v_min, v_max) = config.v_range();
        EngineState {
            sample_rate: config.sample_rate_hz(),
            fft_size: config.fft_size,
            waterfall_acc: config.waterfall_acc,
            history_lines: config.history_lines,
            sp_min,
            sp_max,
            v_min,
            v_max,
            palette: config.palette_id(),
            reversed: config.rev_iq,
            source: config.source.describe(),
            ident: config.ident.clone(),
        }
    }

    /// Run the engine (blocking).
    ///
    /// Returns when a Stop command arrives, the command channel closes, the
    /// display goes away, or the source ends. A fatal source error is sent as
    /// [`Event::SourceFailed`] and returned.
    pub fn run(self) -> Result<()> {
        let config = self.config.clone();
        self.event_tx.send(Event::StateSnapshot(self.state_snapshot()))?;

        let mut processor = Processor::from_config(&config)?;
        let (producer, consumer) = ring::ring(config.n_buffers);
        let acquisition = Acquisition::new(
            self.factory,
            producer,
            config.block_size(),
            config.skip,
            config.max_reopen_attempts,
        );
        let shutdown = acquisition.shutdown_flag();
        let reopens = acquisition.reopen_counter();
        let acquisition_handle = acquisition.spawn()?;

        let rig_thread = match self.rig_backend {
            Some(backend) => {
                let synchronizer = RigSynchronizer::new(
                    backend,
                    self.rig_writer,
                    config.poll_interval(),
                    config.rig_failure_threshold,
                );
                Some(synchronizer.spawn()?)
            }
            None => None,
        };

        let exit = process_loop(
            &self.cmd_rx,
            &self.event_tx,
            &consumer,
            &mut processor,
            &self.rig_reader,
            rig_thread.as_ref().map(|(tune_tx, _)| tune_tx),
            &reopens,
        );
        debug!("Processing loop ended: {:?}", exit);

        // Stop acquisition within one block and the synchronizer within one poll
        shutdown.store(true, Ordering::Relaxed);
        if let Some((tune_tx, rig_handle)) = rig_thread {
            drop(tune_tx);
            rig_handle
                .join()
                .map_err(|_| anyhow!("Rig synchronizer thread panicked"))?;
        }
        let acquisition_result = acquisition_handle
            .join()
            .map_err(|_| anyhow!("Acquisition thread panicked"))?;
        drop(consumer);

        let diagnostics = processor.diagnostics(0, reopens.load(Ordering::Relaxed));
        info!(
            "Engine stopped after {} frames, {} lines, {} clips, {} rejected windows",
            diagnostics.frames, diagnostics.lines, diagnostics.clips, diagnostics.rejected_windows
        );

        if let Err(e) = acquisition_result {
            let _ = self.event_tx.send(Event::SourceFailed(e.to_string()));
            return Err(e.into());
        }
        if exit == LoopExit::Drained {
            let pending = processor.waterfall().pending();
            if pending > 0 {
                debug!("Dropping {} frame(s) of an unfinished waterfall line", pending);
            }
            let _ = self.event_tx.send(Event::EndOfStream);
        }
        Ok(())
    }
}

fn process_loop(
    cmd_rx: &Receiver<Command>,
    event_tx: &Sender<Event>,
    consumer: &RingConsumer,
    processor: &mut Processor,
    rig: &RigReader,
    tune_tx: Option<&Sender<Kilohertz>>,
    reopens: &AtomicU64,
) -> LoopExit {
    let mut dropped_events = 0u64;

    loop {
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return LoopExit::Stopped,
                Ok(Command::Tune(frequency)) => request_tune(frequency, tune_tx),
                Ok(command) => {
                    debug!("Engine received command: {:?}", command);
                    if handle_command(command, processor, event_tx).is_err() {
                        return LoopExit::DisplayGone;
                    }
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let block = match consumer.pop_timeout(POP_TIMEOUT) {
            Pop::Item(block) => block,
            Pop::Empty => continue,
            Pop::Closed => return LoopExit::Drained,
        };

        for processed in processor.process(block) {
            let frame = DisplayFrame {
                spectrum: processed.frame.averaged_db,
                partial: processed.frame.partial,
                line: processed.line,
                rig: rig.snapshot(),
                diagnostics: processor
                    .diagnostics(consumer.overruns(), reopens.load(Ordering::Relaxed)),
            };
            match send_frame(event_tx, frame) {
                Ok(()) => {}
                Err(FrameDropped::Full) => {
                    // The display is behind; it only needs the newest spectra
                    dropped_events += 1;
                    if dropped_events.is_power_of_two() {
                        debug!("Display behind, {} frame event(s) dropped", dropped_events);
                    }
                }
                Err(FrameDropped::Disconnected) => return LoopExit::DisplayGone,
            }
        }
    }
}

enum FrameDropped {
    Full,
    Disconnected,
}

/// Send a frame to the display.
///
/// A frame that only refreshes the spectrum is dropped when the channel is
/// full. One that completes a waterfall line waits for room, so a slow
/// display still receives every line.
fn send_frame(event_tx: &Sender<Event>, frame: DisplayFrame) -> Result<(), FrameDropped> {
    if frame.line.is_some() {
        return match event_tx.send_timeout(Event::Frame(frame), LINE_SEND_TIMEOUT) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Display stalled, dropping a waterfall line");
                Err(FrameDropped::Full)
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(FrameDropped::Disconnected),
        };
    }
    match event_tx.try_send(Event::Frame(frame)) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err(FrameDropped::Full),
        Err(TrySendError::Disconnected(_)) => Err(FrameDropped::Disconnected),
    }
}

/// Forward a tune request to the rig synchronizer.
fn request_tune(frequency: Kilohertz, tune_tx: Option<&Sender<Kilohertz>>) {
    match tune_tx {
        Some(tune_tx) => {
            debug!("Tune request {}", frequency);
            if tune_tx.send(frequency).is_err() {
                warn!("Rig synchronizer has stopped, cannot tune to {}", frequency);
            }
        }
        None => warn!("No frequency backend to tune to {}", frequency),
    }
}

/// Apply a waterfall command. `Err` means the event channel is closed.
fn handle_command(
    command: Command,
    processor: &mut Processor,
    event_tx: &Sender<Event>,
) -> Result<()> {
    let waterfall = processor.waterfall_mut();
    match command {
        Command::Stop | Command::Tune(_) => return Ok(()),
        Command::SetPalette(palette) => {
            info!("Waterfall palette {}", palette.label());
            waterfall.set_palette(palette);
        }
        Command::SetWaterfallRange { v_min, v_max } => {
            if let Err(e) = waterfall.set_range(v_min, v_max) {
                warn!("Ignoring waterfall range change: {}", e);
                return Ok(());
            }
            info!("Waterfall range {} .. {}", v_min, v_max);
        }
        Command::ResetWaterfallRange => waterfall.reset_range(),
    }
    event_tx.send(Event::WaterfallHistory(waterfall.history_snapshot()))?;
    Ok(())
}
