use eframe::egui::Key;
use flume::Sender;
use log::{debug, info, warn};

use crate::control_panel::ControlPanel;
use crate::spectrum::SpectrumView;
use crate::waterfall::Waterfall;
use iqpan_engine::axis::FrequencyAxis;
use iqpan_messages::{Command, Diagnostics, EngineState, Event, Kilohertz, RigState};

/// Arrow key tuning step, and the step with Shift held.
const TUNE_STEP: Kilohertz = Kilohertz(0.1);
const COARSE_TUNE_STEP: Kilohertz = Kilohertz(1.0);

/// What the sample source is doing, as far as the display knows.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum SourceStatus {
    Running,
    /// Fatal source error, with the last reason
    NoSignal(String),
    EndOfStream,
}

/// Local UI state derived from engine events.
pub(super) struct UiState {
    /// Current engine state (from StateSnapshot)
    pub engine_state: Option<EngineState>,

    pub spectrum: SpectrumView,

    /// Waterfall widget state
    pub waterfall: Waterfall,

    /// Control panel widget state
    pub control_panel: ControlPanel,

    /// Rig state carried by the newest frame
    pub rig: RigState,

    pub diagnostics: Diagnostics,

    /// True if the newest frame saw new clips or rejected windows
    pub clipping: bool,

    pub source_status: SourceStatus,

    cmd_tx: Sender<Command>,
}

impl UiState {
    pub fn new(cmd_tx: Sender<Command>) -> Self {
        Self {
            engine_state: None,
            spectrum: SpectrumView::new(),
            waterfall: Waterfall::new(),
            control_panel: ControlPanel::new(cmd_tx.clone()),
            rig: RigState::default(),
            diagnostics: Diagnostics::default(),
            clipping: false,
            source_status: SourceStatus::Running,
            cmd_tx,
        }
    }

    /// Keyboard shortcuts: `u`/`U` and `l`/`L` move the spectrum range,
    /// `r` resets both ranges, the arrow keys tune.
    pub fn handle_key(&mut self, key: Key, shift: bool) {
        let step = if shift { COARSE_TUNE_STEP } else { TUNE_STEP };
        match key {
            Key::U if shift => self.spectrum.raise_max(),
            Key::U => self.spectrum.lower_max(),
            Key::L if shift => self.spectrum.raise_min(),
            Key::L => self.spectrum.lower_min(),
            Key::R => {
                self.spectrum.reset_range();
                self.control_panel.reset_range();
            }
            Key::ArrowRight => self.tune_by(step.0),
            Key::ArrowLeft => self.tune_by(-step.0),
            _ => {}
        }
    }

    /// Ask the engine to move the rig `step_khz` from its current frequency.
    fn tune_by(&self, step_khz: f64) {
        let Some(current) = self.rig.display_frequency() else {
            debug!("Frequency unknown, not tuning");
            return;
        };
        // Whole hertz keeps repeated steps from drifting
        let target = Kilohertz(((current.0 + step_khz) * 1000.0).round() / 1000.0);
        let _ = self.cmd_tx.send(Command::Tune(target));
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::StateSnapshot(state) => {
                let axis = FrequencyAxis::new(state.fft_size, state.sample_rate, state.reversed);
                self.spectrum.configure(axis, state.sp_min, state.sp_max);
                self.waterfall.configure(state.fft_size, state.history_lines);
                self.control_panel.update_from_engine_state(&state);
                self.engine_state = Some(state);
            }
            Event::Frame(frame) => {
                let before = self.diagnostics.clips + self.diagnostics.rejected_windows;
                let after = frame.diagnostics.clips + frame.diagnostics.rejected_windows;
                self.clipping = after > before;
                self.diagnostics = frame.diagnostics;
                self.rig = frame.rig;
                self.spectrum.set_trace(frame.spectrum);
                if let Some(line) = frame.line {
                    self.waterfall.insert_line(&line);
                }
            }
            Event::WaterfallHistory(lines) => {
                self.waterfall.replace_history(&lines);
            }
            Event::SourceFailed(reason) => {
                warn!("No signal: {}", reason);
                self.source_status = SourceStatus::NoSignal(reason);
            }
            Event::EndOfStream => {
                info!("Sample source reached end of stream");
                self.source_status = SourceStatus::EndOfStream;
            }
        }
    }

    /// Text for the frequency label.
    pub fn frequency_text(&self) -> String {
        match self.rig.display_frequency() {
            Some(frequency) => frequency.to_string(),
            None => String::from("frequency unknown"),
        }
    }

    pub fn diagnostics_text(&self) -> String {
        let d = &self.diagnostics;
        format!(
            "frames {}  lines {}  overruns {}  clips {}  pulses {}  partial {}  reopens {}",
            d.frames, d.lines, d.overruns, d.clips, d.rejected_windows, d.partial_frames, d.reopens
        )
    }
}
