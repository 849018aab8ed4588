use crate::{Diagnostics, EngineState, RigState};

/// One palette-mapped waterfall row together with the averaged dB values
/// it was rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallLine {
    /// Monotonic line counter
    pub sequence: u64,
    /// Averaged dB values, one per bin
    pub db: Vec<f32>,
    /// RGB pixel per bin
    pub pixels: Vec<[u8; 3]>,
}

/// Everything the display needs for one processing cycle.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    /// Decay-averaged live spectrum in dBFS, DC at the center bin
    pub spectrum: Vec<f32>,
    /// True if the frame was zero-padded at end of stream
    pub partial: bool,
    /// New waterfall line, if this frame completed one
    pub line: Option<WaterfallLine>,
    pub rig: RigState,
    pub diagnostics: Diagnostics,
}

/// Events sent from the engine to the display.
#[derive(Debug, Clone)]
pub enum Event {
    /// Initial state snapshot sent when the pipeline starts.
    StateSnapshot(EngineState),
    /// Per-frame spectrum, waterfall and status data.
    Frame(DisplayFrame),
    /// Whole waterfall history, newest line first, after a palette or range change.
    WaterfallHistory(Vec<WaterfallLine>),
    /// The sample source failed for good ("no signal").
    SourceFailed(String),
    /// The sample source reached its end and the pipeline drained.
    EndOfStream,
}
