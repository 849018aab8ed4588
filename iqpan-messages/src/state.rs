use crate::{Decibels, Hertz, Kilohertz};
use std::time::Instant;

/// Current state of the panadapter engine, sent once per run.
#[derive(Debug, Clone)]
pub struct EngineState {
    /// Sample rate the spectra are computed at
    pub sample_rate: Hertz,
    /// FFT size (number of bins)
    pub fft_size: usize,
    /// Spectra averaged into each waterfall line
    pub waterfall_acc: usize,
    /// Waterfall history depth in lines
    pub history_lines: usize,
    /// Live spectrum display range
    pub sp_min: Decibels,
    pub sp_max: Decibels,
    /// Waterfall palette range
    pub v_min: Decibels,
    pub v_max: Decibels,
    pub palette: PaletteId,
    /// True when I and Q are swapped (spectrum mirrored around DC)
    pub reversed: bool,
    /// Human readable description of the sample source
    pub source: String,
    /// Identification label shown as window title
    pub ident: String,
}

/// One of the two fixed waterfall palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaletteId {
    /// Red, then yellow, then white steps
    #[default]
    Stepped,
    /// Continuous rainbow
    Rainbow,
}

impl PaletteId {
    /// Palettes are numbered 1 and 2 on the command line and in config files.
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Stepped),
            2 => Some(Self::Rainbow),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stepped => "Stepped",
            Self::Rainbow => "Rainbow",
        }
    }
}

/// Connection status of the frequency-control backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RigStatus {
    /// No backend configured
    #[default]
    None,
    /// Backend configured, no successful poll yet
    Connecting,
    Connected,
    /// Too many consecutive poll failures
    Disconnected,
}

/// Last known receiver frequency as published by the rig synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RigState {
    /// Last good center frequency, retained across failed polls
    pub frequency: Option<Kilohertz>,
    /// When `frequency` was last read from the backend
    pub polled_at: Option<Instant>,
    pub status: RigStatus,
    pub consecutive_failures: u32,
}

impl RigState {
    /// Frequency to show on screen; `None` means "frequency unknown".
    pub fn display_frequency(&self) -> Option<Kilohertz> {
        match self.status {
            RigStatus::Connected => self.frequency,
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == RigStatus::Disconnected
    }
}

/// Counters of non-fatal pipeline conditions, for the diagnostic overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// Blocks dropped by the ring buffer because it was full
    pub overruns: u64,
    /// Sample components clamped at the clip threshold
    pub clips: u64,
    /// Windows dropped by pulse rejection
    pub rejected_windows: u64,
    /// Zero-padded final windows discarded by the waterfall
    pub partial_frames: u64,
    /// Source re-opens after read errors
    pub reopens: u64,
    /// Spectral frames computed
    pub frames: u64,
    /// Waterfall lines produced
    pub lines: u64,
}
