//! Resolved run configuration.
//!
//! A `PanConfig` is built once at startup (defaults, then an optional TOML
//! file, then command line overrides), validated, and shared read-only for the
//! rest of the process lifetime.

use crate::error::{PanError, PanResult};
use iqpan_messages::{Decibels, Hertz, PaletteId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where samples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Deterministic complex tone generator.
    TestTone {
        /// Tone offset from the center frequency, may be negative
        offset_hz: f64,
        /// Amplitude as a fraction of 16-bit full scale
        amplitude: f32,
        /// Stop after this many samples (end of stream), run forever if unset
        limit_samples: Option<u64>,
    },
    /// Raw interleaved little-endian f32 I/Q pairs.
    IqFile { path: PathBuf, loop_on_eof: bool },
    /// 16-bit stereo WAV, left channel = I, right channel = Q.
    WavFile { path: PathBuf },
    /// Stereo sound card capture; `device` is a name substring, default device if unset.
    SoundCard { device: Option<String> },
    /// RTL-SDR dongle.
    RtlSdr {
        device_index: u32,
        frequency_hz: u32,
        /// Tuner gain in tenths of a dB, automatic if unset
        gain_tenths_db: Option<i32>,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::TestTone {
            offset_hz: 6_000.0,
            amplitude: 0.25,
            limit_samples: None,
        }
    }
}

impl SourceConfig {
    pub fn describe(&self) -> String {
        match self {
            Self::TestTone { offset_hz, .. } => format!("test tone at {offset_hz:+.0} Hz"),
            Self::IqFile { path, .. } => format!("IQ file {}", path.display()),
            Self::WavFile { path } => format!("WAV file {}", path.display()),
            Self::SoundCard { device } => {
                format!("sound card {}", device.as_deref().unwrap_or("(default)"))
            }
            Self::RtlSdr {
                device_index,
                frequency_hz,
                ..
            } => format!("RTL-SDR #{device_index} at {:.3} MHz", *frequency_hz as f64 / 1e6),
        }
    }
}

/// Where the receiver's center frequency comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RigConfig {
    /// No frequency control, axis labelled relative to DC
    #[default]
    None,
    /// A fixed, known center frequency (for example an RTL dongle's tuning)
    Fixed { frequency_khz: f64 },
    /// Hamlib `rigctld` daemon reachable over TCP
    Rigctld {
        /// host:port of the daemon
        endpoint: String,
        /// Hamlib rig model the daemon drives, for display/validation only
        model: Option<u32>,
        /// Serial device the daemon drives, for display only
        device: Option<String>,
    },
    /// Si570 synthesizer behind a SoftRock-style USB control chip
    Si570 {
        vendor_id: u16,
        product_id: u16,
        /// Si570 output frequency divided by this is the receive frequency
        multiplier: f64,
    },
}

/// Every option of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanConfig {
    /// Identification label for the window title and logs
    pub ident: String,
    /// FFT size, a power of two
    pub fft_size: usize,
    /// Requested sample rate in Hz
    pub sample_rate: u32,
    /// Ring buffer depth in blocks
    pub n_buffers: usize,
    /// FFT windows per sample block
    pub block_frames: usize,
    /// Blocks discarded after every open while the hardware settles
    pub skip: usize,
    /// Clamp level for sample components, in 16-bit full-scale units
    pub clip: f32,
    /// Pulse rejection factor over the median level, 0 disables
    pub pulse: f32,
    /// Live spectrum range in dBFS
    pub sp_min: f32,
    pub sp_max: f32,
    /// Waterfall palette range in dBFS
    pub v_min: f32,
    pub v_max: f32,
    /// Spectra averaged per waterfall line
    pub waterfall_acc: usize,
    /// Waterfall lines kept in the scroll history
    pub history_lines: usize,
    /// Waterfall palette, 1 or 2
    pub palette: u8,
    /// Swap I and Q
    pub rev_iq: bool,
    /// Correct the PCM290x channel offset and lag
    pub offset_fix: bool,
    /// Blocks between channel-offset recalibrations
    pub offset_recal_blocks: usize,
    /// Weight of the previous spectrum in the live average, 0 disables smoothing
    pub spectrum_decay: f32,
    /// Seconds between frequency polls
    pub poll_interval_secs: f64,
    /// Consecutive failed polls before the rig is considered disconnected
    pub rig_failure_threshold: u32,
    /// Re-open attempts after a source read error
    pub max_reopen_attempts: u32,
    // Tables last so the TOML layout stays valid
    pub source: SourceConfig,
    pub rig: RigConfig,
}

impl Default for PanConfig {
    fn default() -> Self {
        Self {
            ident: String::from("iqpan"),
            fft_size: 512,
            sample_rate: 48_000,
            n_buffers: 12,
            block_frames: 1,
            skip: 0,
            clip: 32_767.0,
            pulse: 0.0,
            sp_min: -120.0,
            sp_max: -20.0,
            v_min: -120.0,
            v_max: -20.0,
            waterfall_acc: 4,
            history_lines: 50,
            palette: 1,
            rev_iq: false,
            offset_fix: false,
            offset_recal_blocks: 16,
            spectrum_decay: 0.5,
            poll_interval_secs: 1.0,
            rig_failure_threshold: 3,
            max_reopen_attempts: 3,
            source: SourceConfig::default(),
            rig: RigConfig::default(),
        }
    }
}

impl PanConfig {
    /// Load from a TOML file. A missing file is created with defaults.
    pub fn load(path: &Path) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    pub fn store(&self, path: &Path) -> Result<(), confy::ConfyError> {
        confy::store_path(path, self)
    }

    pub fn validate(&self) -> PanResult<()> {
        let fail = |msg: String| Err(PanError::Configuration(msg));

        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return fail(format!(
                "FFT size {} is not a power of two >= 2",
                self.fft_size
            ));
        }
        if self.sample_rate == 0 {
            return fail(String::from("sample rate must be positive"));
        }
        if self.n_buffers == 0 {
            return fail(String::from("n_buffers must be at least 1"));
        }
        if self.block_frames == 0 {
            return fail(String::from("block_frames must be at least 1"));
        }
        if self.waterfall_acc == 0 {
            return fail(String::from("waterfall accumulation must be at least 1"));
        }
        if self.history_lines == 0 {
            return fail(String::from("waterfall history must hold at least 1 line"));
        }
        if self.sp_min >= self.sp_max {
            return fail(format!(
                "spectrum range inverted: sp_min {} >= sp_max {}",
                self.sp_min, self.sp_max
            ));
        }
        if self.v_min >= self.v_max {
            return fail(format!(
                "waterfall range inverted: v_min {} >= v_max {}",
                self.v_min, self.v_max
            ));
        }
        if !(self.clip > 0.0) {
            return fail(format!("clip threshold {} must be positive", self.clip));
        }
        if !(self.pulse >= 0.0) {
            return fail(format!("pulse factor {} must not be negative", self.pulse));
        }
        if !(0.0..1.0).contains(&self.spectrum_decay) {
            return fail(format!(
                "spectrum decay {} must be in [0, 1)",
                self.spectrum_decay
            ));
        }
        if PaletteId::from_number(self.palette).is_none() {
            return fail(format!("palette {} must be 1 or 2", self.palette));
        }
        if !(self.poll_interval_secs > 0.0) {
            return fail(String::from("poll interval must be positive"));
        }
        if self.offset_fix && self.offset_recal_blocks == 0 {
            return fail(String::from("offset_recal_blocks must be at least 1"));
        }
        if let SourceConfig::TestTone { amplitude, .. } = &self.source {
            if !(0.0..=1.0).contains(amplitude) {
                return fail(format!("test tone amplitude {amplitude} outside [0, 1]"));
            }
        }
        if let RigConfig::Si570 { multiplier, .. } = &self.rig {
            if !(*multiplier > 0.0) {
                return fail(String::from("Si570 multiplier must be positive"));
            }
        }
        Ok(())
    }

    pub fn palette_id(&self) -> PaletteId {
        PaletteId::from_number(self.palette).unwrap_or_default()
    }

    pub fn sample_rate_hz(&self) -> Hertz {
        Hertz(u64::from(self.sample_rate))
    }

    /// Samples requested from the source per block.
    pub fn block_size(&self) -> usize {
        self.fft_size * self.block_frames
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn sp_range(&self) -> (Decibels, Decibels) {
        (Decibels(self.sp_min), Decibels(self.sp_max))
    }

    pub fn v_range(&self) -> (Decibels, Decibels) {
        (Decibels(self.v_min), Decibels(self.v_max))
    }

    /// One-line summary of the operating parameters.
    pub fn summary(&self) -> String {
        let rate = f64::from(self.sample_rate);
        format!(
            "Fs = {} Hz; Res. = {:.1} Hz; chans = {}; acc = {:.3} sec",
            self.sample_rate,
            rate / self.fft_size as f64,
            self.fft_size,
            (self.block_size() * self.waterfall_acc) as f64 / rate
        )
    }
}
