//! Windowed FFT, dB conversion and live-view averaging.

use crate::config::PanConfig;
use crate::error::{PanError, PanResult};
use crate::source::FULL_SCALE;
use iqpan_messages::Hertz;
use log::debug;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Instant;

/// One FFT window worth of spectrum.
///
/// `bins` are the complex FFT outputs reordered so that DC sits at index
/// `fft_size / 2` and frequency increases with the index. `db` is the
/// instantaneous power of this window, `averaged_db` the decay-averaged
/// live view after folding it in.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    pub bins: Vec<Complex<f32>>,
    pub db: Vec<f32>,
    pub averaged_db: Vec<f32>,
    pub fft_size: usize,
    pub sample_rate: Hertz,
    /// Zero-padded final window before end of stream
    pub partial: bool,
    pub captured_at: Instant,
}

impl SpectralFrame {
    /// Index of the strongest bin in the instantaneous spectrum.
    pub fn peak_bin(&self) -> usize {
        self.db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Hann window, `0.5 · (1 − cos(2πi / (N − 1)))`.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| (0.5 * (1.0 - (TAU * i as f64 / denom).cos())) as f32)
        .collect()
}

/// Turns corrected sample blocks into spectral frames.
pub struct SpectralEngine {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_size: usize,
    sample_rate: Hertz,
    decay: f32,
    pulse: f32,
    // dB of a full-scale 16-bit sinusoid through an N-point FFT
    db_adjust: f32,
    // Linear power of the live view
    average: Option<Vec<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    rejected: u64,
}

impl std::fmt::Debug for SpectralEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralEngine")
            .field("fft_size", &self.fft_size)
            .field("sample_rate", &self.sample_rate)
            .field("decay", &self.decay)
            .field("pulse", &self.pulse)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

impl SpectralEngine {
    pub fn new(fft_size: usize, sample_rate: Hertz, decay: f32, pulse: f32) -> PanResult<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(PanError::Configuration(format!(
                "FFT size must be a power of two >= 2, got {fft_size}"
            )));
        }
        if !(0.0..1.0).contains(&decay) {
            return Err(PanError::Configuration(format!(
                "spectrum decay must be in [0, 1), got {decay}"
            )));
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let db_adjust = (20.0 * (fft_size as f64 * f64::from(FULL_SCALE)).log10()) as f32;

        Ok(Self {
            fft,
            window: hann_window(fft_size),
            fft_size,
            sample_rate,
            decay,
            pulse,
            db_adjust,
            average: None,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            magnitudes: Vec::with_capacity(fft_size),
            rejected: 0,
        })
    }

    pub fn from_config(config: &PanConfig) -> PanResult<Self> {
        Self::new(
            config.fft_size,
            config.sample_rate_hz(),
            config.spectrum_decay,
            config.pulse,
        )
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Windows dropped by pulse rejection so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Split a block into FFT windows and analyze each one.
    ///
    /// A trailing run shorter than the FFT size is zero-padded and marked
    /// partial. Partial frames are reported but not folded into the average.
    pub fn process(
        &mut self,
        samples: &[Complex<f32>],
        captured_at: Instant,
    ) -> Vec<SpectralFrame> {
        let threshold = self.pulse_threshold(samples);
        let mut frames = Vec::with_capacity(samples.len().div_ceil(self.fft_size));

        for window in samples.chunks(self.fft_size) {
            let partial = window.len() < self.fft_size;
            if let Some(limit) = threshold {
                let peak = peak_after_dc_removal(window);
                if peak >= limit {
                    self.rejected += 1;
                    debug!(
                        "Pulse rejected: peak {:.0} >= {:.0} ({} so far)",
                        peak, limit, self.rejected
                    );
                    continue;
                }
            }
            frames.push(self.analyze(window, partial, captured_at));
        }

        frames
    }

    /// Peak limit derived from the median level of the block's first window.
    fn pulse_threshold(&mut self, samples: &[Complex<f32>]) -> Option<f32> {
        if self.pulse <= 0.0 || samples.is_empty() {
            return None;
        }
        self.magnitudes.clear();
        self.magnitudes
            .extend(samples.iter().take(self.fft_size).map(|s| s.norm()));
        let median = median(&mut self.magnitudes);
        // A silent reference window would reject everything
        (median > 0.0).then_some(self.pulse * median)
    }

    fn analyze(
        &mut self,
        window: &[Complex<f32>],
        partial: bool,
        captured_at: Instant,
    ) -> SpectralFrame {
        let valid = window.len();
        let mean = window.iter().sum::<Complex<f32>>() / valid as f32;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = match window.get(i) {
                Some(s) => (s - mean) * self.window[i],
                None => Complex::new(0.0, 0.0),
            };
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // FFT shift: move DC from the edges to the center
        let mut bins = self.buffer.clone();
        bins.rotate_left(self.fft_size / 2);

        let power: Vec<f32> = bins.iter().map(|b| b.norm_sqr()).collect();
        let db = power.iter().map(|&p| self.to_db(p)).collect();

        let averaged = if partial {
            self.average.clone().unwrap_or_else(|| power.clone())
        } else {
            let decay = self.decay;
            let next = match self.average.take() {
                Some(prev) => prev
                    .iter()
                    .zip(&power)
                    .map(|(&old, &new)| decay * old + (1.0 - decay) * new)
                    .collect(),
                None => power,
            };
            self.average = Some(next.clone());
            next
        };
        let averaged_db = averaged.iter().map(|&p| self.to_db(p)).collect();

        SpectralFrame {
            bins,
            db,
            averaged_db,
            fft_size: self.fft_size,
            sample_rate: self.sample_rate,
            partial,
            captured_at,
        }
    }

    fn to_db(&self, power: f32) -> f32 {
        10.0 * power.max(f32::MIN_POSITIVE).log10() - self.db_adjust
    }
}

fn peak_after_dc_removal(window: &[Complex<f32>]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let mean = window.iter().sum::<Complex<f32>>() / window.len() as f32;
    window
        .iter()
        .map(|s| (s - mean).norm())
        .fold(0.0, f32::max)
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}
