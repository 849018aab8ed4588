use iqpan_messages::Hertz;
use num_complex::Complex;
use std::time::Instant;

/// How the samples of a block were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Complex baseband: `re` is I, `im` is Q
    Iq,
    /// Single real channel carried in `re`, `im` is zero
    Mono,
}

/// A block of samples as produced by a source.
///
/// Samples are scaled to 16-bit full scale (±32768) whatever the device's
/// native format, so that dB figures are comparable between sources.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    samples: Vec<Complex<f32>>,
    captured_at: Instant,
    sample_rate: Hertz,
    layout: ChannelLayout,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex<f32>>, sample_rate: Hertz, layout: ChannelLayout) -> Self {
        Self {
            samples,
            captured_at: Instant::now(),
            sample_rate,
            layout,
        }
    }

    pub fn samples(&self) -> &[Complex<f32>] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [Complex<f32>] {
        &mut self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }
}

/// Scale factor from a normalized ±1.0 sample to 16-bit full scale.
pub const FULL_SCALE: f32 = 32_768.0;

/// Convert interleaved unsigned 8-bit I/Q pairs to full-scale complex samples.
///
/// Codes are centred on 127.5, so code 255 is +full scale and code 0 is
/// -full scale. An 8-bit converter driven to its limits reads 0 dBFS like a
/// 16-bit one; no per-source level boost is needed.
pub fn convert_u8_iq(buf: &[u8]) -> Vec<Complex<f32>> {
    buf.chunks_exact(2)
        .map(|pair| {
            let i_val = (f32::from(pair[0]) - 127.5) / 127.5;
            let q_val = (f32::from(pair[1]) - 127.5) / 127.5;
            Complex::new(i_val * FULL_SCALE, q_val * FULL_SCALE)
        })
        .collect()
}
