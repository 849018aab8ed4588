//! Per-sample corrections applied before spectral analysis.
//!
//! Corrections run in a fixed order: channel-offset fix, I/Q reversal, then
//! clipping.

use crate::config::PanConfig;
use crate::source::SampleBlock;
use log::debug;
use num_complex::Complex;
use std::collections::VecDeque;

/// Number of per-block channel means averaged into a bias estimate.
const BIAS_WINDOW: usize = 8;

/// Channel-offset fix, I/Q reversal and clip clamping.
#[derive(Debug)]
pub struct Corrector {
    reverse: bool,
    offset_fix: bool,
    clip: f32,
    recal_blocks: usize,
    // Last Q sample of the previous block, fed into the next one
    carry_q: f32,
    block_means: VecDeque<Complex<f64>>,
    bias: Option<Complex<f32>>,
    blocks_since_recal: usize,
    clips: u64,
}

impl Corrector {
    pub fn new(reverse: bool, offset_fix: bool, clip: f32, recal_blocks: usize) -> Self {
        Self {
            reverse,
            offset_fix,
            clip,
            recal_blocks: recal_blocks.max(1),
            carry_q: 0.0,
            block_means: VecDeque::with_capacity(BIAS_WINDOW),
            bias: None,
            blocks_since_recal: 0,
            clips: 0,
        }
    }

    pub fn from_config(config: &PanConfig) -> Self {
        Self::new(
            config.rev_iq,
            config.offset_fix,
            config.clip,
            config.offset_recal_blocks,
        )
    }

    /// Correct a block in place, returning the number of clamped components.
    pub fn correct(&mut self, block: &mut SampleBlock) -> u64 {
        let samples = block.samples_mut();
        if self.offset_fix {
            self.fix_offset(samples);
        }
        if self.reverse {
            for s in samples.iter_mut() {
                *s = Complex::new(s.im, s.re);
            }
        }

        let clipped: u64 = samples
            .iter_mut()
            .map(|s| {
                let (clamped, count) = clamp_sample(*s, self.clip);
                *s = clamped;
                u64::from(count)
            })
            .sum();
        self.clips += clipped;
        clipped
    }

    /// Total clamped components since construction.
    pub fn clips(&self) -> u64 {
        self.clips
    }

    /// Current channel bias estimate, once the offset fix has calibrated.
    pub fn bias(&self) -> Option<Complex<f32>> {
        self.bias
    }

    /// The PCM290x family delivers Q one sample early and with a per-channel
    /// DC offset. Realign Q, then subtract the periodically refreshed bias.
    fn fix_offset(&mut self, samples: &mut [Complex<f32>]) {
        if samples.is_empty() {
            return;
        }

        for s in samples.iter_mut() {
            let q = s.im;
            s.im = self.carry_q;
            self.carry_q = q;
        }

        let sum = samples.iter().fold(Complex::new(0.0f64, 0.0f64), |acc, s| {
            acc + Complex::new(f64::from(s.re), f64::from(s.im))
        });
        if self.block_means.len() == BIAS_WINDOW {
            self.block_means.pop_front();
        }
        self.block_means.push_back(sum / samples.len() as f64);

        if self.bias.is_none() || self.blocks_since_recal >= self.recal_blocks {
            let count = self.block_means.len() as f64;
            let mean = self.block_means.iter().sum::<Complex<f64>>() / count;
            let bias = Complex::new(mean.re as f32, mean.im as f32);
            debug!("Channel offset recalibrated: I {:.1}, Q {:.1}", bias.re, bias.im);
            self.bias = Some(bias);
            self.blocks_since_recal = 0;
        }
        self.blocks_since_recal += 1;

        if let Some(bias) = self.bias {
            for s in samples.iter_mut() {
                *s -= bias;
            }
        }
    }
}

/// Clamp both components to `±clip`, returning how many were clamped.
pub fn clamp_sample(sample: Complex<f32>, clip: f32) -> (Complex<f32>, u32) {
    let clamp = |v: f32| {
        if v > clip {
            (clip, 1)
        } else if v < -clip {
            (-clip, 1)
        } else {
            (v, 0)
        }
    };
    let (re, re_clipped) = clamp(sample.re);
    let (im, im_clipped) = clamp(sample.im);
    (Complex::new(re, im), re_clipped + im_clipped)
}
