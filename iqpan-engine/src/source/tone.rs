use super::pace::Pacer;
use super::{ChannelLayout, FULL_SCALE, SampleBlock, SampleSource};
use crate::error::{PanError, PanResult};
use iqpan_messages::Hertz;
use num_complex::Complex;
use std::f64::consts::TAU;

/// Deterministic complex tone generator.
///
/// Produces `amplitude · e^{j2πft}` in 16-bit full-scale units, so a positive
/// offset lands above DC and a negative one below. With `limit_samples` set,
/// the stream ends after that many samples, the last block being short.
/// Blocks are released at the sample rate, like a live receiver.
#[derive(Debug)]
pub struct ToneSource {
    sample_rate: Hertz,
    offset_hz: f64,
    amplitude: f32,
    limit_samples: Option<u64>,
    produced: u64,
    is_open: bool,
    pacer: Pacer,
}

impl ToneSource {
    pub fn new(
        sample_rate: Hertz,
        offset_hz: f64,
        amplitude: f32,
        limit_samples: Option<u64>,
    ) -> Self {
        Self {
            sample_rate,
            offset_hz,
            amplitude,
            limit_samples,
            produced: 0,
            is_open: false,
            pacer: Pacer::new(),
        }
    }

    fn sample_at(&self, index: u64) -> Complex<f32> {
        // Phase from the absolute index keeps long runs free of drift
        let cycles = self.offset_hz * index as f64 / self.sample_rate.0 as f64;
        let phase = TAU * cycles.fract();
        let scale = f64::from(self.amplitude * FULL_SCALE);
        Complex::new((scale * phase.cos()) as f32, (scale * phase.sin()) as f32)
    }
}

impl SampleSource for ToneSource {
    fn open(&mut self) -> PanResult<()> {
        if self.sample_rate.0 == 0 {
            return Err(PanError::DeviceUnavailable(String::from(
                "tone generator needs a positive sample rate",
            )));
        }
        self.is_open = true;
        self.pacer.start(self.sample_rate);
        Ok(())
    }

    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
        if !self.is_open {
            return Err(PanError::DeviceIo(String::from("tone generator is not open")));
        }

        let wanted = n as u64;
        let count = match self.limit_samples {
            Some(limit) => wanted.min(limit.saturating_sub(self.produced)),
            None => wanted,
        };
        if count == 0 {
            return Ok(None);
        }

        let samples: Vec<Complex<f32>> = (self.produced..self.produced + count)
            .map(|index| self.sample_at(index))
            .collect();
        self.produced += count;
        self.pacer.wait(samples.len());

        Ok(Some(SampleBlock::new(samples, self.sample_rate, ChannelLayout::Iq)))
    }

    fn close(&mut self) {
        self.is_open = false;
        self.pacer.stop();
    }

    fn native_sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("test tone at {:+.0} Hz", self.offset_hz)
    }
}
