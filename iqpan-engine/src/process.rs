//! Processing-thread pipeline: corrector, spectral engine and waterfall.

use crate::config::PanConfig;
use crate::correct::Corrector;
use crate::error::PanResult;
use crate::source::SampleBlock;
use crate::spectrum::{SpectralEngine, SpectralFrame};
use crate::waterfall::WaterfallAccumulator;
use iqpan_messages::{Diagnostics, WaterfallLine};
use log::{debug, warn};

/// A spectral frame and the waterfall line it completed, if any.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: SpectralFrame,
    pub line: Option<WaterfallLine>,
}

/// Runs one block at a time through the correction and analysis stages.
#[derive(Debug)]
pub struct Processor {
    corrector: Corrector,
    spectral: SpectralEngine,
    waterfall: WaterfallAccumulator,
    frames: u64,
}

impl Processor {
    pub fn new(
        corrector: Corrector,
        spectral: SpectralEngine,
        waterfall: WaterfallAccumulator,
    ) -> Self {
        Self {
            corrector,
            spectral,
            waterfall,
            frames: 0,
        }
    }

    pub fn from_config(config: &PanConfig) -> PanResult<Self> {
        Ok(Self::new(
            Corrector::from_config(config),
            SpectralEngine::from_config(config)?,
            WaterfallAccumulator::from_config(config),
        ))
    }

    pub fn process(&mut self, mut block: SampleBlock) -> Vec<ProcessedFrame> {
        let clips_before = self.corrector.clips();
        let clipped = self.corrector.correct(&mut block);
        if clipped > 0 {
            if clips_before == 0 {
                warn!("Input is clipping at the configured threshold");
            }
            debug!("{} sample component(s) clipped in block", clipped);
        }

        let frames = self.spectral.process(block.samples(), block.captured_at());
        self.frames += frames.len() as u64;

        frames
            .into_iter()
            .map(|frame| {
                let line = self.waterfall.push(&frame);
                ProcessedFrame { frame, line }
            })
            .collect()
    }

    pub fn waterfall(&self) -> &WaterfallAccumulator {
        &self.waterfall
    }

    pub fn waterfall_mut(&mut self) -> &mut WaterfallAccumulator {
        &mut self.waterfall
    }

    /// Counters owned by the processing stages, plus those kept elsewhere.
    pub fn diagnostics(&self, overruns: u64, reopens: u64) -> Diagnostics {
        Diagnostics {
            overruns,
            clips: self.corrector.clips(),
            rejected_windows: self.spectral.rejected(),
            partial_frames: self.waterfall.partial_frames(),
            reopens,
            frames: self.frames,
            lines: self.waterfall.lines(),
        }
    }
}
