//! Waterfall line accumulation and scroll history.

use crate::config::PanConfig;
use crate::error::{PanError, PanResult};
use crate::palette;
use crate::spectrum::SpectralFrame;
use iqpan_messages::{Decibels, PaletteId, WaterfallLine};
use log::debug;
use std::collections::VecDeque;

/// Smallest allowed distance between `v_min` and `v_max`.
pub const MIN_RANGE_DB: f32 = 20.0;

/// Averages groups of spectral frames into palette-mapped waterfall lines.
///
/// Lines keep their averaged dB values so that a palette or range change
/// only re-renders the history. The newest line is at the front.
#[derive(Debug)]
pub struct WaterfallAccumulator {
    sum: Vec<f64>,
    count: usize,
    acc: usize,
    history: VecDeque<WaterfallLine>,
    capacity: usize,
    palette: PaletteId,
    v_min: Decibels,
    v_max: Decibels,
    default_range: (Decibels, Decibels),
    sequence: u64,
    partial_frames: u64,
}

impl WaterfallAccumulator {
    pub fn new(
        fft_size: usize,
        acc: usize,
        capacity: usize,
        palette: PaletteId,
        v_min: Decibels,
        v_max: Decibels,
    ) -> Self {
        Self {
            sum: vec![0.0; fft_size],
            count: 0,
            acc: acc.max(1),
            history: VecDeque::with_capacity(capacity),
            capacity,
            palette,
            v_min,
            v_max,
            default_range: (v_min, v_max),
            sequence: 0,
            partial_frames: 0,
        }
    }

    pub fn from_config(config: &PanConfig) -> Self {
        let (v_min, v_max) = config.v_range();
        Self::new(
            config.fft_size,
            config.waterfall_acc,
            config.history_lines,
            config.palette_id(),
            v_min,
            v_max,
        )
    }

    /// Fold a frame in; returns the new line once `acc` frames are summed.
    ///
    /// Partial frames are counted and discarded.
    pub fn push(&mut self, frame: &SpectralFrame) -> Option<WaterfallLine> {
        if frame.partial {
            self.partial_frames += 1;
            debug!("Discarding partial frame ({} so far)", self.partial_frames);
            return None;
        }
        if frame.db.len() != self.sum.len() {
            self.sum = vec![0.0; frame.db.len()];
            self.count = 0;
        }

        for (acc, &db) in self.sum.iter_mut().zip(&frame.db) {
            *acc += f64::from(db);
        }
        self.count += 1;
        if self.count < self.acc {
            return None;
        }

        let n = self.count as f64;
        let db: Vec<f32> = self.sum.iter().map(|&s| (s / n) as f32).collect();
        self.sum.iter_mut().for_each(|s| *s = 0.0);
        self.count = 0;

        let line = WaterfallLine {
            sequence: self.sequence,
            pixels: palette::render_row(self.palette, &db, self.v_min, self.v_max),
            db,
        };
        self.sequence += 1;

        self.history.push_front(line.clone());
        self.history.truncate(self.capacity);
        Some(line)
    }

    /// Scroll history, newest line first.
    pub fn history(&self) -> &VecDeque<WaterfallLine> {
        &self.history
    }

    pub fn history_snapshot(&self) -> Vec<WaterfallLine> {
        self.history.iter().cloned().collect()
    }

    pub fn palette(&self) -> PaletteId {
        self.palette
    }

    pub fn range(&self) -> (Decibels, Decibels) {
        (self.v_min, self.v_max)
    }

    /// Lines produced since start.
    pub fn lines(&self) -> u64 {
        self.sequence
    }

    pub fn partial_frames(&self) -> u64 {
        self.partial_frames
    }

    /// Frames summed towards the next line.
    pub fn pending(&self) -> usize {
        self.count
    }

    pub fn set_palette(&mut self, palette: PaletteId) {
        self.palette = palette;
        self.rerender();
    }

    /// Change the intensity range, keeping at least [`MIN_RANGE_DB`] between the ends.
    pub fn set_range(&mut self, v_min: Decibels, v_max: Decibels) -> PanResult<()> {
        if v_max.0 - v_min.0 < MIN_RANGE_DB {
            return Err(PanError::Configuration(format!(
                "waterfall range {} .. {} is narrower than {MIN_RANGE_DB} dB",
                v_min, v_max
            )));
        }
        self.v_min = v_min;
        self.v_max = v_max;
        self.rerender();
        Ok(())
    }

    /// Restore the range the accumulator was created with.
    pub fn reset_range(&mut self) {
        (self.v_min, self.v_max) = self.default_range;
        self.rerender();
    }

    fn rerender(&mut self) {
        for line in self.history.iter_mut() {
            line.pixels = palette::render_row(self.palette, &line.db, self.v_min, self.v_max);
        }
    }
}
