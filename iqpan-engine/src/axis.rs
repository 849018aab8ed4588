//! Bin to frequency mapping and graticule layout.

use iqpan_messages::{Decibels, Hertz, Kilohertz};

/// Candidate tick spacings, largest first.
const TICK_STEPS_KHZ: [f64; 8] = [800.0, 400.0, 200.0, 100.0, 80.0, 40.0, 20.0, 10.0];

/// Maps FFT bins of a DC-centered spectrum to frequencies.
///
/// With `reversed` set the mapping is mirrored around the center so that
/// labels follow the swapped I/Q channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAxis {
    pub fft_size: usize,
    pub sample_rate: Hertz,
    pub reversed: bool,
}

impl FrequencyAxis {
    pub fn new(fft_size: usize, sample_rate: Hertz, reversed: bool) -> Self {
        Self {
            fft_size,
            sample_rate,
            reversed,
        }
    }

    /// Width of one bin in Hz.
    pub fn resolution_hz(&self) -> f64 {
        self.sample_rate.0 as f64 / self.fft_size as f64
    }

    /// Offset of a bin from the center frequency in Hz.
    pub fn bin_offset_hz(&self, bin: usize) -> f64 {
        let offset = (bin as f64 - (self.fft_size / 2) as f64) * self.resolution_hz();
        if self.reversed { -offset } else { offset }
    }

    /// Absolute frequency of a bin given the tuned center.
    pub fn bin_frequency(&self, bin: usize, center: Kilohertz) -> Kilohertz {
        Kilohertz(center.0 + self.bin_offset_hz(bin) / 1000.0)
    }

    /// Bin nearest to an offset from center, if it falls inside the span.
    pub fn offset_to_bin(&self, offset_hz: f64) -> Option<usize> {
        let offset = if self.reversed { -offset_hz } else { offset_hz };
        let bin = (offset / self.resolution_hz()).round() + (self.fft_size / 2) as f64;
        (bin >= 0.0 && bin < self.fft_size as f64).then_some(bin as usize)
    }

    /// Total displayed span in kHz.
    pub fn span_khz(&self) -> f64 {
        self.sample_rate.as_khz().0
    }

    /// Frequency ticks as kHz offsets from center.
    ///
    /// The step is the largest candidate that fits inside half the span,
    /// giving five ticks symmetric around zero.
    pub fn ticks_khz(&self) -> [f64; 5] {
        let half_span = self.span_khz() / 2.0;
        let step = TICK_STEPS_KHZ
            .iter()
            .copied()
            .find(|&step| step < half_span)
            .unwrap_or(TICK_STEPS_KHZ[TICK_STEPS_KHZ.len() - 1]);
        [-step, -step / 2.0, 0.0, step / 2.0, step]
    }

    /// Horizontal position of a kHz offset, 0.0 at the left edge and 1.0 at the right.
    pub fn offset_fraction(&self, offset_khz: f64) -> f64 {
        0.5 + offset_khz / self.span_khz()
    }
}

/// Horizontal grid lines every 10 dB from `sp_min` up to (not including) `sp_max`.
pub fn db_gridlines(sp_min: Decibels, sp_max: Decibels) -> Vec<Decibels> {
    let mut lines = Vec::new();
    let mut level = sp_min.0;
    while level < sp_max.0 {
        lines.push(Decibels(level));
        level += 10.0;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_offsets() {
        let axis = FrequencyAxis::new(512, Hertz(48_000), false);
        assert_eq!(axis.resolution_hz(), 93.75);
        assert_eq!(axis.bin_offset_hz(256), 0.0);
        assert_eq!(axis.bin_offset_hz(320), 6_000.0);
        assert_eq!(axis.bin_offset_hz(128), -12_000.0);
        assert_eq!(axis.bin_offset_hz(0), -24_000.0);
    }

    #[test]
    fn test_reversed_axis_is_mirrored() {
        let normal = FrequencyAxis::new(512, Hertz(48_000), false);
        let reversed = FrequencyAxis::new(512, Hertz(48_000), true);
        for bin in [0, 100, 256, 320, 511] {
            assert_eq!(reversed.bin_offset_hz(bin), -normal.bin_offset_hz(bin));
        }
        assert_eq!(reversed.offset_to_bin(6_000.0), Some(192));
        assert_eq!(normal.offset_to_bin(6_000.0), Some(320));
    }

    #[test]
    fn test_bin_frequency_uses_center() {
        let axis = FrequencyAxis::new(512, Hertz(48_000), false);
        let f = axis.bin_frequency(320, Kilohertz(7_040.0));
        assert!((f.0 - 7_046.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_to_bin_outside_span() {
        let axis = FrequencyAxis::new(512, Hertz(48_000), false);
        assert_eq!(axis.offset_to_bin(30_000.0), None);
        assert_eq!(axis.offset_to_bin(-24_000.0), Some(0));
    }

    #[test]
    fn test_ticks_fit_half_span() {
        let axis = FrequencyAxis::new(512, Hertz(48_000), false);
        assert_eq!(axis.ticks_khz(), [-20.0, -10.0, 0.0, 10.0, 20.0]);

        let wide = FrequencyAxis::new(1024, Hertz(2_048_000), false);
        assert_eq!(wide.ticks_khz(), [-800.0, -400.0, 0.0, 400.0, 800.0]);

        let narrow = FrequencyAxis::new(256, Hertz(8_000), false);
        assert_eq!(narrow.ticks_khz(), [-10.0, -5.0, 0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_offset_fraction() {
        let axis = FrequencyAxis::new(512, Hertz(48_000), false);
        assert_eq!(axis.offset_fraction(0.0), 0.5);
        assert_eq!(axis.offset_fraction(-24.0), 0.0);
        assert_eq!(axis.offset_fraction(12.0), 0.75);
    }

    #[test]
    fn test_db_gridlines() {
        let lines = db_gridlines(Decibels(-120.0), Decibels(-20.0));
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], Decibels(-120.0));
        assert_eq!(lines[9], Decibels(-30.0));
    }
}
