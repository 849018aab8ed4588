//! Waterfall color palettes.
//!
//! A palette is a pure function from a normalized intensity in [0, 1] to a
//! color. Rendering goes through a precomputed lookup table per palette.

use iqpan_messages::{Decibels, PaletteId};
use std::f32::consts::TAU;
use std::sync::LazyLock;

/// Number of color steps in each lookup table.
pub const LUT_STEPS: usize = 256;

/// Floating point color, channels in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    /// Sum of the channels, used to order colors by intensity.
    pub fn brightness(&self) -> f32 {
        self.r + self.g + self.b
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        [q(self.r), q(self.g), q(self.b)]
    }
}

/// Map a normalized intensity to a color.
pub fn color(palette: PaletteId, f: f32) -> Rgb {
    let f = f.clamp(0.0, 1.0);
    match palette {
        PaletteId::Stepped => stepped(f),
        PaletteId::Rainbow => rainbow(f),
    }
}

// Red ramps in first, then green on top of it, then blue towards white.
fn stepped(f: f32) -> Rgb {
    const THIRD: f32 = 1.0 / 3.0;
    const LEVEL: f32 = 200.0;
    let ramp = |start: f32| ((f - start) / THIRD).clamp(0.0, 1.0) * LEVEL;
    Rgb {
        r: ramp(0.0),
        g: ramp(THIRD),
        b: ramp(2.0 * THIRD),
    }
}

// Phase-shifted cosines; the three terms sum to a constant, so brightness
// follows the `bright` envelope.
fn rainbow(f: f32) -> Rgb {
    let bright = (f + 0.15).min(1.0);
    let channel = |shift: f32| bright * 127.5 * (1.0 + (TAU * f + shift).cos());
    Rgb {
        r: channel(0.0),
        g: channel(TAU / 3.0),
        b: channel(2.0 * TAU / 3.0),
    }
}

fn build_lut(palette: PaletteId) -> Vec<[u8; 3]> {
    (0..LUT_STEPS)
        .map(|step| color(palette, step as f32 / (LUT_STEPS - 1) as f32).to_rgb8())
        .collect()
}

static STEPPED_LUT: LazyLock<Vec<[u8; 3]>> = LazyLock::new(|| build_lut(PaletteId::Stepped));
static RAINBOW_LUT: LazyLock<Vec<[u8; 3]>> = LazyLock::new(|| build_lut(PaletteId::Rainbow));

/// The lookup table of a palette, `LUT_STEPS` entries from floor to ceiling.
pub fn lut(palette: PaletteId) -> &'static [[u8; 3]] {
    match palette {
        PaletteId::Stepped => STEPPED_LUT.as_slice(),
        PaletteId::Rainbow => RAINBOW_LUT.as_slice(),
    }
}

/// Position of `db` within `[v_min, v_max]`, clamped to [0, 1].
pub fn normalize(db: f32, v_min: Decibels, v_max: Decibels) -> f32 {
    let span = v_max.0 - v_min.0;
    if span <= 0.0 {
        return if db >= v_max.0 { 1.0 } else { 0.0 };
    }
    ((db - v_min.0) / span).clamp(0.0, 1.0)
}

/// Render one dB value to a pixel.
pub fn map_db(palette: PaletteId, db: f32, v_min: Decibels, v_max: Decibels) -> [u8; 3] {
    let table = lut(palette);
    let index = (normalize(db, v_min, v_max) * (LUT_STEPS - 1) as f32).round() as usize;
    table[index.min(LUT_STEPS - 1)]
}

/// Render a row of dB values.
pub fn render_row(
    palette: PaletteId,
    db: &[f32],
    v_min: Decibels,
    v_max: Decibels,
) -> Vec<[u8; 3]> {
    db.iter().map(|&v| map_db(palette, v, v_min, v_max)).collect()
}
