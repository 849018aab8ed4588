use crate::{Decibels, Kilohertz, PaletteId};

/// Commands sent from the display to the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Stop the engine and shut down every pipeline thread.
    Stop,
    /// Switch waterfall palette. History is re-rendered, not recomputed.
    SetPalette(PaletteId),
    /// Change the waterfall intensity range.
    SetWaterfallRange { v_min: Decibels, v_max: Decibels },
    /// Restore the configured waterfall intensity range.
    ResetWaterfallRange,
    /// Retune the receiver through its frequency backend.
    Tune(Kilohertz),
}
