mod command;
mod event;
mod state;
mod units;

pub use command::Command;
pub use event::{DisplayFrame, Event, WaterfallLine};
pub use state::{Diagnostics, EngineState, PaletteId, RigState, RigStatus};
pub use units::{Decibels, Hertz, Kilohertz};
