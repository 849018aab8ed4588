//! Pipeline error types

use thiserror::Error;

/// Errors and counted conditions of the panadapter pipeline.
///
/// Only some variants end a run; see [`PanError::is_fatal`]. The non-fatal
/// ones exist so that components can report them uniformly before they are
/// folded into the diagnostic counters.
#[derive(Error, Debug)]
pub enum PanError {
    /// The sample source could not be opened
    #[error("Sample device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A read failed after the device was opened
    #[error("Sample device I/O error: {0}")]
    DeviceIo(String),

    /// The ring buffer was full and dropped its oldest block
    #[error("Ring buffer overrun, {dropped} block(s) dropped")]
    BufferOverrun { dropped: u64 },

    /// A sample exceeded the clip threshold and was clamped
    #[error("Sample clipped at {threshold}")]
    Clip { threshold: f32 },

    /// A zero-padded final window was produced at end of stream
    #[error("Partial frame of {valid} samples (FFT size {fft_size})")]
    PartialFrame { valid: usize, fft_size: usize },

    /// The frequency backend failed to answer a poll
    #[error("Rig poll failed: {0}")]
    RigPoll(#[from] RigError),

    /// The resolved configuration is not usable
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl PanError {
    /// Fatal conditions end the owning thread and the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable(_) | Self::DeviceIo(_) | Self::Configuration(_)
        )
    }
}

/// Errors returned by frequency-control backends.
#[derive(Error, Debug)]
pub enum RigError {
    #[error("I/O error talking to rig: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with something that is not a frequency
    #[error("Unexpected rig response: {0:?}")]
    Protocol(String),

    /// The backend reported an error code
    #[error("Rig reported error code {0}")]
    Report(i32),

    #[error("Rig device not found: {0}")]
    NotFound(String),

    /// Backend support was not compiled in
    #[error("Rig backend unsupported: {0}")]
    Unsupported(&'static str),
}

/// Result type for pipeline operations
pub type PanResult<T> = Result<T, PanError>;
