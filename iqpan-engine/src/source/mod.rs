//! Sample sources.
//!
//! Every input device implements [`SampleSource`]. Sources are built on the
//! acquisition thread from a [`SourceFactory`] because some device handles
//! (CPAL streams in particular) must not move between threads.

mod block;
mod file;
mod pace;
#[cfg(feature = "rtlsdr")]
mod rtl;
#[cfg(feature = "soundcard")]
mod soundcard;
mod tone;
mod wav;

pub use block::{ChannelLayout, FULL_SCALE, SampleBlock, convert_u8_iq};
pub use file::FileIqSource;
#[cfg(feature = "rtlsdr")]
pub use rtl::RtlSdrSource;
#[cfg(feature = "soundcard")]
pub use soundcard::SoundCardSource;
pub use tone::ToneSource;
pub use wav::{WavSource, header_rate};

use crate::config::{PanConfig, SourceConfig};
#[cfg(not(all(feature = "rtlsdr", feature = "soundcard")))]
use crate::error::PanError;
use crate::error::PanResult;
use iqpan_messages::Hertz;
use log::{debug, info};

/// Abstraction over sound cards, SDR dongles, files and generators.
pub trait SampleSource {
    /// Open (or re-open) the device.
    fn open(&mut self) -> PanResult<()>;

    /// Read exactly `n` samples, blocking until they are available.
    ///
    /// A block shorter than `n` is only returned right before end of stream;
    /// `Ok(None)` is end of stream.
    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>>;

    /// Release the device. Calling `close` on a closed source is a no-op.
    fn close(&mut self);

    fn native_sample_rate(&self) -> Hertz;

    fn describe(&self) -> String;
}

/// Builds a source on the thread that will read from it.
pub type SourceFactory = Box<dyn FnOnce() -> PanResult<Box<dyn SampleSource>> + Send>;

/// Adopt the sample rate recorded in a WAV file's header.
///
/// Other sources run at the configured rate. A header that cannot be read is
/// left for [`SampleSource::open`] to report.
pub fn resolve_sample_rate(config: &mut PanConfig) {
    let SourceConfig::WavFile { path } = &config.source else {
        return;
    };
    match header_rate(path).map(|rate| u32::try_from(rate.0)) {
        Ok(Ok(rate)) if rate != config.sample_rate => {
            info!(
                "Using the sample rate of {}: {} Hz instead of {} Hz",
                path.display(),
                rate,
                config.sample_rate
            );
            config.sample_rate = rate;
        }
        Ok(_) => {}
        Err(e) => debug!("Leaving the sample rate as configured: {}", e),
    }
}

/// Select the source implementation for a configuration.
pub fn source_factory(config: &PanConfig) -> SourceFactory {
    let source = config.source.clone();
    let sample_rate = config.sample_rate_hz();
    Box::new(move || build_source(source, sample_rate))
}

fn build_source(source: SourceConfig, sample_rate: Hertz) -> PanResult<Box<dyn SampleSource>> {
    match source {
        SourceConfig::TestTone {
            offset_hz,
            amplitude,
            limit_samples,
        } => Ok(Box::new(ToneSource::new(
            sample_rate,
            offset_hz,
            amplitude,
            limit_samples,
        ))),
        SourceConfig::IqFile { path, loop_on_eof } => {
            Ok(Box::new(FileIqSource::new(path, sample_rate, loop_on_eof)))
        }
        SourceConfig::WavFile { path } => Ok(Box::new(WavSource::new(path, sample_rate))),
        #[cfg(feature = "soundcard")]
        SourceConfig::SoundCard { device } => {
            Ok(Box::new(SoundCardSource::new(device, sample_rate)))
        }
        #[cfg(not(feature = "soundcard"))]
        SourceConfig::SoundCard { .. } => Err(PanError::DeviceUnavailable(String::from(
            "sound card support not compiled (enable the 'soundcard' feature)",
        ))),
        #[cfg(feature = "rtlsdr")]
        SourceConfig::RtlSdr {
            device_index,
            frequency_hz,
            gain_tenths_db,
        } => Ok(Box::new(RtlSdrSource::new(
            device_index,
            frequency_hz,
            sample_rate,
            gain_tenths_db,
        ))),
        #[cfg(not(feature = "rtlsdr"))]
        SourceConfig::RtlSdr { .. } => Err(PanError::DeviceUnavailable(String::from(
            "RTL-SDR support not compiled (enable the 'rtlsdr' feature)",
        ))),
    }
}
