use super::pace::Pacer;
use super::{ChannelLayout, SampleBlock, SampleSource};
use crate::error::{PanError, PanResult};
use hound::WavReader;
use iqpan_messages::Hertz;
use log::info;
use num_complex::Complex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// WAV file source.
///
/// Reads 16-bit stereo WAV files where:
/// - Left channel = I (in-phase component)
/// - Right channel = Q (quadrature component)
///
/// A mono file is accepted and read as a real signal. The file must be
/// recorded at the rate the pipeline runs at; see [`header_rate`].
pub struct WavSource {
    path: PathBuf,
    requested_rate: Hertz,
    native_rate: Option<Hertz>,
    reader: Option<WavReader<BufReader<File>>>,
    channels: u16,
    pacer: Pacer,
}

impl std::fmt::Debug for WavSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSource")
            .field("path", &self.path)
            .field("native_rate", &self.native_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl WavSource {
    pub fn new(path: impl Into<PathBuf>, requested_rate: Hertz) -> Self {
        Self {
            path: path.into(),
            requested_rate,
            native_rate: None,
            reader: None,
            channels: 0,
            pacer: Pacer::new(),
        }
    }
}

/// Sample rate recorded in a WAV file's header.
pub fn header_rate(path: &Path) -> PanResult<Hertz> {
    let reader = WavReader::open(path)
        .map_err(|e| PanError::DeviceUnavailable(format!("{}: {e}", path.display())))?;
    Ok(Hertz(u64::from(reader.spec().sample_rate)))
}

impl SampleSource for WavSource {
    fn open(&mut self) -> PanResult<()> {
        let reader = WavReader::open(&self.path).map_err(|e| {
            PanError::DeviceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(PanError::DeviceUnavailable(format!(
                "{}: WAV file must be 16-bit integer, found {} bits",
                self.path.display(),
                spec.bits_per_sample
            )));
        }
        if !(1..=2).contains(&spec.channels) {
            return Err(PanError::DeviceUnavailable(format!(
                "{}: WAV file must be mono or stereo, found {} channels",
                self.path.display(),
                spec.channels
            )));
        }

        let native = Hertz(u64::from(spec.sample_rate));
        if native != self.requested_rate {
            return Err(PanError::Configuration(format!(
                "{} is recorded at {}, the pipeline runs at {}",
                self.path.display(),
                native,
                self.requested_rate
            )));
        }
        info!(
            "Opened WAV file {}: {} Hz, {} channel(s), {:.2} seconds",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            f64::from(reader.duration()) / f64::from(spec.sample_rate)
        );

        self.native_rate = Some(native);
        self.channels = spec.channels;
        self.reader = Some(reader);
        self.pacer.start(native);
        Ok(())
    }

    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
        let channels = usize::from(self.channels);
        let rate = self.native_sample_rate();
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PanError::DeviceIo(String::from("WAV file is not open")))?;

        let raw: Vec<i16> = reader
            .samples::<i16>()
            .take(n * channels)
            .collect::<Result<_, _>>()
            .map_err(|e| PanError::DeviceIo(format!("{}: {e}", self.path.display())))?;

        let samples: Vec<Complex<f32>> = raw
            .chunks_exact(channels)
            .map(|frame| match frame {
                [i, q] => Complex::new(f32::from(*i), f32::from(*q)),
                [mono] => Complex::new(f32::from(*mono), 0.0),
                _ => unreachable!("channel count checked at open"),
            })
            .collect();

        if samples.is_empty() {
            return Ok(None);
        }
        self.pacer.wait(samples.len());

        let layout = if channels == 2 {
            ChannelLayout::Iq
        } else {
            ChannelLayout::Mono
        };
        Ok(Some(SampleBlock::new(samples, rate, layout)))
    }

    fn close(&mut self) {
        self.reader = None;
        self.pacer.stop();
    }

    fn native_sample_rate(&self) -> Hertz {
        self.native_rate.unwrap_or(self.requested_rate)
    }

    fn describe(&self) -> String {
        format!("WAV file {}", self.path.display())
    }
}
