use super::pace::Pacer;
use super::{ChannelLayout, FULL_SCALE, SampleBlock, SampleSource};
use crate::error::{PanError, PanResult};
use iqpan_messages::Hertz;
use log::debug;
use num_complex::Complex;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::PathBuf;

const BYTES_PER_SAMPLE: usize = 2 * std::mem::size_of::<f32>();

/// File-based IQ source that reads binary IQ samples from disk.
/// Expects interleaved I/Q samples as little-endian f32 pairs normalized to ±1.0.
/// Samples are released at `sample_rate`, as the receiver recorded them.
#[derive(Debug)]
pub struct FileIqSource {
    path: PathBuf,
    sample_rate: Hertz,
    loop_on_eof: bool,
    reader: Option<BufReader<File>>,
    pacer: Pacer,
}

impl FileIqSource {
    /// Create a new FileIqSource for a path. The file is opened by [`SampleSource::open`].
    /// If loop_on_eof is true, the file will restart from the beginning on EOF.
    pub fn new(path: impl Into<PathBuf>, sample_rate: Hertz, loop_on_eof: bool) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            loop_on_eof,
            reader: None,
            pacer: Pacer::new(),
        }
    }

    /// Fill `byte_buf` as far as the file allows, returning the byte count.
    ///
    /// When looping, a trailing partial sample is dropped before the rewind
    /// so I and Q stay aligned across the wrap.
    fn fill(
        reader: &mut BufReader<File>,
        byte_buf: &mut [u8],
        loop_on_eof: bool,
    ) -> io::Result<usize> {
        let mut total_read = 0;
        // Byte count at the last rewind; a pass that adds no whole sample ends the read
        let mut rewound_at = None;

        loop {
            match reader.read(&mut byte_buf[total_read..]) {
                Ok(0) => {
                    if !loop_on_eof {
                        break;
                    }
                    total_read -= total_read % BYTES_PER_SAMPLE;
                    if rewound_at == Some(total_read) {
                        break;
                    }
                    reader.seek(io::SeekFrom::Start(0))?;
                    rewound_at = Some(total_read);
                }
                Ok(n) => {
                    total_read += n;
                    if total_read >= byte_buf.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(total_read)
    }
}

impl SampleSource for FileIqSource {
    fn open(&mut self) -> PanResult<()> {
        let file = File::open(&self.path).map_err(|e| {
            PanError::DeviceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        debug!("Opened IQ file {}", self.path.display());
        self.reader = Some(BufReader::new(file));
        self.pacer.start(self.sample_rate);
        Ok(())
    }

    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PanError::DeviceIo(String::from("IQ file is not open")))?;

        let mut byte_buf = vec![0u8; n * BYTES_PER_SAMPLE];
        let total_read = Self::fill(reader, &mut byte_buf, self.loop_on_eof)
            .map_err(|e| PanError::DeviceIo(format!("{}: {e}", self.path.display())))?;

        // A trailing half sample is dropped
        let samples_read = total_read / BYTES_PER_SAMPLE;
        if samples_read == 0 {
            return Ok(None);
        }

        let samples: Vec<Complex<f32>> = byte_buf[..samples_read * BYTES_PER_SAMPLE]
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| {
                let i_val = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
                let q_val = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
                Complex::new(i_val * FULL_SCALE, q_val * FULL_SCALE)
            })
            .collect();
        self.pacer.wait(samples.len());

        Ok(Some(SampleBlock::new(samples, self.sample_rate, ChannelLayout::Iq)))
    }

    fn close(&mut self) {
        self.reader = None;
        self.pacer.stop();
    }

    fn native_sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("IQ file {}", self.path.display())
    }
}
