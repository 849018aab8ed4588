use super::{ChannelLayout, SampleBlock, SampleSource};
use crate::error::{PanError, PanResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use iqpan_messages::Hertz;
use log::{error, info};
use num_complex::Complex;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Stereo sound card source.
///
/// Captures 16-bit stereo frames. The right channel carries I and the left
/// channel carries Q, matching the usual wiring of QSD-style receivers.
pub struct SoundCardSource {
    device_name: Option<String>,
    sample_rate: Hertz,
    stream: Option<Stream>,
    frames_rx: Option<flume::Receiver<Vec<i16>>>,
    pending: Vec<Complex<f32>>,
}

impl SoundCardSource {
    pub fn new(device_name: Option<String>, sample_rate: Hertz) -> Self {
        Self {
            device_name,
            sample_rate,
            stream: None,
            frames_rx: None,
            pending: Vec::new(),
        }
    }

    fn find_device(&self) -> PanResult<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| {
                    PanError::DeviceUnavailable(String::from("no default input device"))
                }),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| PanError::DeviceUnavailable(e.to_string()))?
                .find(|d| {
                    d.name()
                        .map(|name| name.contains(wanted.as_str()))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    PanError::DeviceUnavailable(format!("input device '{wanted}' not found"))
                }),
        }
    }
}

/// Split interleaved stereo into I (right) and Q (left).
fn deinterleave(data: &[i16]) -> impl Iterator<Item = Complex<f32>> + '_ {
    data.chunks_exact(2)
        .map(|frame| Complex::new(f32::from(frame[1]), f32::from(frame[0])))
}

impl SampleSource for SoundCardSource {
    fn open(&mut self) -> PanResult<()> {
        let device = self.find_device()?;
        let name = device.name().unwrap_or_else(|_| String::from("Unknown"));
        let rate = u32::try_from(self.sample_rate.0).map_err(|_| {
            PanError::DeviceUnavailable(format!("sample rate {} out of range", self.sample_rate))
        })?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Default,
        };

        let (tx, rx) = flume::unbounded();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the source was closed
                    let _ = tx.send(data.to_vec());
                },
                |e| error!("Sound card stream error: {e}"),
                None,
            )
            .map_err(|e| PanError::DeviceUnavailable(format!("{name}: {e}")))?;
        stream
            .play()
            .map_err(|e| PanError::DeviceUnavailable(format!("{name}: {e}")))?;

        info!("Opened sound card '{name}' at {} Hz", rate);
        self.stream = Some(stream);
        self.frames_rx = Some(rx);
        self.pending.clear();
        Ok(())
    }

    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
        let rx = self
            .frames_rx
            .as_ref()
            .ok_or_else(|| PanError::DeviceIo(String::from("sound card is not open")))?;

        while self.pending.len() < n {
            let data = rx.recv_timeout(READ_TIMEOUT).map_err(|e| {
                PanError::DeviceIo(format!("sound card delivered no samples: {e}"))
            })?;
            self.pending.extend(deinterleave(&data));
        }

        let samples: Vec<Complex<f32>> = self.pending.drain(..n).collect();
        Ok(Some(SampleBlock::new(samples, self.sample_rate, ChannelLayout::Iq)))
    }

    fn close(&mut self) {
        self.stream = None;
        self.frames_rx = None;
        self.pending.clear();
    }

    fn native_sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    fn describe(&self) -> String {
        match &self.device_name {
            Some(name) => format!("sound card '{name}'"),
            None => String::from("default sound card"),
        }
    }
}
