use super::{ChannelLayout, SampleBlock, SampleSource, convert_u8_iq};
use crate::error::{PanError, PanResult};
use iqpan_messages::Hertz;
use log::{debug, info};
use rtlsdr::RTLSDRDevice;

/// RTL-SDR dongle source.
///
/// The dongle delivers interleaved unsigned 8-bit I/Q, converted with
/// [`convert_u8_iq`] so the spectrum shares the 16-bit dBFS reference.
pub struct RtlSdrSource {
    device_index: u32,
    frequency_hz: u32,
    sample_rate: Hertz,
    gain_tenths_db: Option<i32>,
    device: Option<RTLSDRDevice>,
}

impl RtlSdrSource {
    pub fn new(
        device_index: u32,
        frequency_hz: u32,
        sample_rate: Hertz,
        gain_tenths_db: Option<i32>,
    ) -> Self {
        Self {
            device_index,
            frequency_hz,
            sample_rate,
            gain_tenths_db,
            device: None,
        }
    }

    fn configure(&self, device: &mut RTLSDRDevice) -> PanResult<()> {
        let unavailable = |what: &str, e: rtlsdr::RTLSDRError| {
            PanError::DeviceUnavailable(format!("RTL-SDR {}: {what}: {e}", self.device_index))
        };
        let rate = u32::try_from(self.sample_rate.0).map_err(|_| {
            PanError::DeviceUnavailable(format!(
                "sample rate {} is too large for RTL-SDR",
                self.sample_rate
            ))
        })?;

        device
            .set_center_freq(self.frequency_hz)
            .map_err(|e| unavailable("failed to set center frequency", e))?;
        device
            .set_sample_rate(rate)
            .map_err(|e| unavailable("failed to set sample rate", e))?;

        match self.gain_tenths_db {
            None => device
                .set_tuner_gain_mode(false)
                .map_err(|e| unavailable("failed to set gain mode", e))?,
            Some(gain) => {
                device
                    .set_tuner_gain_mode(true)
                    .map_err(|e| unavailable("failed to set gain mode", e))?;
                device
                    .set_tuner_gain(gain)
                    .map_err(|e| unavailable("failed to set gain", e))?;
            }
        }

        device
            .reset_buffer()
            .map_err(|e| unavailable("failed to reset buffer", e))
    }
}

impl SampleSource for RtlSdrSource {
    fn open(&mut self) -> PanResult<()> {
        #[allow(clippy::cast_possible_wrap)]
        let mut device = rtlsdr::open(self.device_index as i32).map_err(|e| {
            PanError::DeviceUnavailable(format!(
                "failed to open RTL-SDR device {}: {e}",
                self.device_index
            ))
        })?;
        self.configure(&mut device)?;

        info!(
            "RTL-SDR {} configured: center {:.3} MHz, rate {:.3} MHz, gain {:?}",
            self.device_index,
            f64::from(self.frequency_hz) / 1e6,
            self.sample_rate.0 as f64 / 1e6,
            self.gain_tenths_db
        );
        self.device = Some(device);
        Ok(())
    }

    fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| PanError::DeviceIo(String::from("RTL-SDR is not open")))?;

        let mut samples = Vec::with_capacity(n);
        while samples.len() < n {
            // Reads must be a multiple of the 512 byte USB packet
            let wanted = ((n - samples.len()) * 2).div_ceil(512) * 512;
            let buf = device
                .read_sync(wanted)
                .map_err(|e| PanError::DeviceIo(format!("RTL-SDR read failed: {e}")))?;
            if buf.is_empty() {
                return Err(PanError::DeviceIo(String::from("RTL-SDR returned no data")));
            }
            samples.extend(convert_u8_iq(&buf));
        }
        samples.truncate(n);
        debug!("RTL-SDR read {} samples", samples.len());

        Ok(Some(SampleBlock::new(samples, self.sample_rate, ChannelLayout::Iq)))
    }

    fn close(&mut self) {
        // Dropping the handle releases the USB device
        self.device = None;
    }

    fn native_sample_rate(&self) -> Hertz {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!(
            "RTL-SDR {} at {:.3} MHz",
            self.device_index,
            f64::from(self.frequency_hz) / 1e6
        )
    }
}
