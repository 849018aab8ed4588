//! Si570 synthesizer read through a SoftRock-style USB control chip.
//!
//! The firmware answers vendor control requests: 0x3A returns the output
//! frequency as a little-endian 11.21 fixed-point MHz value, 0x3F returns the
//! six raw Si570 frequency registers. Request 0x32 sets the output frequency
//! from the same 11.21 format. The receive frequency is the synthesizer
//! frequency divided by the board's multiplier.

use super::FrequencyBackend;
use crate::error::RigError;
use iqpan_messages::Kilohertz;

/// Default USB ids of SoftRock-compatible control firmware.
pub const DEFAULT_VENDOR_ID: u16 = 0x16c0;
pub const DEFAULT_PRODUCT_ID: u16 = 0x05dc;

/// Nominal Si570 crystal frequency.
pub const XTAL_MHZ: f64 = 114.285;

#[cfg_attr(not(feature = "si570"), allow(dead_code))]
const REQUEST_READ_FREQUENCY: u8 = 0x3A;
#[cfg_attr(not(feature = "si570"), allow(dead_code))]
const REQUEST_READ_REGISTERS: u8 = 0x3F;
#[cfg_attr(not(feature = "si570"), allow(dead_code))]
const REQUEST_SET_FREQUENCY: u8 = 0x32;

/// Decode the 11.21 fixed-point MHz reply of request 0x3A.
pub fn decode_fixed_point_mhz(bytes: [u8; 4]) -> f64 {
    f64::from(u32::from_le_bytes(bytes)) / f64::from(1u32 << 21)
}

/// Encode a frequency in MHz for request 0x32.
pub fn encode_fixed_point_mhz(mhz: f64) -> [u8; 4] {
    let raw = (mhz * f64::from(1u32 << 21)).round();
    (raw.clamp(0.0, f64::from(u32::MAX)) as u32).to_le_bytes()
}

/// Compute the output frequency in MHz from the six Si570 registers 7..12.
pub fn decode_registers(regs: [u8; 6], xtal_mhz: f64) -> f64 {
    let hs_div = u32::from((regs[0] & 0xE0) >> 5) + 4;
    let n1 = ((u32::from(regs[0] & 0x1F) << 2) | (u32::from(regs[1] & 0xC0) >> 6)) + 1;
    let rfreq_int = (u64::from(regs[1] & 0x3F) << 32)
        | (u64::from(regs[2]) << 24)
        | (u64::from(regs[3]) << 16)
        | (u64::from(regs[4]) << 8)
        | u64::from(regs[5]);
    let rfreq = rfreq_int as f64 / f64::from(1u32 << 28);
    xtal_mhz * rfreq / f64::from(hs_div * n1)
}

#[cfg(feature = "si570")]
pub struct Si570Backend {
    handle: rusb::DeviceHandle<rusb::GlobalContext>,
    vendor_id: u16,
    product_id: u16,
    multiplier: f64,
}

#[cfg(feature = "si570")]
impl Si570Backend {
    const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

    pub fn open(vendor_id: u16, product_id: u16, multiplier: f64) -> Result<Self, RigError> {
        let handle = rusb::open_device_with_vid_pid(vendor_id, product_id).ok_or_else(|| {
            RigError::NotFound(format!("USB device {vendor_id:04x}:{product_id:04x}"))
        })?;
        log::info!(
            "Opened Si570 control chip {:04x}:{:04x}, multiplier {}",
            vendor_id,
            product_id,
            multiplier
        );
        Ok(Self {
            handle,
            vendor_id,
            product_id,
            multiplier,
        })
    }

    fn read(&self, request: u8, value: u16, buf: &mut [u8]) -> Result<usize, RigError> {
        let request_type = rusb::request_type(
            rusb::Direction::In,
            rusb::RequestType::Vendor,
            rusb::Recipient::Device,
        );
        self.handle
            .read_control(request_type, request, value, 0, buf, Self::TIMEOUT)
            .map_err(|e| RigError::Protocol(format!("USB control read 0x{request:02x}: {e}")))
    }

    fn write(&self, request: u8, value: u16, buf: &[u8]) -> Result<usize, RigError> {
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            rusb::RequestType::Vendor,
            rusb::Recipient::Device,
        );
        self.handle
            .write_control(request_type, request, value, 0, buf, Self::TIMEOUT)
            .map_err(|e| RigError::Protocol(format!("USB control write 0x{request:02x}: {e}")))
    }

    fn synthesizer_mhz(&self) -> Result<f64, RigError> {
        let mut fixed = [0u8; 4];
        if let Ok(4) = self.read(REQUEST_READ_FREQUENCY, 0, &mut fixed) {
            let mhz = decode_fixed_point_mhz(fixed);
            if mhz > 0.0 {
                return Ok(mhz);
            }
        }

        // Older firmware only exposes the raw registers
        let mut regs = [0u8; 6];
        match self.read(REQUEST_READ_REGISTERS, 0x55, &mut regs)? {
            6 => Ok(decode_registers(regs, XTAL_MHZ)),
            n => Err(RigError::Protocol(format!("register read returned {n} bytes"))),
        }
    }
}

#[cfg(feature = "si570")]
impl FrequencyBackend for Si570Backend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        let mhz = self.synthesizer_mhz()?;
        Ok(Kilohertz(mhz * 1000.0 / self.multiplier))
    }

    fn set_frequency(&mut self, frequency: Kilohertz) -> Result<(), RigError> {
        let mhz = frequency.0 * self.multiplier / 1000.0;
        let bytes = encode_fixed_point_mhz(mhz);
        match self.write(REQUEST_SET_FREQUENCY, 0x700, &bytes)? {
            4 => Ok(()),
            n => Err(RigError::Protocol(format!("frequency write took {n} bytes"))),
        }
    }

    fn describe(&self) -> String {
        format!("Si570 {:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Placeholder when USB support is not compiled in; opening always fails.
#[cfg(not(feature = "si570"))]
pub struct Si570Backend {
    _private: (),
}

#[cfg(not(feature = "si570"))]
impl Si570Backend {
    pub fn open(_vendor_id: u16, _product_id: u16, _multiplier: f64) -> Result<Self, RigError> {
        Err(RigError::Unsupported(
            "Si570 support not compiled (enable the 'si570' feature)",
        ))
    }
}

#[cfg(not(feature = "si570"))]
impl FrequencyBackend for Si570Backend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        Err(RigError::Unsupported("Si570"))
    }

    fn describe(&self) -> String {
        String::from("Si570 (unsupported)")
    }
}
