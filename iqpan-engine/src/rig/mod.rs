//! Receiver frequency tracking.
//!
//! A [`FrequencyBackend`] answers "what is the rig tuned to" and, where the
//! hardware allows, retunes it. The [`RigSynchronizer`] owns the backend on
//! its own thread and publishes the answer through a single-writer
//! [`RigState`] cell.

pub mod models;
mod rigctld;
mod si570;
mod sync;

pub use rigctld::RigctldBackend;
pub use si570::{
    DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID, Si570Backend, XTAL_MHZ, decode_fixed_point_mhz,
    decode_registers, encode_fixed_point_mhz,
};
pub use sync::RigSynchronizer;

use crate::config::RigConfig;
use crate::error::RigError;
use iqpan_messages::{Kilohertz, RigState};
use log::{info, warn};
use std::sync::{Arc, RwLock};

/// A source of the receiver's current center frequency.
pub trait FrequencyBackend: Send {
    /// Query the current frequency.
    fn poll(&mut self) -> Result<Kilohertz, RigError>;

    /// Tune the receiver. Backends that cannot tune keep the default.
    fn set_frequency(&mut self, _frequency: Kilohertz) -> Result<(), RigError> {
        Err(RigError::Unsupported("tuning"))
    }

    fn describe(&self) -> String;
}

/// Reports a frequency that never changes, such as the tuning of an RTL dongle.
#[derive(Debug, Clone)]
pub struct FixedBackend {
    frequency: Kilohertz,
}

impl FixedBackend {
    pub fn new(frequency: Kilohertz) -> Self {
        Self { frequency }
    }
}

impl FrequencyBackend for FixedBackend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        Ok(self.frequency)
    }

    fn describe(&self) -> String {
        format!("fixed {}", self.frequency)
    }
}

/// Build the backend named by the configuration, `None` if frequency
/// tracking is off.
pub fn open_backend(config: &RigConfig) -> Result<Option<Box<dyn FrequencyBackend>>, RigError> {
    match config {
        RigConfig::None => Ok(None),
        RigConfig::Fixed { frequency_khz } => {
            Ok(Some(Box::new(FixedBackend::new(Kilohertz(*frequency_khz)))))
        }
        RigConfig::Rigctld { endpoint, model, .. } => {
            if let Some(code) = model {
                match models::lookup(*code) {
                    Some(rig) => info!("Rig model {} ({}, {})", code, rig.name, rig.status),
                    None => warn!("Rig model {} is not in the known rig table", code),
                }
            }
            Ok(Some(Box::new(RigctldBackend::new(endpoint.clone()))))
        }
        RigConfig::Si570 {
            vendor_id,
            product_id,
            multiplier,
        } => Ok(Some(Box::new(Si570Backend::open(
            *vendor_id,
            *product_id,
            *multiplier,
        )?))),
    }
}

/// Create the shared rig state cell.
pub fn rig_cell(initial: RigState) -> (RigWriter, RigReader) {
    let cell = Arc::new(RwLock::new(initial));
    (RigWriter(cell.clone()), RigReader(cell))
}

/// The single handle that can change [`RigState`].
#[derive(Debug)]
pub struct RigWriter(Arc<RwLock<RigState>>);

impl RigWriter {
    /// Apply `f` to the state under the write lock.
    pub fn update(&self, f: impl FnOnce(&mut RigState)) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    pub fn reader(&self) -> RigReader {
        RigReader(self.0.clone())
    }
}

/// Read handle returning whole copies of the state.
#[derive(Debug, Clone)]
pub struct RigReader(Arc<RwLock<RigState>>);

impl RigReader {
    pub fn snapshot(&self) -> RigState {
        match self.0.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
