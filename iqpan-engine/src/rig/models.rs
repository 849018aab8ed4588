//! Reference table of known rig model codes.
//!
//! The codes are Hamlib model numbers, as passed to `rigctld -m`. The table is
//! static data used to show and check a requested code; it never changes at
//! run time.

use std::fmt;

/// Maturity of a rig's backend support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    Stable,
    Beta,
    Alpha,
    Untested,
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stable => "Stable",
            Self::Beta => "Beta",
            Self::Alpha => "Alpha",
            Self::Untested => "Untested",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigModel {
    pub code: u32,
    pub manufacturer: &'static str,
    pub name: &'static str,
    pub status: SupportStatus,
}

impl fmt::Display for RigModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6}  {:<12} {:<20} {}",
            self.code, self.manufacturer, self.name, self.status
        )
    }
}

const fn model(
    code: u32,
    manufacturer: &'static str,
    name: &'static str,
    status: SupportStatus,
) -> RigModel {
    RigModel {
        code,
        manufacturer,
        name,
        status,
    }
}

use SupportStatus::{Alpha, Beta, Stable, Untested};

/// Known rig models, sorted by code.
pub static RIG_MODELS: &[RigModel] = &[
    model(1, "Hamlib", "Dummy", Stable),
    model(2, "Hamlib", "NET rigctl", Stable),
    model(4, "FLRig", "FLRig", Stable),
    model(1020, "Yaesu", "FT-817", Stable),
    model(1022, "Yaesu", "FT-857", Stable),
    model(1023, "Yaesu", "FT-897", Stable),
    model(1035, "Yaesu", "FT-991", Beta),
    model(2014, "Kenwood", "TS-2000", Stable),
    model(2029, "Elecraft", "K3/KX3", Stable),
    model(2044, "Elecraft", "KX3", Stable),
    model(2045, "Elecraft", "KX2", Beta),
    model(3011, "Icom", "IC-706MkIIG", Stable),
    model(3073, "Icom", "IC-7300", Stable),
    model(25016, "SoftRock", "Si570 AVR-USB", Alpha),
    model(29001, "Network", "RTL-TCP", Untested),
];

/// Find a model by its code.
pub fn lookup(code: u32) -> Option<&'static RigModel> {
    RIG_MODELS
        .binary_search_by_key(&code, |m| m.code)
        .ok()
        .map(|i| &RIG_MODELS[i])
}

/// Models whose manufacturer or name contains `text`, ignoring case.
pub fn search(text: &str) -> Vec<&'static RigModel> {
    let needle = text.to_lowercase();
    RIG_MODELS
        .iter()
        .filter(|m| {
            m.name.to_lowercase().contains(&needle)
                || m.manufacturer.to_lowercase().contains(&needle)
        })
        .collect()
}
