/// Frequency in Hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hertz(pub u64);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl Hertz {
    pub fn as_khz(self) -> Kilohertz {
        Kilohertz(self.0 as f64 / 1_000.0)
    }
}

/// Frequency in kilohertz, the unit rig backends report in.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Kilohertz(pub f64);

impl std::fmt::Display for Kilohertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} kHz", self.0)
    }
}

impl Kilohertz {
    pub fn from_hz(hz: f64) -> Self {
        Self(hz / 1_000.0)
    }
}

/// Level in decibels relative to 16-bit full scale (dBFS).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibels(pub f32);

impl std::fmt::Display for Decibels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} dB", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hertz_to_khz() {
        assert_eq!(Hertz(48_000).as_khz(), Kilohertz(48.0));
        assert_eq!(Kilohertz::from_hz(7_074_000.0), Kilohertz(7_074.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Kilohertz(7074.25).to_string(), "7074.250 kHz");
        assert_eq!(Hertz(48_000).to_string(), "48000 Hz");
        assert_eq!(Decibels(-60.0).to_string(), "-60.0 dB");
    }
}
