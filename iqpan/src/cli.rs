use clap::Parser;
use iqpan_engine::{PanConfig, RigConfig, SourceConfig};
use iqpan_engine::rig::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use std::path::PathBuf;

/// Live spectrum and waterfall panadapter for IQ receivers.
#[derive(Debug, Parser)]
#[command(name = "iqpan", version)]
pub struct Cli {
    /// TOML configuration file, created with defaults if missing
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the resolved configuration back to --config and exit
    #[arg(long, requires = "config")]
    pub write_config: bool,

    /// Print the known rig models and exit
    #[arg(long)]
    pub list_rigs: bool,

    /// Print rig models whose name or manufacturer matches and exit
    #[arg(long, value_name = "TEXT")]
    pub search_rigs: Option<String>,

    /// Run without a window, logging diagnostics periodically
    #[arg(long)]
    pub headless: bool,

    /// Identification label for the window title
    #[arg(long)]
    pub ident: Option<String>,

    /// FFT size, a power of two
    #[arg(short = 'n', long)]
    pub fft_size: Option<usize>,

    /// Sample rate in Hz
    #[arg(short = 'r', long)]
    pub sample_rate: Option<u32>,

    /// Ring buffer depth in blocks
    #[arg(long)]
    pub n_buffers: Option<usize>,

    /// Blocks to discard after opening the source
    #[arg(long)]
    pub skip: Option<usize>,

    /// Clip threshold in 16-bit full-scale units
    #[arg(long)]
    pub clip: Option<f32>,

    /// Pulse rejection factor over the median level, 0 disables
    #[arg(long)]
    pub pulse: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub sp_min: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub sp_max: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub v_min: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub v_max: Option<f32>,

    /// Spectra averaged per waterfall line
    #[arg(long)]
    pub waterfall_acc: Option<usize>,

    /// Waterfall palette, 1 (stepped) or 2 (rainbow)
    #[arg(long)]
    pub palette: Option<u8>,

    /// Swap I and Q
    #[arg(long)]
    pub rev_iq: bool,

    /// Correct the sound card channel offset and lag
    #[arg(long)]
    pub offset_fix: bool,

    /// Test tone at this offset from center, in Hz
    #[arg(long, allow_negative_numbers = true, value_name = "HZ", group = "input")]
    pub tone: Option<f64>,

    /// Raw little-endian complex f32 IQ file
    #[arg(long, value_name = "PATH", group = "input")]
    pub iq_file: Option<PathBuf>,

    /// 16-bit stereo WAV file, left = I
    #[arg(long, value_name = "PATH", group = "input")]
    pub wav: Option<PathBuf>,

    /// Restart the IQ file at end of file
    #[arg(long = "loop")]
    pub loop_on_eof: bool,

    /// Sound card capture; the device is a name substring
    #[arg(
        long,
        value_name = "DEVICE",
        num_args = 0..=1,
        default_missing_value = "",
        group = "input"
    )]
    pub sound_card: Option<String>,

    /// RTL-SDR dongle index
    #[arg(long, value_name = "INDEX", group = "input")]
    pub rtl: Option<u32>,

    /// RTL-SDR center frequency in Hz
    #[arg(long, value_name = "HZ", default_value_t = 100_000_000)]
    pub rtl_freq: u32,

    /// RTL-SDR tuner gain in tenths of a dB, automatic if unset
    #[arg(long)]
    pub rtl_gain: Option<i32>,

    /// rigctld endpoint to poll for the center frequency
    #[arg(long, value_name = "HOST:PORT", group = "rig")]
    pub rigctld: Option<String>,

    /// Hamlib rig model behind rigctld, see --list-rigs
    #[arg(long, value_name = "CODE")]
    pub rig_model: Option<u32>,

    /// Read the center frequency from a Si570 USB synthesizer
    #[arg(long, group = "rig")]
    pub si570: bool,

    /// Si570 frequency multiplier
    #[arg(long, default_value_t = 4.0)]
    pub multiplier: f64,

    /// Fixed center frequency in kHz
    #[arg(long, value_name = "KHZ", group = "rig")]
    pub fixed_khz: Option<f64>,
}

impl Cli {
    /// Override configuration values with the ones given on the command line.
    pub fn apply(&self, config: &mut PanConfig) {
        if let Some(ident) = &self.ident {
            config.ident = ident.clone();
        }
        set(&mut config.fft_size, self.fft_size);
        set(&mut config.sample_rate, self.sample_rate);
        set(&mut config.n_buffers, self.n_buffers);
        set(&mut config.skip, self.skip);
        set(&mut config.clip, self.clip);
        set(&mut config.pulse, self.pulse);
        set(&mut config.sp_min, self.sp_min);
        set(&mut config.sp_max, self.sp_max);
        set(&mut config.v_min, self.v_min);
        set(&mut config.v_max, self.v_max);
        set(&mut config.waterfall_acc, self.waterfall_acc);
        set(&mut config.palette, self.palette);
        config.rev_iq |= self.rev_iq;
        config.offset_fix |= self.offset_fix;

        if let Some(offset_hz) = self.tone {
            config.source = SourceConfig::TestTone {
                offset_hz,
                amplitude: 0.25,
                limit_samples: None,
            };
        } else if let Some(path) = &self.iq_file {
            config.source = SourceConfig::IqFile {
                path: path.clone(),
                loop_on_eof: self.loop_on_eof,
            };
        } else if let Some(path) = &self.wav {
            config.source = SourceConfig::WavFile { path: path.clone() };
        } else if let Some(device) = &self.sound_card {
            config.source = SourceConfig::SoundCard {
                device: (!device.is_empty()).then(|| device.clone()),
            };
        } else if let Some(device_index) = self.rtl {
            config.source = SourceConfig::RtlSdr {
                device_index,
                frequency_hz: self.rtl_freq,
                gain_tenths_db: self.rtl_gain,
            };
            // The dongle's own tuning labels the axis unless a rig is given
            if !self.has_rig_option() && config.rig == RigConfig::None {
                config.rig = RigConfig::Fixed {
                    frequency_khz: f64::from(self.rtl_freq) / 1000.0,
                };
            }
        }

        if let Some(endpoint) = &self.rigctld {
            config.rig = RigConfig::Rigctld {
                endpoint: endpoint.clone(),
                model: self.rig_model,
                device: None,
            };
        } else if self.si570 {
            config.rig = RigConfig::Si570 {
                vendor_id: DEFAULT_VENDOR_ID,
                product_id: DEFAULT_PRODUCT_ID,
                multiplier: self.multiplier,
            };
        } else if let Some(frequency_khz) = self.fixed_khz {
            config.rig = RigConfig::Fixed { frequency_khz };
        }
    }

    fn has_rig_option(&self) -> bool {
        self.rigctld.is_some() || self.si570 || self.fixed_khz.is_some()
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("iqpan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_arguments_keep_defaults() {
        let mut config = PanConfig::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config, PanConfig::default());
    }

    #[test]
    fn test_overrides() {
        let mut config = PanConfig::default();
        parse(&["-n", "1024", "--v-min", "-100", "--v-max", "-30", "--palette", "2", "--rev-iq"])
            .apply(&mut config);

        assert_eq!(config.fft_size, 1024);
        assert_eq!(config.v_min, -100.0);
        assert_eq!(config.v_max, -30.0);
        assert_eq!(config.palette, 2);
        assert!(config.rev_iq);
    }

    #[test]
    fn test_rtl_uses_its_tuning_as_frequency() {
        let mut config = PanConfig::default();
        parse(&["--rtl", "0", "--rtl-freq", "144800000"]).apply(&mut config);

        assert!(matches!(config.source, SourceConfig::RtlSdr { device_index: 0, .. }));
        assert_eq!(
            config.rig,
            RigConfig::Fixed {
                frequency_khz: 144_800.0
            }
        );
    }

    #[test]
    fn test_rigctld_with_model() {
        let mut config = PanConfig::default();
        parse(&["--rigctld", "localhost:4532", "--rig-model", "2044"]).apply(&mut config);

        assert_eq!(
            config.rig,
            RigConfig::Rigctld {
                endpoint: String::from("localhost:4532"),
                model: Some(2044),
                device: None,
            }
        );
    }

    #[test]
    fn test_sound_card_without_device_name() {
        let mut config = PanConfig::default();
        parse(&["--sound-card"]).apply(&mut config);
        assert_eq!(config.source, SourceConfig::SoundCard { device: None });
    }

    #[test]
    fn test_conflicting_inputs_are_rejected() {
        let result = Cli::try_parse_from(["iqpan", "--wav", "a.wav", "--iq-file", "b.iq"]);
        assert!(result.is_err());
    }
}
