mod cli;

use clap::Parser;
use cli::Cli;
use iqpan_engine::rig::models;
use iqpan_engine::{Engine, PanConfig};
use iqpan_messages::{Command, Event};

use anyhow::Context;
use log::{LevelFilter, error, info};
use std::io::Write;
use std::time::{Duration, Instant};

/// How often headless mode logs the diagnostic counters.
const HEADLESS_REPORT_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - target | {} | args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.target(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .filter_module("iqpan_engine", LevelFilter::Info)
        .filter_module("iqpan_ui", LevelFilter::Info)
        .filter_module("eframe", LevelFilter::Warn)
        .filter_module("egui_glow", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if cli.list_rigs {
        for model in models::RIG_MODELS {
            println!("{model}");
        }
        return Ok(());
    }
    if let Some(text) = &cli.search_rigs {
        for model in models::search(text) {
            println!("{model}");
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => PanConfig::load(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => PanConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;
    info!("{}", config.summary());
    info!("Source: {}", config.source.describe());

    if cli.write_config {
        if let Some(path) = &cli.config {
            config.store(path)?;
            info!("Configuration written to {}", path.display());
        }
        return Ok(());
    }

    // Create flume channels for bidirectional communication
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::bounded(4);

    let engine = Engine::new(cmd_rx, event_tx, config)?;
    let engine_handle = std::thread::Builder::new()
        .name(String::from("engine"))
        .spawn(move || engine.run())?;

    if cli.headless {
        run_headless(&event_rx);
    } else {
        // Run UI on main thread (blocking)
        iqpan_ui::run(event_rx, cmd_tx.clone())?;
    }

    // UI has exited - send stop command to engine
    let _ = cmd_tx.send(Command::Stop);

    // Wait for engine thread to finish
    engine_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Engine thread panicked"))?
}

/// Consume events without a window until the source ends.
fn run_headless(event_rx: &flume::Receiver<Event>) {
    let mut last_report = Instant::now();

    while let Ok(event) = event_rx.recv() {
        match event {
            Event::StateSnapshot(state) => {
                info!(
                    "{}: {} bins at {}, palette {}",
                    state.ident,
                    state.fft_size,
                    state.sample_rate,
                    state.palette.label()
                );
            }
            Event::Frame(frame) => {
                if last_report.elapsed() >= HEADLESS_REPORT_INTERVAL {
                    last_report = Instant::now();
                    let d = frame.diagnostics;
                    let frequency = frame
                        .rig
                        .display_frequency()
                        .map_or_else(|| String::from("frequency unknown"), |f| f.to_string());
                    info!(
                        "{}; frames {} lines {} overruns {} clips {} pulses {} reopens {}",
                        frequency,
                        d.frames,
                        d.lines,
                        d.overruns,
                        d.clips,
                        d.rejected_windows,
                        d.reopens
                    );
                }
            }
            Event::WaterfallHistory(_) => {}
            Event::SourceFailed(reason) => {
                error!("No signal: {}", reason);
                break;
            }
            Event::EndOfStream => {
                info!("End of stream");
                break;
            }
        }
    }
}
