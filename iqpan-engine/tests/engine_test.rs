use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use iqpan_engine::rig::FrequencyBackend;
use iqpan_engine::source::{SampleSource, SourceFactory};
use iqpan_engine::{Engine, PanConfig, PanError, RigConfig, RigError, SourceConfig};
use iqpan_messages::{Command, Decibels, Event, Hertz, Kilohertz, PaletteId, RigStatus};
use std::sync::{Arc, Mutex};

// Test helpers to reduce boilerplate

fn tone_config(offset_hz: f64, limit_samples: Option<u64>) -> PanConfig {
    PanConfig {
        source: SourceConfig::TestTone {
            offset_hz,
            amplitude: 0.25,
            limit_samples,
        },
        ..PanConfig::default()
    }
}

fn setup_engine(
    config: PanConfig,
) -> (
    flume::Sender<Command>,
    flume::Receiver<Event>,
    JoinHandle<anyhow::Result<()>>,
) {
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    // Bounded like the display's channel, so an endless source cannot pile up events
    let (event_tx, event_rx) = flume::bounded::<Event>(64);

    let handle = thread::spawn(move || {
        let engine = Engine::new(cmd_rx, event_tx, config)?;
        engine.run()
    });

    (cmd_tx, event_rx, handle)
}

fn teardown_engine(
    cmd_tx: flume::Sender<Command>,
    event_rx: flume::Receiver<Event>,
    handle: JoinHandle<anyhow::Result<()>>,
) {
    // The engine may already have finished on its own
    let _ = cmd_tx.send(Command::Stop);
    // Release a frame that is waiting for room in the event channel
    drop(event_rx);
    let _ = handle.join();
}

fn skip_state_snapshot(event_rx: &flume::Receiver<Event>) {
    let event = event_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Should receive StateSnapshot");
    assert!(matches!(event, Event::StateSnapshot(_)));
}

/// Collect events until `stop` returns true or the channel closes.
fn collect_until(
    event_rx: &flume::Receiver<Event>,
    stop: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = event_rx.recv_timeout(Duration::from_secs(2)) {
        let done = stop(&event);
        events.push(event);
        if done {
            break;
        }
    }
    events
}

fn peak_bin(spectrum: &[f32]) -> usize {
    spectrum
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap()
}

/// Fails every poll after its first `good` ones.
struct FailingBackend {
    good: usize,
    polls: usize,
}

impl FrequencyBackend for FailingBackend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        self.polls += 1;
        if self.polls <= self.good {
            Ok(Kilohertz(7_074.0))
        } else {
            Err(RigError::Protocol(String::from("timeout")))
        }
    }

    fn describe(&self) -> String {
        String::from("failing")
    }
}

/// Follows tune requests and records them.
struct RecordingBackend {
    tuned: Arc<Mutex<Vec<Kilohertz>>>,
    frequency: Kilohertz,
}

impl FrequencyBackend for RecordingBackend {
    fn poll(&mut self) -> Result<Kilohertz, RigError> {
        Ok(self.frequency)
    }

    fn set_frequency(&mut self, frequency: Kilohertz) -> Result<(), RigError> {
        self.tuned.lock().unwrap().push(frequency);
        self.frequency = frequency;
        Ok(())
    }

    fn describe(&self) -> String {
        String::from("recording")
    }
}

#[test]
fn test_engine_construction() {
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();

    let engine = Engine::new(cmd_rx, event_tx, PanConfig::default());
    assert!(engine.is_ok());
    assert_eq!(engine.unwrap().rig_reader().snapshot().status, RigStatus::None);

    drop(cmd_tx);
    drop(event_rx);
}

#[test]
fn test_engine_rejects_invalid_config() {
    let (_cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, _event_rx) = flume::unbounded::<Event>();

    let config = PanConfig {
        fft_size: 1000,
        ..PanConfig::default()
    };
    let result = Engine::new(cmd_rx, event_tx, config);
    assert!(matches!(result, Err(PanError::Configuration(_))));
}

#[test]
fn test_unopenable_rig_backend_is_not_fatal() {
    let (_cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, _event_rx) = flume::unbounded::<Event>();

    let config = PanConfig {
        rig: RigConfig::Si570 {
            vendor_id: 0xffff,
            product_id: 0xffff,
            multiplier: 4.0,
        },
        ..PanConfig::default()
    };
    let engine = Engine::new(cmd_rx, event_tx, config).unwrap();
    let state = engine.rig_reader().snapshot();
    assert!(state.is_disconnected());
    assert_eq!(state.display_frequency(), None);
}

#[test]
fn test_engine_sends_state_snapshot() {
    let (cmd_tx, event_rx, handle) = setup_engine(PanConfig::default());

    let first_event = event_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Should receive StateSnapshot");

    match first_event {
        Event::StateSnapshot(state) => {
            assert_eq!(state.sample_rate, Hertz(48_000));
            assert_eq!(state.fft_size, 512);
            assert_eq!(state.palette, PaletteId::Stepped);
            assert_eq!(state.v_min, Decibels(-120.0));
            assert!(!state.reversed);
            assert!(state.source.contains("tone"));
        }
        _ => panic!("First event should be StateSnapshot, got {:?}", first_event),
    }

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_tone_peak_lands_on_expected_bin() {
    // -12 kHz at 93.75 Hz per bin is 128 bins below the center bin 256
    let (cmd_tx, event_rx, handle) = setup_engine(tone_config(-12_000.0, None));
    skip_state_snapshot(&event_rx);

    let mut frames = 0;
    for _ in 0..5 {
        match event_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Event::Frame(frame)) => {
                assert_eq!(frame.spectrum.len(), 512);
                assert!(!frame.partial);
                let peak = peak_bin(&frame.spectrum);
                assert!((127..=129).contains(&peak), "peak at bin {peak}");
                frames += 1;
            }
            Ok(other) => panic!("Unexpected event {:?}", other),
            Err(e) => panic!("Timed out waiting for a frame: {e}"),
        }
    }
    assert_eq!(frames, 5);

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_end_of_stream_flushes_partial_frame() {
    // 1280 samples: two full 512-sample blocks and a short one
    let (cmd_tx, event_rx, handle) = setup_engine(tone_config(6_000.0, Some(1_280)));
    skip_state_snapshot(&event_rx);

    let events = collect_until(&event_rx, |event| matches!(event, Event::EndOfStream));
    let partial: Vec<bool> = events
        .iter()
        .filter_map(|event| match event {
            Event::Frame(frame) => Some(frame.partial),
            _ => None,
        })
        .collect();

    assert_eq!(partial, vec![false, false, true]);
    assert!(matches!(events.last(), Some(Event::EndOfStream)));

    // The engine finishes on its own
    let result = handle.join().expect("engine thread panicked");
    assert!(result.is_ok());
    drop(cmd_tx);
}

#[test]
fn test_reversed_iq_mirrors_tone() {
    // +6 kHz is bin 320; swapping I and Q moves it to 192
    let config = PanConfig {
        rev_iq: true,
        ..tone_config(6_000.0, Some(512 * 8))
    };
    let (cmd_tx, event_rx, handle) = setup_engine(config);
    skip_state_snapshot(&event_rx);

    match event_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Event::Frame(frame)) => {
            let peak = peak_bin(&frame.spectrum);
            assert!((191..=193).contains(&peak), "peak at bin {peak}");
        }
        other => panic!("Expected a frame, got {:?}", other),
    }

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_failing_rig_disconnects_and_keeps_last_frequency() {
    let config = PanConfig {
        poll_interval_secs: 0.01,
        rig_failure_threshold: 3,
        ..tone_config(6_000.0, None)
    };
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::bounded::<Event>(64);

    let engine = Engine::new(cmd_rx, event_tx, config)
        .unwrap()
        .with_rig_backend(Box::new(FailingBackend { good: 1, polls: 0 }));
    let rig = engine.rig_reader();
    let handle = thread::spawn(move || engine.run());
    skip_state_snapshot(&event_rx);

    let deadline = Instant::now() + Duration::from_secs(5);
    while rig.snapshot().consecutive_failures < 5 && Instant::now() < deadline {
        let _ = event_rx.try_recv();
        thread::sleep(Duration::from_millis(5));
    }

    let state = rig.snapshot();
    assert!(state.consecutive_failures >= 5);
    assert_eq!(state.status, RigStatus::Disconnected);
    assert_eq!(state.frequency, Some(Kilohertz(7_074.0)));
    assert_eq!(state.display_frequency(), None);

    // Frames keep flowing and eventually carry the disconnected state
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut seen_disconnected = false;
    while !seen_disconnected && Instant::now() < deadline {
        if let Ok(Event::Frame(frame)) = event_rx.recv_timeout(Duration::from_millis(100)) {
            seen_disconnected = frame.rig.is_disconnected();
        }
    }
    assert!(seen_disconnected);

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_unavailable_source_reports_no_signal() {
    let (_cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();

    let factory: SourceFactory = Box::new(|| -> Result<Box<dyn SampleSource>, PanError> {
        Err(PanError::DeviceUnavailable(String::from("hw:9 not present")))
    });
    let engine = Engine::new(cmd_rx, event_tx, PanConfig::default())
        .unwrap()
        .with_source(factory);

    let result = engine.run();
    assert!(result.is_err());

    skip_state_snapshot(&event_rx);
    match event_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Event::SourceFailed(reason)) => assert!(reason.contains("hw:9")),
        other => panic!("Expected SourceFailed, got {:?}", other),
    }
}

#[test]
fn test_palette_change_repaints_history() {
    let config = PanConfig {
        waterfall_acc: 1,
        ..tone_config(6_000.0, None)
    };
    let (cmd_tx, event_rx, handle) = setup_engine(config);
    skip_state_snapshot(&event_rx);

    // Wait for at least one waterfall line
    let events = collect_until(&event_rx, |event| {
        matches!(event, Event::Frame(frame) if frame.line.is_some())
    });
    assert!(matches!(events.last(), Some(Event::Frame(_))));

    cmd_tx.send(Command::SetPalette(PaletteId::Rainbow)).unwrap();
    let events = collect_until(&event_rx, |event| matches!(event, Event::WaterfallHistory(_)));
    match events.last() {
        Some(Event::WaterfallHistory(lines)) => {
            assert!(!lines.is_empty());
            assert!(lines.len() <= 50);
            assert!(lines.windows(2).all(|w| w[0].sequence > w[1].sequence));
            assert!(lines.iter().all(|line| line.pixels.len() == 512));
        }
        other => panic!("Expected WaterfallHistory, got {:?}", other),
    }

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_too_narrow_range_is_ignored() {
    let (cmd_tx, event_rx, handle) = setup_engine(tone_config(6_000.0, None));
    skip_state_snapshot(&event_rx);

    cmd_tx
        .send(Command::SetWaterfallRange {
            v_min: Decibels(-60.0),
            v_max: Decibels(-50.0),
        })
        .unwrap();
    cmd_tx.send(Command::ResetWaterfallRange).unwrap();

    // Only the reset produces a history repaint
    let mut histories = 0;
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        if let Ok(Event::WaterfallHistory(_)) = event_rx.recv_timeout(Duration::from_millis(50)) {
            histories += 1;
        }
    }
    assert_eq!(histories, 1);

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_engine_stops_on_command() {
    let (cmd_tx, event_rx, handle) = setup_engine(PanConfig::default());
    skip_state_snapshot(&event_rx);

    cmd_tx.send(Command::Stop).unwrap();
    let result = handle.join().expect("engine thread panicked");
    assert!(result.is_ok());
}

#[test]
fn test_engine_stops_when_display_goes_away() {
    let (cmd_tx, event_rx, handle) = setup_engine(PanConfig::default());
    skip_state_snapshot(&event_rx);

    drop(event_rx);
    let result = handle.join().expect("engine thread panicked");
    assert!(result.is_ok());
    drop(cmd_tx);
}

#[test]
fn test_tone_is_delivered_in_real_time() {
    let (cmd_tx, event_rx, handle) = setup_engine(tone_config(3_000.0, None));
    skip_state_snapshot(&event_rx);

    let begin = Instant::now();
    let mut last = None;
    while begin.elapsed() < Duration::from_millis(500) {
        if let Ok(Event::Frame(frame)) = event_rx.recv_timeout(Duration::from_millis(100)) {
            last = Some(frame.diagnostics);
        }
    }

    // 48 kHz in 512-sample frames, four frames a line: about 23 lines a second
    let diagnostics = last.expect("no frames in half a second");
    assert!(
        (5..=20).contains(&diagnostics.lines),
        "{} lines in half a second",
        diagnostics.lines
    );
    assert_eq!(diagnostics.overruns, 0);

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_slow_display_receives_every_line() {
    // 40 blocks, two frames a line
    let config = PanConfig {
        waterfall_acc: 2,
        ..tone_config(6_000.0, Some(512 * 40))
    };
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::bounded::<Event>(1);
    let handle = thread::spawn(move || Engine::new(cmd_rx, event_tx, config)?.run());
    skip_state_snapshot(&event_rx);

    let mut sequences = Vec::new();
    loop {
        match event_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Event::Frame(frame)) => {
                if let Some(line) = frame.line {
                    sequences.push(line.sequence);
                }
                thread::sleep(Duration::from_millis(20));
            }
            Ok(Event::EndOfStream) => break,
            Ok(other) => panic!("Unexpected event {:?}", other),
            Err(e) => panic!("Timed out waiting for events: {e}"),
        }
    }

    assert_eq!(sequences, (0..20).collect::<Vec<u64>>());
    assert!(handle.join().expect("engine thread panicked").is_ok());
    drop(cmd_tx);
}

#[test]
fn test_wav_source_runs_at_its_recorded_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 96_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..2_048 {
        writer.write_sample(1_000i16).unwrap();
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let config = PanConfig {
        source: SourceConfig::WavFile { path },
        ..PanConfig::default()
    };
    let (cmd_tx, event_rx, handle) = setup_engine(config);

    match event_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Event::StateSnapshot(state)) => assert_eq!(state.sample_rate, Hertz(96_000)),
        other => panic!("Expected StateSnapshot, got {:?}", other),
    }
    let events = collect_until(&event_rx, |event| {
        matches!(event, Event::EndOfStream | Event::SourceFailed(_))
    });
    let frames = events
        .iter()
        .filter(|event| matches!(event, Event::Frame(_)))
        .count();
    assert_eq!(frames, 4);
    assert!(matches!(events.last(), Some(Event::EndOfStream)));

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_tune_command_reaches_rig() {
    let tuned = Arc::new(Mutex::new(Vec::new()));
    let backend = RecordingBackend {
        tuned: tuned.clone(),
        frequency: Kilohertz(7_074.0),
    };
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::bounded::<Event>(64);

    let engine = Engine::new(cmd_rx, event_tx, tone_config(6_000.0, None))
        .unwrap()
        .with_rig_backend(Box::new(backend));
    let rig = engine.rig_reader();
    let handle = thread::spawn(move || engine.run());
    skip_state_snapshot(&event_rx);

    cmd_tx.send(Command::Tune(Kilohertz(7_074.1))).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.snapshot().frequency != Some(Kilohertz(7_074.1)) && Instant::now() < deadline {
        let _ = event_rx.try_recv();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(*tuned.lock().unwrap(), vec![Kilohertz(7_074.1)]);
    assert_eq!(rig.snapshot().display_frequency(), Some(Kilohertz(7_074.1)));

    teardown_engine(cmd_tx, event_rx, handle);
}

#[test]
fn test_tune_without_rig_is_ignored() {
    let (cmd_tx, event_rx, handle) = setup_engine(tone_config(6_000.0, None));
    skip_state_snapshot(&event_rx);

    cmd_tx.send(Command::Tune(Kilohertz(14_074.0))).unwrap();
    assert!(matches!(
        event_rx.recv_timeout(Duration::from_secs(2)),
        Ok(Event::Frame(_))
    ));

    cmd_tx.send(Command::Stop).unwrap();
    drop(event_rx);
    let result = handle.join().expect("engine thread panicked");
    assert!(result.is_ok());
}
