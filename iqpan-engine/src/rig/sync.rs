use super::{FrequencyBackend, RigReader, RigWriter};
use crate::error::RigError;
use flume::{Receiver, RecvTimeoutError, Sender};
use iqpan_messages::{Kilohertz, RigStatus};
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Polls a frequency backend, applies tune requests, and publishes the result.
///
/// A failed poll keeps the last good frequency. Once `failure_threshold`
/// consecutive polls have failed the rig is marked disconnected, which the
/// display shows as "frequency unknown". All backend I/O happens on the
/// synchronizer's thread.
pub struct RigSynchronizer {
    backend: Box<dyn FrequencyBackend>,
    writer: RigWriter,
    interval: Duration,
    failure_threshold: u32,
}

impl RigSynchronizer {
    pub fn new(
        backend: Box<dyn FrequencyBackend>,
        writer: RigWriter,
        interval: Duration,
        failure_threshold: u32,
    ) -> Self {
        writer.update(|state| state.status = RigStatus::Connecting);
        Self {
            backend,
            writer,
            interval,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn reader(&self) -> RigReader {
        self.writer.reader()
    }

    /// Poll the backend once and fold the outcome into the shared state.
    pub fn poll_once(&mut self) -> Result<Kilohertz, RigError> {
        let result = self.backend.poll();
        let threshold = self.failure_threshold;
        let backend = self.backend.describe();

        match &result {
            Ok(frequency) => {
                let frequency = *frequency;
                self.writer.update(|state| {
                    if state.status == RigStatus::Disconnected {
                        info!("{} answered again: {}", backend, frequency);
                    }
                    state.frequency = Some(frequency);
                    state.polled_at = Some(Instant::now());
                    state.status = RigStatus::Connected;
                    state.consecutive_failures = 0;
                });
            }
            Err(e) => {
                self.writer.update(|state| {
                    state.consecutive_failures += 1;
                    let failures = state.consecutive_failures;
                    if failures == 1 {
                        warn!("Frequency poll of {} failed: {}", backend, e);
                    } else {
                        debug!(
                            "Frequency poll of {} failed ({} in a row): {}",
                            backend, failures, e
                        );
                    }
                    if failures >= threshold && state.status != RigStatus::Disconnected {
                        warn!(
                            "{} failed {} polls in a row, frequency unknown",
                            backend, failures
                        );
                        state.status = RigStatus::Disconnected;
                    }
                });
            }
        }

        result
    }

    /// Ask the backend to tune, publishing the new frequency on success.
    pub fn tune(&mut self, frequency: Kilohertz) -> Result<(), RigError> {
        let backend = self.backend.describe();
        match self.backend.set_frequency(frequency) {
            Ok(()) => {
                info!("Tuned {} to {}", backend, frequency);
                self.writer.update(|state| state.frequency = Some(frequency));
                Ok(())
            }
            Err(e) => {
                warn!("Tuning {} to {} failed: {}", backend, frequency, e);
                Err(e)
            }
        }
    }

    /// Poll every `interval` and apply tune requests as they arrive, until
    /// every sender of `tune_rx` is dropped.
    pub fn run(mut self, tune_rx: Receiver<Kilohertz>) {
        info!(
            "Rig synchronizer polling {} every {:?}",
            self.backend.describe(),
            self.interval
        );
        let mut next_poll = Instant::now();
        loop {
            if Instant::now() >= next_poll {
                // Errors are recorded in the shared state
                let _ = self.poll_once();
                next_poll = Instant::now() + self.interval;
            }

            match tune_rx.recv_deadline(next_poll) {
                Ok(frequency) => {
                    // Read back what the rig actually settled on
                    if self.tune(frequency).is_ok() {
                        next_poll = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Rig synchronizer stopped");
    }

    /// Run on a dedicated thread. The returned sender carries tune requests;
    /// dropping it stops the thread.
    pub fn spawn(self) -> std::io::Result<(Sender<Kilohertz>, thread::JoinHandle<()>)> {
        let (tune_tx, tune_rx) = flume::unbounded();
        let handle = thread::Builder::new()
            .name(String::from("rig-sync"))
            .spawn(move || self.run(tune_rx))?;
        Ok((tune_tx, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::rig_cell;
    use iqpan_messages::RigState;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Plays back a scripted sequence of poll outcomes.
    struct ScriptedBackend {
        script: VecDeque<Option<f64>>,
    }

    impl ScriptedBackend {
        fn new(script: &[Option<f64>]) -> Box<Self> {
            Box::new(Self {
                script: script.iter().copied().collect(),
            })
        }
    }

    impl FrequencyBackend for ScriptedBackend {
        fn poll(&mut self) -> Result<Kilohertz, RigError> {
            match self.script.pop_front().flatten() {
                Some(khz) => Ok(Kilohertz(khz)),
                None => Err(RigError::Protocol(String::from("no answer"))),
            }
        }

        fn describe(&self) -> String {
            String::from("scripted")
        }
    }

    fn synchronizer(script: &[Option<f64>], threshold: u32) -> (RigSynchronizer, RigReader) {
        let (writer, reader) = rig_cell(RigState::default());
        let sync = RigSynchronizer::new(
            ScriptedBackend::new(script),
            writer,
            Duration::from_millis(10),
            threshold,
        );
        (sync, reader)
    }

    #[test]
    fn test_successful_poll_publishes_frequency() {
        let (mut sync, reader) = synchronizer(&[Some(7_040.0)], 3);
        assert_eq!(reader.snapshot().status, RigStatus::Connecting);

        sync.poll_once().unwrap();
        let state = reader.snapshot();
        assert_eq!(state.status, RigStatus::Connected);
        assert_eq!(state.frequency, Some(Kilohertz(7_040.0)));
        assert!(state.polled_at.is_some());
    }

    #[test]
    fn test_single_failure_keeps_last_value() {
        let (mut sync, reader) = synchronizer(&[Some(7_040.0), None], 3);
        sync.poll_once().unwrap();
        assert!(sync.poll_once().is_err());

        let state = reader.snapshot();
        assert_eq!(state.status, RigStatus::Connected);
        assert_eq!(state.display_frequency(), Some(Kilohertz(7_040.0)));
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_repeated_failures_disconnect_and_keep_last_good() {
        let (mut sync, reader) = synchronizer(&[Some(14_074.0), None, None, None, None, None], 3);
        sync.poll_once().unwrap();
        for _ in 0..5 {
            assert!(sync.poll_once().is_err());
        }

        let state = reader.snapshot();
        assert!(state.is_disconnected());
        assert_eq!(state.consecutive_failures, 5);
        assert_eq!(state.frequency, Some(Kilohertz(14_074.0)));
        assert_eq!(state.display_frequency(), None);
    }

    #[test]
    fn test_recovers_after_disconnect() {
        let (mut sync, reader) = synchronizer(&[None, None, Some(3_573.0)], 2);
        let _ = sync.poll_once();
        let _ = sync.poll_once();
        assert!(reader.snapshot().is_disconnected());

        sync.poll_once().unwrap();
        let state = reader.snapshot();
        assert_eq!(state.status, RigStatus::Connected);
        assert_eq!(state.consecutive_failures, 0);
    }

    /// Reports whatever it was last tuned to.
    struct TunableBackend {
        frequency: Arc<Mutex<f64>>,
    }

    impl FrequencyBackend for TunableBackend {
        fn poll(&mut self) -> Result<Kilohertz, RigError> {
            Ok(Kilohertz(*self.frequency.lock().unwrap()))
        }

        fn set_frequency(&mut self, frequency: Kilohertz) -> Result<(), RigError> {
            *self.frequency.lock().unwrap() = frequency.0;
            Ok(())
        }

        fn describe(&self) -> String {
            String::from("tunable")
        }
    }

    #[test]
    fn test_tune_publishes_new_frequency() {
        let (writer, reader) = rig_cell(RigState::default());
        let frequency = Arc::new(Mutex::new(7_000.0));
        let backend = Box::new(TunableBackend {
            frequency: frequency.clone(),
        });
        let mut sync = RigSynchronizer::new(backend, writer, Duration::from_secs(1), 3);

        sync.tune(Kilohertz(7_000.1)).unwrap();
        assert_eq!(*frequency.lock().unwrap(), 7_000.1);
        assert_eq!(reader.snapshot().frequency, Some(Kilohertz(7_000.1)));
    }

    #[test]
    fn test_tune_unsupported_keeps_state() {
        let (mut sync, reader) = synchronizer(&[Some(7_040.0)], 3);
        sync.poll_once().unwrap();

        assert!(matches!(
            sync.tune(Kilohertz(7_041.0)),
            Err(RigError::Unsupported(_))
        ));
        assert_eq!(reader.snapshot().frequency, Some(Kilohertz(7_040.0)));
    }

    #[test]
    fn test_spawned_synchronizer_applies_tune_requests() {
        let (writer, reader) = rig_cell(RigState::default());
        let frequency = Arc::new(Mutex::new(3_573.0));
        let backend = Box::new(TunableBackend {
            frequency: frequency.clone(),
        });
        // A long interval: only the tune request can change the state in time
        let sync = RigSynchronizer::new(backend, writer, Duration::from_secs(60), 3);
        let (tune_tx, handle) = sync.spawn().unwrap();

        tune_tx.send(Kilohertz(3_574.0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while reader.snapshot().frequency != Some(Kilohertz(3_574.0))
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reader.snapshot().frequency, Some(Kilohertz(3_574.0)));
        assert_eq!(*frequency.lock().unwrap(), 3_574.0);

        drop(tune_tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_spawned_synchronizer_stops_on_sender_drop() {
        let (sync, reader) = synchronizer(&[Some(7_000.0); 1000], 3);
        let (shutdown_tx, handle) = sync.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while reader.snapshot().status != RigStatus::Connected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reader.snapshot().frequency, Some(Kilohertz(7_000.0)));

        drop(shutdown_tx);
        handle.join().unwrap();
    }
}
