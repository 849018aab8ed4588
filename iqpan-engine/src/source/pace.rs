use iqpan_messages::Hertz;
use std::thread;
use std::time::{Duration, Instant};

/// A reader this far behind schedule starts a fresh schedule instead of
/// bursting to catch up.
const MAX_LAG: Duration = Duration::from_secs(1);

/// Holds generated and recorded sources to their sample rate.
///
/// Sample `n` after [`Pacer::start`] is not released before `n / rate`
/// seconds have passed, so a file plays back like the receiver it was
/// recorded from.
#[derive(Debug)]
pub(crate) struct Pacer {
    rate: Hertz,
    started: Option<Instant>,
    released: u64,
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            rate: Hertz(0),
            started: None,
            released: 0,
        }
    }

    /// Begin a schedule at `rate`, counting from now.
    pub fn start(&mut self, rate: Hertz) {
        self.rate = rate;
        self.started = Some(Instant::now());
        self.released = 0;
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    /// Block until `count` more samples are due.
    pub fn wait(&mut self, count: usize) {
        let Some(started) = self.started else {
            return;
        };
        if self.rate.0 == 0 {
            return;
        }
        self.released += count as u64;

        let due = started + Duration::from_secs_f64(self.released as f64 / self.rate.0 as f64);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        } else if now - due > MAX_LAG {
            self.started = Some(now);
            self.released = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_holds_to_sample_rate() {
        let mut pacer = Pacer::new();
        pacer.start(Hertz(48_000));

        let begin = Instant::now();
        // 100 ms worth of samples in ten blocks
        for _ in 0..10 {
            pacer.wait(480);
        }
        assert!(begin.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn test_stopped_pacer_does_not_wait() {
        let mut pacer = Pacer::new();
        pacer.start(Hertz(1_000));
        pacer.stop();

        let begin = Instant::now();
        pacer.wait(10_000);
        assert!(begin.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_late_reader_is_not_bursted() {
        let mut pacer = Pacer::new();
        pacer.start(Hertz(48_000));
        thread::sleep(Duration::from_millis(1_100));

        // Behind by more than a second: the schedule restarts
        pacer.wait(480);
        let begin = Instant::now();
        pacer.wait(4_800);
        assert!(begin.elapsed() >= Duration::from_millis(95));
    }
}
