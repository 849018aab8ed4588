//! Acquisition thread: reads blocks from the source into the ring.

use crate::error::{PanError, PanResult};
use crate::ring::RingProducer;
use crate::source::{SampleSource, SourceFactory};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

/// Everything the acquisition thread owns.
pub struct Acquisition {
    factory: SourceFactory,
    producer: RingProducer,
    block_size: usize,
    skip: usize,
    max_reopen_attempts: u32,
    shutdown: Arc<AtomicBool>,
    reopens: Arc<AtomicU64>,
}

impl Acquisition {
    pub fn new(
        factory: SourceFactory,
        producer: RingProducer,
        block_size: usize,
        skip: usize,
        max_reopen_attempts: u32,
    ) -> Self {
        Self {
            factory,
            producer,
            block_size,
            skip,
            max_reopen_attempts,
            shutdown: Arc::new(AtomicBool::new(false)),
            reopens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Flag that stops the read loop before the next block.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Re-open counter shared with the processing side.
    pub fn reopen_counter(&self) -> Arc<AtomicU64> {
        self.reopens.clone()
    }

    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<PanResult<()>>> {
        thread::Builder::new()
            .name(String::from("acquisition"))
            .spawn(move || self.run())
    }

    /// Read until end of stream, shutdown, or a fatal device error.
    ///
    /// Returning drops the ring producer, which the processing side sees as
    /// end of stream once the ring is drained.
    pub fn run(self) -> PanResult<()> {
        let mut source = (self.factory)()?;
        source.open()?;
        info!(
            "Acquiring from {} at {}",
            source.describe(),
            source.native_sample_rate()
        );
        discard(source.as_mut(), self.skip, self.block_size)?;

        let result = read_loop(
            source.as_mut(),
            &self.producer,
            self.block_size,
            self.skip,
            self.max_reopen_attempts,
            &self.shutdown,
            &self.reopens,
        );
        source.close();

        if let Err(e) = &result {
            error!("Acquisition stopped: {}", e);
        }
        result
    }
}

fn read_loop(
    source: &mut dyn SampleSource,
    producer: &RingProducer,
    block_size: usize,
    skip: usize,
    max_reopen_attempts: u32,
    shutdown: &AtomicBool,
    reopens: &AtomicU64,
) -> PanResult<()> {
    let mut consecutive_reopens = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        match source.read(block_size) {
            Ok(Some(block)) => {
                consecutive_reopens = 0;
                let short = block.len() < block_size;
                if let Err(overrun) = producer.push(block) {
                    if let PanError::BufferOverrun { dropped } = &overrun {
                        if dropped.is_power_of_two() {
                            warn!("{}", overrun);
                        }
                    }
                }
                if short {
                    info!("End of stream after a short block");
                    return Ok(());
                }
            }
            Ok(None) => {
                info!("End of stream");
                return Ok(());
            }
            Err(e) => {
                source.close();
                loop {
                    if consecutive_reopens >= max_reopen_attempts {
                        return Err(PanError::DeviceIo(format!(
                            "{} (gave up after {} re-open attempts)",
                            e, consecutive_reopens
                        )));
                    }
                    if shutdown.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    consecutive_reopens += 1;
                    reopens.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Read failed: {}; re-opening source (attempt {}/{})",
                        e, consecutive_reopens, max_reopen_attempts
                    );
                    // Settling reads belong to the attempt; their failure costs one too
                    let reopened = source
                        .open()
                        .and_then(|()| discard(source, skip, block_size));
                    match reopened {
                        Ok(()) => break,
                        Err(reopen_err) => {
                            warn!("Re-open failed: {}", reopen_err);
                            source.close();
                        }
                    }
                }
            }
        }
    }

    debug!("Acquisition shut down");
    Ok(())
}

/// Throw away the first `skip` blocks while the hardware settles.
fn discard(source: &mut dyn SampleSource, skip: usize, block_size: usize) -> PanResult<()> {
    for _ in 0..skip {
        if source.read(block_size)?.is_none() {
            break;
        }
    }
    if skip > 0 {
        debug!("Skipped {} settling block(s)", skip);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Pop, ring};
    use crate::source::{ChannelLayout, SampleBlock, ToneSource};
    use iqpan_messages::Hertz;
    use num_complex::Complex;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn tone_factory(limit: Option<u64>) -> SourceFactory {
        Box::new(move || {
            let source = ToneSource::new(Hertz(48_000), 1_000.0, 0.1, limit);
            Ok(Box::new(source) as Box<dyn SampleSource>)
        })
    }

    /// Fails every read after the first `good_reads`, and optionally fails to re-open.
    struct FlakySource {
        good_reads: usize,
        reads: usize,
        reopen_works: bool,
        opens: usize,
    }

    impl SampleSource for FlakySource {
        fn open(&mut self) -> PanResult<()> {
            self.opens += 1;
            if self.opens > 1 && !self.reopen_works {
                return Err(PanError::DeviceUnavailable(String::from("gone")));
            }
            Ok(())
        }

        fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
            self.reads += 1;
            if self.reads > self.good_reads {
                return Err(PanError::DeviceIo(String::from("usb hiccup")));
            }
            Ok(Some(SampleBlock::new(
                vec![Complex::new(1.0, 0.0); n],
                Hertz(48_000),
                ChannelLayout::Iq,
            )))
        }

        fn close(&mut self) {}

        fn native_sample_rate(&self) -> Hertz {
            Hertz(48_000)
        }

        fn describe(&self) -> String {
            String::from("flaky")
        }
    }

    fn flaky_factory(good_reads: usize, reopen_works: bool) -> SourceFactory {
        Box::new(move || {
            Ok(Box::new(FlakySource {
                good_reads,
                reads: 0,
                reopen_works,
                opens: 0,
            }) as Box<dyn SampleSource>)
        })
    }

    /// Plays back a script of reads: a block, a read error, or end of stream.
    struct ScriptedSource {
        reads: VecDeque<Option<bool>>,
    }

    impl SampleSource for ScriptedSource {
        fn open(&mut self) -> PanResult<()> {
            Ok(())
        }

        fn read(&mut self, n: usize) -> PanResult<Option<SampleBlock>> {
            match self.reads.pop_front().flatten() {
                Some(true) => Ok(Some(SampleBlock::new(
                    vec![Complex::new(0.5, 0.5); n],
                    Hertz(48_000),
                    ChannelLayout::Iq,
                ))),
                Some(false) => Err(PanError::DeviceIo(String::from("overflow"))),
                None => Ok(None),
            }
        }

        fn close(&mut self) {}

        fn native_sample_rate(&self) -> Hertz {
            Hertz(48_000)
        }

        fn describe(&self) -> String {
            String::from("scripted")
        }
    }

    fn drain(consumer: &crate::ring::RingConsumer) -> Vec<usize> {
        let mut lengths = Vec::new();
        loop {
            match consumer.pop_timeout(Duration::from_secs(2)) {
                Pop::Item(block) => lengths.push(block.len()),
                Pop::Closed => return lengths,
                Pop::Empty => panic!("acquisition stalled"),
            }
        }
    }

    #[test]
    fn test_reads_until_end_of_stream() {
        let (producer, consumer) = ring(12);
        let acquisition = Acquisition::new(tone_factory(Some(1_280)), producer, 512, 0, 3);
        let handle = acquisition.spawn().unwrap();

        assert_eq!(drain(&consumer), vec![512, 512, 256]);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_skip_discards_settling_blocks() {
        let (producer, consumer) = ring(12);
        let acquisition = Acquisition::new(tone_factory(Some(2_048)), producer, 512, 2, 3);
        acquisition.run().unwrap();
        assert_eq!(drain(&consumer), vec![512, 512]);
    }

    #[test]
    fn test_unavailable_source_is_fatal() {
        let (producer, consumer) = ring(4);
        let factory: SourceFactory =
            Box::new(|| Err(PanError::DeviceUnavailable(String::from("no such card"))));
        let result = Acquisition::new(factory, producer, 512, 0, 3).run();
        assert!(matches!(result, Err(PanError::DeviceUnavailable(_))));
        assert!(drain(&consumer).is_empty());
    }

    #[test]
    fn test_read_errors_reopen_then_give_up() {
        let (producer, consumer) = ring(12);
        let acquisition = Acquisition::new(flaky_factory(2, true), producer, 64, 0, 3);
        let reopens = acquisition.reopen_counter();

        let result = acquisition.run();
        assert!(matches!(result, Err(PanError::DeviceIo(_))));
        assert_eq!(reopens.load(Ordering::Relaxed), 3);
        assert_eq!(drain(&consumer).len(), 2);
    }

    #[test]
    fn test_failed_reopen_counts_as_attempt() {
        let (producer, _consumer) = ring(12);
        let acquisition = Acquisition::new(flaky_factory(1, false), producer, 64, 0, 2);
        let reopens = acquisition.reopen_counter();

        assert!(matches!(acquisition.run(), Err(PanError::DeviceIo(_))));
        assert_eq!(reopens.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_failed_settling_read_counts_as_reopen_attempt() {
        // Settle, one block, a read error, a re-open whose settling read
        // fails, a re-open that settles, one more block, end of stream
        let script = [
            Some(true),
            Some(true),
            Some(false),
            Some(false),
            Some(true),
            Some(true),
            None,
        ];
        let factory: SourceFactory = Box::new(move || {
            let source = ScriptedSource {
                reads: script.into_iter().collect(),
            };
            Ok(Box::new(source) as Box<dyn SampleSource>)
        });
        let (producer, consumer) = ring(12);
        let acquisition = Acquisition::new(factory, producer, 64, 1, 3);
        let reopens = acquisition.reopen_counter();

        assert!(acquisition.run().is_ok());
        assert_eq!(reopens.load(Ordering::Relaxed), 2);
        assert_eq!(drain(&consumer), vec![64, 64]);
    }

    #[test]
    fn test_shutdown_flag_stops_endless_source() {
        let (producer, consumer) = ring(4);
        let acquisition = Acquisition::new(tone_factory(None), producer, 512, 0, 3);
        let shutdown = acquisition.shutdown_flag();
        let handle = acquisition.spawn().unwrap();

        assert!(matches!(consumer.pop_timeout(Duration::from_secs(2)), Pop::Item(_)));
        shutdown.store(true, Ordering::Relaxed);
        assert!(handle.join().unwrap().is_ok());
    }
}
