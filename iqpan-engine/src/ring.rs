//! Bounded block queue between the acquisition and processing threads.

use crate::error::{PanError, PanResult};
use crate::source::SampleBlock;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Create a ring holding at most `capacity` blocks.
pub fn ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let (tx, rx) = flume::bounded(capacity);
    let overruns = Arc::new(AtomicU64::new(0));
    (
        RingProducer {
            tx,
            evict_rx: rx.clone(),
            overruns: overruns.clone(),
        },
        RingConsumer { rx, overruns },
    )
}

/// Acquisition side of the ring. Dropping it signals end of stream.
pub struct RingProducer {
    tx: Sender<SampleBlock>,
    // Lets the producer take the oldest block itself when the ring is full
    evict_rx: Receiver<SampleBlock>,
    overruns: Arc<AtomicU64>,
}

impl RingProducer {
    /// Queue a block, dropping the oldest queued block if the ring is full.
    ///
    /// The block is always queued. `Err(BufferOverrun)` reports that an older
    /// block was discarded to make room, with the running overrun total.
    pub fn push(&self, block: SampleBlock) -> PanResult<()> {
        let mut block = block;
        let mut dropped = false;
        loop {
            match self.tx.try_send(block) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    // The consumer may have made room in the meantime
                    if self.evict_rx.try_recv().is_ok() && !dropped {
                        dropped = true;
                        self.overruns.fetch_add(1, Ordering::Relaxed);
                    }
                    block = returned;
                }
                // Unreachable while evict_rx is alive
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        if dropped {
            Err(PanError::BufferOverrun {
                dropped: self.overruns.load(Ordering::Relaxed),
            })
        } else {
            Ok(())
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Outcome of a timed pop.
#[derive(Debug)]
pub enum Pop {
    Item(SampleBlock),
    /// Nothing arrived within the timeout
    Empty,
    /// The producer is gone and every queued block has been taken
    Closed,
}

/// Processing side of the ring.
pub struct RingConsumer {
    rx: Receiver<SampleBlock>,
    overruns: Arc<AtomicU64>,
}

impl RingConsumer {
    /// Block until a block is available. `None` is end of stream.
    pub fn pop(&self) -> Option<SampleBlock> {
        self.rx.recv().ok()
    }

    /// Wait at most `timeout` for a block.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(block) => Pop::Item(block),
            Err(flume::RecvTimeoutError::Timeout) => Pop::Empty,
            Err(flume::RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    pub fn try_pop(&self) -> Pop {
        match self.rx.try_recv() {
            Ok(block) => Pop::Item(block),
            Err(TryRecvError::Empty) => Pop::Empty,
            Err(TryRecvError::Disconnected) => Pop::Closed,
        }
    }

    /// Total blocks dropped by the producer so far.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.rx.capacity()
    }
}
