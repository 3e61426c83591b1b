//! Single-writer interval recorder with coordinated-omission correction.
//!
//! The recorder owns one *active* HDR histogram that the writer appends to
//! in constant time without allocating. [`Harvester::harvest`] swaps in a
//! fresh histogram and hands back the retired one as an immutable snapshot.
//!
//! # Threading Model
//!
//! - **Writer** ([`IntervalRecorder`]): exactly one, enforced by `&mut self`
//!   on [`record`](IntervalRecorder::record). Never waits on the harvester.
//! - **Harvesters** ([`Harvester`]): any number, any thread. Harvests are
//!   serialized among themselves.
//!
//! The hand-off uses a writer/reader phaser:
//!
//! ```text
//!  writer:    enter ── load active ── record ── exit
//!  harvester: swap active ── flip phase ── wait for writers of old phase ── take retired
//! ```
//!
//! A sample whose `enter` precedes the flip lands in the retired histogram;
//! one whose `enter` follows it lands in the fresh one. The harvester waits
//! at most for one in-flight `record` call.

use bench_common::config::RecorderConfig;
use bench_common::error::{BenchError, BenchResult};
use crossbeam_utils::CachePadded;
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicI64, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Writer/reader phaser: lets a reader wait until every writer that might
/// still hold the previous buffer has left its critical section.
#[derive(Debug)]
struct WriterReaderPhaser {
    /// Incremented on writer entry; sign encodes the phase (>= 0 even, < 0 odd).
    start_epoch: CachePadded<AtomicI64>,
    /// Writer exits counted during the even phase.
    even_end_epoch: CachePadded<AtomicI64>,
    /// Writer exits counted during the odd phase.
    odd_end_epoch: CachePadded<AtomicI64>,
}

impl WriterReaderPhaser {
    fn new() -> Self {
        Self {
            start_epoch: CachePadded::new(AtomicI64::new(0)),
            even_end_epoch: CachePadded::new(AtomicI64::new(0)),
            odd_end_epoch: CachePadded::new(AtomicI64::new(i64::MIN)),
        }
    }

    #[inline]
    fn writer_enter(&self) -> i64 {
        self.start_epoch.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    fn writer_exit(&self, entered_at: i64) {
        if entered_at < 0 {
            self.odd_end_epoch.fetch_add(1, Ordering::SeqCst);
        } else {
            self.even_end_epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Start a new phase and wait for writers of the old one to exit.
    ///
    /// Callers must serialize flips among themselves.
    fn flip_phase(&self) {
        let next_phase_is_even = self.start_epoch.load(Ordering::SeqCst) < 0;
        let initial_start = if next_phase_is_even { 0 } else { i64::MIN };

        if next_phase_is_even {
            self.even_end_epoch.store(initial_start, Ordering::SeqCst);
        } else {
            self.odd_end_epoch.store(initial_start, Ordering::SeqCst);
        }

        let start_at_flip = self.start_epoch.swap(initial_start, Ordering::SeqCst);

        loop {
            let exited = if next_phase_is_even {
                self.odd_end_epoch.load(Ordering::SeqCst)
            } else {
                self.even_end_epoch.load(Ordering::SeqCst)
            };
            if exited == start_at_flip {
                break;
            }
            std::thread::yield_now();
        }
    }
}

/// State shared between the writer and its harvesters.
#[derive(Debug)]
struct Shared {
    phaser: WriterReaderPhaser,
    /// Histogram currently receiving samples. Owned (boxed) by this struct.
    active: AtomicPtr<Histogram<u64>>,
    /// Empty histogram cloned into place on every harvest.
    blank: Histogram<u64>,
    /// Serializes harvests.
    harvest_lock: Mutex<()>,
}

// SAFETY-relevant invariant: `active` always points to a live, uniquely owned
// `Box<Histogram<u64>>`. Only the single writer dereferences it mutably, and
// only inside a phaser critical section; a harvester frees a retired pointer
// only after `flip_phase` proves no writer can still hold it.

impl Shared {
    fn harvest(&self) -> Histogram<u64> {
        let _guard = self
            .harvest_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let fresh = Box::into_raw(Box::new(self.blank.clone()));
        let retired = self.active.swap(fresh, Ordering::SeqCst);
        self.phaser.flip_phase();

        // SAFETY: `retired` came from `Box::into_raw` and is no longer
        // reachable through `active`; the phase flip guarantees the writer
        // has left every critical section that could have loaded it.
        *unsafe { Box::from_raw(retired) }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let active = *self.active.get_mut();
        // SAFETY: we hold the only reference to `Shared`, so no writer or
        // harvester can observe the pointer any more.
        drop(unsafe { Box::from_raw(active) });
    }
}

/// Constant-time, allocation-free latency recorder for one writer.
#[derive(Debug)]
pub struct IntervalRecorder {
    shared: Arc<Shared>,
    highest: u64,
}

impl IntervalRecorder {
    /// Create a recorder with the configured range and precision.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if the histogram bounds are invalid.
    pub fn new(config: &RecorderConfig) -> BenchResult<Self> {
        config.validate()?;
        let blank = Histogram::<u64>::new_with_bounds(
            1,
            config.highest_trackable_ns(),
            config.significant_digits,
        )
        .map_err(|e| BenchError::Config(format!("invalid histogram bounds: {e:?}")))?;
        let highest = blank.high();
        let active = Box::into_raw(Box::new(blank.clone()));

        Ok(Self {
            shared: Arc::new(Shared {
                phaser: WriterReaderPhaser::new(),
                active: AtomicPtr::new(active),
                blank,
                harvest_lock: Mutex::new(()),
            }),
            highest,
        })
    }

    /// Record a value, correcting for coordinated omission.
    ///
    /// If `value` exceeds a non-zero `expected_interval`, the call itself was
    /// late: synthetic samples at `value - k·expected_interval` (down to
    /// `expected_interval`) are recorded alongside `value`, so a stall
    /// shows up with the frequency the missed periodic samples would have had.
    ///
    /// Values above the configured ceiling are clamped to it.
    #[inline]
    pub fn record(&mut self, value: u64, expected_interval: u64) {
        let value = value.min(self.highest);
        let entered_at = self.shared.phaser.writer_enter();
        let active = self.shared.active.load(Ordering::SeqCst);
        // SAFETY: `&mut self` makes this the only writer; the pointer stays
        // valid until the harvester's phase flip observes our exit below.
        let histogram = unsafe { &mut *active };
        let recorded = histogram.record_correct(value, expected_interval);
        debug_assert!(recorded.is_ok(), "clamped value out of range");
        self.shared.phaser.writer_exit(entered_at);
    }

    /// Swap the active histogram for an empty one and return the samples
    /// recorded so far.
    #[must_use]
    pub fn harvest(&self) -> Histogram<u64> {
        self.shared.harvest()
    }

    /// A handle that can harvest this recorder from another thread.
    #[must_use]
    pub fn harvester(&self) -> Harvester {
        Harvester {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Cloneable harvest handle for an [`IntervalRecorder`].
#[derive(Debug, Clone)]
pub struct Harvester {
    shared: Arc<Shared>,
}

impl Harvester {
    /// Swap the active histogram for an empty one and return the samples
    /// recorded so far.
    ///
    /// Waits only for a `record` call that is in flight at the moment of
    /// the swap; the writer is never blocked.
    #[must_use]
    pub fn harvest(&self) -> Histogram<u64> {
        self.shared.harvest()
    }
}
