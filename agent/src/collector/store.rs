//! Append-only sample storage
//!
//! Producers (timer ticks, allocation hooks) append concurrently without
//! taking a lock: a slot index is reserved with an atomic counter and the
//! sample is published through a `OnceLock`. Exports copy every completed
//! slot, so a reader never observes a partially written sample and never
//! blocks a producer.

use flareprof_shared::types::events::RawSample;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Number of slots allocated at once
const SEGMENT_SIZE: usize = 4096;

type Segment = Box<[OnceLock<RawSample>]>;

/// Result of a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    /// Capacity exhausted, the sample was counted as dropped
    Full,
    /// The store was sealed by `stop()`
    Sealed,
}

/// Lock-free, bounded, append-only arena of raw samples.
#[derive(Debug)]
pub struct SampleStore {
    segments: Box<[OnceLock<Segment>]>,
    capacity: usize,
    reserved: AtomicUsize,
    in_flight: AtomicUsize,
    sealed: AtomicBool,
    dropped: AtomicU64,
}

impl SampleStore {
    /// Create a store holding at most `capacity` samples.
    /// Segments are allocated lazily as the store fills.
    pub fn with_capacity(capacity: usize) -> Self {
        let segment_count = capacity.div_ceil(SEGMENT_SIZE);
        let segments = (0..segment_count)
            .map(|_| OnceLock::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            segments,
            capacity,
            reserved: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a sample. Safe to call from any number of threads.
    pub fn append(&self, sample: RawSample) -> AppendOutcome {
        // in_flight must be raised before `sealed` is read; `seal` does the
        // mirror image, so one of the two always sees the other.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.append_inner(sample);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn append_inner(&self, sample: RawSample) -> AppendOutcome {
        if self.sealed.load(Ordering::SeqCst) {
            return AppendOutcome::Sealed;
        }

        let index = self.reserved.fetch_add(1, Ordering::SeqCst);
        if index >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return AppendOutcome::Full;
        }

        let segment = self.segments[index / SEGMENT_SIZE].get_or_init(new_segment);
        // The slot index was reserved exclusively for this call.
        let _ = segment[index % SEGMENT_SIZE].set(sample);
        AppendOutcome::Stored
    }

    /// Reject further appends and wait for in-flight ones to land.
    ///
    /// After this returns the contents never change again.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Copy every completed sample, in slot order.
    ///
    /// Every append that returned before this call started is included.
    pub fn snapshot(&self) -> Vec<RawSample> {
        let len = self.len();
        let mut samples = Vec::with_capacity(len);

        for (segment_index, segment) in self.segments.iter().enumerate() {
            let start = segment_index * SEGMENT_SIZE;
            if start >= len {
                break;
            }
            let Some(slots) = segment.get() else {
                continue;
            };
            let end = (len - start).min(SEGMENT_SIZE);
            samples.extend(slots[..end].iter().filter_map(|slot| slot.get().cloned()));
        }

        samples
    }

    /// Number of reserved slots (completed or in flight)
    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::SeqCst).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples rejected because the store was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn new_segment() -> Segment {
    (0..SEGMENT_SIZE)
        .map(|_| OnceLock::new())
        .collect::<Vec<_>>()
        .into_boxed_slice()
}
