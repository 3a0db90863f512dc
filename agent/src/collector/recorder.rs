//! Producer-side handle used by sampling hooks
//!
//! A recorder is cheap to clone and may be called from any thread, including
//! signal-adjacent timer threads and allocation hooks. It never blocks: it
//! loads the active store through an `ArcSwapOption` and appends to it.

use super::store::{AppendOutcome, SampleStore};
use arc_swap::ArcSwapOption;
use flareprof_shared::types::events::{ProfilerKind, RawSample, StackTrace};
use std::sync::Arc;

/// Deepest stack captured by [`capture_stack`]
pub const MAX_STACK_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// No session is running
    Idle,
    /// Session store is full
    Dropped,
    /// Sample carried no frames
    Empty,
}

#[derive(Clone)]
pub struct SampleRecorder {
    kind: ProfilerKind,
    active: Arc<ArcSwapOption<SampleStore>>,
}

impl SampleRecorder {
    pub(crate) fn new(kind: ProfilerKind, active: Arc<ArcSwapOption<SampleStore>>) -> Self {
        Self { kind, active }
    }

    pub fn kind(&self) -> ProfilerKind {
        self.kind
    }

    pub fn is_recording(&self) -> bool {
        self.active.load().is_some()
    }

    /// Hand one sample to the running session
    pub fn record(&self, sample: RawSample) -> RecordOutcome {
        if sample.is_empty() {
            return RecordOutcome::Empty;
        }

        let active = self.active.load();
        match &*active {
            Some(store) => match store.append(sample) {
                AppendOutcome::Stored => RecordOutcome::Recorded,
                AppendOutcome::Full => RecordOutcome::Dropped,
                AppendOutcome::Sealed => RecordOutcome::Idle,
            },
            None => RecordOutcome::Idle,
        }
    }

    /// Capture the caller's stack and record it with `weight`.
    ///
    /// `skip` drops that many frames above the caller.
    #[inline(never)]
    pub fn record_current_stack(&self, weight: u64, skip: usize) -> RecordOutcome {
        // Skip the unwind entirely when nobody is listening.
        if !self.is_recording() {
            return RecordOutcome::Idle;
        }
        // Leave out capture_stack and this frame.
        let addresses = capture_stack(skip + 2);
        self.record(RawSample::new(addresses, weight))
    }
}

impl std::fmt::Debug for SampleRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRecorder")
            .field("kind", &self.kind)
            .field("recording", &self.is_recording())
            .finish()
    }
}

/// Capture the calling thread's stack, leaf first.
///
/// The first `skip` frames (starting at this function) are left out.
#[inline(never)]
pub fn capture_stack(skip: usize) -> StackTrace {
    let mut addresses = Vec::with_capacity(32);
    let mut index = 0usize;

    backtrace::trace(|frame| {
        if index >= skip {
            addresses.push(frame.ip() as usize as u64);
        }
        index += 1;
        addresses.len() < MAX_STACK_DEPTH
    });

    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder_with(store: Option<Arc<SampleStore>>) -> SampleRecorder {
        let active = Arc::new(ArcSwapOption::new(store));
        SampleRecorder::new(ProfilerKind::Cpu, active)
    }

    #[test]
    fn test_idle_recorder_discards() {
        let recorder = recorder_with(None);
        assert!(!recorder.is_recording());
        assert_eq!(
            recorder.record(RawSample::new(vec![0x1], 1)),
            RecordOutcome::Idle
        );
        assert_eq!(recorder.record_current_stack(1, 0), RecordOutcome::Idle);
    }

    #[test]
    fn test_records_into_active_store() {
        let store = Arc::new(SampleStore::with_capacity(4));
        let recorder = recorder_with(Some(store.clone()));

        assert_eq!(
            recorder.record(RawSample::new(vec![0x1, 0x2], 3)),
            RecordOutcome::Recorded
        );
        assert_eq!(
            recorder.record(RawSample::new(vec![], 3)),
            RecordOutcome::Empty
        );
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_full_store_reports_dropped() {
        let store = Arc::new(SampleStore::with_capacity(1));
        let recorder = recorder_with(Some(store));

        recorder.record(RawSample::new(vec![0x1], 1));
        assert_eq!(
            recorder.record(RawSample::new(vec![0x1], 1)),
            RecordOutcome::Dropped
        );
    }

    #[test]
    fn test_capture_stack_is_bounded() {
        let stack = capture_stack(0);
        assert!(!stack.is_empty());
        assert!(stack.len() <= MAX_STACK_DEPTH);
    }

    #[test]
    fn test_record_current_stack() {
        let store = Arc::new(SampleStore::with_capacity(4));
        let recorder = recorder_with(Some(store.clone()));

        assert_eq!(recorder.record_current_stack(64, 0), RecordOutcome::Recorded);
        let samples = store.snapshot();
        assert_eq!(samples[0].weight(), 64);
        assert!(samples[0].depth() > 0);
    }
}
