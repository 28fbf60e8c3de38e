//! Time-bucketed atomic counters for recent-traffic statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Event classes tracked per bucket. Failure, timeout and rejection all
/// count as errors when computing health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingEvent {
    Success,
    Failure,
    Timeout,
    Rejected,
}

#[derive(Debug, Default)]
struct Bucket {
    /// Aligned window-start of the data in this bucket; 0 means unused.
    start_ms: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    timeout: AtomicU64,
    rejected: AtomicU64,
}

impl Bucket {
    fn counter(&self, event: RollingEvent) -> &AtomicU64 {
        match event {
            RollingEvent::Success => &self.success,
            RollingEvent::Failure => &self.failure,
            RollingEvent::Timeout => &self.timeout,
            RollingEvent::Rejected => &self.rejected,
        }
    }

    fn zero(&self) {
        self.success.store(0, Ordering::Release);
        self.failure.store(0, Ordering::Release);
        self.timeout.store(0, Ordering::Release);
        self.rejected.store(0, Ordering::Release);
    }
}

/// Milliseconds on a process-local monotonic clock.
///
/// Offset by one hour so bucket start values are never 0 (the "unused"
/// sentinel) and window arithmetic cannot underflow near process start.
pub(crate) fn now_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64 + 3_600_000
}

/// Sliding window of event counters, bucketed in time.
///
/// Buckets are rotated lazily on access: writing into a bucket whose slot
/// has moved to a newer time period first claims the slot with a
/// compare-and-swap and zeroes it. No locks on the hot path.
#[derive(Debug)]
pub struct RollingNumber {
    buckets: Box<[Bucket]>,
    bucket_ms: u64,
    window_ms: u64,
}

impl RollingNumber {
    /// `window_ms` must divide evenly by `buckets`.
    #[must_use]
    pub fn new(window_ms: u64, buckets: u32) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: (0..buckets).map(|_| Bucket::default()).collect(),
            bucket_ms: (window_ms / u64::from(buckets)).max(1),
            window_ms,
        }
    }

    /// Record one event in the current bucket.
    pub fn increment(&self, event: RollingEvent) {
        self.current_bucket().counter(event).fetch_add(1, Ordering::Relaxed);
    }

    /// Sum of one event class across buckets still inside the window.
    #[must_use]
    pub fn rolling_sum(&self, event: RollingEvent) -> u64 {
        let now = now_ms();
        self.buckets
            .iter()
            .filter(|b| {
                let start = b.start_ms.load(Ordering::Acquire);
                start != 0 && now.saturating_sub(start) < self.window_ms
            })
            .map(|b| b.counter(event).load(Ordering::Relaxed))
            .sum()
    }

    /// Forget all recorded events.
    pub fn reset(&self) {
        for bucket in self.buckets.iter() {
            bucket.start_ms.store(0, Ordering::Release);
            bucket.zero();
        }
    }

    fn current_bucket(&self) -> &Bucket {
        let now = now_ms();
        let aligned = now - (now % self.bucket_ms);
        let idx = ((aligned / self.bucket_ms) % self.buckets.len() as u64) as usize;
        let bucket = &self.buckets[idx];

        let start = bucket.start_ms.load(Ordering::Acquire);
        if start != aligned
            && bucket
                .start_ms
                .compare_exchange(start, aligned, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // This thread claimed the slot for the new period.
            bucket.zero();
        }
        bucket
    }
}
