use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Abstraction over a monotonic tick source to improve testability.
///
/// Ticks are nanoseconds from an arbitrary per-process origin. Timers and
/// retransmission deadlines are absolute values in this unit.
pub trait Clock {
    /// Returns the current tick count in nanoseconds.
    fn now_ns(&self) -> u64;
}

/// System clock measuring nanoseconds since its own construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Cloning shares the underlying counter, so a test can hold one handle and
/// hand another to the transport.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock starting at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `delta_ns` nanoseconds.
    pub fn advance(&self, delta_ns: u64) {
        self.ticks.fetch_add(delta_ns, Ordering::Relaxed);
    }

    /// Sets the clock to an absolute tick value.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}
