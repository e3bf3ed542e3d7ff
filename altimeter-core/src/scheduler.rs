// scheduler.rs
//! Periodic sampling. The timer side only raises a flag; the main loop takes
//! it and runs the full sample/step cycle outside of interrupt context.

use crate::debug;
use embassy_time::{Duration, Instant, Ticker};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Single-producer / single-consumer "sample pending" flag.
///
/// The producer (timer interrupt or ticker task) calls [`raise`](Self::raise);
/// only the main loop calls [`take`](Self::take). While stopped, raises are
/// ignored and a tick already pending is discarded.
pub struct TickFlag {
    pending: AtomicBool,
    active: AtomicBool,
    overruns: AtomicU32,
}

impl Default for TickFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl TickFlag {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            active: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    pub fn start(&self) {
        self.pending.store(false, Ordering::Release);
        self.active.store(true, Ordering::Release);
        debug!("Sample ticker started");
    }

    /// Stops sampling. No tick raised before this call is delivered afterwards.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks a sample as due. Safe to call from interrupt context.
    ///
    /// If the previous tick was never taken the main loop has fallen behind;
    /// that is counted, and the two ticks collapse into one.
    pub fn raise(&self) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Consumes a pending tick.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel) && self.active.load(Ordering::Acquire)
    }

    /// Ticks raised while the previous one was still pending.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Raises `flag` every `period`. Runs forever; the flag itself decides
/// whether ticks are delivered.
pub async fn sample_ticker(flag: &TickFlag, period: Duration) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        flag.raise();
    }
}

/// Monotonic time source for the sampling loop.
pub trait Clock {
    fn now_micros(&self) -> u64;

    fn now_millis(&self) -> u64 {
        self.now_micros() / 1_000
    }
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}
