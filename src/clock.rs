use core::sync::atomic::{AtomicU64, Ordering};

use fugit::MicrosDurationU64;

/// Microsecond timestamps since an arbitrary epoch
pub type Instant = fugit::Instant<u64, 1, 1_000_000>;

/// Time source for the retrace budget. A board crate wraps its system timer.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// A clock that only moves when told to, optionally advancing by a fixed
/// step every time it is read.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    step: u64,
}

impl ManualClock {
    pub const fn new() -> ManualClock {
        ManualClock {
            now: AtomicU64::new(0),
            step: 0,
        }
    }

    /// Advances by `step` after every read
    pub const fn stepping(step: MicrosDurationU64) -> ManualClock {
        ManualClock {
            now: AtomicU64::new(0),
            step: step.ticks(),
        }
    }

    pub fn advance(&self, by: MicrosDurationU64) {
        self.now.fetch_add(by.ticks(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.now.fetch_add(self.step, Ordering::Relaxed))
    }
}

/// Runs `f`, adding the time it took to `elapsed`
pub fn measure<O>(
    clock: &impl Clock,
    elapsed: &mut MicrosDurationU64,
    f: impl FnOnce() -> O,
) -> O {
    let start = clock.now();
    let r = f();
    if let Some(took) = clock.now().checked_duration_since(start) {
        *elapsed += took;
    }
    r
}

#[cfg(test)]
mod test {
    use super::*;
    use fugit::ExtU64;

    #[test]
    fn stepping_clock_advances_on_read() {
        let clock = ManualClock::stepping(10.micros());
        assert_eq!(clock.now().ticks(), 0);
        assert_eq!(clock.now().ticks(), 10);
        clock.advance(1_000.micros());
        assert_eq!(clock.now().ticks(), 1020);
    }

    #[test]
    fn measure_accumulates_elapsed() {
        let clock = ManualClock::stepping(7.micros());
        let mut elapsed = MicrosDurationU64::from_ticks(0);
        assert_eq!(measure(&clock, &mut elapsed, || 3), 3);
        assert_eq!(elapsed.ticks(), 7);
        measure(&clock, &mut elapsed, || clock.advance(5.micros()));
        assert_eq!(elapsed.ticks(), 19);
    }
}
