//! Monotonic time source
//!
//! The master reads time and sleeps only through [`Clock`], so tests can run
//! the inter-frame timing against a manual clock.

#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic clock with a sleep primitive
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// `std::time::Instant` + `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
#[derive(Debug)]
struct ManualState {
    now: Instant,
    tick: Duration,
    sleeps: Vec<Duration>,
}

/// Manually driven clock
///
/// Every `now()` advances time by `tick` so consecutive readings are strictly
/// increasing; `sleep()` advances by the requested duration and records it.
/// Clones share state. Test builds only.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                tick,
                sleeps: Vec::new(),
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ManualState) -> R) -> R {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.with(|s| s.now += duration);
    }

    /// Current time without ticking
    pub fn peek(&self) -> Instant {
        self.with(|s| s.now)
    }

    /// Sleeps requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.with(|s| s.sleeps.clone())
    }

    pub fn total_slept(&self) -> Duration {
        self.with(|s| s.sleeps.iter().sum())
    }
}

#[cfg(test)]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Duration::from_micros(1))
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.with(|s| {
            s.now += s.tick;
            s.now
        })
    }

    fn sleep(&self, duration: Duration) {
        self.with(|s| {
            s.now += duration;
            s.sleeps.push(duration);
        });
    }
}
