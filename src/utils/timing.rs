//! Tick pacing and core pinning for the runtime thread.

use core_affinity::{get_core_ids, set_for_current};
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::time::{Duration, Instant};

/// Periodic release schedule for the judge loop.
///
/// Sleeps until the next scheduled release; a late wake-up is counted as an
/// overrun and the schedule is re-anchored so the loop does not try to catch
/// up with a burst of back-to-back ticks.
pub struct Pacer {
    period: Duration,
    next_release: Instant,
    sleeper: SpinSleeper,
    overruns: u64,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_release: Instant::now(),
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
            overruns: 0,
        }
    }

    /// Blocks until the next release.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next_release {
            self.sleeper.sleep(self.next_release - now);
            self.next_release += self.period;
        } else {
            if now.duration_since(self.next_release) > self.period {
                self.overruns += 1;
                debug!("tick overrun #{} ({:?} late)", self.overruns, now - self.next_release);
            }
            self.next_release = now + self.period;
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

/// Pins the calling thread to `core`; logs and carries on if that fails.
pub fn pin_current_thread(core: usize) -> bool {
    let core_ids = get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) => {
            if set_for_current(*core_id) {
                info!("runtime thread pinned to core {}", core);
                true
            } else {
                warn!("failed to pin runtime thread to core {}", core);
                false
            }
        }
        None => {
            warn!("core {} not among {} available cores", core, core_ids.len());
            false
        }
    }
}
