//! Spacing between consecutive tracker mutations.
//!
//! Back-to-back mutations wait `min(n * base, max)` where `n` counts the
//! mutations in the current streak. Any iteration without a mutation ends the
//! streak and the next mutation goes out immediately.

use std::time::Duration;

use tracing::debug;

use crate::config::PacingConfig;

/// Run-scoped mutation pacer.
#[derive(Debug)]
pub struct Pacer {
    base: Duration,
    max: Duration,
    streak: u32,
    just_mutated: bool,
    dry_run: bool,
    sleep: fn(Duration),
    slept: Duration,
}

impl Pacer {
    #[must_use]
    pub fn new(config: &PacingConfig, dry_run: bool) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            streak: 0,
            just_mutated: false,
            dry_run,
            sleep: std::thread::sleep,
            slept: Duration::ZERO,
        }
    }

    /// Replace the sleep function, e.g. with a no-op in tests.
    #[must_use]
    pub const fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Call right before issuing a mutation. Returns the delay applied.
    pub fn before_mutation(&mut self) -> Duration {
        let mut delay = Duration::ZERO;

        if self.just_mutated {
            self.streak = self.streak.saturating_add(1);
            delay = self.base.saturating_mul(self.streak).min(self.max);
            if !self.dry_run && !delay.is_zero() {
                debug!(?delay, streak = self.streak, "pacing tracker mutation");
                (self.sleep)(delay);
                self.slept += delay;
            }
        }

        self.just_mutated = true;
        if self.dry_run { Duration::ZERO } else { delay }
    }

    /// Call for an iteration that issued no mutation.
    pub const fn idle(&mut self) {
        self.just_mutated = false;
        self.streak = 0;
    }

    /// Total time spent sleeping so far.
    #[must_use]
    pub const fn slept(&self) -> Duration {
        self.slept
    }
}
