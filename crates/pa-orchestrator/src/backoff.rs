//! Attempt schedule for reconnecting after a configuration change
//!
//! A [`ReconnectSchedule`] yields a fixed number of [`Attempt`]s. The first
//! one starts immediately; each later one waits an exponentially growing,
//! capped and optionally jittered delay.

use std::time::Duration;

use pa_core::config::BackoffConfig;

/// One connection attempt of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    pub total: u32,
    /// Wait before making this attempt
    pub delay: Duration,
}

/// Bounded sequence of connection attempts
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    total: u32,
    made: u32,
    /// Base delay before the next retry, before jitter
    step: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ReconnectSchedule {
    /// Schedule `attempts` attempts (at least one) spaced by `backoff`
    pub fn new(attempts: u32, backoff: &BackoffConfig) -> Self {
        Self {
            total: attempts.max(1),
            made: 0,
            step: backoff.initial.min(backoff.max),
            max: backoff.max,
            multiplier: backoff.multiplier.max(1.0),
            jitter: backoff.jitter.clamp(0.0, 1.0),
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    fn retry_delay(&mut self) -> Duration {
        let base = self.step;
        self.step = base.mul_f64(self.multiplier).min(self.max);

        if self.jitter == 0.0 {
            base
        } else {
            base + base.mul_f64(self.jitter * rand::random::<f64>())
        }
    }
}

impl Iterator for ReconnectSchedule {
    type Item = Attempt;

    fn next(&mut self) -> Option<Attempt> {
        if self.made >= self.total {
            return None;
        }
        let delay = if self.made == 0 {
            Duration::ZERO
        } else {
            self.retry_delay()
        };
        self.made += 1;

        Some(Attempt {
            number: self.made,
            total: self.total,
            delay,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.made) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ReconnectSchedule {}
