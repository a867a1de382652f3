//! Cooperative cancellation and wall-clock limits
//!
//! Iterating functions call [`crate::EvaluationContext::poll`] once per set
//! element. The token is checked on every poll; the clock is only read
//! every `check_interval` work units.

use crate::error::{EvalError, EvalResult};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag another thread can set to stop an evaluation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can be reused for the next query
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}

/// Monotonic time since a process-wide anchor
pub fn monotonic_now() -> Duration {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    ANCHOR.get_or_init(Instant::now).elapsed()
}

/// Amortized wall-clock budget
#[derive(Debug, Clone)]
pub struct ExecutionTimer {
    limit: Option<Duration>,
    check_interval: u32,
    start: Option<Duration>,
    accumulated_units: u32,
}

impl ExecutionTimer {
    pub fn new(limit: Option<Duration>, check_interval: u32) -> Self {
        Self {
            limit,
            check_interval: check_interval.max(1),
            start: None,
            accumulated_units: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, 1)
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Start (or restart) the budget at `now`
    pub fn start(&mut self, now: Duration) {
        self.start = Some(now);
        self.accumulated_units = 0;
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        self.start.map(|start| now.saturating_sub(start))
    }

    /// Count `units` of work, reading the clock once enough has piled up
    pub fn tick(&mut self, units: u32) -> EvalResult<()> {
        if self.limit.is_none() || self.start.is_none() {
            return Ok(());
        }
        self.accumulated_units = self.accumulated_units.saturating_add(units);
        if self.accumulated_units < self.check_interval {
            return Ok(());
        }
        self.accumulated_units %= self.check_interval;
        self.check_now(monotonic_now())
    }

    /// Fail if the budget is spent at `now`
    pub fn check_now(&self, now: Duration) -> EvalResult<()> {
        let (Some(limit), Some(elapsed)) = (self.limit, self.elapsed(now)) else {
            return Ok(());
        };
        if elapsed > limit {
            return Err(EvalError::Timeout {
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }
}

impl Default for ExecutionTimer {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_check_now_against_explicit_clock() {
        let mut timer = ExecutionTimer::new(Some(Duration::from_millis(10)), 4);
        timer.start(Duration::from_millis(100));
        assert!(timer.check_now(Duration::from_millis(105)).is_ok());
        let err = timer.check_now(Duration::from_millis(120)).unwrap_err();
        assert_eq!(
            err,
            EvalError::Timeout {
                elapsed_ms: 20,
                limit_ms: 10
            }
        );
    }

    #[test]
    fn test_unstarted_timer_never_fails() {
        let mut timer = ExecutionTimer::new(Some(Duration::ZERO), 1);
        assert!(timer.tick(1000).is_ok());
        assert!(timer.check_now(Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_zero_budget_fails_on_first_check() {
        let mut timer = ExecutionTimer::new(Some(Duration::ZERO), 2);
        timer.start(monotonic_now());
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.tick(1).is_ok());
        assert!(timer.tick(1).is_err());
    }
}
