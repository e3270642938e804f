//! Per-service circuit breaker.
//!
//! # Responsibilities
//! - Track consecutive upstream failures per logical service
//! - Reject traffic while open, probe with bounded trials while half-open
//! - Publish state and transitions as metrics
//!
//! # State Machine
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ recovery timeout elapsed,
//!     │ test_volume successes          │ next request
//!     │                                ▼
//!     └──────────────────────────── HalfOpen
//!                 any trial failure ──▶ Open
//! ```
//!
//! # Design Decisions
//! - One mutex per service; there is no lock shared across services
//! - Admission hands out a `BreakerPermit`; dropping it without reporting
//!   an outcome frees its half-open slot
//! - All clock reads go through `_at` variants so tests inject instants

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Returned when the breaker refuses a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct BreakerOpen;

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    /// Trials admitted in the current half-open episode.
    trials_admitted: u32,
    trial_successes: u32,
    last_failure: Option<Instant>,
}

/// Point-in-time view for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub trials_admitted: u32,
    pub trial_successes: u32,
}

/// Circuit breaker guarding one logical service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    test_request_volume: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        let breaker = Self {
            service: service.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            test_request_volume: config.test_request_volume.max(1),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                trials_admitted: 0,
                trial_successes: 0,
                last_failure: None,
            }),
        };
        metrics::record_breaker_state(&breaker.service, BreakerState::Closed);
        breaker
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            trials_admitted: inner.trials_admitted,
            trial_successes: inner.trial_successes,
        }
    }

    /// Ask to send one request upstream.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, BreakerOpen> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(self: &Arc<Self>, now: Instant) -> Result<BreakerPermit, BreakerOpen> {
        let mut inner = self.lock();

        if inner.state == BreakerState::Open {
            let recovered = inner
                .last_failure
                .map(|at| now.saturating_duration_since(at) >= self.recovery_timeout)
                .unwrap_or(true);
            if !recovered {
                return Err(BreakerOpen);
            }
            self.transition(&mut inner, BreakerState::HalfOpen);
        }

        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen => {
                if inner.trials_admitted >= self.test_request_volume {
                    return Err(BreakerOpen);
                }
                inner.trials_admitted += 1;
                true
            }
            BreakerState::Open => return Err(BreakerOpen),
        };

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            trial,
            settled: false,
        })
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen if trial => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.test_request_volume {
                    inner.consecutive_failures = 0;
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            // A request admitted before the breaker tripped says nothing
            // about recovery.
            BreakerState::HalfOpen | BreakerState::Open => {}
        }
    }

    fn on_failure(&self, now: Instant, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.last_failure = Some(now);
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        service = %self.service,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opening"
                    );
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen if trial => {
                tracing::warn!(service = %self.service, "Half-open trial failed, reopening");
                inner.last_failure = Some(now);
                inner.consecutive_failures = 0;
                self.transition(&mut inner, BreakerState::Open);
            }
            // Outcomes of calls admitted before the breaker tripped neither
            // reopen it nor extend the recovery timeout.
            BreakerState::HalfOpen | BreakerState::Open => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen && inner.trials_admitted > 0 {
            inner.trials_admitted -= 1;
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.trials_admitted = 0;
        inner.trial_successes = 0;

        tracing::info!(
            service = %self.service,
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker transition"
        );
        metrics::record_breaker_state(&self.service, to);
        metrics::record_breaker_transition(&self.service, to);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Admission ticket for one upstream call.
///
/// Report the outcome with [`BreakerPermit::success`] or
/// [`BreakerPermit::failure`]. A permit dropped without an outcome (the
/// client went away) frees its trial slot and counts as neither.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    settled: bool,
}

impl BreakerPermit {
    /// Whether this permit is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(self) {
        self.failure_at(Instant::now());
    }

    pub fn failure_at(mut self, now: Instant) {
        self.settled = true;
        self.breaker.on_failure(now, self.trial);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64, volume: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test-service",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout_secs: recovery_secs,
                test_request_volume: volume,
            },
        ))
    }

    fn fail_n(cb: &Arc<CircuitBreaker>, n: u32, at: Instant) {
        for _ in 0..n {
            cb.try_acquire_at(at).unwrap().failure_at(at);
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 30, 2);
        let t0 = Instant::now();

        fail_n(&cb, 2, t0);
        assert_eq!(cb.state(), BreakerState::Closed);
        fail_n(&cb, 1, t0);
        assert_eq!(cb.state(), BreakerState::Open);

        assert_eq!(cb.try_acquire_at(t0 + Duration::from_secs(29)).unwrap_err(), BreakerOpen);
    }

    #[test]
    fn test_success_resets_failures_in_closed() {
        let cb = breaker(3, 30, 2);
        let t0 = Instant::now();

        fail_n(&cb, 2, t0);
        cb.try_acquire_at(t0).unwrap().success();
        fail_n(&cb, 2, t0);

        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 2);
    }

    #[test]
    fn test_half_open_closes_after_volume_successes() {
        let cb = breaker(1, 10, 2);
        let t0 = Instant::now();
        fail_n(&cb, 1, t0);

        let later = t0 + Duration::from_secs(10);
        let first = cb.try_acquire_at(later).unwrap();
        assert!(first.is_trial());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        let second = cb.try_acquire_at(later).unwrap();
        // Volume exhausted: a third concurrent trial is refused.
        assert!(cb.try_acquire_at(later).is_err());

        first.success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        second.success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 10, 3);
        let t0 = Instant::now();
        fail_n(&cb, 1, t0);

        let t1 = t0 + Duration::from_secs(11);
        cb.try_acquire_at(t1).unwrap().success();
        cb.try_acquire_at(t1).unwrap().failure_at(t1);
        assert_eq!(cb.state(), BreakerState::Open);

        // Recovery is measured from the newest failure.
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(9)).is_err());
        assert!(cb.try_acquire_at(t1 + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn test_dropped_trial_frees_slot() {
        let cb = breaker(1, 5, 1);
        let t0 = Instant::now();
        fail_n(&cb, 1, t0);

        let t1 = t0 + Duration::from_secs(5);
        let permit = cb.try_acquire_at(t1).unwrap();
        assert!(cb.try_acquire_at(t1).is_err());
        drop(permit);

        let retry = cb.try_acquire_at(t1).unwrap();
        retry.success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_late_success_while_open_is_ignored() {
        let cb = breaker(1, 30, 1);
        let t0 = Instant::now();
        let slow = cb.try_acquire_at(t0).unwrap();
        fail_n(&cb, 1, t0);
        assert_eq!(cb.state(), BreakerState::Open);

        slow.success();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_late_failure_does_not_reopen_or_extend() {
        let cb = breaker(1, 10, 3);
        let t0 = Instant::now();
        let stale = cb.try_acquire_at(t0).unwrap();
        let early = cb.try_acquire_at(t0).unwrap();
        fail_n(&cb, 1, t0);
        assert_eq!(cb.state(), BreakerState::Open);

        // While open, a late failure leaves the recovery deadline alone.
        early.failure_at(t0 + Duration::from_secs(5));
        assert_eq!(cb.state(), BreakerState::Open);

        let later = t0 + Duration::from_secs(10);
        let trial = cb.try_acquire_at(later).unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        stale.failure_at(later);
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        trial.failure_at(later);
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
