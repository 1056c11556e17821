//! Per-command circuit breaker.
//!
//! The machine has exactly three states. Closed: invocations pass
//! through, failures are counted in a rolling window and a success clears
//! it. Open: every invocation short-circuits to
//! [`Failure::BreakerOpen`] until the cool-down deadline passes. HalfOpen:
//! a single trial invocation is admitted; arrivals while the trial is in
//! flight still short-circuit. A successful trial closes the breaker, a
//! failed trial reopens it with a fresh cool-down. No other transitions
//! exist.

use crate::errors::Failure;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for a command's circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: usize,
    /// Rolling window in which failures are counted.
    pub window: Duration,
    /// How long the breaker stays open before admitting a trial.
    pub cool_down: Duration,
}

impl BreakerConfig {
    /// Creates a configuration with the given threshold and default
    /// 10-second window and 30-second cool-down.
    #[must_use]
    pub fn new(failure_threshold: usize) -> Self {
        Self {
            failure_threshold,
            window: Duration::from_secs(10),
            cool_down: Duration::from_secs(30),
        }
    }

    /// Sets the rolling window.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the cool-down.
    #[must_use]
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".to_string());
        }
        if self.window.is_zero() {
            return Err("window must be positive".to_string());
        }
        if self.cool_down.is_zero() {
            return Err("cool_down must be positive".to_string());
        }
        Ok(())
    }
}

/// Why an invocation was admitted through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal pass-through while the breaker is closed.
    Closed,
    /// The single half-open trial probing recovery.
    Trial,
}

/// The observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStateKind {
    /// Invocations pass through.
    Closed,
    /// Invocations short-circuit until cool-down elapses.
    Open,
    /// A trial invocation is probing recovery.
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { failures: VecDeque<Instant> },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// Per-command protective state machine.
///
/// All state lives behind one mutex; the lock is held only for the
/// transition itself, never across an await.
#[derive(Debug)]
pub struct CircuitBreaker {
    command: String,
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named command.
    #[must_use]
    pub fn new(command: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            command: command.into(),
            config,
            state: Mutex::new(State::Closed {
                failures: VecDeque::new(),
            }),
        }
    }

    /// Decides whether an invocation may proceed.
    ///
    /// Returns a permit to report the invocation's result through, or
    /// [`Failure::BreakerOpen`] when the call must short-circuit.
    pub fn try_admit(&self) -> Result<BreakerPermit<'_>, Failure> {
        let mut state = self.state.lock();
        let admission = match &mut *state {
            State::Closed { .. } => Admission::Closed,
            State::Open { until } => {
                if Instant::now() < *until {
                    return Err(Failure::BreakerOpen);
                }
                debug!(command = %self.command, "cool-down elapsed, admitting trial");
                *state = State::HalfOpen {
                    trial_in_flight: true,
                };
                Admission::Trial
            }
            State::HalfOpen { trial_in_flight } => {
                if *trial_in_flight {
                    return Err(Failure::BreakerOpen);
                }
                *trial_in_flight = true;
                Admission::Trial
            }
        };

        Ok(BreakerPermit {
            breaker: self,
            admission,
            resolved: false,
        })
    }

    /// Returns the currently observable state.
    #[must_use]
    pub fn state(&self) -> BreakerStateKind {
        match *self.state.lock() {
            State::Closed { .. } => BreakerStateKind::Closed,
            State::Open { .. } => BreakerStateKind::Open,
            State::HalfOpen { .. } => BreakerStateKind::HalfOpen,
        }
    }

    fn record(&self, admission: Admission, success: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();

        match admission {
            Admission::Closed => {
                // Results of invocations admitted while closed only count
                // while the breaker is still closed; the trial alone
                // drives half-open transitions.
                if let State::Closed { failures } = &mut *state {
                    if success {
                        failures.clear();
                        return;
                    }

                    failures.push_back(now);
                    let window = self.config.window;
                    while failures
                        .front()
                        .is_some_and(|first| now.duration_since(*first) > window)
                    {
                        failures.pop_front();
                    }

                    if failures.len() >= self.config.failure_threshold {
                        warn!(
                            command = %self.command,
                            failures = failures.len(),
                            "breaker opened"
                        );
                        *state = State::Open {
                            until: now + self.config.cool_down,
                        };
                    }
                }
            }
            Admission::Trial => {
                if let State::HalfOpen { .. } = *state {
                    if success {
                        debug!(command = %self.command, "trial succeeded, breaker closed");
                        *state = State::Closed {
                            failures: VecDeque::new(),
                        };
                    } else {
                        warn!(command = %self.command, "trial failed, breaker reopened");
                        *state = State::Open {
                            until: now + self.config.cool_down,
                        };
                    }
                }
            }
        }
    }

    fn release_unresolved(&self, admission: Admission) {
        if admission == Admission::Trial {
            let mut state = self.state.lock();
            if let State::HalfOpen { trial_in_flight } = &mut *state {
                *trial_in_flight = false;
            }
        }
    }
}

/// Outcome-reporting handle for an admitted invocation.
///
/// Dropping the permit without completing it releases a half-open trial
/// slot, so an abandoned trial cannot wedge the breaker.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    resolved: bool,
}

impl BreakerPermit<'_> {
    /// Returns why this invocation was admitted.
    #[must_use]
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Reports the invocation's result and consumes the permit.
    pub fn complete(mut self, success: bool) {
        self.resolved = true;
        self.breaker.record(self.admission, success);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.release_unresolved(self.admission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(threshold: usize) -> BreakerConfig {
        BreakerConfig::new(threshold)
            .with_window(Duration::from_millis(200))
            .with_cool_down(Duration::from_millis(40))
    }

    fn fail_once(breaker: &CircuitBreaker) {
        breaker.try_admit().unwrap().complete(false);
    }

    #[test]
    fn test_config_validation() {
        assert!(BreakerConfig::new(0).validate().is_err());
        assert!(BreakerConfig::new(3)
            .with_window(Duration::ZERO)
            .validate()
            .is_err());
        assert!(BreakerConfig::new(3)
            .with_cool_down(Duration::ZERO)
            .validate()
            .is_err());
        assert!(BreakerConfig::new(3).validate().is_ok());
    }

    #[test]
    fn test_threshold_failures_open_the_breaker() {
        let breaker = CircuitBreaker::new("cmd", fast_config(2));
        assert_eq!(breaker.state(), BreakerStateKind::Closed);

        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerStateKind::Closed);

        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerStateKind::Open);
        assert_eq!(breaker.try_admit().unwrap_err(), Failure::BreakerOpen);
    }

    #[test]
    fn test_success_clears_the_window() {
        let breaker = CircuitBreaker::new("cmd", fast_config(2));

        fail_once(&breaker);
        breaker.try_admit().unwrap().complete(true);
        fail_once(&breaker);

        // One failure since the success: still closed.
        assert_eq!(breaker.state(), BreakerStateKind::Closed);
    }

    #[test]
    fn test_failures_outside_window_are_forgotten() {
        let config = BreakerConfig::new(2)
            .with_window(Duration::from_millis(30))
            .with_cool_down(Duration::from_millis(40));
        let breaker = CircuitBreaker::new("cmd", config);

        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(50));
        fail_once(&breaker);

        assert_eq!(breaker.state(), BreakerStateKind::Closed);
    }

    #[test]
    fn test_cool_down_admits_exactly_one_trial() {
        let breaker = CircuitBreaker::new("cmd", fast_config(1));

        fail_once(&breaker);
        assert_eq!(breaker.state(), BreakerStateKind::Open);

        std::thread::sleep(Duration::from_millis(50));

        let trial = breaker.try_admit().unwrap();
        assert_eq!(trial.admission(), Admission::Trial);
        assert_eq!(breaker.state(), BreakerStateKind::HalfOpen);

        // While the trial is unresolved, everyone else short-circuits.
        assert_eq!(breaker.try_admit().unwrap_err(), Failure::BreakerOpen);

        trial.complete(true);
        assert_eq!(breaker.state(), BreakerStateKind::Closed);
    }

    #[test]
    fn test_failed_trial_reopens_with_fresh_cool_down() {
        let breaker = CircuitBreaker::new("cmd", fast_config(1));

        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(50));

        breaker.try_admit().unwrap().complete(false);
        assert_eq!(breaker.state(), BreakerStateKind::Open);
        assert_eq!(breaker.try_admit().unwrap_err(), Failure::BreakerOpen);
    }

    #[test]
    fn test_dropped_trial_releases_the_slot() {
        let breaker = CircuitBreaker::new("cmd", fast_config(1));

        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(50));

        let trial = breaker.try_admit().unwrap();
        drop(trial);

        // The slot is free again for the next trial.
        let trial = breaker.try_admit().unwrap();
        assert_eq!(trial.admission(), Admission::Trial);
    }

    #[test]
    fn test_stale_closed_result_does_not_drive_half_open() {
        let breaker = CircuitBreaker::new("cmd", fast_config(1));

        // Admitted while closed, resolves only after the breaker opened
        // and went half-open.
        let stale = breaker.try_admit().unwrap();

        fail_once(&breaker);
        std::thread::sleep(Duration::from_millis(50));
        let trial = breaker.try_admit().unwrap();

        stale.complete(true);
        assert_eq!(breaker.state(), BreakerStateKind::HalfOpen);

        trial.complete(true);
        assert_eq!(breaker.state(), BreakerStateKind::Closed);
    }
}
