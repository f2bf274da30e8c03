//! Resource limits and safety controls for workflow execution.
//!
//! Backs the Host Runner's per-host timeout/retry policy and the
//! orchestrator's overall workflow duration ceiling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Resource limits for a single workflow run.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum execution time for the entire workflow.
    pub max_workflow_duration: Duration,

    /// Maximum execution time per host-task invocation.
    pub max_task_duration: Duration,

    /// Maximum number of retry attempts per host-task invocation.
    pub max_retries: usize,

    /// Maximum number of concurrent per-host workers within one task.
    pub max_concurrent_hosts: usize,

    /// Maximum size for a task's rendered payload (bytes).
    pub max_output_size: usize,

    /// Optional rate limiter for host-runner calls.
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_workflow_duration: Duration::from_secs(3600),
            max_task_duration: Duration::from_secs(300),
            max_retries: 3,
            max_concurrent_hosts: 10,
            max_output_size: 10 * 1024 * 1024,
            rate_limiter: None,
        }
    }
}

impl ResourceLimits {
    /// Limits suitable for testing (more restrictive, fails fast).
    pub fn testing() -> Self {
        Self {
            max_workflow_duration: Duration::from_secs(60),
            max_task_duration: Duration::from_secs(10),
            max_retries: 1,
            max_concurrent_hosts: 2,
            max_output_size: 1024 * 1024,
            rate_limiter: Some(Arc::new(RateLimiter::new(10, Duration::from_secs(60)))),
        }
    }

    /// Limits suitable for production (balanced).
    pub fn production() -> Self {
        Self::default()
    }

    /// Unlimited configuration (use with caution).
    pub fn unlimited() -> Self {
        Self {
            max_workflow_duration: Duration::from_secs(86400),
            max_task_duration: Duration::from_secs(3600),
            max_retries: 10,
            max_concurrent_hosts: 256,
            max_output_size: 100 * 1024 * 1024,
            rate_limiter: None,
        }
    }
}

/// Simple token bucket rate limiter, used to throttle host-runner calls.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    tokens: AtomicUsize,
    refill_period: Duration,
    last_refill: std::sync::Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(capacity: usize, refill_period: Duration) -> Self {
        Self {
            capacity,
            tokens: AtomicUsize::new(capacity),
            refill_period,
            last_refill: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    pub fn try_acquire_n(&self, n: usize) -> bool {
        self.refill();

        let mut current = self.tokens.load(Ordering::Relaxed);
        loop {
            if current < n {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - n,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn refill(&self) {
        let mut last_refill = self.last_refill.lock().unwrap();
        let now = Instant::now();
        if now.duration_since(*last_refill) >= self.refill_period {
            self.tokens.store(self.capacity, Ordering::SeqCst);
            *last_refill = now;
        }
    }

    pub fn available_tokens(&self) -> usize {
        self.refill();
        self.tokens.load(Ordering::Relaxed)
    }
}

/// Circuit breaker guarding a flaky host runner from being hammered with retries.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    reset_timeout: Duration,
    state: Arc<std::sync::Mutex<CircuitState>>,
}

#[derive(Debug)]
struct CircuitState {
    failures: usize,
    last_failure: Option<Instant>,
    state: BreakerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            state: Arc::new(std::sync::Mutex::new(CircuitState {
                failures: 0,
                last_failure: None,
                state: BreakerState::Closed,
            })),
        }
    }

    pub fn can_proceed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if let Some(last_failure) = state.last_failure {
                    if last_failure.elapsed() >= self.reset_timeout {
                        state.state = BreakerState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if state.state == BreakerState::HalfOpen {
            state.state = BreakerState::Closed;
            state.failures = 0;
            state.last_failure = None;
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.failures += 1;
        state.last_failure = Some(Instant::now());
        match state.state {
            BreakerState::Closed => {
                if state.failures >= self.failure_threshold {
                    state.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => state.state = BreakerState::Open,
            BreakerState::Open => {}
        }
    }

    pub fn current_state(&self) -> BreakerState {
        self.state.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(5, Duration::from_millis(100));
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
        thread::sleep(Duration::from_millis(101));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_circuit_breaker() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(100));
        assert_eq!(breaker.current_state(), BreakerState::Closed);
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.current_state(), BreakerState::Open);
        assert!(!breaker.can_proceed());
        thread::sleep(Duration::from_millis(101));
        assert!(breaker.can_proceed());
        breaker.record_success();
        assert_eq!(breaker.current_state(), BreakerState::Closed);
    }

    #[test]
    fn test_resource_limits_profiles() {
        let testing = ResourceLimits::testing();
        assert_eq!(testing.max_task_duration, Duration::from_secs(10));
        assert!(testing.rate_limiter.is_some());

        let production = ResourceLimits::production();
        assert_eq!(production.max_task_duration, Duration::from_secs(300));

        let unlimited = ResourceLimits::unlimited();
        assert_eq!(unlimited.max_task_duration, Duration::from_secs(3600));
    }
}
