//! Bounded retry with exponential backoff, as an explicit state machine.

use std::time::Duration;

/// How often and how patiently a block fetch is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per block, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Where a block fetch stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Fetching { attempt: u32 },
    RetryWait { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
    Done { attempts: u32 },
}

/// Drives `FETCHING -> RETRY_WAIT -> FETCHING` until success or the attempt
/// budget runs out.
#[derive(Debug)]
pub struct RetryMachine<'a> {
    policy: &'a RetryPolicy,
    state: RetryState,
}

impl<'a> RetryMachine<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Fetching { attempt: 1 },
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// The current attempt succeeded.
    pub fn succeed(&mut self) -> RetryState {
        if let RetryState::Fetching { attempt } = self.state {
            self.state = RetryState::Done { attempts: attempt };
        }
        self.state
    }

    /// The current attempt failed with a retryable error.
    pub fn fail(&mut self) -> RetryState {
        if let RetryState::Fetching { attempt } = self.state {
            self.state = if attempt >= self.policy.max_attempts {
                RetryState::Failed { attempts: attempt }
            } else {
                RetryState::RetryWait {
                    attempt,
                    delay: self.policy.backoff_for(attempt),
                }
            };
        }
        self.state
    }

    /// The backoff delay has elapsed.
    pub fn resume(&mut self) -> RetryState {
        if let RetryState::RetryWait { attempt, .. } = self.state {
            self.state = RetryState::Fetching { attempt: attempt + 1 };
        }
        self.state
    }
}
