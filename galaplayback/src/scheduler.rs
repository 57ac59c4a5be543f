//! Retry policy: one immediate attempt, one delayed retry, then give up.
//!
//! The scheduler only counts and decides. Timers are armed by the controller
//! runtime from the machine's effects.

use crate::capability::CapabilityProfile;
use galaconfig::Config;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Recorded failures after which the controller stops trying on its own.
    pub max_failures: u32,
    /// Fixed delay before the single automatic retry.
    pub retry_delay: Duration,
    /// Delay before unmuting a muted start.
    pub unmute_delay: Duration,
    /// Bound on the readiness wait of restricted platforms.
    pub readiness_timeout: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_FAILURES: u32 = 3;

    pub fn from_config(config: &Config) -> Self {
        let default = Self::default();
        Self {
            max_failures: config
                .get_max_failures()
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX).max(1))
                .unwrap_or(default.max_failures),
            retry_delay: config
                .get_retry_delay_ms()
                .map(Duration::from_millis)
                .unwrap_or(default.retry_delay),
            unmute_delay: config
                .get_unmute_delay_ms()
                .map(Duration::from_millis)
                .unwrap_or(default.unmute_delay),
            readiness_timeout: config
                .get_readiness_timeout_secs()
                .map(Duration::from_secs)
                .unwrap_or(default.readiness_timeout),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_failures: Self::DEFAULT_MAX_FAILURES,
            retry_delay: Duration::from_millis(1000),
            unmute_delay: Duration::from_millis(500),
            readiness_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Arm the delayed retry.
    RetryAfter(Duration),
    /// Stop and wait for the user.
    Exhausted,
    /// Restricted platform: no automatic attempt at all.
    Bypassed,
}

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    failures: u32,
    delayed_retry_used: bool,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            delayed_retry_used: false,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.policy.max_failures
    }

    /// Decides whether automatic attempts may start at all.
    pub fn admit(&self, profile: &CapabilityProfile) -> Option<RetryDecision> {
        if profile.is_restricted_platform {
            Some(RetryDecision::Bypassed)
        } else if self.is_exhausted() {
            Some(RetryDecision::Exhausted)
        } else {
            None
        }
    }

    /// Starts a new automatic round; the failure count is kept.
    pub fn begin_round(&mut self) {
        self.delayed_retry_used = false;
    }

    /// Clears everything. Used on success, on `retry()` and on gestures.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.delayed_retry_used = false;
    }

    /// Records a failure without deciding anything. Saturates at the maximum.
    pub fn record_failure(&mut self) -> u32 {
        if self.failures < self.policy.max_failures {
            self.failures += 1;
        }
        self.failures
    }

    /// Records a failed automatic attempt and decides what comes next.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.record_failure();
        if self.is_exhausted() || self.delayed_retry_used {
            RetryDecision::Exhausted
        } else {
            self.delayed_retry_used = true;
            RetryDecision::RetryAfter(self.policy.retry_delay)
        }
    }
}
