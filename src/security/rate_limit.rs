//! Per-IP sliding window rate limiting.
//!
//! The decision itself is [`evaluate`], a pure function of the stored record
//! and the current time. [`RateLimiter`] wraps it with a plain
//! get/compute/put against the server store, without any locking, so
//! concurrent requests from one IP may under-count.

use crate::server_store::{RateLimitRecord, ServerStore};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 100 requests per 15 minutes.
pub const DEFAULT_MAX_REQUESTS: usize = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
/// Block applied once the window overflows.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window: Duration,
    pub block_duration: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            block_duration: DEFAULT_BLOCK_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: usize,
    /// Time until the block is lifted, set when the request is rejected.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Whole seconds for the `Retry-After` header, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|d| d.as_millis().div_ceil(1000) as u64)
    }
}

/// Computes the decision for one request at `now_ms` and the record to store.
pub fn evaluate(
    record: Option<&RateLimitRecord>,
    now_ms: i64,
    policy: &RateLimitPolicy,
) -> (RateLimitRecord, RateLimitDecision) {
    let mut record = record.cloned().unwrap_or_default();

    if record.blocked {
        match record.block_until {
            Some(until) if until > now_ms => {
                let decision = RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    retry_after: Some(Duration::from_millis((until - now_ms) as u64)),
                };
                return (record, decision);
            }
            _ => {
                record.blocked = false;
                record.block_until = None;
                record.requests.clear();
            }
        }
    }

    let window_start = now_ms - policy.window.as_millis() as i64;
    record.requests.retain(|&t| t > window_start);

    if record.requests.len() >= policy.max_requests {
        let block_ms = policy.block_duration.as_millis() as i64;
        record.blocked = true;
        record.block_until = Some(now_ms + block_ms);
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after: Some(policy.block_duration),
        };
        return (record, decision);
    }

    record.requests.push(now_ms);
    let decision = RateLimitDecision {
        allowed: true,
        remaining: policy.max_requests - record.requests.len(),
        retry_after: None,
    };
    (record, decision)
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ServerStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ServerStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn check_rate_limit(&self, ip: &str, now_ms: i64) -> Result<RateLimitDecision> {
        let existing = self.store.get_rate_limit(ip)?;
        let was_blocked = existing
            .as_ref()
            .map(|r| r.blocked && r.block_until.is_some_and(|u| u > now_ms))
            .unwrap_or(false);

        let (record, decision) = evaluate(existing.as_ref(), now_ms, &self.policy);

        if !decision.allowed && !was_blocked {
            warn!(
                "Rate limit exceeded for {}, blocking for {:?}",
                ip, self.policy.block_duration
            );
        }
        // A request rejected by an active block leaves the record as it was.
        if !was_blocked {
            self.store.put_rate_limit(ip, &record, now_ms)?;
        }
        Ok(decision)
    }

    /// Removes records whose whole history fell out of the window.
    pub fn prune(&self, now_ms: i64) -> Result<usize> {
        let stale_before = now_ms - self.policy.window.as_millis() as i64;
        let pruned = self.store.prune_rate_limits(stale_before, now_ms)?;
        if pruned > 0 {
            debug!("Pruned {} idle rate limit records", pruned);
        }
        Ok(pruned)
    }
}
