use super::types::{CallFailure, ProviderId};
use std::collections::HashMap;

/// Breaker thresholds. Defaults are the normative values; they are tunable
/// through [`ReliabilityConfig`](crate::config::ReliabilityConfig) rather
/// than contractual.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Consecutive failures at which the breaker opens.
    pub open_threshold: u32,
    /// Auth failures pushing the count past this value get clamped.
    pub auth_clamp_after: u32,
    /// The value an auth failure clamps the count to.
    pub auth_clamp_to: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            open_threshold: 5,
            auth_clamp_after: 3,
            auth_clamp_to: 2,
        }
    }
}

/// Per-provider failure state read by the failover path.
#[derive(Debug, Clone, Default)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Tracks consecutive failures per provider and decides breaker state.
///
/// Counters are best-effort: concurrent calls may interleave increments, and
/// that is acceptable. A success always resets to zero. Auth-classified
/// failures that push the count past `auth_clamp_after` are clamped down to
/// `auth_clamp_to`, so a provider whose credentials were just rotated closes
/// its breaker after fewer follow-up failures.
pub struct FailureTracker {
    states: HashMap<ProviderId, FailureState>,
    policy: BreakerPolicy,
}

impl FailureTracker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            states: HashMap::new(),
            policy,
        }
    }

    pub fn record_success(&mut self, provider: ProviderId) {
        if let Some(state) = self.states.get_mut(&provider) {
            state.consecutive_failures = 0;
            state.last_error = None;
        }
    }

    pub fn record_failure(&mut self, provider: ProviderId, failure: &CallFailure) {
        let state = self.states.entry(provider).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if failure.looks_like_auth() && state.consecutive_failures > self.policy.auth_clamp_after {
            tracing::debug!(
                provider = %provider,
                from = state.consecutive_failures,
                to = self.policy.auth_clamp_to,
                "clamping failure count after auth error"
            );
            state.consecutive_failures = self.policy.auth_clamp_to;
        }

        state.last_error = Some(failure.to_string());
    }

    /// Open means the provider is skipped by the failover path. Binary; no
    /// half-open probing.
    pub fn is_open(&self, provider: ProviderId) -> bool {
        self.failures(provider) >= self.policy.open_threshold
    }

    pub fn failures(&self, provider: ProviderId) -> u32 {
        self.states
            .get(&provider)
            .map_or(0, |s| s.consecutive_failures)
    }

    pub fn last_error(&self, provider: ProviderId) -> Option<String> {
        self.states.get(&provider).and_then(|s| s.last_error.clone())
    }

    /// Forget everything about a provider (forced reinitialization).
    pub fn reset(&mut self, provider: ProviderId) {
        self.states.remove(&provider);
    }
}
