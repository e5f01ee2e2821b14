use crate::traits::{ToolDescriptor, ToolExecutionResult, ToolRegistry};
use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::ToolRetryConfig;
use std::time::{Duration, Instant};

/// Capped exponential backoff, ported from the teacher's `compute_backoff_ms`:
/// attempt 1 waits `initial_backoff_ms`, each subsequent attempt doubles,
/// capped at `max_backoff_ms`.
pub fn compute_backoff_ms(policy: &ToolRetryConfig, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    let base = policy.initial_backoff_ms.saturating_mul(factor);
    base.min(policy.max_backoff_ms)
}

/// Wraps a [`ToolRegistry`] with the teacher's capped-backoff retry loop
/// (`execute_agent_with_retries`): a failed `execute()` is retried up to
/// `policy.max_attempts` times before the Execution Entry sees the final
/// outcome.
pub struct RetryingToolRegistry<T: ToolRegistry> {
    inner: T,
    policy: ToolRetryConfig,
}

impl<T: ToolRegistry> RetryingToolRegistry<T> {
    pub fn new(inner: T, policy: ToolRetryConfig) -> Self {
        RetryingToolRegistry { inner, policy }
    }
}

#[async_trait]
impl<T: ToolRegistry> ToolRegistry for RetryingToolRegistry<T> {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.list_tools().await
    }

    async fn execute(&self, name: &str, params: &Map<String, Value>) -> ToolExecutionResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.inner.execute(name, params).await;
            if result.success || attempt >= self.policy.max_attempts.max(1) {
                return result;
            }
            let backoff = compute_backoff_ms(&self.policy, attempt);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

/// Per-tool consecutive-failure counter and open-circuit deadline, generalized
/// from the teacher's per-agent `agent_health` bookkeeping.
struct ToolHealth {
    consecutive_failures: u32,
    circuit_open_until: Option<Instant>,
}

/// Whether a tool is currently in its cooldown window, ported from the
/// teacher's `agent_in_circuit_cooldown`.
fn in_cooldown(health: &ToolHealth) -> bool {
    match health.circuit_open_until {
        Some(until) => until > Instant::now(),
        None => false,
    }
}

/// Wraps a [`ToolRegistry`], opening a circuit for a tool after
/// `failure_threshold` consecutive failures and skipping dispatch to it until
/// `cooldown_ms` elapses, recording a `tool_unavailable` error instead
/// (spec.md's failure-awareness pre-filter then treats this the same as any
/// other tool-execution failure). Disabled tools pass straight through.
pub struct CircuitBreakingToolRegistry<T: ToolRegistry> {
    inner: T,
    health: dashmap::DashMap<String, ToolHealth>,
    failure_threshold: u32,
    cooldown: Duration,
    enabled: bool,
}

impl<T: ToolRegistry> CircuitBreakingToolRegistry<T> {
    pub fn new(inner: T, enabled: bool, failure_threshold: u32, cooldown_ms: u64) -> Self {
        CircuitBreakingToolRegistry {
            inner,
            health: dashmap::DashMap::new(),
            failure_threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            enabled,
        }
    }

    fn record_outcome(&self, name: &str, success: bool) {
        let mut entry = self
            .health
            .entry(name.to_string())
            .or_insert_with(|| ToolHealth {
                consecutive_failures: 0,
                circuit_open_until: None,
            });
        if success {
            entry.consecutive_failures = 0;
            entry.circuit_open_until = None;
        } else {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            if entry.consecutive_failures >= self.failure_threshold {
                entry.circuit_open_until = Some(Instant::now() + self.cooldown);
            }
        }
    }
}

#[async_trait]
impl<T: ToolRegistry> ToolRegistry for CircuitBreakingToolRegistry<T> {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.list_tools().await
    }

    async fn execute(&self, name: &str, params: &Map<String, Value>) -> ToolExecutionResult {
        if !self.enabled {
            return self.inner.execute(name, params).await;
        }
        if let Some(health) = self.health.get(name) {
            if in_cooldown(&health) {
                return ToolExecutionResult {
                    success: false,
                    result: None,
                    error: Some(format!("tool_unavailable: {name} is in circuit cooldown")),
                    metadata: Default::default(),
                };
            }
        }
        let result = self.inner.execute(name, params).await;
        self.record_outcome(name, result.success);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn compute_backoff_ms_grows_exponentially_and_is_capped() {
        let policy = ToolRetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
        };
        assert_eq!(compute_backoff_ms(&policy, 1), 500);
        assert_eq!(compute_backoff_ms(&policy, 2), 1_000);
        assert_eq!(compute_backoff_ms(&policy, 3), 2_000);
        assert_eq!(compute_backoff_ms(&policy, 4), 4_000);
        assert_eq!(compute_backoff_ms(&policy, 5), 5_000);
    }

    struct FlakyTools {
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl ToolRegistry for FlakyTools {
        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![]
        }

        async fn execute(&self, _name: &str, _params: &Map<String, Value>) -> ToolExecutionResult {
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                ToolExecutionResult {
                    success: false,
                    result: None,
                    error: Some("transient".into()),
                    metadata: Default::default(),
                }
            } else {
                ToolExecutionResult {
                    success: true,
                    result: Some(Value::String("ok".into())),
                    error: None,
                    metadata: Default::default(),
                }
            }
        }
    }

    #[tokio::test]
    async fn retrying_registry_recovers_within_max_attempts() {
        let registry = RetryingToolRegistry::new(
            FlakyTools {
                fail_times: AtomicU32::new(2),
            },
            ToolRetryConfig {
                max_attempts: 5,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        );
        let result = registry.execute("flaky", &Map::new()).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn retrying_registry_gives_up_after_max_attempts() {
        let registry = RetryingToolRegistry::new(
            FlakyTools {
                fail_times: AtomicU32::new(10),
            },
            ToolRetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        );
        let result = registry.execute("flaky", &Map::new()).await;
        assert!(!result.success);
    }

    struct AlwaysFailTools;

    #[async_trait]
    impl ToolRegistry for AlwaysFailTools {
        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![]
        }

        async fn execute(&self, _name: &str, _params: &Map<String, Value>) -> ToolExecutionResult {
            ToolExecutionResult {
                success: false,
                result: None,
                error: Some("boom".into()),
                metadata: Default::default(),
            }
        }
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_blocks_dispatch() {
        let registry = CircuitBreakingToolRegistry::new(AlwaysFailTools, true, 2, 60_000);
        let _ = registry.execute("bad_tool", &Map::new()).await;
        let second = registry.execute("bad_tool", &Map::new()).await;
        assert!(!second.success);

        let third = registry.execute("bad_tool", &Map::new()).await;
        assert!(third.error.unwrap().starts_with("tool_unavailable"));
    }

    #[tokio::test]
    async fn disabled_circuit_breaker_passes_through() {
        let registry = CircuitBreakingToolRegistry::new(AlwaysFailTools, false, 1, 60_000);
        let first = registry.execute("bad_tool", &Map::new()).await;
        let second = registry.execute("bad_tool", &Map::new()).await;
        assert_eq!(first.error.as_deref(), Some("boom"));
        assert_eq!(second.error.as_deref(), Some("boom"));
    }
}
