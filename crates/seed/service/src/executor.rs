use async_trait::async_trait;
use seed_types::{Action, Clock, ExecutionResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Outbound platform executor. Failures are reported as unsuccessful
/// results, never as errors, so they always reach the ledger.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> ExecutionResult;
}

/// Executor that performs nothing and succeeds, except for listed targets
/// and, optionally, every n-th call.
pub struct SimulatedExecutor {
    clock: Arc<dyn Clock>,
    failing_targets: HashSet<String>,
    fail_every: Option<usize>,
    calls: AtomicUsize,
}

impl SimulatedExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            failing_targets: HashSet::new(),
            fail_every: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_target(mut self, target: impl Into<String>) -> Self {
        self.failing_targets.insert(target.into());
        self
    }

    pub fn fail_every(mut self, n: usize) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, action: &Action) -> ExecutionResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.clock.now();

        if self.failing_targets.contains(&action.target_identifier) {
            return ExecutionResult::failed(
                format!("{} rejected {}", action.platform, action.action_type),
                now,
            );
        }
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return ExecutionResult::failed("simulated platform error", now);
        }
        ExecutionResult::succeeded(now)
    }
}
