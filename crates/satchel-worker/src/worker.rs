use crate::classify::classify;
use crate::config::ScopeConfig;
use crate::event::FetchEvent;
use crate::executor::{ServedResponse, StrategyExecutor};
use crate::lifecycle::{LifecycleManager, WorkerPhase};
use crate::strategy::PolicyTable;
use std::sync::Arc;

/// Per-request decision: respond from the strategy machinery, or decline
/// and let the caller hit the network untouched.
pub enum Verdict {
    Respond(ServedResponse),
    PassThrough,
}

/// The worker facade: classification, strategy selection and execution for
/// one intercepted request at a time.
pub struct Worker {
    scope: ScopeConfig,
    policy: PolicyTable,
    executor: StrategyExecutor,
    lifecycle: Arc<LifecycleManager>,
}

impl Worker {
    pub fn new(
        scope: ScopeConfig,
        policy: PolicyTable,
        executor: StrategyExecutor,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            scope,
            policy,
            executor,
            lifecycle,
        }
    }

    pub async fn handle(&self, event: &FetchEvent) -> Verdict {
        // Interception only once this version controls the page.
        if self.lifecycle.phase() != WorkerPhase::Active {
            return Verdict::PassThrough;
        }
        let classification = classify(event, &self.scope);
        let Some(strategy) = self.policy.select(classification) else {
            return Verdict::PassThrough;
        };
        tracing::debug!(url = %event.url, ?classification, ?strategy, "request intercepted");
        Verdict::Respond(self.executor.execute(event, classification, strategy).await)
    }
}
