//! Ordered fallback across alternative implementations of one stage.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;

use super::error::{ErrorKind, StageError, StageOutcome};
use super::progress::{Reporter, StageKind};

/// One alternative implementation of a stage.
#[async_trait]
pub trait Tier<I: ?Sized + Sync, O: Send>: Send + Sync {
    /// Name for logs, metrics and attempt records.
    fn name(&self) -> &str;

    /// Runs the tier. `reporter` is already scoped to the tier's sub-window.
    async fn run(&self, input: &I, reporter: &Reporter) -> StageOutcome<O>;
}

/// Decides whether a tier failure moves the chain to the next tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvancePolicy {
    /// Follow the failure's own disposition.
    Classified,
    /// Any failure advances.
    AnyFailure,
    /// Only failures of these kinds advance.
    Only(Vec<ErrorKind>),
}

impl AdvancePolicy {
    pub fn advances(&self, err: &StageError) -> bool {
        match self {
            Self::Classified => err.is_advancing(),
            Self::AnyFailure => true,
            Self::Only(kinds) => kinds.contains(&err.kind()),
        }
    }
}

/// What happened when a tier was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Advanced { kind: ErrorKind },
    Aborted { kind: ErrorKind },
}

/// Record of one tier invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TierAttempt {
    pub tier: String,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

struct ChainEntry<I: ?Sized, O> {
    tier: Arc<dyn Tier<I, O>>,
    policy: AdvancePolicy,
}

/// Ordered list of tiers for the same logical operation, highest capability
/// first.
pub struct FallbackChain<I: ?Sized, O> {
    stage: StageKind,
    entries: Vec<ChainEntry<I, O>>,
}

impl<I, O> FallbackChain<I, O>
where
    I: ?Sized + Sync,
    O: Send,
{
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            entries: Vec::new(),
        }
    }

    /// Appends a tier with the given advance policy.
    pub fn with_tier(mut self, tier: Arc<dyn Tier<I, O>>, policy: AdvancePolicy) -> Self {
        self.entries.push(ChainEntry { tier, policy });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.tier.name()).collect()
    }

    /// Runs tiers in order until one succeeds or a failure aborts the chain.
    pub async fn run(&self, input: &I, reporter: &Reporter) -> StageOutcome<O> {
        self.run_with_attempts(input, reporter).await.0
    }

    /// Like [`run`](Self::run), also returning one record per tier invoked.
    pub async fn run_with_attempts(
        &self,
        input: &I,
        reporter: &Reporter,
    ) -> (StageOutcome<O>, Vec<TierAttempt>) {
        let stage = self.stage.as_str();
        let mut attempts = Vec::with_capacity(self.entries.len());

        if self.entries.is_empty() {
            let err = StageError::fatal(
                ErrorKind::ServiceUnavailable,
                format!("no {} tiers configured", stage),
            );
            return (Err(err), attempts);
        }

        let count = self.entries.len();
        let mut last_error = None;

        for (index, entry) in self.entries.iter().enumerate() {
            let name = entry.tier.name().to_string();
            let tier_reporter = reporter.tier(index, count);
            debug!(stage, tier = %name, index, window = %tier_reporter.window(), "Trying tier");

            let started = Instant::now();
            let result = entry.tier.run(input, &tier_reporter).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    metrics::TIER_ATTEMPTS
                        .with_label_values(&[stage, &name, "success"])
                        .inc();
                    info!(stage, tier = %name, duration_ms, "Tier succeeded");
                    attempts.push(TierAttempt {
                        tier: name,
                        outcome: AttemptOutcome::Succeeded,
                        duration_ms,
                    });
                    return (Ok(value), attempts);
                }
                Err(err) => {
                    let kind = err.kind();
                    if entry.policy.advances(&err) {
                        metrics::TIER_ATTEMPTS
                            .with_label_values(&[stage, &name, "advanced"])
                            .inc();
                        warn!(stage, tier = %name, error = %err, "Tier failed, advancing");
                        attempts.push(TierAttempt {
                            tier: name,
                            outcome: AttemptOutcome::Advanced { kind },
                            duration_ms,
                        });
                        last_error = Some(err);
                    } else {
                        metrics::TIER_ATTEMPTS
                            .with_label_values(&[stage, &name, "aborted"])
                            .inc();
                        warn!(stage, tier = %name, error = %err, "Tier failed, aborting chain");
                        attempts.push(TierAttempt {
                            tier: name,
                            outcome: AttemptOutcome::Aborted { kind },
                            duration_ms,
                        });
                        return (Err(err), attempts);
                    }
                }
            }
        }

        let err = match last_error {
            Some(last) => StageError::exhausted(stage, last),
            None => StageError::fatal(ErrorKind::Internal, "fallback chain ended without result"),
        };
        (Err(err), attempts)
    }
}
