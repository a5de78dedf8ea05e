//! Mock fallback tier.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::stage::{Reporter, StageError, StageOutcome, Tier};

/// Tier that always returns the same outcome and counts its invocations.
#[derive(Debug)]
pub struct MockTier<O> {
    name: String,
    outcome: StageOutcome<O>,
    calls: AtomicUsize,
}

impl<O> MockTier<O> {
    pub fn succeeding(name: impl Into<String>, value: O) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(value),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: impl Into<String>, error: StageError) -> Self {
        Self {
            name: name.into(),
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the tier ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I, O> Tier<I, O> for MockTier<O>
where
    I: ?Sized + Sync,
    O: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _input: &I, reporter: &Reporter) -> StageOutcome<O> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        reporter.report(0, format!("{} started", self.name)).await;
        let outcome = self.outcome.clone();
        if outcome.is_ok() {
            reporter.report(100, format!("{} finished", self.name)).await;
        }
        outcome
    }
}
