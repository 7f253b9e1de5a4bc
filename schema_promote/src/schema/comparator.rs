//! Multi-environment comparison
//!
//! Runs the diff engine for one baseline against many targets. Each target is
//! compared independently; results always come back in target order.

use futures::future::try_join_all;
use std::sync::Arc;

use crate::config::CompareOptions;
use crate::error::Result;
use crate::schema::diff::DiffEngine;
use crate::schema::difference::Comparison;
use crate::schema::types::Snapshot;

/// Compares one baseline against several target environments
#[derive(Debug, Clone, Default)]
pub struct MultiEnvironmentComparator {
    engine: DiffEngine,
}

impl MultiEnvironmentComparator {
    /// Create a new comparator
    pub fn new(options: CompareOptions) -> Self {
        Self {
            engine: DiffEngine::new(options),
        }
    }

    /// Compare every target against the baseline, sequentially
    pub fn compare_multiple(&self, baseline: &Snapshot, targets: &[Snapshot]) -> Vec<Comparison> {
        tracing::debug!(
            baseline = %baseline.environment,
            targets = targets.len(),
            "Comparing environments"
        );
        self.engine.compare_many(baseline, targets)
    }

    /// Compare every target against the baseline on the blocking thread pool
    pub async fn compare_multiple_concurrent(
        &self,
        baseline: Arc<Snapshot>,
        targets: Vec<Snapshot>,
    ) -> Result<Vec<Comparison>> {
        tracing::debug!(
            baseline = %baseline.environment,
            targets = targets.len(),
            "Comparing environments concurrently"
        );

        let tasks = targets.into_iter().map(|target| {
            let engine = self.engine.clone();
            let baseline = Arc::clone(&baseline);
            tokio::task::spawn_blocking(move || engine.compare(&baseline, &target))
        });

        let comparisons = try_join_all(tasks).await?;
        Ok(comparisons)
    }
}
