//! schema_promote: risk-ranked schema comparison across database environments
//!
//! schema_promote compares snapshots of database metadata captured in several
//! environments against a baseline, classifies every structural difference by
//! risk, and generates apply/rollback scripts for the differences a DBA
//! approves. It never proposes dropping an object that exists on only one side.

pub mod config;
pub mod error;
pub mod schema;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

// Re-export main types for easier access
pub use config::{CompareOptions, Config, ScriptOptions};
pub use error::{Error, Result};
pub use schema::comparator::MultiEnvironmentComparator;
pub use schema::diff::{compare, DiffEngine};
pub use schema::difference::{Comparison, Difference, RiskLevel, SyncAction};
pub use schema::generator::{ScriptGenerator, ScriptItem, ScriptSubject};
pub use schema::loader::{FileSnapshotSource, SnapshotSource};
pub use schema::script::SyncScript;
pub use schema::types::Snapshot;

use crate::utils::naming::sanitize_file_stem;

/// Initialize schema_promote with the specified configuration file
pub async fn init(config_path: &str) -> Result<PromotionClient> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    PromotionClient::new(config)
}

/// Snapshots and the comparisons computed from them
#[derive(Debug, Clone)]
pub struct PromotionPlan {
    pub baseline: Arc<Snapshot>,
    pub targets: Vec<Snapshot>,
    pub comparisons: Vec<Comparison>,
}

impl PromotionPlan {
    /// Target snapshot a comparison was computed against
    pub fn target_for(&self, comparison: &Comparison) -> Option<&Snapshot> {
        self.targets
            .iter()
            .find(|target| target.environment == comparison.target)
    }

    pub fn has_drift(&self) -> bool {
        self.comparisons.iter().any(Comparison::has_differences)
    }
}

/// The main client for comparing environments and producing sync scripts
pub struct PromotionClient {
    config: Config,
    source: FileSnapshotSource,
    comparator: MultiEnvironmentComparator,
}

impl PromotionClient {
    /// Create a new client from configuration
    pub fn new(config: Config) -> Result<Self> {
        let mut source = FileSnapshotSource::default();
        for (environment, path) in &config.environments {
            source.insert(environment, path);
        }
        if let Some(pattern) = &config.snapshot_glob {
            source.discover(pattern)?;
        }

        if source.path(&config.baseline).is_none() {
            return Err(Error::ConfigError(format!(
                "Baseline environment '{}' has no snapshot file",
                config.baseline
            )));
        }

        let comparator = MultiEnvironmentComparator::new(config.comparison.clone());

        Ok(Self {
            config,
            source,
            comparator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Every configured environment except the baseline, in configuration order
    pub fn target_environments(&self) -> Vec<String> {
        self.source
            .environments()
            .into_iter()
            .filter(|environment| environment != &self.config.baseline)
            .collect()
    }

    /// Load the baseline snapshot and every target snapshot
    pub async fn load_snapshots(&self) -> Result<(Snapshot, Vec<Snapshot>)> {
        let baseline = self.source.load(&self.config.baseline).await?;

        let mut targets = Vec::new();
        for environment in self.target_environments() {
            targets.push(self.source.load(&environment).await?);
        }

        Ok((baseline, targets))
    }

    /// Compare the baseline against every other environment
    pub async fn compare_environments(&self) -> Result<PromotionPlan> {
        let (baseline, targets) = self.load_snapshots().await?;
        let baseline = Arc::new(baseline);

        let comparisons = self
            .comparator
            .compare_multiple_concurrent(Arc::clone(&baseline), targets.clone())
            .await?;

        Ok(PromotionPlan {
            baseline,
            targets,
            comparisons,
        })
    }

    /// Generate the sync script for the approved differences of one comparison
    pub fn generate_sync_script(
        &self,
        comparison: &Comparison,
        baseline: &Snapshot,
        target: &Snapshot,
    ) -> Result<SyncScript> {
        ScriptGenerator::new(&self.config.scripts)
            .generate_for_comparison(comparison, baseline, target)
    }

    /// Write the apply and rollback scripts to the output directory
    pub async fn write_script(&self, script: &SyncScript) -> Result<Vec<PathBuf>> {
        write_script_files(Path::new(&self.config.scripts.output_directory), script).await
    }

    /// Complete workflow: load, compare, approve, generate and write scripts
    ///
    /// Forbidden differences and changes without a script rule are never
    /// scripted. With `executable_only`, High differences are skipped too;
    /// otherwise they are exported for manual review.
    pub async fn promote(&self, executable_only: bool) -> Result<Vec<SyncScript>> {
        let mut plan = self.compare_environments().await?;

        if !plan.has_drift() {
            tracing::info!("All environments match the baseline");
            return Ok(Vec::new());
        }

        let mut scripts = Vec::new();
        for comparison in &mut plan.comparisons {
            if !comparison.has_differences() {
                continue;
            }

            comparison.approve_executable();
            if executable_only {
                for difference in comparison.differences_mut() {
                    if !difference.can_execute_directly() {
                        difference.sync_action = SyncAction::Skip;
                    }
                }
            }

            if comparison.approved().is_empty() {
                tracing::warn!(
                    target_environment = %comparison.target,
                    "No differences approved for scripting"
                );
                continue;
            }

            let target = plan
                .targets
                .iter()
                .find(|target| target.environment == comparison.target)
                .ok_or_else(|| {
                    Error::Unknown(format!("Missing snapshot for '{}'", comparison.target))
                })?;

            let script = self.generate_sync_script(comparison, &plan.baseline, target)?;
            self.write_script(&script).await?;
            scripts.push(script);
        }

        Ok(scripts)
    }
}

/// Write `<target>.apply.sql` and, when present, `<target>.rollback.sql`
pub async fn write_script_files(directory: &Path, script: &SyncScript) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(directory).await?;

    let stem = sanitize_file_stem(&script.target);
    let mut written = Vec::new();

    let apply_path = directory.join(format!("{}.apply.sql", stem));
    tokio::fs::write(&apply_path, script.apply_script()).await?;
    written.push(apply_path);

    if let Some(rollback) = script.rollback_script() {
        let rollback_path = directory.join(format!("{}.rollback.sql", stem));
        tokio::fs::write(&rollback_path, rollback).await?;
        written.push(rollback_path);
    }

    tracing::info!(
        target_environment = %script.target,
        max_risk = %script.max_risk_level(),
        can_execute = script.can_execute(),
        files = written.len(),
        "Wrote sync script"
    );

    Ok(written)
}
