//! Snapshot loading
//!
//! The live catalog collector is a separate component. It hands its output to
//! this crate through a [`SnapshotSource`]; [`FileSnapshotSource`] reads the
//! snapshot files such a collector exports.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schema::types::Snapshot;

/// Anything that can produce a snapshot for a named environment
#[async_trait]
pub trait SnapshotSource {
    /// Load the snapshot of one environment
    async fn load(&self, environment: &str) -> Result<Snapshot>;

    /// Environment labels this source knows about, in a stable order
    fn environments(&self) -> Vec<String>;
}

/// Snapshot files on disk, keyed by environment label
#[derive(Debug, Clone, Default)]
pub struct FileSnapshotSource {
    files: IndexMap<String, PathBuf>,
}

impl FileSnapshotSource {
    /// Create a source over explicit environment → file mappings
    pub fn new(files: IndexMap<String, PathBuf>) -> Self {
        Self { files }
    }

    /// Register one more environment file
    pub fn insert(&mut self, environment: &str, path: impl Into<PathBuf>) {
        self.files.insert(environment.to_string(), path.into());
    }

    /// Add every file matching a glob pattern, labelled by its file stem
    ///
    /// Explicitly configured environments win over discovered ones.
    pub fn discover(&mut self, pattern: &str) -> Result<usize> {
        let paths = glob::glob(pattern).map_err(|e| {
            Error::ConfigError(format!("Invalid snapshot glob '{}': {}", pattern, e))
        })?;

        let mut added = 0;
        for entry in paths {
            let path = entry.map_err(|e| Error::IoError(e.into_error()))?;
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.files.contains_key(stem) {
                tracing::debug!(
                    environment = stem,
                    path = %path.display(),
                    "Discovered snapshot file"
                );
                self.files.insert(stem.to_string(), path.clone());
                added += 1;
            }
        }

        Ok(added)
    }

    pub fn path(&self, environment: &str) -> Option<&Path> {
        self.files.get(environment).map(PathBuf::as_path)
    }
}

/// Parse snapshot text according to the file extension
pub fn parse_snapshot(path: &Path, contents: &str) -> Result<Snapshot> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let snapshot: Snapshot = match extension.as_str() {
        "json" => serde_json::from_str(contents)?,
        "yaml" | "yml" => serde_yaml::from_str(contents)?,
        "toml" => toml::from_str(contents)
            .map_err(|e| Error::SerializationError(format!("{}: {}", path.display(), e)))?,
        other => {
            return Err(Error::SnapshotError(format!(
                "Unsupported snapshot format '{}' for {}",
                other,
                path.display()
            )))
        }
    };

    snapshot.validate()?;
    Ok(snapshot)
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn load(&self, environment: &str) -> Result<Snapshot> {
        let path = self.path(environment).ok_or_else(|| {
            Error::SnapshotError(format!(
                "No snapshot file configured for environment '{}'",
                environment
            ))
        })?;

        let contents = tokio::fs::read_to_string(path).await?;
        let mut snapshot = parse_snapshot(path, &contents)?;

        if snapshot.environment.trim().is_empty() {
            snapshot.environment = environment.to_string();
        } else if snapshot.environment != environment {
            tracing::warn!(
                configured = environment,
                captured = %snapshot.environment,
                "Snapshot environment label differs from configured label"
            );
        }

        tracing::info!(
            environment = %snapshot.environment,
            tables = snapshot.tables.len(),
            captured_at = %snapshot.captured_at,
            "Loaded snapshot"
        );

        Ok(snapshot)
    }

    fn environments(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}
