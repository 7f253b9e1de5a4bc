//! Schema module for schema_promote
//!
//! This module holds the snapshot model, the diff engine, the risk policy and
//! the sync script generator.

pub mod comparator;
pub mod diff;
pub mod difference;
pub mod generator;
pub mod loader;
pub mod risk;
pub mod script;
pub mod types;

// Re-export key types
pub use comparator::MultiEnvironmentComparator;
pub use diff::DiffEngine;
pub use difference::{
    ChangeType, Comparison, Difference, ObjectSide, Property, RiskLevel, RiskSummary, SyncAction,
};
pub use generator::{ScriptGenerator, ScriptItem, ScriptSubject};
pub use loader::{FileSnapshotSource, SnapshotSource};
pub use risk::{classify_risk, ChangeContext, RiskClassifier};
pub use script::{ScriptFragment, Statement, SyncScript, BATCH_DELIMITER};
pub use types::{
    Column, Constraint, ConstraintKind, Index, ObjectKind, ProgramObject, ProgramObjectKind,
    Snapshot, Table,
};
