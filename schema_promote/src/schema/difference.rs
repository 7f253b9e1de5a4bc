//! Difference and comparison model
//!
//! A [`Difference`] is one structural delta between a baseline and a target
//! snapshot. A [`Comparison`] is the ordered list of differences the engine
//! produced for one baseline/target pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::schema::types::ObjectKind;
use crate::utils::naming::quote_identifier;

/// Add/modify classification. There is no removal variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
}

/// How safe a change is to apply unattended
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Forbidden,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Forbidden,
    ];

    /// Low and Medium changes may run without a DBA reviewing them
    pub fn is_executable(&self) -> bool {
        matches!(self, RiskLevel::Low | RiskLevel::Medium)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Forbidden => "Forbidden",
        };
        f.write_str(name)
    }
}

/// What the caller intends to do with a difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncAction {
    #[default]
    Skip,
    Execute,
    ExportScriptOnly,
}

/// Which snapshot holds the object an Added difference refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectSide {
    Baseline,
    Target,
    Both,
}

/// Name of a compared property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    DataType,
    MaxLength,
    Precision,
    Scale,
    IsNullable,
    DefaultValue,
    IsIdentity,
    IsClustered,
    IsUnique,
    KeyColumns,
    IncludeColumns,
    FilterDefinition,
    ConstraintType,
    Columns,
    ReferencedTable,
    ReferencedColumns,
    OnDelete,
    OnUpdate,
    Definition,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::DataType => "DataType",
            Property::MaxLength => "MaxLength",
            Property::Precision => "Precision",
            Property::Scale => "Scale",
            Property::IsNullable => "IsNullable",
            Property::DefaultValue => "DefaultValue",
            Property::IsIdentity => "IsIdentity",
            Property::IsClustered => "IsClustered",
            Property::IsUnique => "IsUnique",
            Property::KeyColumns => "KeyColumns",
            Property::IncludeColumns => "IncludeColumns",
            Property::FilterDefinition => "FilterDefinition",
            Property::ConstraintType => "ConstraintType",
            Property::Columns => "Columns",
            Property::ReferencedTable => "ReferencedTable",
            Property::ReferencedColumns => "ReferencedColumns",
            Property::OnDelete => "OnDelete",
            Property::OnUpdate => "OnUpdate",
            Property::Definition => "Definition",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural delta between baseline and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub object_kind: ObjectKind,
    /// Object name; full `[schema].[name]` for tables and program objects
    pub object_name: String,
    /// Owning table's full name for columns, indexes and constraints
    pub owner_name: Option<String>,
    pub change_type: ChangeType,
    pub side: ObjectSide,
    pub risk_level: RiskLevel,
    pub property: Option<Property>,
    pub source_value: Option<String>,
    pub target_value: Option<String>,
    pub description: String,
    #[serde(default)]
    pub sync_action: SyncAction,
}

impl Difference {
    /// Difference for an object that exists on one side only
    pub fn added(
        object_kind: ObjectKind,
        object_name: String,
        owner_name: Option<String>,
        side: ObjectSide,
        risk_level: RiskLevel,
        description: String,
    ) -> Self {
        Self {
            object_kind,
            object_name,
            owner_name,
            change_type: ChangeType::Added,
            side,
            risk_level,
            property: None,
            source_value: None,
            target_value: None,
            description,
            sync_action: SyncAction::Skip,
        }
    }

    /// Difference for one property that differs between both sides
    #[allow(clippy::too_many_arguments)]
    pub fn modified(
        object_kind: ObjectKind,
        object_name: String,
        owner_name: Option<String>,
        property: Property,
        source_value: Option<String>,
        target_value: Option<String>,
        risk_level: RiskLevel,
        description: String,
    ) -> Self {
        Self {
            object_kind,
            object_name,
            owner_name,
            change_type: ChangeType::Modified,
            side: ObjectSide::Both,
            risk_level,
            property: Some(property),
            source_value,
            target_value,
            description,
            sync_action: SyncAction::Skip,
        }
    }

    /// Only Low and Medium risk differences may be executed directly
    pub fn can_execute_directly(&self) -> bool {
        self.risk_level.is_executable()
    }

    /// Whether the script generator has a rule for this kind of change
    pub fn has_script_rule(&self) -> bool {
        let property = match (self.change_type, self.property) {
            (ChangeType::Added, _) => return true,
            (ChangeType::Modified, Some(property)) => property,
            (ChangeType::Modified, None) => return false,
        };

        match self.object_kind {
            ObjectKind::Table => false,
            ObjectKind::Column => matches!(
                property,
                Property::DataType
                    | Property::MaxLength
                    | Property::Precision
                    | Property::Scale
                    | Property::IsNullable
                    | Property::DefaultValue
            ),
            ObjectKind::Index => matches!(
                property,
                Property::IsClustered
                    | Property::IsUnique
                    | Property::KeyColumns
                    | Property::IncludeColumns
                    | Property::FilterDefinition
            ),
            ObjectKind::Constraint => matches!(
                property,
                Property::ConstraintType
                    | Property::Columns
                    | Property::ReferencedTable
                    | Property::ReferencedColumns
                    | Property::OnDelete
                    | Property::OnUpdate
                    | Property::Definition
            ),
            ObjectKind::View
            | ObjectKind::Procedure
            | ObjectKind::Function
            | ObjectKind::Trigger => property == Property::Definition,
        }
    }

    /// Name including the owner, e.g. `[dbo].[Users].[Email]`
    pub fn qualified_name(&self) -> String {
        match &self.owner_name {
            Some(owner) => format!("{}.{}", owner, quote_identifier(&self.object_name)),
            None => self.object_name.clone(),
        }
    }
}

/// Number of differences per risk level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub forbidden: usize,
}

impl RiskSummary {
    pub fn from_differences<'a>(differences: impl IntoIterator<Item = &'a Difference>) -> Self {
        let mut summary = Self::default();
        for difference in differences {
            match difference.risk_level {
                RiskLevel::Low => summary.low += 1,
                RiskLevel::Medium => summary.medium += 1,
                RiskLevel::High => summary.high += 1,
                RiskLevel::Forbidden => summary.forbidden += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.forbidden
    }

    pub fn count(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Forbidden => self.forbidden,
        }
    }
}

/// Result of comparing one target against a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub id: Uuid,
    pub baseline: String,
    pub target: String,
    pub compared_at: DateTime<Utc>,
    pub differences: Vec<Difference>,
}

impl Comparison {
    pub fn new(baseline: &str, target: &str, differences: Vec<Difference>) -> Self {
        Self {
            id: Uuid::new_v4(),
            baseline: baseline.to_string(),
            target: target.to_string(),
            compared_at: Utc::now(),
            differences,
        }
    }

    pub fn has_differences(&self) -> bool {
        !self.differences.is_empty()
    }

    pub fn risk_summary(&self) -> RiskSummary {
        RiskSummary::from_differences(&self.differences)
    }

    /// Highest risk among the differences, `None` when there are none
    pub fn max_risk_level(&self) -> Option<RiskLevel> {
        self.differences.iter().map(|d| d.risk_level).max()
    }

    pub fn by_risk(&self, level: RiskLevel) -> Vec<&Difference> {
        self.differences.iter().filter(|d| d.risk_level == level).collect()
    }

    pub fn by_kind(&self, kind: ObjectKind) -> Vec<&Difference> {
        self.differences.iter().filter(|d| d.object_kind == kind).collect()
    }

    pub fn executable(&self) -> Vec<&Difference> {
        self.differences.iter().filter(|d| d.can_execute_directly()).collect()
    }

    pub fn requiring_review(&self) -> Vec<&Difference> {
        self.differences.iter().filter(|d| !d.can_execute_directly()).collect()
    }

    /// Differences ordered highest risk first; traversal order breaks ties
    pub fn sorted_by_risk(&self) -> Vec<&Difference> {
        let mut sorted: Vec<&Difference> = self.differences.iter().collect();
        sorted.sort_by(|a, b| b.risk_level.cmp(&a.risk_level));
        sorted
    }

    /// Mutable access for toggling sync actions during approval
    pub fn differences_mut(&mut self) -> &mut [Difference] {
        &mut self.differences
    }

    /// Mark Low/Medium differences for execution and High ones for export only
    ///
    /// Forbidden differences and changes without a script rule stay skipped.
    pub fn approve_executable(&mut self) {
        for difference in &mut self.differences {
            difference.sync_action = if difference.risk_level == RiskLevel::Forbidden
                || !difference.has_script_rule()
            {
                SyncAction::Skip
            } else if difference.can_execute_directly() {
                SyncAction::Execute
            } else {
                SyncAction::ExportScriptOnly
            };
        }
    }

    /// Differences the caller has not skipped
    pub fn approved(&self) -> Vec<&Difference> {
        self.differences
            .iter()
            .filter(|d| d.sync_action != SyncAction::Skip)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn difference(kind: ObjectKind, risk_level: RiskLevel) -> Difference {
        Difference::added(
            kind,
            "Email".to_string(),
            Some("[dbo].[Users]".to_string()),
            ObjectSide::Baseline,
            risk_level,
            "missing from target".to_string(),
        )
    }

    #[test]
    fn can_execute_directly_only_for_low_and_medium() {
        assert!(difference(ObjectKind::Column, RiskLevel::Low).can_execute_directly());
        assert!(difference(ObjectKind::Column, RiskLevel::Medium).can_execute_directly());
        assert!(!difference(ObjectKind::Column, RiskLevel::High).can_execute_directly());
        assert!(!difference(ObjectKind::Column, RiskLevel::Forbidden).can_execute_directly());
    }

    #[test]
    fn new_differences_default_to_skip() {
        assert_eq!(difference(ObjectKind::Index, RiskLevel::Low).sync_action, SyncAction::Skip);
    }

    #[test]
    fn summary_and_filters() {
        let mut comparison = Comparison::new(
            "dev",
            "prod",
            vec![
                difference(ObjectKind::Column, RiskLevel::Low),
                difference(ObjectKind::Index, RiskLevel::High),
                difference(ObjectKind::Column, RiskLevel::Medium),
            ],
        );

        let summary = comparison.risk_summary();
        assert_eq!((summary.low, summary.medium, summary.high, summary.forbidden), (1, 1, 1, 0));
        assert_eq!(summary.total(), 3);
        assert_eq!(comparison.by_kind(ObjectKind::Column).len(), 2);
        assert_eq!(comparison.by_risk(RiskLevel::High).len(), 1);
        assert_eq!(comparison.executable().len(), 2);
        assert_eq!(comparison.max_risk_level(), Some(RiskLevel::High));
        assert_eq!(comparison.sorted_by_risk()[0].risk_level, RiskLevel::High);

        comparison.approve_executable();
        assert_eq!(comparison.differences[0].sync_action, SyncAction::Execute);
        assert_eq!(comparison.differences[1].sync_action, SyncAction::ExportScriptOnly);
        assert_eq!(comparison.approved().len(), 3);
    }

    #[test]
    fn approval_leaves_forbidden_and_unscriptable_changes_skipped() {
        let identity = Difference::modified(
            ObjectKind::Column,
            "Id".to_string(),
            Some("[dbo].[Users]".to_string()),
            Property::IsIdentity,
            Some("true".to_string()),
            Some("false".to_string()),
            RiskLevel::Medium,
            "identity changed".to_string(),
        );
        let default_value = Difference::modified(
            ObjectKind::Column,
            "Active".to_string(),
            Some("[dbo].[Users]".to_string()),
            Property::DefaultValue,
            Some("(1)".to_string()),
            Some("(0)".to_string()),
            RiskLevel::Low,
            "default changed".to_string(),
        );
        let mut comparison = Comparison::new(
            "dev",
            "prod",
            vec![
                difference(ObjectKind::Table, RiskLevel::Forbidden),
                identity,
                default_value,
            ],
        );

        comparison.approve_executable();

        let actions: Vec<SyncAction> =
            comparison.differences.iter().map(|d| d.sync_action).collect();
        assert_eq!(actions, vec![SyncAction::Skip, SyncAction::Skip, SyncAction::Execute]);
        assert_eq!(comparison.approved().len(), 1);
    }

    #[test]
    fn qualified_name_includes_owner() {
        assert_eq!(
            difference(ObjectKind::Column, RiskLevel::Low).qualified_name(),
            "[dbo].[Users].[Email]"
        );
    }
}
