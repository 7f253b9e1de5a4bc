//! Risk classification policy
//!
//! [`classify_risk`] maps a proposed change to a [`RiskLevel`]. It is a pure
//! function of its context: no I/O, no configuration. Every branch that cannot
//! prove a change safe falls through to `High`.

use crate::schema::difference::{Property, RiskLevel};
use crate::schema::types::{Column, Constraint, ConstraintKind, Index, ObjectKind, MAX_LENGTH};

/// Type changes that can always hold every value of the source type
const WIDENING_CONVERSIONS: &[(&str, &str)] = &[
    ("bit", "tinyint"),
    ("bit", "smallint"),
    ("bit", "int"),
    ("bit", "bigint"),
    ("tinyint", "smallint"),
    ("tinyint", "int"),
    ("tinyint", "bigint"),
    ("smallint", "int"),
    ("smallint", "bigint"),
    ("int", "bigint"),
    ("real", "float"),
    ("smallmoney", "money"),
    ("smalldatetime", "datetime"),
    ("smalldatetime", "datetime2"),
    ("datetime", "datetime2"),
    ("date", "datetime2"),
    ("char", "varchar"),
    ("char", "nchar"),
    ("char", "nvarchar"),
    ("nchar", "nvarchar"),
    ("varchar", "nvarchar"),
    ("binary", "varbinary"),
];

/// What is being changed, with the objects needed to judge it
#[derive(Debug, Clone, Copy)]
pub enum ChangeContext<'a> {
    /// A table, index or program object present on one side only
    ObjectAdded { kind: ObjectKind },
    ColumnAdded { column: &'a Column },
    ConstraintAdded { constraint: &'a Constraint },
    ColumnChanged { property: Property, source: &'a Column, target: &'a Column },
    IndexChanged { property: Property, source: &'a Index, target: &'a Index },
    ConstraintChanged { property: Property, source: &'a Constraint, target: &'a Constraint },
    /// Whole-definition change of a view, procedure, function or trigger
    DefinitionChanged { kind: ObjectKind },
    /// An upstream rule refuses to script this change
    Disallowed { reason: &'a str },
}

/// Risk classifier
pub struct RiskClassifier;

impl RiskClassifier {
    /// Classify a change
    pub fn classify(context: &ChangeContext<'_>) -> RiskLevel {
        classify_risk(context)
    }
}

/// Map a proposed change to its risk level
pub fn classify_risk(context: &ChangeContext<'_>) -> RiskLevel {
    match context {
        ChangeContext::ObjectAdded { kind } => classify_added_object(*kind),
        ChangeContext::ColumnAdded { column } => classify_added_column(column),
        ChangeContext::ConstraintAdded { constraint } => match constraint.kind {
            ConstraintKind::Default { .. } => RiskLevel::Low,
            // Existing rows may violate the new rule
            ConstraintKind::PrimaryKey
            | ConstraintKind::Unique
            | ConstraintKind::ForeignKey { .. }
            | ConstraintKind::Check { .. } => RiskLevel::Medium,
        },
        ChangeContext::ColumnChanged { property, source, target } => {
            classify_column_change(*property, source, target)
        }
        ChangeContext::IndexChanged { property, source, target } => {
            classify_index_change(*property, source, target)
        }
        ChangeContext::ConstraintChanged { property, source, .. } => {
            classify_constraint_change(*property, source)
        }
        ChangeContext::DefinitionChanged { kind } => match kind {
            ObjectKind::View | ObjectKind::Procedure | ObjectKind::Function => RiskLevel::Low,
            ObjectKind::Trigger => RiskLevel::Medium,
            _ => RiskLevel::High,
        },
        ChangeContext::Disallowed { .. } => RiskLevel::Forbidden,
    }
}

fn classify_added_object(kind: ObjectKind) -> RiskLevel {
    match kind {
        ObjectKind::Table | ObjectKind::Index => RiskLevel::Low,
        ObjectKind::View | ObjectKind::Procedure | ObjectKind::Function => RiskLevel::Low,
        // Triggers change the behaviour of every write to their table
        ObjectKind::Trigger => RiskLevel::Medium,
        ObjectKind::Column | ObjectKind::Constraint => RiskLevel::High,
    }
}

fn classify_added_column(column: &Column) -> RiskLevel {
    if column.nullable {
        RiskLevel::Low
    } else if column.default_value.is_some() || column.is_identity {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn classify_column_change(property: Property, source: &Column, target: &Column) -> RiskLevel {
    match property {
        Property::DataType => {
            if is_widening_conversion(source, target) {
                RiskLevel::Medium
            } else {
                RiskLevel::High
            }
        }
        Property::MaxLength => classify_length_change(source.max_length, target.max_length),
        Property::Precision | Property::Scale => classify_numeric_change(source, target),
        Property::IsNullable => {
            if !source.nullable && target.nullable {
                RiskLevel::Low
            } else if target.default_value.is_some() {
                RiskLevel::Medium
            } else {
                RiskLevel::High
            }
        }
        Property::DefaultValue => {
            if target.default_value.is_some() {
                RiskLevel::Low
            } else {
                RiskLevel::Medium
            }
        }
        Property::IsIdentity => RiskLevel::High,
        _ => RiskLevel::High,
    }
}

/// Widening (or gaining a length limit from none) is Low, narrowing is High
fn classify_length_change(source: Option<i32>, target: Option<i32>) -> RiskLevel {
    let effective = |length: i32| if length == MAX_LENGTH { i64::MAX } else { i64::from(length) };

    match (source, target) {
        (None, _) => RiskLevel::Low,
        (Some(_), None) => RiskLevel::High,
        (Some(source), Some(target)) => {
            if effective(target) >= effective(source) {
                RiskLevel::Low
            } else {
                RiskLevel::High
            }
        }
    }
}

/// Low only when neither the integer digits nor the fractional digits shrink
fn classify_numeric_change(source: &Column, target: &Column) -> RiskLevel {
    let (Some(source_precision), Some(target_precision)) = (source.precision, target.precision)
    else {
        return match source.precision {
            None => RiskLevel::Low,
            Some(_) => RiskLevel::High,
        };
    };

    let source_scale = i32::from(source.scale.unwrap_or(0));
    let target_scale = i32::from(target.scale.unwrap_or(0));
    let source_integer_digits = i32::from(source_precision) - source_scale;
    let target_integer_digits = i32::from(target_precision) - target_scale;

    if target_scale >= source_scale && target_integer_digits >= source_integer_digits {
        RiskLevel::Low
    } else {
        RiskLevel::High
    }
}

/// Whether every value of the source column's type fits the target column's type
pub fn is_widening_conversion(source: &Column, target: &Column) -> bool {
    let from = source.data_type.trim().to_lowercase();
    let to = target.data_type.trim().to_lowercase();

    if !WIDENING_CONVERSIONS.contains(&(from.as_str(), to.as_str())) {
        return false;
    }

    match (source.max_length, target.max_length) {
        (_, None) => target_type_is_unbounded(&to, source.max_length),
        (None, Some(_)) => false,
        (Some(s), Some(t)) => classify_length_change(Some(s), Some(t)) == RiskLevel::Low,
    }
}

/// Non-string targets carry no length; string targets without one default to 1
fn target_type_is_unbounded(target_type: &str, source_length: Option<i32>) -> bool {
    match target_type {
        "char" | "nchar" | "varchar" | "nvarchar" | "binary" | "varbinary" => {
            source_length.map_or(false, |length| length != MAX_LENGTH && length <= 1)
        }
        _ => true,
    }
}

fn classify_index_change(property: Property, source: &Index, target: &Index) -> RiskLevel {
    match property {
        Property::IsUnique => {
            if source.is_unique && !target.is_unique {
                RiskLevel::Low
            } else {
                // Fails when duplicates already exist
                RiskLevel::High
            }
        }
        Property::IsClustered => RiskLevel::High,
        Property::KeyColumns | Property::FilterDefinition => RiskLevel::Medium,
        Property::IncludeColumns => RiskLevel::Low,
        _ => RiskLevel::High,
    }
}

fn classify_constraint_change(property: Property, source: &Constraint) -> RiskLevel {
    match property {
        Property::OnDelete | Property::OnUpdate => RiskLevel::Medium,
        Property::Definition => match source.kind {
            ConstraintKind::Default { .. } => RiskLevel::Low,
            _ => RiskLevel::High,
        },
        Property::ConstraintType
        | Property::Columns
        | Property::ReferencedTable
        | Property::ReferencedColumns => RiskLevel::High,
        _ => RiskLevel::High,
    }
}
