//! Schema difference calculator
//!
//! Compares two snapshots object by object and produces an ordered list of
//! differences. Nothing is ever proposed for removal: an object that exists on
//! only one side is reported as `Added`, whichever side holds it.
//!
//! Traversal order is tables (each followed by its columns, indexes and
//! constraints), then views, procedures, functions and triggers. Within each
//! collection, baseline objects come first in baseline order, followed by
//! target-only objects in target order.

use indexmap::IndexMap;

use crate::config::CompareOptions;
use crate::schema::difference::{Comparison, Difference, ObjectSide, Property, RiskLevel};
use crate::schema::risk::{classify_risk, ChangeContext};
use crate::schema::types::{
    normalize_definition, Column, Constraint, ConstraintKind, Index, ObjectKind, ProgramObject,
    ProgramObjectKind, Snapshot, Table, MAX_LENGTH,
};

/// Schema comparison engine
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: CompareOptions,
}

/// How an identity key matched across the two sides
enum Pairing<'a, T> {
    BaselineOnly(&'a T),
    TargetOnly(&'a T),
    Both(&'a T, &'a T),
}

/// Pair baseline and target objects by a case-insensitive identity key
fn pair_by_key<'a, T>(
    baseline: &'a [T],
    target: &'a [T],
    key: impl Fn(&T) -> String,
) -> Vec<Pairing<'a, T>> {
    let target_map: IndexMap<String, &T> =
        target.iter().map(|item| (key(item), item)).collect();
    let baseline_map: IndexMap<String, &T> =
        baseline.iter().map(|item| (key(item), item)).collect();

    let mut pairings: Vec<Pairing<'a, T>> = baseline_map
        .iter()
        .map(|(k, item)| match target_map.get(k) {
            Some(other) => Pairing::Both(*item, *other),
            None => Pairing::BaselineOnly(*item),
        })
        .collect();

    pairings.extend(
        target_map
            .iter()
            .filter(|(k, _)| !baseline_map.contains_key(*k))
            .map(|(_, item)| Pairing::TargetOnly(*item)),
    );

    pairings
}

fn flag(value: bool) -> Option<String> {
    Some(value.to_string())
}

fn length_text(length: Option<i32>) -> Option<String> {
    length.map(|l| if l == MAX_LENGTH { "max".to_string() } else { l.to_string() })
}

fn list_text(names: &[String]) -> Option<String> {
    Some(names.join(", "))
}

fn same_list(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let mut b: Vec<String> = b.iter().map(|s| s.to_lowercase()).collect();
    a.sort();
    b.sort();
    a == b
}

fn same_text(a: &Option<String>, b: &Option<String>) -> bool {
    let normalize =
        |value: &Option<String>| value.as_deref().map(|v| normalize_definition(v, false));
    normalize(a) == normalize(b)
}

fn referential_action(action: &Option<String>) -> String {
    action
        .as_deref()
        .map(|a| a.trim().to_uppercase())
        .unwrap_or_else(|| "NO ACTION".to_string())
}

impl DiffEngine {
    /// Create a new diff engine
    pub fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    /// Compare a target snapshot against a baseline
    pub fn compare(&self, baseline: &Snapshot, target: &Snapshot) -> Comparison {
        let mut pass = DiffPass {
            options: &self.options,
            baseline: &baseline.environment,
            target: &target.environment,
            differences: Vec::new(),
        };

        pass.diff_tables(&baseline.tables, &target.tables);
        for kind in ProgramObjectKind::ALL {
            pass.diff_program_objects(
                kind,
                baseline.program_objects(kind),
                target.program_objects(kind),
            );
        }

        let comparison =
            Comparison::new(&baseline.environment, &target.environment, pass.differences);
        let summary = comparison.risk_summary();

        tracing::info!(
            baseline_environment = %comparison.baseline,
            target_environment = %comparison.target,
            total = summary.total(),
            low = summary.low,
            medium = summary.medium,
            high = summary.high,
            forbidden = summary.forbidden,
            "Schema comparison complete"
        );

        comparison
    }

    /// Compare each target against the same baseline, in input order
    pub fn compare_many(&self, baseline: &Snapshot, targets: &[Snapshot]) -> Vec<Comparison> {
        targets.iter().map(|target| self.compare(baseline, target)).collect()
    }
}

/// State for one baseline/target comparison
struct DiffPass<'a> {
    options: &'a CompareOptions,
    baseline: &'a str,
    target: &'a str,
    differences: Vec<Difference>,
}

impl<'a> DiffPass<'a> {
    fn is_protected(&self, schema: &str) -> bool {
        self.options
            .protected_schemas
            .iter()
            .any(|protected| protected.eq_ignore_ascii_case(schema))
    }

    /// Classify, unless the object's schema is protected
    fn risk(&self, schema: &str, context: ChangeContext<'_>) -> RiskLevel {
        if self.is_protected(schema) {
            classify_risk(&ChangeContext::Disallowed { reason: "protected schema" })
        } else {
            classify_risk(&context)
        }
    }

    fn push(&mut self, difference: Difference) {
        match difference.risk_level {
            RiskLevel::High | RiskLevel::Forbidden => tracing::warn!(
                kind = %difference.object_kind,
                object = %difference.qualified_name(),
                risk = %difference.risk_level,
                "{}",
                difference.description
            ),
            RiskLevel::Low | RiskLevel::Medium => tracing::debug!(
                kind = %difference.object_kind,
                object = %difference.qualified_name(),
                risk = %difference.risk_level,
                "{}",
                difference.description
            ),
        }
        self.differences.push(difference);
    }

    fn push_added(
        &mut self,
        kind: ObjectKind,
        name: String,
        owner: Option<String>,
        side: ObjectSide,
        risk: RiskLevel,
    ) {
        let display = match &owner {
            Some(owner) => format!("{} on {}", name, owner),
            None => name.clone(),
        };
        let description = match side {
            ObjectSide::Target => format!(
                "{} {} exists only in target '{}', not in baseline '{}'",
                kind, display, self.target, self.baseline
            ),
            ObjectSide::Baseline | ObjectSide::Both => {
                format!("{} {} is missing from target '{}'", kind, display, self.target)
            }
        };

        self.push(Difference::added(kind, name, owner, side, risk, description));
    }

    #[allow(clippy::too_many_arguments)]
    fn push_modified(
        &mut self,
        kind: ObjectKind,
        name: &str,
        owner: Option<&str>,
        property: Property,
        source: Option<String>,
        target: Option<String>,
        risk: RiskLevel,
    ) {
        let description = format!(
            "{} {} {} differs: '{}' in baseline '{}', '{}' in target '{}'",
            kind,
            name,
            property,
            source.as_deref().unwrap_or("(none)"),
            self.baseline,
            target.as_deref().unwrap_or("(none)"),
            self.target
        );

        self.push(Difference::modified(
            kind,
            name.to_string(),
            owner.map(str::to_string),
            property,
            source,
            target,
            risk,
            description,
        ));
    }

    fn diff_tables(&mut self, baseline: &[Table], target: &[Table]) {
        for pairing in pair_by_key(baseline, target, Table::key) {
            match pairing {
                Pairing::BaselineOnly(table) => {
                    let context = ChangeContext::ObjectAdded { kind: ObjectKind::Table };
                    let risk = self.risk(&table.schema, context);
                    let name = table.full_name();
                    self.push_added(ObjectKind::Table, name, None, ObjectSide::Baseline, risk);
                }
                Pairing::TargetOnly(table) => {
                    let context = ChangeContext::ObjectAdded { kind: ObjectKind::Table };
                    let risk = self.risk(&table.schema, context);
                    let name = table.full_name();
                    self.push_added(ObjectKind::Table, name, None, ObjectSide::Target, risk);
                }
                Pairing::Both(source, target) => {
                    self.diff_columns(source, target);
                    self.diff_indexes(source, target);
                    self.diff_constraints(source, target);
                }
            }
        }
    }

    fn diff_columns(&mut self, source_table: &Table, target_table: &Table) {
        let owner = source_table.full_name();
        let schema = source_table.schema.as_str();

        let pairings = pair_by_key(&source_table.columns, &target_table.columns, |c| {
            c.name.to_lowercase()
        });
        for pairing in pairings {
            match pairing {
                Pairing::BaselineOnly(column) => {
                    let risk = self.risk(schema, ChangeContext::ColumnAdded { column });
                    self.push_added(
                        ObjectKind::Column,
                        column.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Baseline,
                        risk,
                    );
                }
                Pairing::TargetOnly(column) => {
                    let risk = self.risk(schema, ChangeContext::ColumnAdded { column });
                    self.push_added(
                        ObjectKind::Column,
                        column.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Target,
                        risk,
                    );
                }
                Pairing::Both(source, target) => self.diff_column(schema, &owner, source, target),
            }
        }
    }

    fn diff_column(&mut self, schema: &str, owner: &str, source: &Column, target: &Column) {
        let mut changes: Vec<(Property, Option<String>, Option<String>)> = Vec::new();

        if !source.same_base_type(target) {
            // Length, precision and scale belong to the type definition here
            changes.push((
                Property::DataType,
                Some(source.type_definition()),
                Some(target.type_definition()),
            ));
        } else {
            if source.max_length != target.max_length {
                changes.push((
                    Property::MaxLength,
                    length_text(source.max_length),
                    length_text(target.max_length),
                ));
            }
            if source.precision != target.precision {
                changes.push((
                    Property::Precision,
                    source.precision.map(|p| p.to_string()),
                    target.precision.map(|p| p.to_string()),
                ));
            }
            if source.scale != target.scale {
                changes.push((
                    Property::Scale,
                    source.scale.map(|s| s.to_string()),
                    target.scale.map(|s| s.to_string()),
                ));
            }
        }

        if source.nullable != target.nullable {
            changes.push((Property::IsNullable, flag(source.nullable), flag(target.nullable)));
        }
        if !same_text(&source.default_value, &target.default_value) {
            changes.push((
                Property::DefaultValue,
                source.default_value.clone(),
                target.default_value.clone(),
            ));
        }
        if source.is_identity != target.is_identity {
            changes.push((
                Property::IsIdentity,
                flag(source.is_identity),
                flag(target.is_identity),
            ));
        }

        for (property, source_value, target_value) in changes {
            let risk =
                self.risk(schema, ChangeContext::ColumnChanged { property, source, target });
            self.push_modified(
                ObjectKind::Column,
                &source.name,
                Some(owner),
                property,
                source_value,
                target_value,
                risk,
            );
        }
    }

    fn diff_indexes(&mut self, source_table: &Table, target_table: &Table) {
        let owner = source_table.full_name();
        let schema = source_table.schema.as_str();

        let pairings = pair_by_key(&source_table.indexes, &target_table.indexes, |i| {
            i.name.to_lowercase()
        });
        for pairing in pairings {
            match pairing {
                Pairing::BaselineOnly(index) => {
                    let context = ChangeContext::ObjectAdded { kind: ObjectKind::Index };
                    let risk = self.risk(schema, context);
                    self.push_added(
                        ObjectKind::Index,
                        index.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Baseline,
                        risk,
                    );
                }
                Pairing::TargetOnly(index) => {
                    let context = ChangeContext::ObjectAdded { kind: ObjectKind::Index };
                    let risk = self.risk(schema, context);
                    self.push_added(
                        ObjectKind::Index,
                        index.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Target,
                        risk,
                    );
                }
                Pairing::Both(source, target) => self.diff_index(schema, &owner, source, target),
            }
        }
    }

    fn diff_index(&mut self, schema: &str, owner: &str, source: &Index, target: &Index) {
        let mut changes: Vec<(Property, Option<String>, Option<String>)> = Vec::new();

        if source.is_clustered != target.is_clustered {
            changes.push((
                Property::IsClustered,
                flag(source.is_clustered),
                flag(target.is_clustered),
            ));
        }
        if source.is_unique != target.is_unique {
            changes.push((Property::IsUnique, flag(source.is_unique), flag(target.is_unique)));
        }
        if !same_list(&source.key_columns, &target.key_columns) {
            changes.push((
                Property::KeyColumns,
                list_text(&source.key_columns),
                list_text(&target.key_columns),
            ));
        }
        if !same_set(&source.include_columns, &target.include_columns) {
            changes.push((
                Property::IncludeColumns,
                list_text(&source.include_columns),
                list_text(&target.include_columns),
            ));
        }
        if !same_text(&source.filter, &target.filter) {
            changes.push((
                Property::FilterDefinition,
                source.filter.clone(),
                target.filter.clone(),
            ));
        }

        for (property, source_value, target_value) in changes {
            let risk =
                self.risk(schema, ChangeContext::IndexChanged { property, source, target });
            self.push_modified(
                ObjectKind::Index,
                &source.name,
                Some(owner),
                property,
                source_value,
                target_value,
                risk,
            );
        }
    }

    fn diff_constraints(&mut self, source_table: &Table, target_table: &Table) {
        let owner = source_table.full_name();
        let schema = source_table.schema.as_str();

        let pairings = pair_by_key(&source_table.constraints, &target_table.constraints, |c| {
            c.name.to_lowercase()
        });
        for pairing in pairings {
            match pairing {
                Pairing::BaselineOnly(constraint) => {
                    let risk = self.risk(schema, ChangeContext::ConstraintAdded { constraint });
                    self.push_added(
                        ObjectKind::Constraint,
                        constraint.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Baseline,
                        risk,
                    );
                }
                Pairing::TargetOnly(constraint) => {
                    let risk = self.risk(schema, ChangeContext::ConstraintAdded { constraint });
                    self.push_added(
                        ObjectKind::Constraint,
                        constraint.name.clone(),
                        Some(owner.clone()),
                        ObjectSide::Target,
                        risk,
                    );
                }
                Pairing::Both(source, target) => {
                    self.diff_constraint(schema, &owner, source, target)
                }
            }
        }
    }

    fn diff_constraint(
        &mut self,
        schema: &str,
        owner: &str,
        source: &Constraint,
        target: &Constraint,
    ) {
        let mut changes: Vec<(Property, Option<String>, Option<String>)> = Vec::new();

        if source.kind.keyword() != target.kind.keyword() {
            // Kind-specific fields are not comparable across kinds
            changes.push((
                Property::ConstraintType,
                Some(source.kind.keyword().to_string()),
                Some(target.kind.keyword().to_string()),
            ));
        } else {
            if !same_list(&source.columns, &target.columns) {
                changes.push((
                    Property::Columns,
                    list_text(&source.columns),
                    list_text(&target.columns),
                ));
            }

            match (&source.kind, &target.kind) {
                (
                    ConstraintKind::ForeignKey {
                        referenced_table: source_table,
                        referenced_columns: source_columns,
                        on_delete: source_delete,
                        on_update: source_update,
                    },
                    ConstraintKind::ForeignKey {
                        referenced_table: target_table,
                        referenced_columns: target_columns,
                        on_delete: target_delete,
                        on_update: target_update,
                    },
                ) => {
                    if !source_table.eq_ignore_ascii_case(target_table) {
                        changes.push((
                            Property::ReferencedTable,
                            Some(source_table.clone()),
                            Some(target_table.clone()),
                        ));
                    }
                    if !same_list(source_columns, target_columns) {
                        changes.push((
                            Property::ReferencedColumns,
                            list_text(source_columns),
                            list_text(target_columns),
                        ));
                    }
                    let source_delete = referential_action(source_delete);
                    let target_delete = referential_action(target_delete);
                    if source_delete != target_delete {
                        changes.push((
                            Property::OnDelete,
                            Some(source_delete),
                            Some(target_delete),
                        ));
                    }
                    let source_update = referential_action(source_update);
                    let target_update = referential_action(target_update);
                    if source_update != target_update {
                        changes.push((
                            Property::OnUpdate,
                            Some(source_update),
                            Some(target_update),
                        ));
                    }
                }
                (ConstraintKind::Check { definition: a }, ConstraintKind::Check { definition: b })
                | (
                    ConstraintKind::Default { definition: a },
                    ConstraintKind::Default { definition: b },
                ) => {
                    if normalize_definition(a, false) != normalize_definition(b, false) {
                        changes.push((Property::Definition, Some(a.clone()), Some(b.clone())));
                    }
                }
                _ => {}
            }
        }

        for (property, source_value, target_value) in changes {
            let context = ChangeContext::ConstraintChanged { property, source, target };
            let risk = self.risk(schema, context);
            self.push_modified(
                ObjectKind::Constraint,
                &source.name,
                Some(owner),
                property,
                source_value,
                target_value,
                risk,
            );
        }
    }

    fn diff_program_objects(
        &mut self,
        kind: ProgramObjectKind,
        baseline: &[ProgramObject],
        target: &[ProgramObject],
    ) {
        let object_kind = kind.object_kind();
        let strip_comments = self.options.strip_comments;

        for pairing in pair_by_key(baseline, target, ProgramObject::key) {
            match pairing {
                Pairing::BaselineOnly(object) => {
                    let context = ChangeContext::ObjectAdded { kind: object_kind };
                    let risk = self.risk(&object.schema, context);
                    let name = object.full_name();
                    self.push_added(object_kind, name, None, ObjectSide::Baseline, risk);
                }
                Pairing::TargetOnly(object) => {
                    let context = ChangeContext::ObjectAdded { kind: object_kind };
                    let risk = self.risk(&object.schema, context);
                    let name = object.full_name();
                    self.push_added(object_kind, name, None, ObjectSide::Target, risk);
                }
                Pairing::Both(source, target) => {
                    if source.normalized_definition(strip_comments)
                        == target.normalized_definition(strip_comments)
                    {
                        continue;
                    }
                    let context = ChangeContext::DefinitionChanged { kind: object_kind };
                    let risk = self.risk(&source.schema, context);
                    self.push_modified(
                        object_kind,
                        &source.full_name(),
                        None,
                        Property::Definition,
                        Some(source.definition_checksum(strip_comments)),
                        Some(target.definition_checksum(strip_comments)),
                        risk,
                    );
                }
            }
        }
    }
}

/// Compare two snapshots with default options
pub fn compare(baseline: &Snapshot, target: &Snapshot) -> Comparison {
    DiffEngine::default().compare(baseline, target)
}
