//! Sync script generator
//!
//! Turns differences into forward (apply) and reverse (rollback) script
//! fragments. Each fragment is generated from the difference plus the schema
//! object it refers to (the "subject"), and fails loudly for any kind or
//! property without a generation rule.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ScriptOptions;
use crate::error::{Error, Result};
use crate::schema::difference::{
    ChangeType, Comparison, Difference, ObjectSide, Property, RiskLevel,
};
use crate::schema::script::{ScriptFragment, Statement, SyncScript};
use crate::schema::types::{
    parse_type_definition, Column, Constraint, ConstraintKind, Index, ObjectKind, ProgramObject,
    ProgramObjectKind, Snapshot, Table, MAX_LENGTH,
};
use crate::utils::naming::{identity_key, parse_list};

static CREATE_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bCREATE\s+(?:OR\s+ALTER\s+)?(PROC(?:EDURE)?|VIEW|FUNCTION|TRIGGER)\b")
        .expect("valid regex")
});

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/|--[^\n]*").expect("valid regex"));

/// The schema object a difference refers to
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptSubject {
    Table(Table),
    Column(Column),
    Index(Index),
    Constraint(Constraint),
    ProgramObject(ProgramObject),
}

impl ScriptSubject {
    fn kind_name(&self) -> &'static str {
        match self {
            ScriptSubject::Table(_) => "table",
            ScriptSubject::Column(_) => "column",
            ScriptSubject::Index(_) => "index",
            ScriptSubject::Constraint(_) => "constraint",
            ScriptSubject::ProgramObject(_) => "program object",
        }
    }

    /// Copy with one property set from a stored difference value
    fn with_property(&self, property: Property, value: Option<&str>) -> Result<Self> {
        Ok(match self {
            ScriptSubject::Column(column) => {
                ScriptSubject::Column(with_column_property(column, property, value)?)
            }
            ScriptSubject::Index(index) => {
                ScriptSubject::Index(with_index_property(index, property, value)?)
            }
            ScriptSubject::Constraint(constraint) => {
                ScriptSubject::Constraint(with_constraint_property(constraint, property, value)?)
            }
            other => {
                return Err(Error::UnsupportedChange(format!(
                    "{} property {} cannot be scripted",
                    other.kind_name(),
                    property
                )))
            }
        })
    }
}

/// One difference with its subject, ready for batch generation
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptItem {
    pub difference: Difference,
    pub subject: ScriptSubject,
    pub owner_name: Option<String>,
}

impl ScriptItem {
    pub fn new(difference: Difference, subject: ScriptSubject, owner_name: Option<String>) -> Self {
        Self { difference, subject, owner_name }
    }

    /// Look up the subject of a difference in the snapshots it was computed from
    ///
    /// Added differences take the object from whichever side holds it;
    /// Modified differences take the target-side object.
    pub fn resolve(
        difference: &Difference,
        baseline: &Snapshot,
        target: &Snapshot,
    ) -> Result<Self> {
        let snapshot = match (difference.change_type, difference.side) {
            (ChangeType::Added, ObjectSide::Baseline) => baseline,
            (ChangeType::Added, _) | (ChangeType::Modified, _) => target,
        };

        let not_found = || {
            Error::SnapshotError(format!(
                "{} {} not found in snapshot '{}'",
                difference.object_kind,
                difference.qualified_name(),
                snapshot.environment
            ))
        };

        let owning_table = difference
            .owner_name
            .as_deref()
            .and_then(|owner| snapshot.find_table_by_full_name(owner));

        let subject = match difference.object_kind {
            ObjectKind::Table => ScriptSubject::Table(
                snapshot
                    .find_table_by_full_name(&difference.object_name)
                    .ok_or_else(not_found)?
                    .clone(),
            ),
            ObjectKind::Column => ScriptSubject::Column(
                owning_table
                    .ok_or_else(not_found)?
                    .find_column(&difference.object_name)
                    .ok_or_else(not_found)?
                    .clone(),
            ),
            ObjectKind::Index => ScriptSubject::Index(
                owning_table
                    .ok_or_else(not_found)?
                    .find_index(&difference.object_name)
                    .ok_or_else(not_found)?
                    .clone(),
            ),
            ObjectKind::Constraint => ScriptSubject::Constraint(
                owning_table
                    .ok_or_else(not_found)?
                    .find_constraint(&difference.object_name)
                    .ok_or_else(not_found)?
                    .clone(),
            ),
            ObjectKind::View
            | ObjectKind::Procedure
            | ObjectKind::Function
            | ObjectKind::Trigger => {
                let kind = ProgramObjectKind::from_object_kind(difference.object_kind)
                    .ok_or_else(not_found)?;
                ScriptSubject::ProgramObject(
                    snapshot
                        .find_program_object(kind, &difference.object_name)
                        .ok_or_else(not_found)?
                        .clone(),
                )
            }
        };

        Ok(Self::new(difference.clone(), subject, difference.owner_name.clone()))
    }

    /// Property rewritten in place on a column, index or constraint
    fn chained_property(&self) -> Option<Property> {
        let difference = &self.difference;
        let property = difference.property?;
        let subject_matches = matches!(
            (difference.object_kind, &self.subject),
            (ObjectKind::Column, ScriptSubject::Column(_))
                | (ObjectKind::Index, ScriptSubject::Index(_))
                | (ObjectKind::Constraint, ScriptSubject::Constraint(_))
        );

        (difference.change_type == ChangeType::Modified
            && subject_matches
            && difference.has_script_rule()
            && property != Property::ConstraintType)
            .then_some(property)
    }

    fn shape_key(&self) -> String {
        let kind = self.difference.object_kind.to_string();
        let owner = self
            .owner_name
            .as_deref()
            .or(self.difference.owner_name.as_deref())
            .unwrap_or_default();
        identity_key(&[kind.as_str(), owner, self.difference.object_name.as_str()])
    }
}

/// Shape of a subject before and after one property change
type Transition = (ScriptSubject, ScriptSubject);

/// Before/after shapes for every in-place property change of a batch
///
/// Changes to the same object are chained. The first starts from the subject
/// with the source value of every change applied, and each later one starts
/// where the previous one ended, so undoing them in reverse order restores
/// the original definition.
fn property_transitions(items: &[ScriptItem]) -> Result<Vec<Option<Transition>>> {
    let mut shapes: HashMap<String, ScriptSubject> = HashMap::new();

    for item in items {
        let Some(property) = item.chained_property() else {
            continue;
        };
        let shape = shapes.entry(item.shape_key()).or_insert_with(|| item.subject.clone());
        let original = shape.with_property(property, item.difference.source_value.as_deref())?;
        *shape = original;
    }

    let mut transitions = Vec::with_capacity(items.len());
    for item in items {
        let Some(property) = item.chained_property() else {
            transitions.push(None);
            continue;
        };
        let key = item.shape_key();
        let before = shapes.get(&key).cloned().unwrap_or_else(|| item.subject.clone());
        let after = before.with_property(property, item.difference.target_value.as_deref())?;
        shapes.insert(key, after.clone());
        transitions.push(Some((before, after)));
    }

    Ok(transitions)
}

/// Sync script generator
pub struct ScriptGenerator<'a> {
    options: &'a ScriptOptions,
}

impl<'a> ScriptGenerator<'a> {
    /// Create a new script generator
    pub fn new(options: &'a ScriptOptions) -> Self {
        Self { options }
    }

    /// Generate the script for a single difference
    pub fn generate_script(
        &self,
        difference: &Difference,
        subject: &ScriptSubject,
        owner_full_name: Option<&str>,
    ) -> Result<SyncScript> {
        let item = ScriptItem::new(
            difference.clone(),
            subject.clone(),
            owner_full_name.map(str::to_string),
        );
        let (apply, rollback) = self.generate_all(std::slice::from_ref(&item))?;

        Ok(SyncScript::new(
            &difference.qualified_name(),
            &self.options.batch_delimiter,
            apply,
            rollback,
            vec![difference.clone()],
        ))
    }

    /// Generate one script for many differences, in the order given
    ///
    /// Rollback fragments are emitted in reverse order so that later changes
    /// are undone first.
    pub fn generate_batch_script(
        &self,
        target_label: &str,
        items: &[ScriptItem],
    ) -> Result<SyncScript> {
        let (apply, rollback) = self.generate_all(items)?;

        tracing::info!(
            environment = target_label,
            differences = items.len(),
            apply_batches = apply.len(),
            rollback_batches = rollback.len(),
            "Generated sync script"
        );

        Ok(SyncScript::new(
            target_label,
            &self.options.batch_delimiter,
            apply,
            rollback,
            items.iter().map(|item| item.difference.clone()).collect(),
        ))
    }

    /// Generate a script for every difference of a comparison the caller has not skipped
    pub fn generate_for_comparison(
        &self,
        comparison: &Comparison,
        baseline: &Snapshot,
        target: &Snapshot,
    ) -> Result<SyncScript> {
        let items = comparison
            .approved()
            .into_iter()
            .map(|difference| ScriptItem::resolve(difference, baseline, target))
            .collect::<Result<Vec<_>>>()?;

        self.generate_batch_script(&comparison.target, &items)
    }

    fn generate_all(
        &self,
        items: &[ScriptItem],
    ) -> Result<(Vec<ScriptFragment>, Vec<ScriptFragment>)> {
        if let Some(item) = items
            .iter()
            .find(|item| item.difference.risk_level == RiskLevel::Forbidden)
        {
            return Err(Error::ForbiddenChange(format!(
                "{} {} is never scripted: {}",
                item.difference.object_kind,
                item.difference.qualified_name(),
                item.difference.description
            )));
        }

        let transitions = property_transitions(items)?;
        let mut apply = Vec::with_capacity(items.len());
        let mut rollback = Vec::new();

        for (item, transition) in items.iter().zip(&transitions) {
            let (forward, reverse) = self.generate_fragments(item, transition.as_ref())?;
            apply.push(forward);
            rollback.extend(reverse);
        }
        rollback.reverse();

        Ok((apply, rollback))
    }

    /// Forward fragment and, where one exists, its reverse
    fn generate_fragments(
        &self,
        item: &ScriptItem,
        transition: Option<&Transition>,
    ) -> Result<(ScriptFragment, Option<ScriptFragment>)> {
        let difference = &item.difference;
        let owner_full_name = item.owner_name.as_deref();

        let (forward, reverse) = match (difference.object_kind, &item.subject) {
            (ObjectKind::Table, ScriptSubject::Table(table)) => {
                table_statements(difference, table)?
            }
            (ObjectKind::Column, ScriptSubject::Column(column)) => {
                let owner = require_owner(difference, owner_full_name)?;
                column_statements(difference, column, owner, transition)?
            }
            (ObjectKind::Index, ScriptSubject::Index(index)) => {
                let owner = require_owner(difference, owner_full_name)?;
                index_statements(difference, index, owner, transition)?
            }
            (ObjectKind::Constraint, ScriptSubject::Constraint(constraint)) => {
                let owner = require_owner(difference, owner_full_name)?;
                constraint_statements(difference, constraint, owner, transition)?
            }
            (kind, ScriptSubject::ProgramObject(object)) if kind.is_program_object() => {
                program_object_statements(difference, object)?
            }
            (kind, subject) => {
                return Err(Error::SubjectMismatch(format!(
                    "{} difference {} was given a {} subject",
                    kind,
                    difference.qualified_name(),
                    subject.kind_name()
                )))
            }
        };

        let mut forward = ScriptFragment::new(forward);
        let mut reverse = match reverse {
            Some(statements) if self.options.include_rollback => {
                Some(ScriptFragment::new(statements))
            }
            _ => None,
        };

        if self.options.include_comments {
            forward = forward.with_comment(format!(
                "{} [{} risk]",
                difference.description, difference.risk_level
            ));
            reverse = reverse.map(|fragment| {
                fragment.with_comment(format!("Rollback: {}", difference.description))
            });
        }

        Ok((forward, reverse))
    }
}

type Statements = (Vec<Statement>, Option<Vec<Statement>>);

fn require_owner<'o>(
    difference: &'o Difference,
    owner_full_name: Option<&'o str>,
) -> Result<&'o str> {
    owner_full_name
        .or(difference.owner_name.as_deref())
        .ok_or_else(|| {
            Error::UnsupportedChange(format!(
                "{} {} has no owning table",
                difference.object_kind, difference.object_name
            ))
        })
}

fn unsupported(difference: &Difference) -> Error {
    Error::UnsupportedChange(format!(
        "no script rule for {:?} {} {}{}",
        difference.change_type,
        difference.object_kind,
        difference.qualified_name(),
        difference
            .property
            .map(|property| format!(" ({})", property))
            .unwrap_or_default()
    ))
}

/// `ADD CONSTRAINT`, refusing a DEFAULT that is not bound to exactly one column
fn add_constraint(table: &str, constraint: &Constraint) -> Result<Statement> {
    if matches!(constraint.kind, ConstraintKind::Default { .. }) && constraint.columns.len() != 1 {
        return Err(Error::UnsupportedChange(format!(
            "default constraint {} on {} must name exactly one column, found {}",
            constraint.name,
            table,
            constraint.columns.len()
        )));
    }
    Ok(Statement::AddConstraint { table: table.to_string(), constraint: constraint.clone() })
}

fn table_statements(difference: &Difference, table: &Table) -> Result<Statements> {
    match difference.change_type {
        ChangeType::Added => {
            let name = table.full_name();
            let mut forward = vec![Statement::CreateTable {
                table: name.clone(),
                columns: table.columns.clone(),
            }];
            for constraint in &table.constraints {
                forward.push(add_constraint(&name, constraint)?);
            }
            forward.extend(table.indexes.iter().map(|index| Statement::CreateIndex {
                table: name.clone(),
                index: index.clone(),
                drop_existing: false,
            }));
            Ok((forward, Some(vec![Statement::DropTable { table: name }])))
        }
        ChangeType::Modified => Err(unsupported(difference)),
    }
}

/// Drop the column's current default, then bind the shape's default if it has one
fn default_statements(table: &str, column: &Column) -> Vec<Statement> {
    let mut statements = vec![Statement::DropDefault {
        table: table.to_string(),
        column: column.name.clone(),
    }];
    if let Some(value) = &column.default_value {
        statements.push(Statement::AddDefault {
            table: table.to_string(),
            column: column.name.clone(),
            value: value.clone(),
        });
    }
    statements
}

fn column_statements(
    difference: &Difference,
    column: &Column,
    owner: &str,
    transition: Option<&Transition>,
) -> Result<Statements> {
    let table = owner.to_string();

    match (difference.change_type, difference.property, transition) {
        (ChangeType::Added, _, _) => Ok((
            vec![Statement::AddColumn { table: table.clone(), column: column.clone() }],
            Some(vec![Statement::DropColumn { table, column: column.name.clone() }]),
        )),
        (
            ChangeType::Modified,
            Some(Property::DefaultValue),
            Some((ScriptSubject::Column(before), ScriptSubject::Column(after))),
        ) => Ok((default_statements(&table, after), Some(default_statements(&table, before)))),
        (
            ChangeType::Modified,
            Some(_),
            Some((ScriptSubject::Column(before), ScriptSubject::Column(after))),
        ) => Ok((
            vec![Statement::AlterColumn { table: table.clone(), column: after.clone() }],
            Some(vec![Statement::AlterColumn { table, column: before.clone() }]),
        )),
        (ChangeType::Modified, _, _) => Err(unsupported(difference)),
    }
}

fn index_statements(
    difference: &Difference,
    index: &Index,
    owner: &str,
    transition: Option<&Transition>,
) -> Result<Statements> {
    let table = owner.to_string();

    match (difference.change_type, difference.property, transition) {
        (ChangeType::Added, _, _) => Ok((
            vec![Statement::CreateIndex {
                table: table.clone(),
                index: index.clone(),
                drop_existing: false,
            }],
            Some(vec![Statement::DropIndex { table, index: index.name.clone() }]),
        )),
        // DROP_EXISTING cannot change whether an index is clustered
        (
            ChangeType::Modified,
            Some(Property::IsClustered),
            Some((ScriptSubject::Index(before), ScriptSubject::Index(after))),
        ) => {
            let drop = Statement::DropIndex { table: table.clone(), index: index.name.clone() };
            Ok((
                vec![
                    drop.clone(),
                    Statement::CreateIndex {
                        table: table.clone(),
                        index: after.clone(),
                        drop_existing: false,
                    },
                ],
                Some(vec![
                    drop,
                    Statement::CreateIndex { table, index: before.clone(), drop_existing: false },
                ]),
            ))
        }
        (
            ChangeType::Modified,
            Some(_),
            Some((ScriptSubject::Index(before), ScriptSubject::Index(after))),
        ) => Ok((
            vec![Statement::CreateIndex {
                table: table.clone(),
                index: after.clone(),
                drop_existing: true,
            }],
            Some(vec![Statement::CreateIndex {
                table,
                index: before.clone(),
                drop_existing: true,
            }]),
        )),
        (ChangeType::Modified, _, _) => Err(unsupported(difference)),
    }
}

fn constraint_statements(
    difference: &Difference,
    constraint: &Constraint,
    owner: &str,
    transition: Option<&Transition>,
) -> Result<Statements> {
    let drop = Statement::DropConstraint {
        table: owner.to_string(),
        constraint: constraint.name.clone(),
    };

    match (difference.change_type, difference.property, transition) {
        (ChangeType::Added, _, _) => {
            Ok((vec![add_constraint(owner, constraint)?], Some(vec![drop])))
        }
        (ChangeType::Modified, Some(Property::ConstraintType), _) => {
            Ok((vec![drop, add_constraint(owner, constraint)?], None))
        }
        (
            ChangeType::Modified,
            Some(_),
            Some((ScriptSubject::Constraint(before), ScriptSubject::Constraint(after))),
        ) => Ok((
            vec![drop.clone(), add_constraint(owner, after)?],
            Some(vec![drop, add_constraint(owner, before)?]),
        )),
        (ChangeType::Modified, _, _) => Err(unsupported(difference)),
    }
}

fn program_object_statements(
    difference: &Difference,
    object: &ProgramObject,
) -> Result<Statements> {
    match difference.change_type {
        ChangeType::Added => Ok((
            vec![Statement::Definition { text: object.definition.clone() }],
            Some(vec![Statement::DropProgramObject {
                kind: object.kind,
                name: object.full_name(),
            }]),
        )),
        // The prior definition is not known here; callers supply their own rollback
        ChangeType::Modified => Ok((
            vec![Statement::Definition { text: alter_definition(object)? }],
            None,
        )),
    }
}

/// Rewrite the creation verb of a definition to its alter form
///
/// Occurrences inside comments are ignored.
pub fn alter_definition(object: &ProgramObject) -> Result<String> {
    let definition = object.definition.as_str();
    let comments: Vec<Range<usize>> = COMMENT_RE.find_iter(definition).map(|m| m.range()).collect();

    let found = CREATE_VERB_RE.captures_iter(definition).find_map(|captures| {
        let statement = captures.get(0)?;
        let verb = captures.get(1)?;
        let commented = comments.iter().any(|comment| comment.contains(&statement.start()));
        (!commented).then(|| (statement.range(), verb.as_str()))
    });

    let (range, verb) = found.ok_or_else(|| {
        Error::UnsupportedChange(format!(
            "definition of {} {} does not contain a CREATE statement",
            object.kind.keyword().to_lowercase(),
            object.full_name()
        ))
    })?;

    Ok(format!("{}ALTER {}{}", &definition[..range.start], verb, &definition[range.end..]))
}

fn parse_flag(property: Property, value: Option<&str>) -> Result<bool> {
    value
        .and_then(|v| v.trim().parse::<bool>().ok())
        .ok_or_else(|| Error::UnsupportedChange(format!("invalid {} value {:?}", property, value)))
}

fn parse_number<T: std::str::FromStr>(
    property: Property,
    value: Option<&str>,
) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| {
                Error::UnsupportedChange(format!("invalid {} value '{}'", property, v))
            })
        })
        .transpose()
}

/// Rebuild a column with one property set from a stored difference value
pub fn with_column_property(
    column: &Column,
    property: Property,
    value: Option<&str>,
) -> Result<Column> {
    let mut column = column.clone();

    match property {
        Property::DataType => {
            let text = value.ok_or_else(|| {
                Error::UnsupportedChange(format!(
                    "missing DataType value for column {}",
                    column.name
                ))
            })?;
            let definition = parse_type_definition(text)?;
            column.data_type = definition.data_type;
            column.max_length = definition.max_length;
            column.precision = definition.precision;
            column.scale = definition.scale;
        }
        Property::MaxLength => {
            column.max_length = match value {
                Some(v) if v.trim().eq_ignore_ascii_case("max") => Some(MAX_LENGTH),
                other => parse_number(property, other)?,
            };
        }
        Property::Precision => column.precision = parse_number(property, value)?,
        Property::Scale => column.scale = parse_number(property, value)?,
        Property::IsNullable => column.nullable = parse_flag(property, value)?,
        Property::DefaultValue => column.default_value = value.map(str::to_string),
        other => {
            return Err(Error::UnsupportedChange(format!(
                "column property {} cannot be scripted",
                other
            )))
        }
    }

    Ok(column)
}

/// Rebuild an index with one property set from a stored difference value
pub fn with_index_property(
    index: &Index,
    property: Property,
    value: Option<&str>,
) -> Result<Index> {
    let mut index = index.clone();

    match property {
        Property::IsClustered => index.is_clustered = parse_flag(property, value)?,
        Property::IsUnique => index.is_unique = parse_flag(property, value)?,
        Property::KeyColumns => index.key_columns = value.map(parse_list).unwrap_or_default(),
        Property::IncludeColumns => {
            index.include_columns = value.map(parse_list).unwrap_or_default()
        }
        Property::FilterDefinition => index.filter = value.map(str::to_string),
        other => {
            return Err(Error::UnsupportedChange(format!(
                "index property {} cannot be scripted",
                other
            )))
        }
    }

    Ok(index)
}

/// Rebuild a constraint with one property set from a stored difference value
pub fn with_constraint_property(
    constraint: &Constraint,
    property: Property,
    value: Option<&str>,
) -> Result<Constraint> {
    let mut constraint = constraint.clone();
    let invalid = || {
        Error::UnsupportedChange(format!("constraint property {} cannot be scripted", property))
    };

    match (&mut constraint.kind, property) {
        (_, Property::Columns) => constraint.columns = value.map(parse_list).unwrap_or_default(),
        (ConstraintKind::ForeignKey { referenced_table, .. }, Property::ReferencedTable) => {
            *referenced_table = value.ok_or_else(invalid)?.to_string();
        }
        (ConstraintKind::ForeignKey { referenced_columns, .. }, Property::ReferencedColumns) => {
            *referenced_columns = value.map(parse_list).unwrap_or_default();
        }
        (ConstraintKind::ForeignKey { on_delete, .. }, Property::OnDelete) => {
            *on_delete = value.map(str::to_string);
        }
        (ConstraintKind::ForeignKey { on_update, .. }, Property::OnUpdate) => {
            *on_update = value.map(str::to_string);
        }
        (
            ConstraintKind::Check { definition } | ConstraintKind::Default { definition },
            Property::Definition,
        ) => {
            *definition = value.ok_or_else(invalid)?.to_string();
        }
        _ => return Err(invalid()),
    }

    Ok(constraint)
}
