//! Type definitions for database snapshots
//!
//! A [`Snapshot`] is the captured structure of one environment at one instant.
//! Collections are never null: the deserialization boundary turns missing or
//! `null` lists into empty ones, and [`Snapshot::validate`] rejects duplicate
//! identities before the diff engine ever sees the value.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::naming::{check_identifier_conflicts, full_name, identity_key};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static BLOCK_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)--.*$").expect("valid regex"));
static TYPE_DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*(?:\(\s*([^)]*?)\s*\))?\s*$")
        .expect("valid regex")
});

/// Length value collectors use for `(max)` columns
pub const MAX_LENGTH: i32 = -1;

/// Deserialize `null` as the type's default value
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_nullable() -> bool {
    true
}

/// Kind of schema object a difference refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    Constraint,
    View,
    Procedure,
    Function,
    Trigger,
}

impl ObjectKind {
    /// Whether this kind is a definition-text object
    pub fn is_program_object(&self) -> bool {
        matches!(
            self,
            ObjectKind::View | ObjectKind::Procedure | ObjectKind::Function | ObjectKind::Trigger
        )
    }

    /// Whether objects of this kind live inside a table
    pub fn is_table_child(&self) -> bool {
        matches!(self, ObjectKind::Column | ObjectKind::Index | ObjectKind::Constraint)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Table => "Table",
            ObjectKind::Column => "Column",
            ObjectKind::Index => "Index",
            ObjectKind::Constraint => "Constraint",
            ObjectKind::View => "View",
            ObjectKind::Procedure => "Procedure",
            ObjectKind::Function => "Function",
            ObjectKind::Trigger => "Trigger",
        };
        f.write_str(name)
    }
}

/// Represents one database's structure at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub environment: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub database_name: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tables: Vec<Table>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub views: Vec<ProgramObject>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedures: Vec<ProgramObject>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub functions: Vec<ProgramObject>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub triggers: Vec<ProgramObject>,
}

impl Snapshot {
    /// Create a new empty snapshot captured now
    pub fn new(environment: &str, server_name: &str, database_name: &str) -> Self {
        Self {
            environment: environment.to_string(),
            server_name: server_name.to_string(),
            database_name: database_name.to_string(),
            captured_at: Utc::now(),
            tables: Vec::new(),
            views: Vec::new(),
            procedures: Vec::new(),
            functions: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Add a table to the snapshot
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Add a program object to the collection matching its kind
    pub fn with_program_object(mut self, object: ProgramObject) -> Self {
        match object.kind {
            ProgramObjectKind::View => self.views.push(object),
            ProgramObjectKind::Procedure => self.procedures.push(object),
            ProgramObjectKind::Function => self.functions.push(object),
            ProgramObjectKind::Trigger => self.triggers.push(object),
        }
        self
    }

    /// Find a table by schema and name, case-insensitively
    pub fn find_table(&self, schema: &str, name: &str) -> Option<&Table> {
        let key = identity_key(&[schema, name]);
        self.tables.iter().find(|table| table.key() == key)
    }

    /// Find a table by its rendered `[schema].[name]`
    pub fn find_table_by_full_name(&self, full: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|table| table.full_name().eq_ignore_ascii_case(full))
    }

    /// Program objects of one kind
    pub fn program_objects(&self, kind: ProgramObjectKind) -> &[ProgramObject] {
        match kind {
            ProgramObjectKind::View => &self.views,
            ProgramObjectKind::Procedure => &self.procedures,
            ProgramObjectKind::Function => &self.functions,
            ProgramObjectKind::Trigger => &self.triggers,
        }
    }

    /// Find a program object by kind and its rendered full name
    pub fn find_program_object(
        &self,
        kind: ProgramObjectKind,
        full: &str,
    ) -> Option<&ProgramObject> {
        self.program_objects(kind)
            .iter()
            .find(|object| object.full_name().eq_ignore_ascii_case(full))
    }

    /// Check that identities are unique, case-insensitively
    pub fn validate(&self) -> Result<()> {
        let table_keys: Vec<String> = self.tables.iter().map(Table::key).collect();
        if let Some((first, _)) = check_identifier_conflicts(&table_keys, true) {
            return Err(Error::SnapshotError(format!(
                "{}: duplicate table '{}'",
                self.environment, first
            )));
        }

        for table in &self.tables {
            let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
            if let Some((first, second)) = check_identifier_conflicts(&columns, true) {
                return Err(Error::SnapshotError(format!(
                    "{}: table {} has duplicate columns '{}' and '{}'",
                    self.environment,
                    table.full_name(),
                    first,
                    second
                )));
            }

            let indexes: Vec<String> = table.indexes.iter().map(|i| i.name.clone()).collect();
            if let Some((first, _)) = check_identifier_conflicts(&indexes, true) {
                return Err(Error::SnapshotError(format!(
                    "{}: table {} has duplicate index '{}'",
                    self.environment,
                    table.full_name(),
                    first
                )));
            }
        }

        for kind in ProgramObjectKind::ALL {
            let keys: Vec<String> =
                self.program_objects(kind).iter().map(ProgramObject::key).collect();
            if let Some((first, _)) = check_identifier_conflicts(&keys, true) {
                return Err(Error::SnapshotError(format!(
                    "{}: duplicate {} '{}'",
                    self.environment,
                    kind.keyword().to_lowercase(),
                    first
                )));
            }
        }

        Ok(())
    }
}

/// Represents a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<Column>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub indexes: Vec<Index>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<Constraint>,
}

impl Table {
    /// Create a new table with the given schema and name
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column to the table
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add an index to the table
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a constraint to the table
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// `[schema].[name]`
    pub fn full_name(&self) -> String {
        full_name(&self.schema, &self.name)
    }

    pub fn key(&self) -> String {
        identity_key(&[&self.schema, &self.name])
    }

    /// Find a column by name, case-insensitively
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn find_constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    /// Declared length; [`MAX_LENGTH`] means `(max)`
    #[serde(default)]
    pub max_length: Option<i32>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub scale: Option<u8>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub collation: Option<String>,
}

impl Column {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            max_length: None,
            precision: None,
            scale: None,
            nullable: true,
            default_value: None,
            is_identity: false,
            collation: None,
        }
    }

    /// Set the declared length
    pub fn length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set precision and scale
    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default_value = Some(default.to_string());
        self
    }

    /// Mark the column as an identity column
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Render the type with its length or precision, e.g. `nvarchar(200)`
    pub fn type_definition(&self) -> String {
        match (self.max_length, self.precision, self.scale) {
            (Some(MAX_LENGTH), _, _) => format!("{}(max)", self.data_type),
            (Some(length), _, _) => format!("{}({})", self.data_type, length),
            (None, Some(precision), Some(scale)) => {
                format!("{}({},{})", self.data_type, precision, scale)
            }
            (None, Some(precision), None) => format!("{}({})", self.data_type, precision),
            (None, None, _) => self.data_type.clone(),
        }
    }

    /// Whether both columns share the same base type name
    pub fn same_base_type(&self, other: &Column) -> bool {
        self.data_type.trim().eq_ignore_ascii_case(other.data_type.trim())
    }
}

/// A type definition split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub data_type: String,
    pub max_length: Option<i32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

/// Types whose single argument is a precision rather than a length
const PRECISION_TYPES: &[&str] =
    &["decimal", "numeric", "float", "datetime2", "time", "datetimeoffset"];

/// Parse `nvarchar(200)`, `decimal(10,2)` or `int` into its parts
pub fn parse_type_definition(text: &str) -> Result<TypeDefinition> {
    let captures = TYPE_DEFINITION_RE
        .captures(text)
        .ok_or_else(|| Error::SnapshotError(format!("invalid type definition '{}'", text)))?;

    let data_type = captures[1].trim().to_string();
    let mut definition = TypeDefinition {
        data_type,
        max_length: None,
        precision: None,
        scale: None,
    };

    let Some(arguments) = captures.get(2) else {
        return Ok(definition);
    };

    let invalid = || Error::SnapshotError(format!("invalid type arguments in '{}'", text));
    let parts: Vec<&str> = arguments.as_str().split(',').map(str::trim).collect();

    match parts.as_slice() {
        [single] if single.eq_ignore_ascii_case("max") => {
            definition.max_length = Some(MAX_LENGTH);
        }
        [single] => {
            if PRECISION_TYPES.contains(&definition.data_type.to_lowercase().as_str()) {
                definition.precision = Some(single.parse().map_err(|_| invalid())?);
            } else {
                definition.max_length = Some(single.parse().map_err(|_| invalid())?);
            }
        }
        [precision, scale] => {
            definition.precision = Some(precision.parse().map_err(|_| invalid())?);
            definition.scale = Some(scale.parse().map_err(|_| invalid())?);
        }
        _ => return Err(invalid()),
    }

    Ok(definition)
}

/// Represents an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub is_clustered: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_columns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub include_columns: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
}

impl Index {
    /// Create a new nonclustered, non-unique index over the given columns
    pub fn new(name: &str, key_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            is_clustered: false,
            is_unique: false,
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            include_columns: Vec::new(),
            filter: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn clustered(mut self) -> Self {
        self.is_clustered = true;
        self
    }

    pub fn include(mut self, columns: &[&str]) -> Self {
        self.include_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, predicate: &str) -> Self {
        self.filter = Some(predicate.to_string());
        self
    }
}

/// Constraint kind with its kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey {
        referenced_table: String,
        #[serde(default)]
        referenced_columns: Vec<String>,
        #[serde(default)]
        on_delete: Option<String>,
        #[serde(default)]
        on_update: Option<String>,
    },
    Unique,
    Check {
        definition: String,
    },
    Default {
        definition: String,
    },
}

impl ConstraintKind {
    /// The SQL keyword for the constraint type
    pub fn keyword(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey { .. } => "FOREIGN KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Check { .. } => "CHECK",
            ConstraintKind::Default { .. } => "DEFAULT",
        }
    }
}

/// Represents a table constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,
    #[serde(flatten)]
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn new(name: &str, columns: &[&str], kind: ConstraintKind) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            kind,
        }
    }
}

/// Kind of definition-text object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramObjectKind {
    View,
    Procedure,
    Function,
    Trigger,
}

impl ProgramObjectKind {
    /// Traversal order of program-object collections
    pub const ALL: [ProgramObjectKind; 4] = [
        ProgramObjectKind::View,
        ProgramObjectKind::Procedure,
        ProgramObjectKind::Function,
        ProgramObjectKind::Trigger,
    ];

    /// The SQL keyword, e.g. `PROCEDURE`
    pub fn keyword(&self) -> &'static str {
        match self {
            ProgramObjectKind::View => "VIEW",
            ProgramObjectKind::Procedure => "PROCEDURE",
            ProgramObjectKind::Function => "FUNCTION",
            ProgramObjectKind::Trigger => "TRIGGER",
        }
    }

    pub fn object_kind(&self) -> ObjectKind {
        match self {
            ProgramObjectKind::View => ObjectKind::View,
            ProgramObjectKind::Procedure => ObjectKind::Procedure,
            ProgramObjectKind::Function => ObjectKind::Function,
            ProgramObjectKind::Trigger => ObjectKind::Trigger,
        }
    }

    pub fn from_object_kind(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::View => Some(ProgramObjectKind::View),
            ObjectKind::Procedure => Some(ProgramObjectKind::Procedure),
            ObjectKind::Function => Some(ProgramObjectKind::Function),
            ObjectKind::Trigger => Some(ProgramObjectKind::Trigger),
            ObjectKind::Table
            | ObjectKind::Column
            | ObjectKind::Index
            | ObjectKind::Constraint => None,
        }
    }
}

/// A view, procedure, function or trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramObject {
    pub schema: String,
    pub name: String,
    pub kind: ProgramObjectKind,
    pub definition: String,
}

impl ProgramObject {
    pub fn new(schema: &str, name: &str, kind: ProgramObjectKind, definition: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            kind,
            definition: definition.to_string(),
        }
    }

    /// `[schema].[name]`
    pub fn full_name(&self) -> String {
        full_name(&self.schema, &self.name)
    }

    pub fn key(&self) -> String {
        identity_key(&[&self.schema, &self.name])
    }

    /// Definition with whitespace runs collapsed, optionally without comments
    pub fn normalized_definition(&self, strip_comments: bool) -> String {
        normalize_definition(&self.definition, strip_comments)
    }

    /// MD5 of the normalized definition
    pub fn definition_checksum(&self, strip_comments: bool) -> String {
        format!("{:x}", md5::compute(self.normalized_definition(strip_comments).as_bytes()))
    }
}

/// Collapse whitespace runs to one space and trim, optionally stripping comments
pub fn normalize_definition(definition: &str, strip_comments: bool) -> String {
    let mut text = definition.replace("\r\n", "\n");
    if strip_comments {
        let without_block = BLOCK_COMMENT_RE.replace_all(&text, "");
        text = LINE_COMMENT_RE.replace_all(&without_block, "").to_string();
    }
    WHITESPACE_RE.replace_all(text.trim(), " ").to_string()
}
