//! Sync script model
//!
//! Scripts are built as structured [`Statement`] values grouped into
//! [`ScriptFragment`]s, one fragment per difference. Text is only produced at
//! the boundary, by [`SyncScript::apply_script`] and
//! [`SyncScript::rollback_script`], with every fragment terminated by the
//! batch delimiter on its own line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::difference::{Difference, RiskLevel};
use crate::schema::types::{Column, Constraint, ConstraintKind, Index, ProgramObjectKind};
use crate::utils::naming::{quote_identifier, quoted_list};

/// Statement-batch delimiter understood by the execution harness
pub const BATCH_DELIMITER: &str = "GO";

/// One SQL statement, kept structured until rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    CreateTable { table: String, columns: Vec<Column> },
    DropTable { table: String },
    AddColumn { table: String, column: Column },
    DropColumn { table: String, column: String },
    AlterColumn { table: String, column: Column },
    CreateIndex { table: String, index: Index, drop_existing: bool },
    DropIndex { table: String, index: String },
    AddConstraint { table: String, constraint: Constraint },
    DropConstraint { table: String, constraint: String },
    /// Unnamed default bound to one column
    AddDefault { table: String, column: String, value: String },
    /// Drops whatever default constraint is bound to the column, if any
    DropDefault { table: String, column: String },
    DropProgramObject { kind: ProgramObjectKind, name: String },
    /// Verbatim definition text of a view, procedure, function or trigger
    Definition { text: String },
}

impl Statement {
    /// Render the statement as SQL text
    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateTable { table, columns } => {
                let column_defs: Vec<String> = columns
                    .iter()
                    .map(|column| format!("    {}", column_definition(column)))
                    .collect();
                format!("CREATE TABLE {} (\n{}\n)", table, column_defs.join(",\n"))
            }
            Statement::DropTable { table } => format!("DROP TABLE {}", table),
            Statement::AddColumn { table, column } => {
                format!("ALTER TABLE {} ADD {}", table, column_definition(column))
            }
            Statement::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {}", table, quote_identifier(column))
            }
            Statement::AlterColumn { table, column } => {
                let mut sql = format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    table,
                    quote_identifier(&column.name),
                    column.type_definition()
                );
                if let Some(collation) = &column.collation {
                    sql.push_str(&format!(" COLLATE {}", collation));
                }
                sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
                sql
            }
            Statement::CreateIndex { table, index, drop_existing } => {
                create_index_sql(table, index, *drop_existing)
            }
            Statement::DropIndex { table, index } => {
                format!("DROP INDEX {} ON {}", quote_identifier(index), table)
            }
            Statement::AddConstraint { table, constraint } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                table,
                quote_identifier(&constraint.name),
                constraint_body(constraint)
            ),
            Statement::DropConstraint { table, constraint } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                table,
                quote_identifier(constraint)
            ),
            Statement::AddDefault { table, column, value } => format!(
                "ALTER TABLE {} ADD DEFAULT {} FOR {}",
                table,
                value.trim(),
                quote_identifier(column)
            ),
            Statement::DropDefault { table, column } => drop_default_sql(table, column),
            Statement::DropProgramObject { kind, name } => {
                format!("DROP {} {}", kind.keyword(), name)
            }
            Statement::Definition { text } => text.trim().to_string(),
        }
    }
}

/// `[name] type [COLLATE c] [NOT] NULL [IDENTITY] [DEFAULT v]`
pub fn column_definition(column: &Column) -> String {
    let mut parts = vec![quote_identifier(&column.name), column.type_definition()];
    if let Some(collation) = &column.collation {
        parts.push(format!("COLLATE {}", collation));
    }
    parts.push(if column.nullable { "NULL" } else { "NOT NULL" }.to_string());
    if column.is_identity {
        parts.push("IDENTITY".to_string());
    }
    if let Some(default) = &column.default_value {
        parts.push(format!("DEFAULT {}", default));
    }
    parts.join(" ")
}

fn create_index_sql(table: &str, index: &Index, drop_existing: bool) -> String {
    let mut sql = String::from("CREATE ");
    if index.is_unique {
        sql.push_str("UNIQUE ");
    }
    sql.push_str(if index.is_clustered { "CLUSTERED " } else { "NONCLUSTERED " });
    sql.push_str(&format!(
        "INDEX {} ON {} ({})",
        quote_identifier(&index.name),
        table,
        quoted_list(&index.key_columns)
    ));
    if !index.include_columns.is_empty() {
        sql.push_str(&format!(" INCLUDE ({})", quoted_list(&index.include_columns)));
    }
    if let Some(filter) = &index.filter {
        sql.push_str(&format!(" WHERE {}", filter.trim()));
    }
    if drop_existing {
        sql.push_str(" WITH (DROP_EXISTING = ON)");
    }
    sql
}

/// Drop the default bound to a column by its system-generated name
fn drop_default_sql(table: &str, column: &str) -> String {
    let table = sql_literal(table);
    format!(
        "DECLARE @default_name sysname = (\n    \
         SELECT dc.name FROM sys.default_constraints dc\n    \
         JOIN sys.columns c\n        \
         ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id\n    \
         WHERE dc.parent_object_id = OBJECT_ID(N'{table}') AND c.name = N'{column}'\n\
         );\n\
         IF @default_name IS NOT NULL\n    \
         EXEC(N'ALTER TABLE {table} DROP CONSTRAINT ' + QUOTENAME(@default_name))",
        table = table,
        column = sql_literal(column),
    )
}

fn sql_literal(text: &str) -> String {
    text.replace('\'', "''")
}

fn constraint_body(constraint: &Constraint) -> String {
    match &constraint.kind {
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => format!(
            "{} ({})",
            constraint.kind.keyword(),
            quoted_list(&constraint.columns)
        ),
        ConstraintKind::ForeignKey {
            referenced_table,
            referenced_columns,
            on_delete,
            on_update,
        } => {
            let mut body = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quoted_list(&constraint.columns),
                referenced_table,
                quoted_list(referenced_columns)
            );
            if let Some(action) = on_delete {
                body.push_str(&format!(" ON DELETE {}", action));
            }
            if let Some(action) = on_update {
                body.push_str(&format!(" ON UPDATE {}", action));
            }
            body
        }
        ConstraintKind::Check { definition } => {
            let definition = definition.trim();
            if definition.starts_with('(') {
                format!("CHECK {}", definition)
            } else {
                format!("CHECK ({})", definition)
            }
        }
        // The generator only renders defaults bound to exactly one column
        ConstraintKind::Default { definition } => {
            format!("DEFAULT {} FOR {}", definition.trim(), quoted_list(&constraint.columns))
        }
    }
}

/// The statements implementing one difference in one direction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptFragment {
    pub comment: Option<String>,
    pub statements: Vec<Statement>,
}

impl ScriptFragment {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { comment: None, statements }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render as one batch terminated by the delimiter
    pub fn render(&self, delimiter: &str) -> String {
        let mut lines = Vec::new();
        if let Some(comment) = &self.comment {
            lines.extend(comment.lines().map(|line| format!("-- {}", line)));
        }
        lines.extend(self.statements.iter().map(Statement::to_sql));
        lines.push(delimiter.to_string());
        lines.join("\n")
    }
}

/// Generated apply/rollback batches for a set of differences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncScript {
    pub id: Uuid,
    pub target: String,
    pub generated_at: DateTime<Utc>,
    pub batch_delimiter: String,
    pub apply: Vec<ScriptFragment>,
    /// Fragments in execution order, i.e. reverse of `apply`
    pub rollback: Vec<ScriptFragment>,
    pub differences: Vec<Difference>,
}

impl SyncScript {
    pub fn new(
        target: &str,
        batch_delimiter: &str,
        apply: Vec<ScriptFragment>,
        rollback: Vec<ScriptFragment>,
        differences: Vec<Difference>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.to_string(),
            generated_at: Utc::now(),
            batch_delimiter: batch_delimiter.to_string(),
            apply,
            rollback,
            differences,
        }
    }

    /// Concatenated apply batches
    pub fn apply_script(&self) -> String {
        render_batches(&self.apply, &self.batch_delimiter)
    }

    /// Concatenated rollback batches, `None` when no reverse was generated
    pub fn rollback_script(&self) -> Option<String> {
        if self.rollback.is_empty() {
            None
        } else {
            Some(render_batches(&self.rollback, &self.batch_delimiter))
        }
    }

    /// Highest risk among the differences, Low when there are none
    pub fn max_risk_level(&self) -> RiskLevel {
        self.differences
            .iter()
            .map(|d| d.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    /// Whether the script may run unattended
    pub fn can_execute(&self) -> bool {
        self.max_risk_level().is_executable()
    }
}

fn render_batches(fragments: &[ScriptFragment], delimiter: &str) -> String {
    let mut script = fragments
        .iter()
        .map(|fragment| fragment.render(delimiter))
        .collect::<Vec<_>>()
        .join("\n\n");
    if !script.is_empty() {
        script.push('\n');
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_column_definitions() {
        let column = Column::new("Id", "int").nullable(false).identity();
        assert_eq!(column_definition(&column), "[Id] int NOT NULL IDENTITY");

        let column = Column::new("Status", "nvarchar").length(20).nullable(false).default("N'new'");
        assert_eq!(column_definition(&column), "[Status] nvarchar(20) NOT NULL DEFAULT N'new'");
    }

    #[test]
    fn renders_index_statements() {
        let index = Index::new("IX_Users_Email", &["Email"])
            .unique()
            .include(&["Name"])
            .filter("[Email] IS NOT NULL");
        let statement = Statement::CreateIndex {
            table: "[dbo].[Users]".to_string(),
            index,
            drop_existing: false,
        };

        assert_eq!(
            statement.to_sql(),
            "CREATE UNIQUE NONCLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email]) \
             INCLUDE ([Name]) WHERE [Email] IS NOT NULL"
        );
    }

    #[test]
    fn renders_constraints() {
        let fk = Constraint::new(
            "FK_Orders_Users",
            &["UserId"],
            ConstraintKind::ForeignKey {
                referenced_table: "[dbo].[Users]".to_string(),
                referenced_columns: vec!["Id".to_string()],
                on_delete: Some("CASCADE".to_string()),
                on_update: None,
            },
        );
        let statement =
            Statement::AddConstraint { table: "[dbo].[Orders]".to_string(), constraint: fk };
        assert_eq!(
            statement.to_sql(),
            "ALTER TABLE [dbo].[Orders] ADD CONSTRAINT [FK_Orders_Users] FOREIGN KEY ([UserId]) \
             REFERENCES [dbo].[Users] ([Id]) ON DELETE CASCADE"
        );

        let check = Constraint::new(
            "CK_Users_Age",
            &["Age"],
            ConstraintKind::Check { definition: "[Age] >= 0".to_string() },
        );
        assert_eq!(constraint_body(&check), "CHECK ([Age] >= 0)");
    }

    #[test]
    fn renders_default_statements() {
        let add = Statement::AddDefault {
            table: "[dbo].[Users]".to_string(),
            column: "Active".to_string(),
            value: "(0)".to_string(),
        };
        assert_eq!(add.to_sql(), "ALTER TABLE [dbo].[Users] ADD DEFAULT (0) FOR [Active]");

        let drop = Statement::DropDefault {
            table: "[dbo].[O'Brien]".to_string(),
            column: "Active".to_string(),
        };
        let sql = drop.to_sql();
        assert!(sql.starts_with("DECLARE @default_name sysname = ("));
        assert!(sql.contains("OBJECT_ID(N'[dbo].[O''Brien]') AND c.name = N'Active'"));
        assert!(sql.ends_with(
            "EXEC(N'ALTER TABLE [dbo].[O''Brien] DROP CONSTRAINT ' + QUOTENAME(@default_name))"
        ));
    }

    #[test]
    fn renders_batches_with_delimiter() {
        let fragment = ScriptFragment::new(vec![Statement::DropTable {
            table: "[dbo].[Users]".to_string(),
        }])
        .with_comment("Table [dbo].[Users]");
        let script = SyncScript::new(
            "prod",
            BATCH_DELIMITER,
            vec![fragment.clone(), fragment],
            Vec::new(),
            Vec::new(),
        );

        assert_eq!(
            script.apply_script(),
            "-- Table [dbo].[Users]\nDROP TABLE [dbo].[Users]\nGO\n\n\
             -- Table [dbo].[Users]\nDROP TABLE [dbo].[Users]\nGO\n"
        );
        assert_eq!(script.rollback_script(), None);
        assert_eq!(script.max_risk_level(), RiskLevel::Low);
        assert!(script.can_execute());
    }
}
