//! Shared snapshot fixtures for the integration tests

#![allow(dead_code)]

use schema_promote::schema::types::{
    Column, Constraint, ConstraintKind, Index, ProgramObject, ProgramObjectKind, Snapshot, Table,
};

pub fn snapshot(environment: &str) -> Snapshot {
    Snapshot::new(environment, "sql01", "App")
}

pub fn id_column() -> Column {
    Column::new("Id", "int").nullable(false).identity()
}

pub fn email_column(length: i32) -> Column {
    Column::new("Email", "nvarchar").length(length)
}

/// `dbo.Users (Id INT, Email NVARCHAR(200))`
pub fn users_table() -> Table {
    Table::new("dbo", "Users")
        .with_column(id_column())
        .with_column(email_column(200))
}

pub fn users_table_without_email() -> Table {
    Table::new("dbo", "Users").with_column(id_column())
}

pub fn email_index() -> Index {
    Index::new("IX_Users_Email", &["Email"])
}

pub fn orders_table() -> Table {
    Table::new("dbo", "Orders")
        .with_column(Column::new("Id", "int").nullable(false).identity())
        .with_column(Column::new("UserId", "int").nullable(false))
        .with_column(Column::new("Total", "decimal").precision(10, 2))
        .with_constraint(Constraint::new("PK_Orders", &["Id"], ConstraintKind::PrimaryKey))
        .with_constraint(Constraint::new(
            "FK_Orders_Users",
            &["UserId"],
            ConstraintKind::ForeignKey {
                referenced_table: "[dbo].[Users]".to_string(),
                referenced_columns: vec!["Id".to_string()],
                on_delete: None,
                on_update: None,
            },
        ))
        .with_index(Index::new("IX_Orders_UserId", &["UserId"]))
}

pub fn active_users_view(definition: &str) -> ProgramObject {
    ProgramObject::new("dbo", "ActiveUsers", ProgramObjectKind::View, definition)
}

pub fn get_users_procedure(definition: &str) -> ProgramObject {
    ProgramObject::new("dbo", "GetUsers", ProgramObjectKind::Procedure, definition)
}
