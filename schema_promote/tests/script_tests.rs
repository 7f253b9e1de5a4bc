//! Script generation tests

mod common;

use pretty_assertions::assert_eq;

use common::*;
use schema_promote::schema::difference::{Property, RiskLevel, SyncAction};
use schema_promote::schema::script::Statement;
use schema_promote::schema::types::{
    Column, Constraint, ConstraintKind, ObjectKind, Snapshot, Table,
};
use schema_promote::{
    compare, CompareOptions, DiffEngine, Difference, Error, ScriptGenerator, ScriptOptions,
    ScriptSubject, SyncScript,
};

fn without_comments() -> ScriptOptions {
    ScriptOptions {
        include_comments: false,
        ..Default::default()
    }
}

fn approve_all_and_generate(
    options: &ScriptOptions,
    baseline: &Snapshot,
    target: &Snapshot,
) -> schema_promote::Result<SyncScript> {
    let mut comparison = compare(baseline, target);
    comparison.approve_executable();
    ScriptGenerator::new(options).generate_for_comparison(&comparison, baseline, target)
}

#[test]
fn test_added_column_script() {
    let baseline = snapshot("dev").with_table(users_table());
    let target = snapshot("staging").with_table(users_table_without_email());

    let script = approve_all_and_generate(&ScriptOptions::default(), &baseline, &target)
        .expect("column script should generate");

    assert_eq!(script.target, "staging");
    assert_eq!(
        script.apply_script(),
        "-- Column Email on [dbo].[Users] is missing from target 'staging' [Low risk]\n\
         ALTER TABLE [dbo].[Users] ADD [Email] nvarchar(200) NULL\n\
         GO\n"
    );
    assert_eq!(
        script.rollback_script().as_deref(),
        Some(
            "-- Rollback: Column Email on [dbo].[Users] is missing from target 'staging'\n\
             ALTER TABLE [dbo].[Users] DROP COLUMN [Email]\n\
             GO\n"
        )
    );
    assert_eq!(script.max_risk_level(), RiskLevel::Low);
    assert!(script.can_execute());
}

#[test]
fn test_added_table_script_includes_constraints_and_indexes() {
    let baseline = snapshot("dev").with_table(orders_table());
    let target = snapshot("prod");

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("table script should generate");

    assert_eq!(
        script.apply_script(),
        "CREATE TABLE [dbo].[Orders] (\n    \
         [Id] int NOT NULL IDENTITY,\n    \
         [UserId] int NOT NULL,\n    \
         [Total] decimal(10,2) NULL\n\
         )\n\
         ALTER TABLE [dbo].[Orders] ADD CONSTRAINT [PK_Orders] PRIMARY KEY ([Id])\n\
         ALTER TABLE [dbo].[Orders] ADD CONSTRAINT [FK_Orders_Users] \
         FOREIGN KEY ([UserId]) REFERENCES [dbo].[Users] ([Id])\n\
         CREATE NONCLUSTERED INDEX [IX_Orders_UserId] ON [dbo].[Orders] ([UserId])\n\
         GO\n"
    );
    assert_eq!(script.rollback_script().as_deref(), Some("DROP TABLE [dbo].[Orders]\nGO\n"));
}

#[test]
fn test_reverse_fragments_undo_forward_fragments() {
    let baseline = snapshot("dev").with_table(
        users_table()
            .with_column(Column::new("Phone", "varchar").length(20))
            .with_index(email_index()),
    );
    let target = snapshot("prod").with_table(users_table());

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("batch should generate");

    assert_eq!(script.apply.len(), 2);
    assert_eq!(script.rollback.len(), 2);

    match (&script.apply[0].statements[..], &script.rollback[1].statements[..]) {
        (
            [Statement::AddColumn { table, column }],
            [Statement::DropColumn { table: dropped_from, column: dropped }],
        ) => {
            assert_eq!(table, dropped_from);
            assert_eq!(&column.name, dropped);
        }
        other => panic!("unexpected column fragments: {:?}", other),
    }

    match (&script.apply[1].statements[..], &script.rollback[0].statements[..]) {
        (
            [Statement::CreateIndex { table, index, drop_existing: false }],
            [Statement::DropIndex { table: dropped_from, index: dropped }],
        ) => {
            assert_eq!(table, dropped_from);
            assert_eq!(&index.name, dropped);
        }
        other => panic!("unexpected index fragments: {:?}", other),
    }

    // Later changes are undone first
    assert_eq!(
        script.rollback_script().as_deref(),
        Some(
            "DROP INDEX [IX_Users_Email] ON [dbo].[Users]\nGO\n\n\
             ALTER TABLE [dbo].[Users] DROP COLUMN [Phone]\nGO\n"
        )
    );
    assert!(script.can_execute());
}

#[test]
fn test_modified_length_script() {
    let baseline = snapshot("dev").with_table(users_table());
    let target =
        snapshot("prod").with_table(users_table_without_email().with_column(email_column(100)));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("alter should generate");

    assert_eq!(
        script.apply_script(),
        "ALTER TABLE [dbo].[Users] ALTER COLUMN [Email] nvarchar(100) NULL\nGO\n"
    );
    assert_eq!(
        script.rollback_script().as_deref(),
        Some("ALTER TABLE [dbo].[Users] ALTER COLUMN [Email] nvarchar(200) NULL\nGO\n")
    );
    assert_eq!(script.max_risk_level(), RiskLevel::High);
    assert!(!script.can_execute());
}

#[test]
fn test_modified_index_uses_drop_existing() {
    let baseline = snapshot("dev").with_table(users_table().with_index(email_index().unique()));
    let target = snapshot("prod").with_table(users_table().with_index(email_index()));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("index should generate");

    assert_eq!(script.differences[0].property, Some(Property::IsUnique));
    assert_eq!(
        script.apply_script(),
        "CREATE NONCLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email]) \
         WITH (DROP_EXISTING = ON)\nGO\n"
    );
    assert_eq!(
        script.rollback_script().as_deref(),
        Some(
            "CREATE UNIQUE NONCLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email]) \
             WITH (DROP_EXISTING = ON)\nGO\n"
        )
    );
}

#[test]
fn test_clustering_change_drops_and_recreates_index() {
    let baseline = snapshot("dev").with_table(users_table().with_index(email_index().clustered()));
    let target = snapshot("prod").with_table(users_table().with_index(email_index()));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("index should generate");

    assert_eq!(script.differences[0].property, Some(Property::IsClustered));
    assert_eq!(
        script.apply_script(),
        "DROP INDEX [IX_Users_Email] ON [dbo].[Users]\n\
         CREATE NONCLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email])\n\
         GO\n"
    );
    assert_eq!(
        script.rollback_script().as_deref(),
        Some(
            "DROP INDEX [IX_Users_Email] ON [dbo].[Users]\n\
             CREATE CLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email])\n\
             GO\n"
        )
    );
    assert!(!script.apply_script().contains("DROP_EXISTING"));
}

#[test]
fn test_constraint_type_change_has_no_rollback() {
    let baseline = snapshot("dev").with_table(
        users_table().with_constraint(Constraint::new(
            "CK_Users_Email",
            &["Email"],
            ConstraintKind::Unique,
        )),
    );
    let target = snapshot("prod").with_table(users_table().with_constraint(Constraint::new(
        "CK_Users_Email",
        &["Email"],
        ConstraintKind::Check { definition: "([Email] LIKE '%@%')".to_string() },
    )));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("constraint should generate");

    assert_eq!(
        script.apply_script(),
        "ALTER TABLE [dbo].[Users] DROP CONSTRAINT [CK_Users_Email]\n\
         ALTER TABLE [dbo].[Users] ADD CONSTRAINT [CK_Users_Email] CHECK ([Email] LIKE '%@%')\n\
         GO\n"
    );
    assert_eq!(script.rollback_script(), None);
}

#[test]
fn test_program_object_scripts() {
    let baseline = snapshot("dev").with_program_object(get_users_procedure(
        "CREATE PROCEDURE dbo.GetUsers AS SELECT Id FROM dbo.Users",
    ));
    let target = snapshot("prod")
        .with_program_object(active_users_view("CREATE VIEW dbo.ActiveUsers AS SELECT 1"))
        .with_program_object(get_users_procedure(
            "CREATE PROCEDURE dbo.GetUsers AS SELECT Id, Email FROM dbo.Users",
        ));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("definitions should generate");

    assert_eq!(
        script.apply_script(),
        "CREATE VIEW dbo.ActiveUsers AS SELECT 1\nGO\n\n\
         ALTER PROCEDURE dbo.GetUsers AS SELECT Id, Email FROM dbo.Users\nGO\n"
    );
    // The modified procedure has no reverse; only the view can be dropped again
    assert_eq!(
        script.rollback_script().as_deref(),
        Some("DROP VIEW [dbo].[ActiveUsers]\nGO\n")
    );
}

#[test]
fn test_custom_delimiter_and_no_rollback() {
    let options = ScriptOptions {
        batch_delimiter: "GO 1".to_string(),
        include_rollback: false,
        include_comments: false,
        ..Default::default()
    };
    let baseline = snapshot("dev").with_table(users_table().with_index(email_index()));
    let target = snapshot("prod").with_table(users_table());

    let script =
        approve_all_and_generate(&options, &baseline, &target).expect("index should generate");

    assert_eq!(
        script.apply_script(),
        "CREATE NONCLUSTERED INDEX [IX_Users_Email] ON [dbo].[Users] ([Email])\nGO 1\n"
    );
    assert_eq!(script.rollback_script(), None);
}

#[test]
fn test_skipped_differences_are_not_scripted() {
    let baseline = snapshot("dev").with_table(users_table().with_index(email_index()));
    let target =
        snapshot("prod").with_table(users_table_without_email().with_column(email_column(100)));

    let mut comparison = compare(&baseline, &target);
    comparison.approve_executable();
    comparison.differences_mut()[0].sync_action = SyncAction::Skip;

    let options = without_comments();
    let script = ScriptGenerator::new(&options)
        .generate_for_comparison(&comparison, &baseline, &target)
        .expect("index should generate");

    assert_eq!(script.differences.len(), 1);
    assert_eq!(script.differences[0].object_kind, ObjectKind::Index);
    assert!(script.can_execute());
}

#[test]
fn test_single_difference_script_is_labelled_by_object() {
    let baseline = snapshot("dev").with_table(users_table());
    let target = snapshot("staging").with_table(users_table_without_email());
    let comparison = compare(&baseline, &target);

    let options = ScriptOptions::default();
    let script = ScriptGenerator::new(&options)
        .generate_script(
            &comparison.differences[0],
            &ScriptSubject::Column(email_column(200)),
            Some("[dbo].[Users]"),
        )
        .expect("column script should generate");

    assert_eq!(script.target, "[dbo].[Users].[Email]");
    assert_eq!(script.differences, comparison.differences);
}

#[test]
fn test_unscriptable_column_property_is_left_skipped() {
    let baseline = snapshot("dev").with_table(Table::new("dbo", "Flags").with_column(id_column()));
    let target = snapshot("prod").with_table(
        Table::new("dbo", "Flags").with_column(Column::new("Id", "int").nullable(false)),
    );
    let options = ScriptOptions::default();
    let generator = ScriptGenerator::new(&options);

    let mut comparison = compare(&baseline, &target);
    comparison.approve_executable();

    assert_eq!(comparison.differences[0].property, Some(Property::IsIdentity));
    assert_eq!(comparison.differences[0].sync_action, SyncAction::Skip);
    let script = generator
        .generate_for_comparison(&comparison, &baseline, &target)
        .expect("nothing approved should still generate");
    assert!(script.apply.is_empty());

    comparison.differences_mut()[0].sync_action = SyncAction::Execute;
    match generator.generate_for_comparison(&comparison, &baseline, &target) {
        Err(Error::UnsupportedChange(message)) => assert!(message.contains("IsIdentity")),
        other => panic!("expected UnsupportedChange, got {:?}", other),
    }
}

#[test]
fn test_default_value_change_is_scripted_with_other_changes() {
    let active = |default: &str| Column::new("Active", "bit").nullable(false).default(default);
    let baseline = snapshot("dev").with_table(users_table().with_column(active("(1)")));
    let target =
        snapshot("prod").with_table(users_table_without_email().with_column(active("(0)")));

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("default change should not block the batch");

    assert_eq!(script.apply.len(), 2);
    assert!(script
        .apply_script()
        .contains("ALTER TABLE [dbo].[Users] ADD [Email] nvarchar(200) NULL"));
    match &script.apply[1].statements[..] {
        [Statement::DropDefault { table, column }, Statement::AddDefault { value, .. }] => {
            assert_eq!((table.as_str(), column.as_str()), ("[dbo].[Users]", "Active"));
            assert_eq!(value, "(0)");
        }
        other => panic!("unexpected default fragment: {:?}", other),
    }
    match &script.rollback[0].statements[..] {
        [Statement::DropDefault { .. }, Statement::AddDefault { value, .. }] => {
            assert_eq!(value, "(1)")
        }
        other => panic!("unexpected default rollback: {:?}", other),
    }
    assert!(script
        .apply_script()
        .ends_with("ALTER TABLE [dbo].[Users] ADD DEFAULT (0) FOR [Active]\nGO\n"));
}

#[test]
fn test_removed_default_is_dropped_and_restored() {
    let baseline = snapshot("dev").with_table(
        Table::new("dbo", "Flags")
            .with_column(Column::new("Enabled", "bit").nullable(false).default("(0)")),
    );
    let target = snapshot("prod").with_table(
        Table::new("dbo", "Flags").with_column(Column::new("Enabled", "bit").nullable(false)),
    );

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("default removal should generate");

    assert_eq!(
        script.apply[0].statements,
        vec![Statement::DropDefault {
            table: "[dbo].[Flags]".to_string(),
            column: "Enabled".to_string(),
        }]
    );
    assert_eq!(
        script.rollback[0].statements[1],
        Statement::AddDefault {
            table: "[dbo].[Flags]".to_string(),
            column: "Enabled".to_string(),
            value: "(0)".to_string(),
        }
    );
}

#[test]
fn test_rollback_restores_every_changed_column_property() {
    let baseline = snapshot("dev").with_table(
        Table::new("dbo", "People").with_column(Column::new("Name", "varchar").length(100)),
    );
    let target = snapshot("prod").with_table(
        Table::new("dbo", "People")
            .with_column(Column::new("Name", "varchar").length(50).nullable(false)),
    );

    let script = approve_all_and_generate(&without_comments(), &baseline, &target)
        .expect("column changes should generate");

    let properties: Vec<Option<Property>> =
        script.differences.iter().map(|d| d.property).collect();
    assert_eq!(properties, vec![Some(Property::MaxLength), Some(Property::IsNullable)]);
    assert_eq!(
        script.apply_script(),
        "ALTER TABLE [dbo].[People] ALTER COLUMN [Name] varchar(50) NULL\nGO\n\n\
         ALTER TABLE [dbo].[People] ALTER COLUMN [Name] varchar(50) NOT NULL\nGO\n"
    );
    assert_eq!(
        script.rollback_script().as_deref(),
        Some(
            "ALTER TABLE [dbo].[People] ALTER COLUMN [Name] varchar(50) NULL\nGO\n\n\
             ALTER TABLE [dbo].[People] ALTER COLUMN [Name] varchar(100) NULL\nGO\n"
        )
    );
}

#[test]
fn test_forbidden_differences_are_never_scripted() {
    let engine = DiffEngine::new(CompareOptions {
        protected_schemas: vec!["audit".to_string()],
        ..Default::default()
    });
    let baseline = snapshot("dev")
        .with_table(Table::new("Audit", "Log").with_column(Column::new("Id", "bigint")))
        .with_table(users_table());
    let target = snapshot("prod");
    let options = ScriptOptions::default();
    let generator = ScriptGenerator::new(&options);

    let mut comparison = engine.compare(&baseline, &target);
    comparison.approve_executable();

    assert_eq!(comparison.differences[0].risk_level, RiskLevel::Forbidden);
    assert_eq!(comparison.differences[0].sync_action, SyncAction::Skip);
    let script = generator
        .generate_for_comparison(&comparison, &baseline, &target)
        .expect("the unprotected table should generate");
    assert_eq!(script.differences.len(), 1);
    assert!(!script.apply_script().contains("[Audit].[Log]"));

    comparison.differences_mut()[0].sync_action = SyncAction::ExportScriptOnly;
    let result = generator.generate_for_comparison(&comparison, &baseline, &target);
    assert!(matches!(result, Err(Error::ForbiddenChange(_))));
}

#[test]
fn test_default_constraint_without_column_is_rejected() {
    let baseline = snapshot("dev").with_table(
        Table::new("dbo", "Flags")
            .with_column(Column::new("Enabled", "bit").nullable(false))
            .with_constraint(Constraint::new(
                "DF_Flags_Enabled",
                &[],
                ConstraintKind::Default { definition: "(0)".to_string() },
            )),
    );
    let target = snapshot("prod");

    let result = approve_all_and_generate(&ScriptOptions::default(), &baseline, &target);

    match result {
        Err(Error::UnsupportedChange(message)) => assert!(message.contains("DF_Flags_Enabled")),
        other => panic!("expected UnsupportedChange, got {:?}", other),
    }
}

#[test]
fn test_modified_table_is_rejected() {
    let difference = Difference::modified(
        ObjectKind::Table,
        "[dbo].[Users]".to_string(),
        None,
        Property::Definition,
        None,
        None,
        RiskLevel::Low,
        "synthetic".to_string(),
    );

    let options = ScriptOptions::default();
    let result = ScriptGenerator::new(&options).generate_script(
        &difference,
        &ScriptSubject::Table(users_table()),
        None,
    );

    match result {
        Err(Error::UnsupportedChange(message)) => assert!(message.contains("[dbo].[Users]")),
        other => panic!("expected UnsupportedChange, got {:?}", other),
    }
}

#[test]
fn test_subject_must_match_difference_kind() {
    let baseline = snapshot("dev").with_table(users_table());
    let target = snapshot("staging").with_table(users_table_without_email());
    let comparison = compare(&baseline, &target);

    let options = ScriptOptions::default();
    let result = ScriptGenerator::new(&options).generate_script(
        &comparison.differences[0],
        &ScriptSubject::Index(email_index()),
        Some("[dbo].[Users]"),
    );

    assert!(matches!(result, Err(Error::SubjectMismatch(_))));
}

#[test]
fn test_missing_owner_is_rejected() {
    let mut difference = compare(
        &snapshot("dev").with_table(users_table()),
        &snapshot("staging").with_table(users_table_without_email()),
    )
    .differences
    .remove(0);
    difference.owner_name = None;

    let options = ScriptOptions::default();
    let result = ScriptGenerator::new(&options).generate_script(
        &difference,
        &ScriptSubject::Column(email_column(200)),
        None,
    );

    assert!(matches!(result, Err(Error::UnsupportedChange(_))));
}
