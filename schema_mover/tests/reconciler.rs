mod common;

use common::{test_table_columns, FakeCatalog, MockAdapter};
use pretty_assertions::assert_eq;
use rstest::rstest;

use schema_mover::schema::ColumnDefinition;
use schema_mover::utils::TempNameGenerator;
use schema_mover::{
    Dialect, IgnoreRules, Introspector, Phase, ReconciliationEngine, ReconciliationPlan,
    SchemaExtractor,
};
use schema_mover::dialect::{MySqlDialect, PostgresDialect};

const TEST_SCHEMA: &str = "
CREATE TABLE test (
    id int(11) NOT NULL AUTO_INCREMENT PRIMARY KEY,
    bar varchar(255),
    foo varchar(255) DEFAULT 'x',
    baz int NOT NULL DEFAULT 0
);

CREATE VIEW viewtest AS SELECT bar FROM test;
";

async fn plan_for(
    dialect: &dyn Dialect,
    schema: &str,
    catalog: FakeCatalog,
    ignore: &[&str],
) -> ReconciliationPlan {
    let db = MockAdapter::new(catalog);
    let desired = SchemaExtractor::new(dialect).extract(schema).unwrap();
    let live = Introspector::new(&db, dialect)
        .await
        .unwrap()
        .inspect(&desired)
        .await
        .unwrap();
    ReconciliationEngine::new(dialect, IgnoreRules::new(ignore).unwrap())
        .with_temp_names(TempNameGenerator::with_prefix("tmp_test"))
        .plan(&desired, &live)
}

fn live_test_database() -> FakeCatalog {
    FakeCatalog::new("app")
        .table("test", test_table_columns())
        .primary_key("test", "PRIMARY")
        .index("test", "idx_bar")
        .view("viewtest")
}

#[tokio::test]
async fn test_new_column_and_view_are_planned_in_phase_order() {
    let dialect = MySqlDialect::new();
    let plan = plan_for(&dialect, TEST_SCHEMA, live_test_database(), &[]).await;

    assert_eq!(plan.phase(Phase::Setup), vec!["SET FOREIGN_KEY_CHECKS = 0"]);
    assert_eq!(
        plan.phase(Phase::DropRecreatables),
        vec![
            "ALTER TABLE test DROP PRIMARY KEY",
            "ALTER TABLE test DROP INDEX idx_bar",
            "DROP VIEW viewtest",
        ]
    );
    assert_eq!(
        plan.phase(Phase::ReconcileTables),
        vec![
            "ALTER TABLE test CHANGE COLUMN id id int(11) NOT NULL AUTO_INCREMENT",
            "ALTER TABLE test ADD PRIMARY KEY(id)",
            "ALTER TABLE test CHANGE COLUMN bar bar varchar(255)",
            "ALTER TABLE test CHANGE COLUMN foo foo varchar(255) DEFAULT 'x'",
            "ALTER TABLE test ADD COLUMN baz int NOT NULL DEFAULT 0",
        ]
    );

    let recreated = plan.phase(Phase::RecreateObjects);
    assert_eq!(recreated.len(), 2);
    assert_eq!(recreated[0], "DROP VIEW IF EXISTS viewtest");
    assert!(recreated[1].starts_with("CREATE VIEW viewtest AS SELECT bar FROM test"));

    assert!(plan.phase(Phase::DropObsoleteTables).is_empty());
    assert_eq!(plan.phase(Phase::Teardown), vec!["SET FOREIGN_KEY_CHECKS = 1"]);

    // phases never interleave
    let phases: Vec<Phase> = plan.phase_counts().into_iter().map(|(p, _)| p).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Setup,
            Phase::DropRecreatables,
            Phase::ReconcileTables,
            Phase::RecreateObjects,
            Phase::Teardown,
        ]
    );
}

#[tokio::test]
async fn test_obsolete_table_is_dropped_exactly_once() {
    let dialect = MySqlDialect::new();
    let catalog = live_test_database().table(
        "legacy",
        vec![ColumnDefinition::new("id", "int(11)").nullable(false)],
    );
    let plan = plan_for(&dialect, TEST_SCHEMA, catalog, &[]).await;

    assert_eq!(
        plan.phase(Phase::DropObsoleteTables),
        vec!["DROP TABLE legacy CASCADE"]
    );
    let drops = plan
        .statements()
        .into_iter()
        .filter(|s| *s == "DROP TABLE legacy CASCADE")
        .count();
    assert_eq!(drops, 1);
}

#[tokio::test]
async fn test_foreign_keys_on_obsolete_tables_are_dropped_first() {
    let dialect = PostgresDialect::new();
    let schema = "CREATE TABLE child (id integer, parent_id integer);";
    let catalog = FakeCatalog::new("public")
        .table(
            "child",
            vec![
                ColumnDefinition::new("id", "integer"),
                ColumnDefinition::new("parent_id", "integer"),
            ],
        )
        .table("parent", vec![ColumnDefinition::new("id", "integer")])
        .foreign_key("child", "child_parent_fk", "parent");
    let plan = plan_for(&dialect, schema, catalog, &[]).await;

    assert_eq!(
        plan.phase(Phase::DropRecreatables),
        vec!["ALTER TABLE child DROP CONSTRAINT IF EXISTS child_parent_fk"]
    );
    assert_eq!(
        plan.phase(Phase::DropObsoleteTables),
        vec![
            "ALTER TABLE child DROP CONSTRAINT IF EXISTS child_parent_fk",
            "DROP TABLE parent CASCADE",
        ]
    );
}

#[rstest]
#[case::prefix(&["^audit"])]
#[case::anywhere(&["audit"])]
#[case::among_others(&["^nothing_here$", "^audit"])]
#[tokio::test]
async fn test_ignored_objects_are_never_dropped(#[case] ignore: &[&str]) {
    let dialect = MySqlDialect::new();
    let catalog = live_test_database()
        .table("audit", vec![ColumnDefinition::new("id", "int(11)")])
        .primary_key("audit", "PRIMARY")
        .index("audit", "idx_audit_id")
        .trigger("audit_trigger", "test")
        .view("audit_view")
        .procedure("audit_proc");
    let plan = plan_for(&dialect, TEST_SCHEMA, catalog, ignore).await;

    for statement in plan
        .phase(Phase::DropRecreatables)
        .into_iter()
        .chain(plan.phase(Phase::DropObsoleteTables))
    {
        assert!(
            !statement.contains("audit"),
            "ignored object dropped by `{}`",
            statement
        );
    }
}

#[tokio::test]
async fn test_ignored_existing_table_is_left_as_is() {
    let dialect = MySqlDialect::new();
    let schema = "CREATE TABLE test (id int(11) NOT NULL);";
    let plan = plan_for(&dialect, schema, live_test_database(), &["^test$"]).await;

    assert!(plan.phase(Phase::ReconcileTables).is_empty());
    assert!(plan
        .phase(Phase::DropRecreatables)
        .iter()
        .all(|s| !s.starts_with("ALTER TABLE test")));
}

#[tokio::test]
async fn test_missing_and_extra_columns_emit_one_statement_each() {
    let dialect = MySqlDialect::new();
    let mut columns = test_table_columns();
    columns.push(ColumnDefinition::new("obsolete", "text"));
    let catalog = FakeCatalog::new("app").table("test", columns);
    let plan = plan_for(&dialect, TEST_SCHEMA, catalog, &[]).await;

    let statements = plan.phase(Phase::ReconcileTables);
    let added: Vec<_> = statements.iter().filter(|s| s.contains("ADD COLUMN")).collect();
    let dropped: Vec<_> = statements.iter().filter(|s| s.contains("DROP COLUMN")).collect();
    assert_eq!(added, vec![&"ALTER TABLE test ADD COLUMN baz int NOT NULL DEFAULT 0"]);
    assert_eq!(dropped, vec![&"ALTER TABLE test DROP COLUMN obsolete"]);
}

#[tokio::test]
async fn test_second_pass_has_no_column_changes() {
    let dialect = MySqlDialect::new();
    let mut columns = test_table_columns();
    columns.push(ColumnDefinition::new("baz", "int").nullable(false).default("0"));
    let migrated = FakeCatalog::new("app")
        .table("test", columns)
        .primary_key("test", "PRIMARY")
        .view("viewtest");
    let plan = plan_for(&dialect, TEST_SCHEMA, migrated, &[]).await;

    assert!(plan
        .statements()
        .iter()
        .all(|s| !s.contains("ADD COLUMN") && !s.contains("DROP COLUMN")));
    assert!(plan.phase(Phase::DropObsoleteTables).is_empty());
    assert_eq!(
        plan.phase(Phase::RecreateObjects)[0],
        "DROP VIEW IF EXISTS viewtest"
    );
}

#[tokio::test]
async fn test_table_copied_with_like_keeps_its_live_columns() {
    let dialect = PostgresDialect::new();
    let schema = "CREATE TABLE t1 (id integer);\nCREATE TABLE t2 (LIKE t1 INCLUDING ALL);";
    let catalog = FakeCatalog::new("public")
        .table("t1", vec![ColumnDefinition::new("id", "integer")])
        .table(
            "t2",
            vec![
                ColumnDefinition::new("id", "integer"),
                ColumnDefinition::new("name", "text"),
            ],
        );
    let plan = plan_for(&dialect, schema, catalog, &[]).await;

    assert_eq!(
        plan.phase(Phase::ReconcileTables),
        vec![
            "ALTER TABLE t1 ALTER COLUMN id TYPE integer USING id::integer, \
             ALTER COLUMN id DROP NOT NULL, ALTER COLUMN id DROP DEFAULT"
        ]
    );
    assert!(plan.phase(Phase::DropObsoleteTables).is_empty());
}

#[tokio::test]
async fn test_not_null_after_reference_survives_reconciliation() {
    let dialect = PostgresDialect::new();
    let schema = "CREATE TABLE orders (owner integer REFERENCES users(id) NOT NULL);";
    let catalog = FakeCatalog::new("public").table(
        "orders",
        vec![ColumnDefinition::new("owner", "integer").nullable(false)],
    );
    let plan = plan_for(&dialect, schema, catalog, &[]).await;

    assert_eq!(
        plan.phase(Phase::ReconcileTables),
        vec![
            "ALTER TABLE orders ALTER COLUMN owner TYPE integer USING owner::integer, \
             ALTER COLUMN owner SET NOT NULL, ALTER COLUMN owner DROP DEFAULT",
            "ALTER TABLE orders ADD FOREIGN KEY (owner) REFERENCES users(id)",
        ]
    );
}

#[tokio::test]
async fn test_new_tables_are_created_verbatim() {
    let dialect = PostgresDialect::new();
    let schema = "CREATE TABLE fresh (id SERIAL PRIMARY KEY, name text NOT NULL);";
    let plan = plan_for(&dialect, schema, FakeCatalog::new("public"), &[]).await;

    assert_eq!(
        plan.phase(Phase::ReconcileTables),
        vec!["CREATE TABLE fresh (id SERIAL PRIMARY KEY, name text NOT NULL)"]
    );
}

#[tokio::test]
async fn test_routines_and_triggers_are_recreated_in_source_order() {
    let dialect = PostgresDialect::new();
    let schema = r#"
CREATE FUNCTION touch() RETURNS trigger AS $$
BEGIN
    NEW.updated_at := now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER test_touch BEFORE UPDATE ON test FOR EACH ROW EXECUTE FUNCTION touch();

CREATE INDEX test_bar ON test (bar);
"#;
    let catalog = FakeCatalog::new("public")
        .function("touch", "")
        .trigger("test_touch", "test");
    let plan = plan_for(&dialect, schema, catalog, &[]).await;

    assert_eq!(
        plan.phase(Phase::DropRecreatables),
        vec![
            "DROP FUNCTION IF EXISTS touch() CASCADE",
            "DROP TRIGGER IF EXISTS test_touch ON test",
        ]
    );

    let recreated = plan.phase(Phase::RecreateObjects);
    assert_eq!(recreated.len(), 5);
    assert_eq!(recreated[0], "DROP FUNCTION IF EXISTS touch CASCADE");
    assert!(recreated[1].starts_with("CREATE FUNCTION touch()"));
    assert_eq!(recreated[2], "DROP TRIGGER IF EXISTS test_touch ON test");
    assert!(recreated[3].starts_with("CREATE TRIGGER test_touch"));
    assert_eq!(recreated[4], "CREATE INDEX test_bar ON test (bar)");
}

#[tokio::test]
async fn test_one_shot_statements_replay_after_recreation() {
    let dialect = MySqlDialect::new();
    let schema = "
ALTER TABLE test ADD UNIQUE INDEX uq_bar (bar);
INSERT INTO test (bar) VALUES ('seed');
IF (SELECT COUNT(*) FROM test) = 0 THEN
    INSERT INTO test (bar) VALUES ('empty');
END IF;
";
    let plan = plan_for(&dialect, schema, FakeCatalog::new("app"), &[]).await;

    assert_eq!(
        plan.phase(Phase::ReplayStatements),
        vec![
            "ALTER TABLE test ADD UNIQUE INDEX uq_bar (bar)",
            "INSERT INTO test (bar) VALUES ('seed')",
            "DROP PROCEDURE IF EXISTS tmp_test_1",
            "CREATE PROCEDURE tmp_test_1()\nBEGIN\nIF (SELECT COUNT(*) FROM test) = 0 THEN\n    INSERT INTO test (bar) VALUES ('empty');\nEND IF;\nEND",
            "CALL tmp_test_1()",
            "DROP PROCEDURE tmp_test_1",
        ]
    );
}
