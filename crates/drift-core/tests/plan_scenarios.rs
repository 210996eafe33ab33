//! Integration tests for the snapshot diff engine.
//!
//! These tests build "previous" and "current" snapshots, diff them
//! through the full planner pipeline, and verify both the abstract
//! statement plan and the rendered SQL.

use drift_core::diff::Renamed;
use drift_core::prelude::*;
use drift_core::snapshot::{ForeignKey, Index, View};
use tokio_test::block_on;

fn users_v1(dialect: Dialect) -> Table {
    let schema = if dialect == Dialect::Postgres { "public" } else { "" };
    Table::new("users", schema)
        .column(Column::new("id", "bigint").primary_key())
        .column(Column::new("email", "text").not_null())
}

fn full_pg_snapshot() -> Snapshot {
    let users = users_v1(Dialect::Postgres).index(Index {
        name: "users_email_idx".into(),
        columns: vec!["email".into()],
        unique: true,
        where_clause: None,
        method: "btree".into(),
    });
    let posts = Table::new("posts", "public")
        .column(Column::new("id", "bigint").primary_key())
        .column(Column::new("author_id", "bigint").not_null())
        .foreign_key(ForeignKey {
            name: "posts_author_fk".into(),
            table_from: "posts".into(),
            columns_from: vec!["author_id".into()],
            table_to: "users".into(),
            columns_to: vec!["id".into()],
            schema_to: "public".into(),
            on_update: String::new(),
            on_delete: "cascade".into(),
        });
    let mut snapshot = Snapshot::new(Dialect::Postgres).table(users).table(posts);
    snapshot.views.insert(
        "emails".into(),
        View {
            name: "emails".into(),
            schema: "public".into(),
            definition: "SELECT email FROM users".into(),
            materialized: false,
            with_no_data: false,
        },
    );
    snapshot
}

#[test]
fn diffing_a_snapshot_against_itself_is_empty() {
    let snapshot = full_pg_snapshot();
    let plan = block_on(diff_snapshots(
        &snapshot,
        &snapshot,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert!(plan.is_empty(), "unexpected plan: {:?}", plan.statements);
}

#[test]
fn unsupported_snapshot_version_is_refused() {
    let mut prev = full_pg_snapshot();
    prev.version = SNAPSHOT_VERSION + 1;
    let curr = full_pg_snapshot();
    let err = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap_err();
    assert!(matches!(err, DiffError::UnsupportedVersion { .. }));
}

/// Resolver scripted to report one fixed table rename.
struct ScriptedRename {
    from: String,
    to: String,
}

impl Resolver for ScriptedRename {
    async fn resolve(
        &mut self,
        _kind: EntityKind,
        created: Vec<EntityRef>,
        deleted: Vec<EntityRef>,
    ) -> drift_core::error::Result<Resolution> {
        let mut resolution = Resolution::default();
        for from in deleted {
            if from.name == self.from {
                let to = created
                    .iter()
                    .find(|c| c.name == self.to)
                    .expect("scripted target must exist")
                    .clone();
                resolution.renamed.push(Renamed { from, to });
            } else {
                resolution.deleted.push(from);
            }
        }
        for to in created {
            if to.name != self.to {
                resolution.created.push(to);
            }
        }
        Ok(resolution)
    }
}

#[test]
fn rename_via_resolver_produces_exactly_one_rename_statement() {
    let prev = Snapshot::new(Dialect::Postgres).table(users_v1(Dialect::Postgres));
    let mut renamed = users_v1(Dialect::Postgres);
    renamed.name = "accounts".into();
    let curr = Snapshot::new(Dialect::Postgres).table(renamed);

    let mut resolver = ScriptedRename {
        from: "users".into(),
        to: "accounts".into(),
    };
    let plan = block_on(diff_snapshots(&prev, &curr, &mut resolver, ApplyMode::Generate)).unwrap();

    assert_eq!(plan.statements.len(), 1, "{:?}", plan.statements);
    assert!(matches!(
        &plan.statements[0],
        Statement::RenameTable { from, to, .. } if from == "users" && to == "accounts"
    ));
    assert_eq!(
        plan.sql,
        vec!["ALTER TABLE \"users\" RENAME TO \"accounts\";"]
    );
}

#[test]
fn structural_resolver_detects_rename_by_identical_columns() {
    let prev = Snapshot::new(Dialect::Postgres).table(users_v1(Dialect::Postgres));
    let mut renamed = users_v1(Dialect::Postgres);
    renamed.name = "accounts".into();
    let curr = Snapshot::new(Dialect::Postgres).table(renamed);

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut StructuralResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert_eq!(plan.statements.len(), 1);
    assert!(matches!(plan.statements[0], Statement::RenameTable { .. }));
}

/// Resolver that loses an entity from its partition.
struct LossyResolver;

impl Resolver for LossyResolver {
    async fn resolve(
        &mut self,
        _kind: EntityKind,
        created: Vec<EntityRef>,
        _deleted: Vec<EntityRef>,
    ) -> drift_core::error::Result<Resolution> {
        Ok(Resolution {
            created,
            deleted: Vec::new(),
            renamed: Vec::new(),
        })
    }
}

#[test]
fn inconsistent_resolution_aborts_the_diff() {
    let prev = Snapshot::new(Dialect::Postgres).table(users_v1(Dialect::Postgres));
    let mut other = users_v1(Dialect::Postgres);
    other.name = "accounts".into();
    let curr = Snapshot::new(Dialect::Postgres).table(other);

    let err = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut LossyResolver,
        ApplyMode::Generate,
    ))
    .unwrap_err();
    assert!(matches!(err, DiffError::InconsistentResolution { .. }));
}

/// Resolver standing in for a human pressing abort.
struct AbortingResolver;

impl Resolver for AbortingResolver {
    async fn resolve(
        &mut self,
        kind: EntityKind,
        _created: Vec<EntityRef>,
        _deleted: Vec<EntityRef>,
    ) -> drift_core::error::Result<Resolution> {
        Err(DiffError::ResolverAborted {
            kind: kind.as_str(),
        })
    }
}

#[test]
fn resolver_abort_produces_no_partial_output() {
    let prev = Snapshot::new(Dialect::Postgres).table(users_v1(Dialect::Postgres));
    let mut other = users_v1(Dialect::Postgres);
    other.name = "accounts".into();
    let curr = Snapshot::new(Dialect::Postgres).table(other);

    let err = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut AbortingResolver,
        ApplyMode::Generate,
    ))
    .unwrap_err();
    assert!(matches!(err, DiffError::ResolverAborted { .. }));
}

#[test]
fn dropped_fk_is_ordered_before_the_table_it_references() {
    let prev = full_pg_snapshot();
    let mut curr = full_pg_snapshot();
    curr.tables.remove("users");
    curr.views.clear();
    let posts = curr.tables.get_mut("posts").unwrap();
    posts.foreign_keys.clear();

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();

    let fk_drop = plan
        .sql
        .iter()
        .position(|s| s.contains("DROP CONSTRAINT \"posts_author_fk\""))
        .expect("fk drop missing");
    let table_drop = plan
        .sql
        .iter()
        .position(|s| s == "DROP TABLE \"users\";")
        .expect("table drop missing");
    assert!(fk_drop < table_drop, "{:?}", plan.sql);
}

#[test]
fn mysql_add_column_uses_backtick_quoting() {
    let prev = Snapshot::new(Dialect::Mysql).table(users_v1(Dialect::Mysql));
    let mut with_column = users_v1(Dialect::Mysql);
    with_column = with_column.column(Column::new("bio", "text").default_sql("'x'"));
    let curr = Snapshot::new(Dialect::Mysql).table(with_column);

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert_eq!(
        plan.sql,
        vec!["ALTER TABLE `users` ADD COLUMN `bio` text DEFAULT 'x';"]
    );
}

#[test]
fn mysql_type_change_restates_the_column() {
    let prev = Snapshot::new(Dialect::Mysql).table(
        Table::new("users", "")
            .column(Column::new("id", "bigint").primary_key())
            .column(Column::new("score", "int").not_null()),
    );
    let curr = Snapshot::new(Dialect::Mysql).table(
        Table::new("users", "")
            .column(Column::new("id", "bigint").primary_key())
            .column(Column::new("score", "bigint").not_null()),
    );

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert_eq!(
        plan.sql,
        vec!["ALTER TABLE `users` MODIFY COLUMN `score` bigint NOT NULL;"]
    );
}

#[test]
fn sqlite_incompatible_alter_becomes_single_recreate_group() {
    let prev = Snapshot::new(Dialect::Sqlite).table(
        Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("email", "text")),
    );
    let curr = Snapshot::new(Dialect::Sqlite).table(
        Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("email", "text").not_null()),
    );

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();

    assert_eq!(plan.statements.len(), 1);
    assert!(matches!(plan.statements[0], Statement::RecreateTable { .. }));
    assert_eq!(plan.sql.len(), 4);
    assert_eq!(plan.sql[0], "ALTER TABLE `users` RENAME TO `__old_users`;");
    assert!(plan.sql[1].starts_with("CREATE TABLE `users` ("));
    assert_eq!(
        plan.sql[2],
        "INSERT INTO `users` (`email`,`id`) SELECT `email`,`id` FROM `__old_users`;"
    );
    assert_eq!(plan.sql[3], "DROP TABLE `__old_users`;");
}

#[test]
fn sqlite_column_rename_is_hoisted_before_the_recreate_group() {
    let prev = Snapshot::new(Dialect::Sqlite).table(
        Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("mail", "text")),
    );
    let curr = Snapshot::new(Dialect::Sqlite).table(
        Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("email", "text").not_null()),
    );

    // mail -> email rename, plus a NOT NULL change that forces a
    // recreate. The rename must run first.
    struct RenameMail;
    impl Resolver for RenameMail {
        async fn resolve(
            &mut self,
            _kind: EntityKind,
            created: Vec<EntityRef>,
            deleted: Vec<EntityRef>,
        ) -> drift_core::error::Result<Resolution> {
            Ok(Resolution {
                created: Vec::new(),
                deleted: Vec::new(),
                renamed: vec![Renamed {
                    from: deleted.into_iter().next().unwrap(),
                    to: created.into_iter().next().unwrap(),
                }],
            })
        }
    }

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut RenameMail,
        ApplyMode::Generate,
    ))
    .unwrap();

    assert_eq!(plan.statements.len(), 2, "{:?}", plan.statements);
    assert!(matches!(plan.statements[0], Statement::RenameColumn { .. }));
    assert!(matches!(plan.statements[1], Statement::RecreateTable { .. }));
    assert_eq!(
        plan.sql[0],
        "ALTER TABLE `users` RENAME COLUMN `mail` TO `email`;"
    );
}

#[test]
fn view_definition_change_is_replaced_in_place() {
    let prev = full_pg_snapshot();
    let mut curr = full_pg_snapshot();
    curr.views.get_mut("emails").unwrap().definition =
        "SELECT email FROM users WHERE email IS NOT NULL".into();

    let plan = block_on(diff_snapshots(
        &prev,
        &curr,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert_eq!(
        plan.sql,
        vec![
            "CREATE OR REPLACE VIEW \"emails\" AS SELECT email FROM users WHERE email IS NOT NULL;"
        ]
    );
}

#[test]
fn snapshot_json_round_trips_through_the_planner() {
    let snapshot = full_pg_snapshot();
    let json = snapshot.to_json().unwrap();
    let parsed = Snapshot::from_json(&json).unwrap();
    assert_eq!(snapshot, parsed);

    let plan = block_on(diff_snapshots(
        &parsed,
        &snapshot,
        &mut NoopResolver,
        ApplyMode::Generate,
    ))
    .unwrap();
    assert!(plan.is_empty());
}
