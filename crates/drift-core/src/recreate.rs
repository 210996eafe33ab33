//! SQLite recreate-table merging.
//!
//! SQLite cannot alter a column's type, default, nullability or
//! autoincrement, nor add/drop a foreign key, composite primary key,
//! unique or check constraint on an existing table. This pass scans the
//! planned statement list per table; on the first such statement it
//! replaces everything accumulated for that table with a single
//! [`Statement::RecreateTable`] group derived from the already-diffed
//! target state, and absorbs any further statements for the same table
//! instead of re-triggering. Table and column renames are hoisted to run
//! before all recreate groups, because a recreate references columns by
//! their final names. A table is recreated at most once per invocation.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{DiffError, Result};
use crate::snapshot::Snapshot;
use crate::statement::Statement;

fn triggers_recreate(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::AlterColumn { .. }
            | Statement::CreateReference { .. }
            | Statement::DropReference { .. }
            | Statement::CreateCompositePk { .. }
            | Statement::DropCompositePk { .. }
            | Statement::CreateUnique { .. }
            | Statement::DropUnique { .. }
            | Statement::CreateCheck { .. }
            | Statement::DropCheck { .. }
    )
}

fn is_rename(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::RenameTable { .. } | Statement::RenameColumn { .. }
    )
}

/// Replaces inexpressible per-table statements with recreate groups.
///
/// `prev` must be the fully patched previous snapshot (renames applied),
/// so both snapshots key the table identically and column names line up.
pub fn merge_recreates(
    statements: Vec<Statement>,
    prev: &Snapshot,
    curr: &Snapshot,
) -> Result<Vec<Statement>> {
    let mut recreated: BTreeSet<String> = BTreeSet::new();
    let mut merged: Vec<Statement> = Vec::new();

    for statement in statements {
        let Some(key) = statement.table_key() else {
            merged.push(statement);
            continue;
        };

        if recreated.contains(&key) {
            // The group already rebuilds this table to its target state;
            // renames ran before it and everything else is subsumed.
            if is_rename(&statement) {
                merged.push(statement);
            }
            continue;
        }

        if !triggers_recreate(&statement) {
            merged.push(statement);
            continue;
        }

        let target = curr
            .tables
            .get(&key)
            .ok_or_else(|| DiffError::UnknownEntity {
                kind: "table",
                key: key.clone(),
            })?;
        let previous = prev
            .tables
            .get(&key)
            .ok_or_else(|| DiffError::UnknownEntity {
                kind: "table",
                key: key.clone(),
            })?;

        debug!(table = %key, trigger = statement.kind(), "merging into table recreation");

        // Rows are copied over the columns surviving the rebuild;
        // generated columns recompute themselves.
        let copy_columns: Vec<String> = target
            .columns
            .values()
            .filter(|c| c.generated.is_none() && previous.columns.contains_key(&c.name))
            .map(|c| c.name.clone())
            .collect();

        merged.retain(|existing| existing.table_key().as_ref() != Some(&key) || is_rename(existing));
        merged.push(Statement::RecreateTable {
            table: target.clone(),
            copy_columns,
        });
        recreated.insert(key);
    }

    // Renames must precede every recreate group: a group references its
    // table and columns by final name.
    if !recreated.is_empty() {
        let (renames, rest): (Vec<_>, Vec<_>) = merged.into_iter().partition(is_rename);
        let mut hoisted = renames;
        hoisted.extend(rest);
        merged = hoisted;
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::diff::ColumnChange;
    use crate::snapshot::{Column, Table};

    fn prev_snapshot() -> Snapshot {
        Snapshot::new(Dialect::Sqlite).table(
            Table::new("users", "")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("email", "text")),
        )
    }

    fn curr_snapshot() -> Snapshot {
        Snapshot::new(Dialect::Sqlite).table(
            Table::new("users", "")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("email", "text").not_null()),
        )
    }

    fn alter_email() -> Statement {
        Statement::AlterColumn {
            schema: String::new(),
            table: "users".into(),
            column: Column::new("email", "text").not_null(),
            change: ColumnChange::NotNull { to: true },
        }
    }

    #[test]
    fn alter_column_becomes_recreate_group() {
        let merged = merge_recreates(vec![alter_email()], &prev_snapshot(), &curr_snapshot())
            .unwrap();
        assert_eq!(merged.len(), 1);
        let Statement::RecreateTable { table, copy_columns } = &merged[0] else {
            panic!("expected RecreateTable, got {:?}", merged[0]);
        };
        assert_eq!(table.name, "users");
        assert_eq!(copy_columns, &["email".to_string(), "id".to_string()]);
    }

    #[test]
    fn second_trigger_does_not_retrigger() {
        let statements = vec![
            alter_email(),
            Statement::AlterColumn {
                schema: String::new(),
                table: "users".into(),
                column: Column::new("id", "integer"),
                change: ColumnChange::NotNull { to: false },
            },
        ];
        let merged =
            merge_recreates(statements, &prev_snapshot(), &curr_snapshot()).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0], Statement::RecreateTable { .. }));
    }

    #[test]
    fn earlier_statements_for_the_table_are_replaced() {
        let statements = vec![
            Statement::AddColumn {
                schema: String::new(),
                table: "users".into(),
                column: Column::new("age", "integer"),
            },
            alter_email(),
        ];
        let merged =
            merge_recreates(statements, &prev_snapshot(), &curr_snapshot()).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0], Statement::RecreateTable { .. }));
    }

    #[test]
    fn unrelated_tables_pass_through() {
        let statements = vec![
            Statement::AddColumn {
                schema: String::new(),
                table: "posts".into(),
                column: Column::new("title", "text"),
            },
            alter_email(),
        ];
        let merged =
            merge_recreates(statements, &prev_snapshot(), &curr_snapshot()).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(matches!(merged[0], Statement::AddColumn { .. }));
        assert!(matches!(merged[1], Statement::RecreateTable { .. }));
    }

    #[test]
    fn renames_are_hoisted_before_groups() {
        let statements = vec![
            Statement::RenameColumn {
                schema: String::new(),
                table: "users".into(),
                from: "mail".into(),
                to: "email".into(),
            },
            alter_email(),
        ];
        let merged =
            merge_recreates(statements, &prev_snapshot(), &curr_snapshot()).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(matches!(merged[0], Statement::RenameColumn { .. }));
        assert!(matches!(merged[1], Statement::RecreateTable { .. }));
    }

    #[test]
    fn generated_columns_are_not_copied() {
        let mut curr = curr_snapshot();
        let table = curr.tables.get_mut("users").unwrap();
        let mut generated = Column::new("email_domain", "text");
        generated.generated = Some(crate::snapshot::GeneratedColumn {
            expression: "substr(email, instr(email, '@'))".into(),
            mode: crate::snapshot::GeneratedMode::Virtual,
        });
        table.columns.insert(generated.name.clone(), generated);

        let merged = merge_recreates(vec![alter_email()], &prev_snapshot(), &curr).unwrap();
        let Statement::RecreateTable { copy_columns, .. } = &merged[0] else {
            panic!("expected RecreateTable");
        };
        assert!(!copy_columns.contains(&"email_domain".to_string()));
    }
}
