//! MySQL-family SQL generation.
//!
//! No schema qualification (a MySQL schema is a database), backtick
//! quoting, and whole-definition `MODIFY COLUMN` for in-place column
//! alterations. Enums, sequences, roles, policies and RLS are Postgres
//! territory; a correct planner never routes those statements here.

use super::column_list;
use crate::dialect::{ApplyMode, Dialect};
use crate::diff::ColumnChange;
use crate::error::{DiffError, Result};
use crate::snapshot::{Column, ForeignKey, Table};
use crate::statement::Statement;

const DIALECT: Dialect = Dialect::Mysql;

fn unsupported(statement: &Statement) -> DiffError {
    DiffError::UnsupportedStatement {
        statement: statement.kind(),
        dialect: DIALECT,
    }
}

fn q(name: &str) -> String {
    DIALECT.quote(name)
}

fn column_def(column: &Column) -> String {
    let mut def = format!("{} {}", q(&column.name), column.sql_type);
    if column.autoincrement {
        def.push_str(" AUTO_INCREMENT");
    }
    if let Some(generated) = &column.generated {
        let mode = match generated.mode {
            crate::snapshot::GeneratedMode::Stored => "STORED",
            crate::snapshot::GeneratedMode::Virtual => "VIRTUAL",
        };
        def.push_str(&format!(" GENERATED ALWAYS AS ({}) {mode}", generated.expression));
    }
    if column.not_null && !column.primary_key {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    def
}

fn fk_clause(fk: &ForeignKey) -> String {
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        column_list(DIALECT, &fk.columns_from),
        q(&fk.table_to),
        column_list(DIALECT, &fk.columns_to),
    );
    if !fk.on_update.is_empty() {
        sql.push_str(&format!(" ON UPDATE {}", fk.on_update));
    }
    if !fk.on_delete.is_empty() {
        sql.push_str(&format!(" ON DELETE {}", fk.on_delete));
    }
    sql
}

fn create_table(table: &Table) -> String {
    let mut lines: Vec<String> = table
        .columns
        .values()
        .map(|c| format!("\t{}", column_def(c)))
        .collect();
    for pk in table.composite_primary_keys.values() {
        lines.push(format!(
            "\tPRIMARY KEY({})",
            column_list(DIALECT, &pk.columns)
        ));
    }
    for uc in table.unique_constraints.values() {
        lines.push(format!(
            "\tCONSTRAINT {} UNIQUE({})",
            q(&uc.name),
            column_list(DIALECT, &uc.columns)
        ));
    }
    for check in table.check_constraints.values() {
        lines.push(format!(
            "\tCONSTRAINT {} CHECK ({})",
            q(&check.name),
            check.value
        ));
    }
    format!("CREATE TABLE {} (\n{}\n);", q(&table.name), lines.join(",\n"))
}

fn alter_column(
    table: &str,
    column: &Column,
    change: &ColumnChange,
    statement: &Statement,
) -> Result<Vec<String>> {
    let tref = q(table);
    let col = q(&column.name);
    let sql = match change {
        // Defaults alter without re-stating the whole definition.
        ColumnChange::Default { to: Some(default) } => vec![format!(
            "ALTER TABLE {tref} ALTER COLUMN {col} SET DEFAULT {default};"
        )],
        ColumnChange::Default { to: None } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} DROP DEFAULT;")]
        }
        ColumnChange::PrimaryKey { to: true } => {
            vec![format!("ALTER TABLE {tref} ADD PRIMARY KEY ({col});")]
        }
        ColumnChange::PrimaryKey { to: false } => {
            vec![format!("ALTER TABLE {tref} DROP PRIMARY KEY;")]
        }
        ColumnChange::Generated { to: Some(_) } => {
            // Plain columns cannot become generated in place.
            vec![
                format!("ALTER TABLE {tref} DROP COLUMN {col};"),
                format!("ALTER TABLE {tref} ADD COLUMN {};", column_def(column)),
            ]
        }
        ColumnChange::Type { .. }
        | ColumnChange::NotNull { .. }
        | ColumnChange::Autoincrement { .. }
        | ColumnChange::Generated { to: None } => {
            vec![format!(
                "ALTER TABLE {tref} MODIFY COLUMN {};",
                column_def(column)
            )]
        }
        // Identity columns are a Postgres feature.
        ColumnChange::Identity { .. } => return Err(unsupported(statement)),
    };
    Ok(sql)
}

pub(super) fn render(statement: &Statement, _mode: ApplyMode) -> Result<Vec<String>> {
    let sql = match statement {
        Statement::CreateTable { table } => vec![create_table(table)],
        Statement::DropTable { name, .. } => vec![format!("DROP TABLE {};", q(name))],
        Statement::RenameTable { from, to, .. } => {
            vec![format!("RENAME TABLE {} TO {};", q(from), q(to))]
        }

        Statement::CreateView { view } => {
            if view.materialized {
                return Err(unsupported(statement));
            }
            vec![format!(
                "CREATE VIEW {} AS {};",
                q(&view.name),
                view.definition
            )]
        }
        Statement::DropView { name, .. } => vec![format!("DROP VIEW {};", q(name))],
        Statement::RenameView { from, to, .. } => {
            vec![format!("RENAME TABLE {} TO {};", q(from), q(to))]
        }
        Statement::AlterView { view } => vec![format!(
            "ALTER VIEW {} AS {};",
            q(&view.name),
            view.definition
        )],

        Statement::AddColumn { table, column, .. } => vec![format!(
            "ALTER TABLE {} ADD COLUMN {};",
            q(table),
            column_def(column)
        )],
        Statement::DropColumn { table, column, .. } => vec![format!(
            "ALTER TABLE {} DROP COLUMN {};",
            q(table),
            q(column)
        )],
        Statement::RenameColumn {
            table, from, to, ..
        } => vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            q(table),
            q(from),
            q(to)
        )],
        Statement::AlterColumn {
            table,
            column,
            change,
            ..
        } => alter_column(table, column, change, statement)?,

        Statement::CreateIndex { table, index, .. } => {
            let unique = if index.unique { "UNIQUE " } else { "" };
            vec![format!(
                "CREATE {unique}INDEX {} ON {} ({});",
                q(&index.name),
                q(table),
                column_list(DIALECT, &index.columns)
            )]
        }
        Statement::DropIndex { table, index, .. } => {
            vec![format!("DROP INDEX {} ON {};", q(&index.name), q(table))]
        }

        Statement::CreateReference { table, fk, .. } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            q(table),
            q(&fk.name),
            fk_clause(fk)
        )],
        Statement::DropReference { table, name, .. } => vec![format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            q(table),
            q(name)
        )],
        Statement::CreateCompositePk { table, pk, .. } => vec![format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({});",
            q(table),
            column_list(DIALECT, &pk.columns)
        )],
        Statement::DropCompositePk { table, .. } => {
            vec![format!("ALTER TABLE {} DROP PRIMARY KEY;", q(table))]
        }
        Statement::CreateUnique { table, unique, .. } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE({});",
            q(table),
            q(&unique.name),
            column_list(DIALECT, &unique.columns)
        )],
        Statement::DropUnique { table, name, .. } => {
            vec![format!("ALTER TABLE {} DROP INDEX {};", q(table), q(name))]
        }
        Statement::CreateCheck { table, check, .. } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
            q(table),
            q(&check.name),
            check.value
        )],
        Statement::DropCheck { table, name, .. } => {
            vec![format!("ALTER TABLE {} DROP CHECK {};", q(table), q(name))]
        }

        // Schemas, enums, sequences, roles, policies, RLS and
        // whole-table recreation have no MySQL rendering.
        Statement::CreateSchema { .. }
        | Statement::RenameSchema { .. }
        | Statement::DropSchema { .. }
        | Statement::CreateEnum { .. }
        | Statement::AddEnumValue { .. }
        | Statement::RecreateEnum { .. }
        | Statement::RenameEnum { .. }
        | Statement::MoveEnum { .. }
        | Statement::DropEnum { .. }
        | Statement::CreateSequence { .. }
        | Statement::AlterSequence { .. }
        | Statement::RenameSequence { .. }
        | Statement::MoveSequence { .. }
        | Statement::DropSequence { .. }
        | Statement::CreateRole { .. }
        | Statement::AlterRole { .. }
        | Statement::RenameRole { .. }
        | Statement::DropRole { .. }
        | Statement::SetTableSchema { .. }
        | Statement::MoveView { .. }
        | Statement::EnableRls { .. }
        | Statement::DisableRls { .. }
        | Statement::CreatePolicy { .. }
        | Statement::AlterPolicy { .. }
        | Statement::RenamePolicy { .. }
        | Statement::DropPolicy { .. }
        | Statement::RecreateTable { .. } => return Err(unsupported(statement)),
    };
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_one(statement: &Statement) -> String {
        let sql = render(statement, ApplyMode::Generate).unwrap();
        assert_eq!(sql.len(), 1, "expected one statement, got {sql:?}");
        sql.into_iter().next().unwrap()
    }

    #[test]
    fn add_column_uses_backticks() {
        let statement = Statement::AddColumn {
            schema: String::new(),
            table: "users".into(),
            column: Column::new("email", "text").default_sql("'x'"),
        };
        assert_eq!(
            render_one(&statement),
            "ALTER TABLE `users` ADD COLUMN `email` text DEFAULT 'x';"
        );
    }

    #[test]
    fn type_change_restates_full_definition() {
        let statement = Statement::AlterColumn {
            schema: String::new(),
            table: "users".into(),
            column: Column::new("score", "bigint").not_null(),
            change: ColumnChange::Type {
                from: "int".into(),
                to: "bigint".into(),
            },
        };
        assert_eq!(
            render_one(&statement),
            "ALTER TABLE `users` MODIFY COLUMN `score` bigint NOT NULL;"
        );
    }

    #[test]
    fn drop_foreign_key_keyword() {
        let statement = Statement::DropReference {
            schema: String::new(),
            table: "posts".into(),
            name: "posts_author_fk".into(),
        };
        assert_eq!(
            render_one(&statement),
            "ALTER TABLE `posts` DROP FOREIGN KEY `posts_author_fk`;"
        );
    }

    #[test]
    fn autoincrement_in_create_table() {
        let table = Table::new("users", "")
            .column(Column::new("id", "bigint").primary_key().autoincrement());
        let sql = render_one(&Statement::CreateTable { table });
        assert!(sql.contains("`id` bigint AUTO_INCREMENT PRIMARY KEY"));
    }

    #[test]
    fn enum_statements_fail_loudly() {
        let statement = Statement::DropEnum {
            schema: String::new(),
            name: "status".into(),
        };
        assert!(matches!(
            render(&statement, ApplyMode::Generate),
            Err(DiffError::UnsupportedStatement { .. })
        ));
    }
}
