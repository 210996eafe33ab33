//! SQLite-family SQL generation.
//!
//! SQLite cannot alter a column's type/default/nullability, nor add or
//! drop constraints incrementally; those statements never reach this
//! module because the recreate merger replaces them with a
//! [`Statement::RecreateTable`] group beforehand. Foreign keys and
//! table-level constraints only exist inside `CREATE TABLE`.

use super::column_list;
use crate::dialect::{ApplyMode, Dialect};
use crate::error::{DiffError, Result};
use crate::snapshot::{Column, Index, Table};
use crate::statement::Statement;

const DIALECT: Dialect = Dialect::Sqlite;

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
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
        if column.autoincrement {
            def.push_str(" AUTOINCREMENT");
        }
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
    if column.unique {
        def.push_str(" UNIQUE");
    }
    def
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
    for fk in table.foreign_keys.values() {
        let mut clause = format!(
            "\tFOREIGN KEY ({}) REFERENCES {} ({})",
            column_list(DIALECT, &fk.columns_from),
            q(&fk.table_to),
            column_list(DIALECT, &fk.columns_to),
        );
        if !fk.on_update.is_empty() {
            clause.push_str(&format!(" ON UPDATE {}", fk.on_update));
        }
        if !fk.on_delete.is_empty() {
            clause.push_str(&format!(" ON DELETE {}", fk.on_delete));
        }
        lines.push(clause);
    }
    format!("CREATE TABLE {} (\n{}\n);", q(&table.name), lines.join(",\n"))
}

fn create_index(table: &str, index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let mut sql = format!(
        "CREATE {unique}INDEX {} ON {} ({})",
        q(&index.name),
        q(table),
        column_list(DIALECT, &index.columns)
    );
    if let Some(predicate) = &index.where_clause {
        sql.push_str(&format!(" WHERE {predicate}"));
    }
    sql.push(';');
    sql
}

fn recreate_table(table: &Table, copy_columns: &[String]) -> Vec<String> {
    let old_name = format!("__old_{}", table.name);
    let columns = column_list(DIALECT, copy_columns);
    let mut sql = vec![
        format!("ALTER TABLE {} RENAME TO {};", q(&table.name), q(&old_name)),
        create_table(table),
        format!(
            "INSERT INTO {} ({columns}) SELECT {columns} FROM {};",
            q(&table.name),
            q(&old_name)
        ),
        format!("DROP TABLE {};", q(&old_name)),
    ];
    for index in table.indexes.values() {
        sql.push(create_index(&table.name, index));
    }
    sql
}

pub(super) fn render(statement: &Statement, _mode: ApplyMode) -> Result<Vec<String>> {
    let sql = match statement {
        Statement::CreateTable { table } => vec![create_table(table)],
        Statement::DropTable { name, .. } => vec![format!("DROP TABLE {};", q(name))],
        Statement::RenameTable { from, to, .. } => {
            vec![format!("ALTER TABLE {} RENAME TO {};", q(from), q(to))]
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
        // Views are renamed by the planner as drop + create; altering a
        // definition goes the same way.
        Statement::AlterView { view } => vec![
            format!("DROP VIEW {};", q(&view.name)),
            format!("CREATE VIEW {} AS {};", q(&view.name), view.definition),
        ],

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

        Statement::CreateIndex { table, index, .. } => vec![create_index(table, index)],
        Statement::DropIndex { index, .. } => {
            // Index names are database-global.
            vec![format!("DROP INDEX {};", q(&index.name))]
        }

        Statement::RecreateTable {
            table,
            copy_columns,
        } => recreate_table(table, copy_columns),

        // Everything below requires table recreation (handled by the
        // merger) or belongs to another family entirely.
        Statement::AlterColumn { .. }
        | Statement::CreateReference { .. }
        | Statement::DropReference { .. }
        | Statement::CreateCompositePk { .. }
        | Statement::DropCompositePk { .. }
        | Statement::CreateUnique { .. }
        | Statement::DropUnique { .. }
        | Statement::CreateCheck { .. }
        | Statement::DropCheck { .. }
        | Statement::RenameView { .. }
        | Statement::MoveView { .. }
        | Statement::CreateSchema { .. }
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
        | Statement::EnableRls { .. }
        | Statement::DisableRls { .. }
        | Statement::CreatePolicy { .. }
        | Statement::AlterPolicy { .. }
        | Statement::RenamePolicy { .. }
        | Statement::DropPolicy { .. } => return Err(unsupported(statement)),
    };
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ForeignKey;

    #[test]
    fn add_column_uses_backticks() {
        let statement = Statement::AddColumn {
            schema: String::new(),
            table: "users".into(),
            column: Column::new("email", "text").default_sql("'x'"),
        };
        let sql = render(&statement, ApplyMode::Generate).unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE `users` ADD COLUMN `email` text DEFAULT 'x';"]
        );
    }

    #[test]
    fn create_table_embeds_foreign_keys() {
        let table = Table::new("posts", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("author_id", "integer"))
            .foreign_key(ForeignKey {
                name: "posts_author_fk".into(),
                table_from: "posts".into(),
                columns_from: vec!["author_id".into()],
                table_to: "users".into(),
                columns_to: vec!["id".into()],
                schema_to: String::new(),
                on_update: String::new(),
                on_delete: "cascade".into(),
            });
        let sql = render(&Statement::CreateTable { table }, ApplyMode::Generate).unwrap();
        assert!(sql[0].contains(
            "FOREIGN KEY (`author_id`) REFERENCES `users` (`id`) ON DELETE cascade"
        ));
    }

    #[test]
    fn recreate_group_order() {
        let table = Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("email", "text").not_null());
        let statement = Statement::RecreateTable {
            table,
            copy_columns: vec!["id".into(), "email".into()],
        };
        let sql = render(&statement, ApplyMode::Generate).unwrap();
        assert_eq!(sql.len(), 4);
        assert_eq!(sql[0], "ALTER TABLE `users` RENAME TO `__old_users`;");
        assert!(sql[1].starts_with("CREATE TABLE `users` (\n"));
        assert_eq!(
            sql[2],
            "INSERT INTO `users` (`id`,`email`) SELECT `id`,`email` FROM `__old_users`;"
        );
        assert_eq!(sql[3], "DROP TABLE `__old_users`;");
    }

    #[test]
    fn recreate_reissues_target_indexes() {
        let table = Table::new("users", "")
            .column(Column::new("id", "integer").primary_key())
            .index(Index {
                name: "users_id_idx".into(),
                columns: vec!["id".into()],
                unique: false,
                where_clause: None,
                method: String::new(),
            });
        let statement = Statement::RecreateTable {
            table,
            copy_columns: vec!["id".into()],
        };
        let sql = render(&statement, ApplyMode::Generate).unwrap();
        assert_eq!(sql.len(), 5);
        assert_eq!(sql[4], "CREATE INDEX `users_id_idx` ON `users` (`id`);");
    }

    #[test]
    fn alter_column_never_reaches_the_generator() {
        let statement = Statement::AlterColumn {
            schema: String::new(),
            table: "users".into(),
            column: Column::new("email", "text").not_null(),
            change: crate::diff::ColumnChange::NotNull { to: true },
        };
        assert!(matches!(
            render(&statement, ApplyMode::Generate),
            Err(DiffError::UnsupportedStatement { .. })
        ));
    }
}
