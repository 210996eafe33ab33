//! Postgres-family SQL generation.

use tracing::warn;

use super::{column_list, object_ref};
use crate::dialect::{ApplyMode, Dialect};
use crate::diff::ColumnChange;
use crate::error::{DiffError, Result};
use crate::snapshot::{Column, ForeignKey, Identity, Sequence, Table};
use crate::statement::Statement;

const DIALECT: Dialect = Dialect::Postgres;

fn unsupported(statement: &Statement) -> DiffError {
    DiffError::UnsupportedStatement {
        statement: statement.kind(),
        dialect: DIALECT,
    }
}

fn q(name: &str) -> String {
    DIALECT.quote(name)
}

fn table_ref(schema: &str, name: &str) -> String {
    object_ref(DIALECT, schema, name)
}

fn type_token(column: &Column) -> String {
    match column.type_schema.as_deref() {
        Some(schema) if !schema.is_empty() && schema != "public" => {
            format!("{}.{}", q(schema), q(&column.sql_type))
        }
        Some(_) => q(&column.sql_type),
        None => column.sql_type.clone(),
    }
}

fn identity_clause(identity: &Identity) -> String {
    let kind = if identity.always { "ALWAYS" } else { "BY DEFAULT" };
    let cycle = if identity.cycle { " CYCLE" } else { "" };
    format!(
        "GENERATED {kind} AS IDENTITY (INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} CACHE {}{cycle})",
        identity.increment, identity.min_value, identity.max_value, identity.start_with, identity.cache,
    )
}

fn column_def(column: &Column) -> String {
    let mut def = format!("{} {}", q(&column.name), type_token(column));
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if let Some(generated) = &column.generated {
        def.push_str(&format!(
            " GENERATED ALWAYS AS ({}) STORED",
            generated.expression
        ));
    }
    if let Some(identity) = &column.identity {
        def.push(' ');
        def.push_str(&identity_clause(identity));
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    if column.not_null && !column.primary_key {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        match &column.unique_name {
            Some(name) => def.push_str(&format!(" CONSTRAINT {} UNIQUE", q(name))),
            None => def.push_str(" UNIQUE"),
        }
    }
    def
}

fn fk_clause(fk: &ForeignKey) -> String {
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        column_list(DIALECT, &fk.columns_from),
        table_ref(&fk.schema_to, &fk.table_to),
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

fn sequence_options(seq: &Sequence) -> String {
    let cycle = if seq.cycle { " CYCLE" } else { "" };
    format!(
        "INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} CACHE {}{cycle}",
        seq.increment, seq.min_value, seq.max_value, seq.start_with, seq.cache,
    )
}

fn create_table(table: &Table) -> String {
    let mut lines: Vec<String> = table
        .columns
        .values()
        .map(|c| format!("\t{}", column_def(c)))
        .collect();
    for pk in table.composite_primary_keys.values() {
        lines.push(format!(
            "\tCONSTRAINT {} PRIMARY KEY({})",
            q(&pk.name),
            column_list(DIALECT, &pk.columns)
        ));
    }
    for uc in table.unique_constraints.values() {
        let nulls = if uc.nulls_not_distinct {
            " NULLS NOT DISTINCT"
        } else {
            ""
        };
        lines.push(format!(
            "\tCONSTRAINT {} UNIQUE{nulls}({})",
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
    format!(
        "CREATE TABLE {} (\n{}\n);",
        table_ref(&table.schema, &table.name),
        lines.join(",\n")
    )
}

fn enum_values(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn alter_column(
    schema: &str,
    table: &str,
    column: &Column,
    change: &ColumnChange,
    statement: &Statement,
) -> Result<Vec<String>> {
    let tref = table_ref(schema, table);
    let col = q(&column.name);
    let sql = match change {
        ColumnChange::Type { .. } => vec![format!(
            "ALTER TABLE {tref} ALTER COLUMN {col} SET DATA TYPE {};",
            type_token(column)
        )],
        ColumnChange::Default { to: Some(default) } => vec![format!(
            "ALTER TABLE {tref} ALTER COLUMN {col} SET DEFAULT {default};"
        )],
        ColumnChange::Default { to: None } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} DROP DEFAULT;")]
        }
        ColumnChange::NotNull { to: true } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} SET NOT NULL;")]
        }
        ColumnChange::NotNull { to: false } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} DROP NOT NULL;")]
        }
        ColumnChange::PrimaryKey { to: true } => {
            vec![format!("ALTER TABLE {tref} ADD PRIMARY KEY ({col});")]
        }
        ColumnChange::PrimaryKey { to: false } => vec![format!(
            "ALTER TABLE {tref} DROP CONSTRAINT {};",
            q(&format!("{table}_pkey"))
        )],
        // Autoincrement is a MySQL/SQLite concept; a correct planner
        // never emits it for this family.
        ColumnChange::Autoincrement { .. } => return Err(unsupported(statement)),
        ColumnChange::Generated { to: Some(_) } => {
            // The expression of a stored generated column cannot be
            // altered in place; rebuild the column.
            vec![
                format!("ALTER TABLE {tref} DROP COLUMN {col};"),
                format!("ALTER TABLE {tref} ADD COLUMN {};", column_def(column)),
            ]
        }
        ColumnChange::Generated { to: None } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} DROP EXPRESSION;")]
        }
        ColumnChange::Identity { from: None, to: Some(identity) } => vec![format!(
            "ALTER TABLE {tref} ALTER COLUMN {col} ADD {};",
            identity_clause(identity)
        )],
        ColumnChange::Identity { from: Some(_), to: Some(identity) } => {
            let kind = if identity.always { "ALWAYS" } else { "BY DEFAULT" };
            let mut clauses = vec![
                format!("SET GENERATED {kind}"),
                format!("SET INCREMENT BY {}", identity.increment),
                format!("SET MINVALUE {}", identity.min_value),
                format!("SET MAXVALUE {}", identity.max_value),
                format!("SET START WITH {}", identity.start_with),
                format!("SET CACHE {}", identity.cache),
            ];
            clauses.push(if identity.cycle {
                "SET CYCLE".to_string()
            } else {
                "SET NO CYCLE".to_string()
            });
            vec![format!(
                "ALTER TABLE {tref} ALTER COLUMN {col} {};",
                clauses.join(" ")
            )]
        }
        ColumnChange::Identity { from: Some(_), to: None } => {
            vec![format!("ALTER TABLE {tref} ALTER COLUMN {col} DROP IDENTITY;")]
        }
        ColumnChange::Identity { from: None, to: None } => Vec::new(),
    };
    Ok(sql)
}

pub(super) fn render(statement: &Statement, mode: ApplyMode) -> Result<Vec<String>> {
    let sql = match statement {
        Statement::CreateSchema { name } => vec![format!("CREATE SCHEMA {};", q(name))],
        Statement::RenameSchema { from, to } => {
            vec![format!("ALTER SCHEMA {} RENAME TO {};", q(from), q(to))]
        }
        Statement::DropSchema { name } => vec![format!("DROP SCHEMA {};", q(name))],

        Statement::CreateEnum { def } => vec![format!(
            "CREATE TYPE {} AS ENUM({});",
            table_ref(&def.schema, &def.name),
            enum_values(&def.values)
        )],
        Statement::AddEnumValue {
            schema,
            name,
            value,
            before,
        } => {
            let position = match before {
                Some(next) => format!(" BEFORE '{}'", next.replace('\'', "''")),
                None => String::new(),
            };
            vec![format!(
                "ALTER TYPE {} ADD VALUE '{}'{position};",
                table_ref(schema, name),
                value.replace('\'', "''")
            )]
        }
        Statement::RecreateEnum { def, columns } => {
            if mode == ApplyMode::Push {
                // Shrinking an enum silently drops values; that needs a
                // human looking at a migration file first.
                warn!(
                    enum_name = %def.name,
                    "skipping enum recreation in push mode"
                );
                return Ok(Vec::new());
            }
            let type_ref = table_ref(&def.schema, &def.name);
            let mut sql = Vec::new();
            for col_use in columns {
                let tref = table_ref(&col_use.schema, &col_use.table);
                sql.push(format!(
                    "ALTER TABLE {tref} ALTER COLUMN {} SET DATA TYPE text;",
                    q(&col_use.column)
                ));
            }
            sql.push(format!("DROP TYPE {type_ref};"));
            sql.push(format!(
                "CREATE TYPE {type_ref} AS ENUM({});",
                enum_values(&def.values)
            ));
            for col_use in columns {
                let tref = table_ref(&col_use.schema, &col_use.table);
                let col = q(&col_use.column);
                sql.push(format!(
                    "ALTER TABLE {tref} ALTER COLUMN {col} SET DATA TYPE {type_ref} USING {col}::{type_ref};"
                ));
                if let Some(default) = &col_use.default {
                    sql.push(format!(
                        "ALTER TABLE {tref} ALTER COLUMN {col} SET DEFAULT {default};"
                    ));
                }
            }
            sql
        }
        Statement::RenameEnum { schema, from, to } => vec![format!(
            "ALTER TYPE {} RENAME TO {};",
            table_ref(schema, from),
            q(to)
        )],
        Statement::MoveEnum {
            name,
            schema_from,
            schema_to,
        } => vec![format!(
            "ALTER TYPE {} SET SCHEMA {};",
            table_ref(schema_from, name),
            q(schema_to)
        )],
        Statement::DropEnum { schema, name } => {
            vec![format!("DROP TYPE {};", table_ref(schema, name))]
        }

        Statement::CreateSequence { seq } => vec![format!(
            "CREATE SEQUENCE {} {};",
            table_ref(&seq.schema, &seq.name),
            sequence_options(seq)
        )],
        Statement::AlterSequence { seq } => vec![format!(
            "ALTER SEQUENCE {} {};",
            table_ref(&seq.schema, &seq.name),
            sequence_options(seq)
        )],
        Statement::RenameSequence { schema, from, to } => vec![format!(
            "ALTER SEQUENCE {} RENAME TO {};",
            table_ref(schema, from),
            q(to)
        )],
        Statement::MoveSequence {
            name,
            schema_from,
            schema_to,
        } => vec![format!(
            "ALTER SEQUENCE {} SET SCHEMA {};",
            table_ref(schema_from, name),
            q(schema_to)
        )],
        Statement::DropSequence { schema, name } => {
            vec![format!("DROP SEQUENCE {};", table_ref(schema, name))]
        }

        Statement::CreateRole { role } => {
            let mut options = Vec::new();
            if role.create_db {
                options.push("CREATEDB");
            }
            if role.create_role {
                options.push("CREATEROLE");
            }
            if !role.inherit {
                options.push("NOINHERIT");
            }
            if options.is_empty() {
                vec![format!("CREATE ROLE {};", q(&role.name))]
            } else {
                vec![format!(
                    "CREATE ROLE {} WITH {};",
                    q(&role.name),
                    options.join(" ")
                )]
            }
        }
        Statement::AlterRole { role } => {
            let create_db = if role.create_db { "CREATEDB" } else { "NOCREATEDB" };
            let create_role = if role.create_role {
                "CREATEROLE"
            } else {
                "NOCREATEROLE"
            };
            let inherit = if role.inherit { "INHERIT" } else { "NOINHERIT" };
            vec![format!(
                "ALTER ROLE {} WITH {create_db} {create_role} {inherit};",
                q(&role.name)
            )]
        }
        Statement::RenameRole { from, to } => {
            vec![format!("ALTER ROLE {} RENAME TO {};", q(from), q(to))]
        }
        Statement::DropRole { name } => vec![format!("DROP ROLE {};", q(name))],

        Statement::CreateTable { table } => vec![create_table(table)],
        Statement::DropTable { schema, name } => {
            vec![format!("DROP TABLE {};", table_ref(schema, name))]
        }
        Statement::RenameTable { schema, from, to } => vec![format!(
            "ALTER TABLE {} RENAME TO {};",
            table_ref(schema, from),
            q(to)
        )],
        Statement::SetTableSchema {
            name,
            schema_from,
            schema_to,
        } => vec![format!(
            "ALTER TABLE {} SET SCHEMA {};",
            table_ref(schema_from, name),
            q(schema_to)
        )],

        Statement::EnableRls { schema, table } => vec![format!(
            "ALTER TABLE {} ENABLE ROW LEVEL SECURITY;",
            table_ref(schema, table)
        )],
        Statement::DisableRls { schema, table } => vec![format!(
            "ALTER TABLE {} DISABLE ROW LEVEL SECURITY;",
            table_ref(schema, table)
        )],

        Statement::CreateView { view } => {
            let materialized = if view.materialized { "MATERIALIZED " } else { "" };
            let no_data = if view.materialized && view.with_no_data {
                " WITH NO DATA"
            } else {
                ""
            };
            vec![format!(
                "CREATE {materialized}VIEW {} AS {}{no_data};",
                table_ref(&view.schema, &view.name),
                view.definition
            )]
        }
        Statement::DropView {
            schema,
            name,
            materialized,
        } => {
            let kind = if *materialized { "MATERIALIZED VIEW" } else { "VIEW" };
            vec![format!("DROP {kind} {};", table_ref(schema, name))]
        }
        Statement::RenameView {
            schema,
            from,
            to,
            materialized,
        } => {
            let kind = if *materialized { "MATERIALIZED VIEW" } else { "VIEW" };
            vec![format!(
                "ALTER {kind} {} RENAME TO {};",
                table_ref(schema, from),
                q(to)
            )]
        }
        Statement::MoveView {
            name,
            schema_from,
            schema_to,
            materialized,
        } => {
            let kind = if *materialized { "MATERIALIZED VIEW" } else { "VIEW" };
            vec![format!(
                "ALTER {kind} {} SET SCHEMA {};",
                table_ref(schema_from, name),
                q(schema_to)
            )]
        }
        Statement::AlterView { view } => {
            if view.materialized {
                // No OR REPLACE for materialized views.
                let vref = table_ref(&view.schema, &view.name);
                let no_data = if view.with_no_data { " WITH NO DATA" } else { "" };
                vec![
                    format!("DROP MATERIALIZED VIEW {vref};"),
                    format!(
                        "CREATE MATERIALIZED VIEW {vref} AS {}{no_data};",
                        view.definition
                    ),
                ]
            } else {
                vec![format!(
                    "CREATE OR REPLACE VIEW {} AS {};",
                    table_ref(&view.schema, &view.name),
                    view.definition
                )]
            }
        }

        Statement::AddColumn {
            schema,
            table,
            column,
        } => vec![format!(
            "ALTER TABLE {} ADD COLUMN {};",
            table_ref(schema, table),
            column_def(column)
        )],
        Statement::DropColumn {
            schema,
            table,
            column,
        } => vec![format!(
            "ALTER TABLE {} DROP COLUMN {};",
            table_ref(schema, table),
            q(column)
        )],
        Statement::RenameColumn {
            schema,
            table,
            from,
            to,
        } => vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            table_ref(schema, table),
            q(from),
            q(to)
        )],
        Statement::AlterColumn {
            schema,
            table,
            column,
            change,
        } => alter_column(schema, table, column, change, statement)?,

        Statement::CreateIndex {
            schema,
            table,
            index,
        } => {
            let unique = if index.unique { "UNIQUE " } else { "" };
            let method = if index.method.is_empty() || index.method == "btree" {
                String::new()
            } else {
                format!(" USING {}", index.method)
            };
            let mut sql = format!(
                "CREATE {unique}INDEX {} ON {}{method} ({})",
                q(&index.name),
                table_ref(schema, table),
                column_list(DIALECT, &index.columns)
            );
            if let Some(predicate) = &index.where_clause {
                sql.push_str(&format!(" WHERE {predicate}"));
            }
            sql.push(';');
            vec![sql]
        }
        Statement::DropIndex { schema, index, .. } => {
            vec![format!("DROP INDEX {};", table_ref(schema, &index.name))]
        }

        Statement::CreateReference { schema, table, fk } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            table_ref(schema, table),
            q(&fk.name),
            fk_clause(fk)
        )],
        Statement::DropReference {
            schema,
            table,
            name,
        }
        | Statement::DropCompositePk {
            schema,
            table,
            name,
        }
        | Statement::DropUnique {
            schema,
            table,
            name,
        }
        | Statement::DropCheck {
            schema,
            table,
            name,
        } => vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            table_ref(schema, table),
            q(name)
        )],
        Statement::CreateCompositePk { schema, table, pk } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY({});",
            table_ref(schema, table),
            q(&pk.name),
            column_list(DIALECT, &pk.columns)
        )],
        Statement::CreateUnique {
            schema,
            table,
            unique,
        } => {
            let nulls = if unique.nulls_not_distinct {
                " NULLS NOT DISTINCT"
            } else {
                ""
            };
            vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE{nulls}({});",
                table_ref(schema, table),
                q(&unique.name),
                column_list(DIALECT, &unique.columns)
            )]
        }
        Statement::CreateCheck {
            schema,
            table,
            check,
        } => vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
            table_ref(schema, table),
            q(&check.name),
            check.value
        )],

        Statement::CreatePolicy {
            schema,
            table,
            policy,
        } => {
            let roles = if policy.to_roles.is_empty() {
                "public".to_string()
            } else {
                policy.to_roles.join(", ")
            };
            let mut sql = format!(
                "CREATE POLICY {} ON {} AS {} FOR {} TO {roles}",
                q(&policy.name),
                table_ref(schema, table),
                policy.action,
                policy.for_kind
            );
            if let Some(using) = &policy.using_expr {
                sql.push_str(&format!(" USING ({using})"));
            }
            if let Some(check) = &policy.with_check {
                sql.push_str(&format!(" WITH CHECK ({check})"));
            }
            sql.push(';');
            vec![sql]
        }
        Statement::AlterPolicy {
            schema,
            table,
            policy,
        } => {
            let roles = if policy.to_roles.is_empty() {
                "public".to_string()
            } else {
                policy.to_roles.join(", ")
            };
            let mut sql = format!(
                "ALTER POLICY {} ON {} TO {roles}",
                q(&policy.name),
                table_ref(schema, table)
            );
            if let Some(using) = &policy.using_expr {
                sql.push_str(&format!(" USING ({using})"));
            }
            if let Some(check) = &policy.with_check {
                sql.push_str(&format!(" WITH CHECK ({check})"));
            }
            sql.push(';');
            vec![sql]
        }
        Statement::RenamePolicy {
            schema,
            table,
            from,
            to,
        } => vec![format!(
            "ALTER POLICY {} ON {} RENAME TO {};",
            q(from),
            table_ref(schema, table),
            q(to)
        )],
        Statement::DropPolicy {
            schema,
            table,
            name,
        } => vec![format!(
            "DROP POLICY {} ON {};",
            q(name),
            table_ref(schema, table)
        )],

        // Whole-table recreation is the SQLite fallback; the Postgres
        // family alters everything in place.
        Statement::RecreateTable { .. } => return Err(unsupported(statement)),
    };
    Ok(sql)
}
