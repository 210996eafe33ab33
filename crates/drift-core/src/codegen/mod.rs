//! Dialect-specific SQL generation.
//!
//! Each dialect module is an exhaustive `match` over [`Statement`], so a
//! new statement kind that is not handled for every dialect is a build
//! error rather than a runtime "no rule found". A statement that reaches
//! a dialect which cannot express it returns
//! [`DiffError::UnsupportedStatement`](crate::error::DiffError); that
//! path is unreachable from a correct planner and exists to fail
//! loudly, not to be caught.

mod mysql;
mod postgres;
mod sqlite;

use crate::dialect::{ApplyMode, Dialect};
use crate::error::Result;
use crate::statement::Statement;

/// Renders one statement into zero or more SQL statements.
///
/// Zero only happens for unsafe alterations skipped in push mode.
pub fn render_statement(
    statement: &Statement,
    dialect: Dialect,
    mode: ApplyMode,
) -> Result<Vec<String>> {
    match dialect {
        Dialect::Postgres => postgres::render(statement, mode),
        Dialect::Mysql => mysql::render(statement, mode),
        Dialect::Sqlite => sqlite::render(statement, mode),
    }
}

/// Renders a whole plan and removes textually identical duplicates.
///
/// Duplicates happen when two code paths coincide on the same alteration
/// (e.g. a default change alongside a type change); the first occurrence
/// keeps its position.
pub fn render_plan(
    statements: &[Statement],
    dialect: Dialect,
    mode: ApplyMode,
) -> Result<Vec<String>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut sql = Vec::new();
    for statement in statements {
        for rendered in render_statement(statement, dialect, mode)? {
            if seen.insert(rendered.clone()) {
                sql.push(rendered);
            }
        }
    }
    Ok(sql)
}

/// Schema-qualified object reference for dialects that support schemas;
/// bare quoted name otherwise. The default schema is never written out.
pub(crate) fn object_ref(dialect: Dialect, schema: &str, name: &str) -> String {
    if dialect.supports_schemas() && !schema.is_empty() && schema != dialect.default_schema() {
        format!("{}.{}", dialect.quote(schema), dialect.quote(name))
    } else {
        dialect.quote(name)
    }
}

/// Comma-joined quoted column list.
pub(crate) fn column_list(dialect: Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote(c))
        .collect::<Vec<_>>()
        .join(",")
}
