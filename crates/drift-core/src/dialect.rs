//! Dialect selection and per-dialect identifier rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL engine families supported by the diff engine.
///
/// A single dialect value is threaded through every planner and generator
/// call; mixed-dialect runs are rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Postgres family: schemas, enums, sequences, roles, policies, RLS.
    Postgres,
    /// MySQL family: backtick quoting, `MODIFY COLUMN` alterations.
    Mysql,
    /// SQLite family: most alterations require whole-table recreation.
    Sqlite,
}

impl Dialect {
    /// Returns the identifier quote character for this dialect.
    #[must_use]
    pub fn quote_char(&self) -> char {
        match self {
            Self::Postgres => '"',
            Self::Mysql | Self::Sqlite => '`',
        }
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(&self, name: &str) -> String {
        let q = self.quote_char();
        format!("{q}{name}{q}")
    }

    /// Whether this dialect supports named schemas inside one database.
    #[must_use]
    pub fn supports_schemas(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Default schema name for schema-scoped entities.
    #[must_use]
    pub fn default_schema(&self) -> &'static str {
        match self {
            Self::Postgres => "public",
            Self::Mysql | Self::Sqlite => "",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        };
        write!(f, "{name}")
    }
}

/// How the generated plan will be consumed.
///
/// Destructive or ambiguous alterations (shrinking an enum, redefining a
/// check constraint) are only emitted when generating a reviewable
/// migration file; applying directly skips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Generate a migration file for human review.
    #[default]
    Generate,
    /// Apply statements directly to a database.
    Push,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_family() {
        assert_eq!(Dialect::Postgres.quote("users"), "\"users\"");
        assert_eq!(Dialect::Mysql.quote("users"), "`users`");
        assert_eq!(Dialect::Sqlite.quote("users"), "`users`");
    }

    #[test]
    fn schema_support() {
        assert!(Dialect::Postgres.supports_schemas());
        assert!(!Dialect::Mysql.supports_schemas());
        assert!(!Dialect::Sqlite.supports_schemas());
    }

    #[test]
    fn dialect_serde_tags() {
        let json = serde_json::to_string(&Dialect::Postgres).unwrap();
        assert_eq!(json, "\"postgres\"");
        let back: Dialect = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(back, Dialect::Sqlite);
    }
}
