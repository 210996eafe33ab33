//! Versioned schema snapshot model.
//!
//! A [`Snapshot`] is a complete, serialized description of a database
//! schema at one point in time. Snapshots are the only input to the diff
//! engine; they are JSON-serializable and carry a format version so stale
//! inputs are refused instead of diffed lossily.
//!
//! All named collections are `BTreeMap`s keyed by `schema.name` (or bare
//! `name` for schema-less dialects), sorted for deterministic iteration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{DiffError, Result};

/// Snapshot format version understood by this engine.
pub const SNAPSHOT_VERSION: u32 = 3;

/// Builds the collection key for a schema-scoped entity.
///
/// Entities in the default schema (or in schema-less dialects) are keyed
/// by bare name.
#[must_use]
pub fn entity_key(schema: &str, name: &str) -> String {
    if schema.is_empty() || schema == "public" {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

/// A generated (computed) column expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedColumn {
    /// Generation expression, stored verbatim.
    pub expression: String,
    /// Persistence mode: `stored` or `virtual`.
    pub mode: GeneratedMode,
}

/// Persistence mode of a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedMode {
    /// Computed on write and stored.
    Stored,
    /// Computed on read.
    Virtual,
}

/// Sequence-backed identity generation spec for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// `always` generates on every insert; `byDefault` allows overrides.
    pub always: bool,
    /// Increment step.
    pub increment: i64,
    /// Minimum value.
    pub min_value: i64,
    /// Maximum value.
    pub max_value: i64,
    /// Starting value.
    pub start_with: i64,
    /// Cache size.
    pub cache: i64,
    /// Whether the sequence wraps around.
    pub cycle: bool,
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Raw SQL type token, case-normalized, dialect-specific.
    pub sql_type: String,
    /// Schema of the type, for columns typed by a named enum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_schema: Option<String>,
    /// Whether the column is NOT NULL.
    pub not_null: bool,
    /// Raw SQL default literal or expression, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether this column alone is the primary key.
    pub primary_key: bool,
    /// Whether this column auto-increments (MySQL/SQLite family).
    #[serde(default)]
    pub autoincrement: bool,
    /// Generated-column spec, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<GeneratedColumn>,
    /// Identity spec, if any. Mutually exclusive with `generated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// Whether the column carries a single-column UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Name of the unique constraint, when `unique` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
}

impl Column {
    /// Creates a new nullable column of the given raw SQL type.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            type_schema: None,
            not_null: false,
            default: None,
            primary_key: false,
            autoincrement: false,
            generated: None,
            identity: None,
            unique: false,
            unique_name: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default literal/expression (stored verbatim).
    #[must_use]
    pub fn default_sql(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Marks the column as the single-column primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Marks the column auto-incrementing.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Columns covered, in order.
    pub columns: Vec<String>,
    /// Whether this is a UNIQUE index.
    pub unique: bool,
    /// Partial index predicate (WHERE clause), stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    /// Index method (btree, hash, gin, ...). Empty means dialect default.
    #[serde(default)]
    pub method: String,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referencing table.
    pub table_from: String,
    /// Referencing columns. Invariant: all present in the table's columns.
    pub columns_from: Vec<String>,
    /// Referenced table.
    pub table_to: String,
    /// Referenced columns.
    pub columns_to: Vec<String>,
    /// Schema of the referenced table.
    #[serde(default)]
    pub schema_to: String,
    /// ON UPDATE action keyword, stored verbatim (e.g. `cascade`).
    #[serde(default)]
    pub on_update: String,
    /// ON DELETE action keyword, stored verbatim.
    #[serde(default)]
    pub on_delete: String,
}

/// A composite primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositePk {
    /// Constraint name.
    pub name: String,
    /// Key columns, in order.
    pub columns: Vec<String>,
}

/// A multi-column unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,
    /// Columns forming the constraint.
    pub columns: Vec<String>,
    /// Postgres `NULLS NOT DISTINCT` flag.
    #[serde(default)]
    pub nulls_not_distinct: bool,
}

/// A check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,
    /// Check expression, stored verbatim.
    pub value: String,
}

/// A row-level-security policy (Postgres family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Policy name.
    pub name: String,
    /// `PERMISSIVE` or `RESTRICTIVE`.
    pub action: String,
    /// Command the policy applies to (`ALL`, `SELECT`, ...).
    pub for_kind: String,
    /// Roles the policy applies to.
    pub to_roles: Vec<String>,
    /// USING expression, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using_expr: Option<String>,
    /// WITH CHECK expression, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_check: Option<String>,
}

/// A policy declared independently of its table's definition and linked
/// to the table by name (Postgres family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPolicy {
    /// Schema of the table the policy applies to.
    #[serde(default)]
    pub schema: String,
    /// Table the policy applies to.
    pub table: String,
    /// The policy itself.
    pub policy: Policy,
}

impl LinkedPolicy {
    /// Collection key for this policy (`schema.table.name`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", entity_key(&self.schema, &self.table), self.policy.name)
    }
}

/// A single table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Schema the table lives in. Empty for schema-less dialects.
    #[serde(default)]
    pub schema: String,
    /// Columns keyed by name.
    pub columns: BTreeMap<String, Column>,
    /// Indexes keyed by name.
    #[serde(default)]
    pub indexes: BTreeMap<String, Index>,
    /// Foreign keys keyed by constraint name.
    #[serde(default)]
    pub foreign_keys: BTreeMap<String, ForeignKey>,
    /// Composite primary keys keyed by constraint name.
    #[serde(default)]
    pub composite_primary_keys: BTreeMap<String, CompositePk>,
    /// Unique constraints keyed by constraint name.
    #[serde(default)]
    pub unique_constraints: BTreeMap<String, UniqueConstraint>,
    /// Check constraints keyed by constraint name.
    #[serde(default)]
    pub check_constraints: BTreeMap<String, CheckConstraint>,
    /// Policies attached to this table, keyed by name.
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
    /// Row-level-security flag (Postgres family only).
    #[serde(default)]
    pub is_rls_enabled: bool,
}

impl Table {
    /// Creates an empty table in the given schema.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            columns: BTreeMap::new(),
            indexes: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            composite_primary_keys: BTreeMap::new(),
            unique_constraints: BTreeMap::new(),
            check_constraints: BTreeMap::new(),
            policies: BTreeMap::new(),
            is_rls_enabled: false,
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.insert(fk.name.clone(), fk);
        self
    }

    /// Collection key for this table (`schema.name` or bare name).
    #[must_use]
    pub fn key(&self) -> String {
        entity_key(&self.schema, &self.name)
    }
}

/// A named enum type (Postgres family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumDef {
    /// Enum type name.
    pub name: String,
    /// Schema the type lives in.
    #[serde(default)]
    pub schema: String,
    /// Allowed values, in declaration order.
    pub values: Vec<String>,
}

impl EnumDef {
    /// Collection key for this enum.
    #[must_use]
    pub fn key(&self) -> String {
        entity_key(&self.schema, &self.name)
    }
}

/// A standalone sequence (Postgres family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// Schema the sequence lives in.
    #[serde(default)]
    pub schema: String,
    /// Increment step.
    pub increment: i64,
    /// Minimum value.
    pub min_value: i64,
    /// Maximum value.
    pub max_value: i64,
    /// Starting value.
    pub start_with: i64,
    /// Cache size.
    pub cache: i64,
    /// Whether the sequence wraps around.
    pub cycle: bool,
}

impl Sequence {
    /// Collection key for this sequence.
    #[must_use]
    pub fn key(&self) -> String {
        entity_key(&self.schema, &self.name)
    }
}

/// A database role (Postgres family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Role name.
    pub name: String,
    /// CREATEDB privilege.
    #[serde(default)]
    pub create_db: bool,
    /// CREATEROLE privilege.
    #[serde(default)]
    pub create_role: bool,
    /// INHERIT flag.
    #[serde(default = "default_true")]
    pub inherit: bool,
}

fn default_true() -> bool {
    true
}

/// A view definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    /// View name.
    pub name: String,
    /// Schema the view lives in.
    #[serde(default)]
    pub schema: String,
    /// SELECT definition, stored verbatim.
    pub definition: String,
    /// Whether this is a materialized view.
    #[serde(default)]
    pub materialized: bool,
    /// `WITH NO DATA` flag for materialized views.
    #[serde(default)]
    pub with_no_data: bool,
}

impl View {
    /// Collection key for this view.
    #[must_use]
    pub fn key(&self) -> String {
        entity_key(&self.schema, &self.name)
    }
}

/// A complete, versioned schema snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Snapshot format version.
    pub version: u32,
    /// Dialect this snapshot was taken for.
    pub dialect: Dialect,
    /// Named schemas (Postgres family). Keyed and valued by name.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
    /// Enum types keyed by `schema.name`.
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDef>,
    /// Sequences keyed by `schema.name`.
    #[serde(default)]
    pub sequences: BTreeMap<String, Sequence>,
    /// Roles keyed by name.
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
    /// Tables keyed by `schema.name`.
    pub tables: BTreeMap<String, Table>,
    /// Views keyed by `schema.name`.
    #[serde(default)]
    pub views: BTreeMap<String, View>,
    /// Table-independent policies keyed by `schema.table.name`.
    #[serde(default)]
    pub policies: BTreeMap<String, LinkedPolicy>,
}

impl Snapshot {
    /// Creates an empty snapshot at the current format version.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dialect,
            schemas: BTreeMap::new(),
            enums: BTreeMap::new(),
            sequences: BTreeMap::new(),
            roles: BTreeMap::new(),
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
            policies: BTreeMap::new(),
        }
    }

    /// Adds a table, keyed by `schema.name`.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.insert(table.key(), table);
        self
    }

    /// Parses a snapshot from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Serializes the snapshot to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates structural invariants.
    ///
    /// Checks the format version, that foreign keys reference existing
    /// columns, that `generated` and `identity` are mutually exclusive,
    /// and that no name or expression embeds the squash delimiter where it
    /// would break token round-tripping.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(DiffError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        for (key, table) in &self.tables {
            reject_delimiter("table name", &table.name)?;
            for column in table.columns.values() {
                reject_delimiter("column name", &column.name)?;
                reject_delimiter("column type", &column.sql_type)?;
                if let Some(default) = &column.default {
                    reject_delimiter("column default", default)?;
                }
                if column.generated.is_some() && column.identity.is_some() {
                    return Err(DiffError::InvalidSnapshot(format!(
                        "column '{}.{}' is both generated and identity",
                        key, column.name
                    )));
                }
            }
            for fk in table.foreign_keys.values() {
                for col in &fk.columns_from {
                    if !table.columns.contains_key(col) {
                        return Err(DiffError::InvalidSnapshot(format!(
                            "foreign key '{}' on '{}' references missing column '{}'",
                            fk.name, key, col
                        )));
                    }
                }
            }
            for index in table.indexes.values() {
                reject_delimiter("index name", &index.name)?;
                if let Some(where_clause) = &index.where_clause {
                    reject_delimiter("index predicate", where_clause)?;
                }
            }
            for policy in table.policies.values() {
                // Both policy expressions travel mid-token, so neither may
                // contain the delimiter.
                if let Some(using) = &policy.using_expr {
                    reject_delimiter("policy USING expression", using)?;
                }
                if let Some(check) = &policy.with_check {
                    reject_delimiter("policy WITH CHECK expression", check)?;
                }
            }
        }
        for linked in self.policies.values() {
            if let Some(using) = &linked.policy.using_expr {
                reject_delimiter("policy USING expression", using)?;
            }
            if let Some(check) = &linked.policy.with_check {
                reject_delimiter("policy WITH CHECK expression", check)?;
            }
        }
        Ok(())
    }
}

fn reject_delimiter(kind: &'static str, value: &str) -> Result<()> {
    if value.contains(';') {
        return Err(DiffError::ReservedDelimiter {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> Table {
        Table::new("users", "public")
            .column(Column::new("id", "bigint").primary_key())
            .column(Column::new("email", "text").not_null())
    }

    #[test]
    fn entity_keys_skip_default_schema() {
        assert_eq!(entity_key("public", "users"), "users");
        assert_eq!(entity_key("", "users"), "users");
        assert_eq!(entity_key("auth", "users"), "auth.users");
    }

    #[test]
    fn json_round_trip() {
        let snapshot = Snapshot::new(Dialect::Postgres).table(users_table());
        let json = snapshot.to_json().unwrap();
        let back = Snapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn stale_version_is_refused() {
        let mut snapshot = Snapshot::new(Dialect::Postgres);
        snapshot.version = SNAPSHOT_VERSION - 1;
        let err = snapshot.validate().unwrap_err();
        assert!(matches!(
            err,
            DiffError::UnsupportedVersion { found, .. } if found == SNAPSHOT_VERSION - 1
        ));
    }

    #[test]
    fn fk_must_reference_existing_columns() {
        let mut table = users_table();
        table.foreign_keys.insert(
            "users_org_id_fk".into(),
            ForeignKey {
                name: "users_org_id_fk".into(),
                table_from: "users".into(),
                columns_from: vec!["org_id".into()],
                table_to: "orgs".into(),
                columns_to: vec!["id".into()],
                schema_to: "public".into(),
                on_update: String::new(),
                on_delete: String::new(),
            },
        );
        let snapshot = Snapshot::new(Dialect::Postgres).table(table);
        assert!(matches!(
            snapshot.validate(),
            Err(DiffError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn generated_and_identity_are_exclusive() {
        let mut column = Column::new("n", "bigint");
        column.generated = Some(GeneratedColumn {
            expression: "id * 2".into(),
            mode: GeneratedMode::Stored,
        });
        column.identity = Some(Identity {
            always: true,
            increment: 1,
            min_value: 1,
            max_value: i64::MAX,
            start_with: 1,
            cache: 1,
            cycle: false,
        });
        let snapshot =
            Snapshot::new(Dialect::Postgres).table(Table::new("t", "public").column(column));
        assert!(matches!(
            snapshot.validate(),
            Err(DiffError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn delimiter_in_name_is_refused() {
        let snapshot = Snapshot::new(Dialect::Postgres)
            .table(Table::new("users", "public").column(Column::new("a;b", "text")));
        assert!(matches!(
            snapshot.validate(),
            Err(DiffError::ReservedDelimiter { .. })
        ));
    }
}
