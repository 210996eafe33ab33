//! Generic entity differ.
//!
//! Operates over squashed maps: key-set difference for added/deleted
//! detection, token comparison for in-place alteration detection, and a
//! field-by-field structural diff for columns. All sub-entity diffing
//! (indexes, foreign keys, constraints, policies) reduces to the same
//! token comparison, parameterized only by the squash function.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::snapshot::{
    CheckConstraint, Column, CompositePk, EnumDef, ForeignKey, GeneratedColumn, Identity, Index,
    LinkedPolicy, Policy, Role, Sequence, Table, UniqueConstraint, View,
};
use crate::squash::{
    squash_check, squash_fk, squash_index, squash_pk, squash_policy, squash_unique, unsquash_check,
    unsquash_fk, unsquash_index, unsquash_pk, unsquash_policy, unsquash_unique,
};

/// Key-set difference between two same-shape maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    /// Keys present only in the current map.
    pub added: Vec<String>,
    /// Keys present only in the previous map.
    pub deleted: Vec<String>,
}

impl KeyDiff {
    /// Returns `true` when neither side has exclusive keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Computes the key-set difference between two maps.
#[must_use]
pub fn diff_keys<A, B>(prev: &BTreeMap<String, A>, curr: &BTreeMap<String, B>) -> KeyDiff {
    KeyDiff {
        added: curr
            .keys()
            .filter(|k| !prev.contains_key(*k))
            .cloned()
            .collect(),
        deleted: prev
            .keys()
            .filter(|k| !curr.contains_key(*k))
            .cloned()
            .collect(),
    }
}

/// A value change detected for a key present on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChange {
    /// Shared key.
    pub key: String,
    /// Previous squashed token.
    pub before: String,
    /// Current squashed token.
    pub after: String,
}

/// Compares squashed tokens for every key present in both maps.
#[must_use]
pub fn diff_tokens(
    prev: &BTreeMap<String, String>,
    curr: &BTreeMap<String, String>,
) -> Vec<TokenChange> {
    prev.iter()
        .filter_map(|(key, before)| {
            let after = curr.get(key)?;
            (before != after).then(|| TokenChange {
                key: key.clone(),
                before: before.clone(),
                after: after.clone(),
            })
        })
        .collect()
}

/// A matched entity whose value changed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Altered<T> {
    /// Previous value.
    pub before: T,
    /// Current value.
    pub after: T,
}

/// A resolved rename.
#[derive(Debug, Clone, PartialEq)]
pub struct Renamed<T> {
    /// Entity as it appears in the previous snapshot.
    pub from: T,
    /// Entity as it appears in the current snapshot.
    pub to: T,
}

/// A resolved move between schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    /// Entity name (unchanged by the move).
    pub name: String,
    /// Schema it moved out of.
    pub schema_from: String,
    /// Schema it moved into.
    pub schema_to: String,
}

/// Created/deleted/renamed/moved sets for one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDiff<T> {
    /// Entities present only in the current snapshot.
    pub created: Vec<T>,
    /// Entities present only in the previous snapshot.
    pub deleted: Vec<T>,
    /// Entities matched as renames by the resolver.
    pub renamed: Vec<Renamed<T>>,
    /// Entities matched as schema moves by the resolver.
    pub moved: Vec<Moved>,
}

impl<T> Default for EntityDiff<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            deleted: Vec::new(),
            renamed: Vec::new(),
            moved: Vec::new(),
        }
    }
}

/// One detected change on a column present on both sides.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnChange {
    /// Data type changed.
    Type {
        /// Previous raw type token.
        from: String,
        /// New raw type token.
        to: String,
    },
    /// Default set or changed (`Some`) or dropped (`None`).
    Default {
        /// New default, if any.
        to: Option<String>,
    },
    /// Nullability changed.
    NotNull {
        /// New NOT NULL flag.
        to: bool,
    },
    /// Single-column primary key flag changed.
    PrimaryKey {
        /// New primary-key flag.
        to: bool,
    },
    /// Autoincrement flag changed.
    Autoincrement {
        /// New autoincrement flag.
        to: bool,
    },
    /// Generated-column spec set, changed or dropped.
    Generated {
        /// New generation spec, if any.
        to: Option<GeneratedColumn>,
    },
    /// Identity spec set, changed or dropped.
    Identity {
        /// Previous identity spec, if any.
        from: Option<Identity>,
        /// New identity spec, if any.
        to: Option<Identity>,
    },
}

/// Compares two columns field by field.
#[must_use]
pub fn diff_columns(prev: &Column, curr: &Column) -> Vec<ColumnChange> {
    let mut changes = Vec::new();
    if prev.sql_type != curr.sql_type || prev.type_schema != curr.type_schema {
        changes.push(ColumnChange::Type {
            from: prev.sql_type.clone(),
            to: curr.sql_type.clone(),
        });
    }
    if prev.default != curr.default {
        changes.push(ColumnChange::Default {
            to: curr.default.clone(),
        });
    }
    if prev.not_null != curr.not_null {
        changes.push(ColumnChange::NotNull { to: curr.not_null });
    }
    if prev.primary_key != curr.primary_key {
        changes.push(ColumnChange::PrimaryKey {
            to: curr.primary_key,
        });
    }
    if prev.autoincrement != curr.autoincrement {
        changes.push(ColumnChange::Autoincrement {
            to: curr.autoincrement,
        });
    }
    if prev.generated != curr.generated {
        changes.push(ColumnChange::Generated {
            to: curr.generated.clone(),
        });
    }
    if prev.identity != curr.identity {
        changes.push(ColumnChange::Identity {
            from: prev.identity.clone(),
            to: curr.identity.clone(),
        });
    }
    changes
}

/// A column present on both sides with at least one change.
#[derive(Debug, Clone, PartialEq)]
pub struct AlteredColumn {
    /// Target state of the column.
    pub column: Column,
    /// Detected changes.
    pub changes: Vec<ColumnChange>,
}

/// Added/deleted/altered sets for one sub-entity kind of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubEntityDiff<T> {
    /// Entries present only in the current table.
    pub added: Vec<T>,
    /// Entries present only in the previous table.
    pub deleted: Vec<T>,
    /// Entries whose squashed token changed.
    pub altered: Vec<Altered<T>>,
}

impl<T> Default for SubEntityDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            deleted: Vec::new(),
            altered: Vec::new(),
        }
    }
}

impl<T> SubEntityDiff<T> {
    /// Returns `true` when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.altered.is_empty()
    }
}

/// Every in-place change detected on a table matched across snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableAlteration {
    /// Table name (current side).
    pub name: String,
    /// Schema (current side).
    pub schema: String,
    /// Columns present only in the current table.
    pub added_columns: Vec<Column>,
    /// Columns present only in the previous table.
    pub dropped_columns: Vec<Column>,
    /// Columns changed in place.
    pub altered_columns: Vec<AlteredColumn>,
    /// Index changes.
    pub indexes: SubEntityDiff<Index>,
    /// Foreign key changes.
    pub foreign_keys: SubEntityDiff<ForeignKey>,
    /// Composite primary key changes.
    pub composite_pks: SubEntityDiff<CompositePk>,
    /// Unique constraint changes.
    pub unique_constraints: SubEntityDiff<UniqueConstraint>,
    /// Check constraint changes.
    pub check_constraints: SubEntityDiff<CheckConstraint>,
    /// Policy changes.
    pub policies: SubEntityDiff<Policy>,
    /// New RLS flag, when it changed.
    pub rls_changed: Option<bool>,
}

impl TableAlteration {
    /// Returns `true` when the table is identical on both sides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.dropped_columns.is_empty()
            && self.altered_columns.is_empty()
            && self.indexes.is_empty()
            && self.foreign_keys.is_empty()
            && self.composite_pks.is_empty()
            && self.unique_constraints.is_empty()
            && self.check_constraints.is_empty()
            && self.policies.is_empty()
            && self.rls_changed.is_none()
    }
}

fn diff_sub_entities<T>(
    prev: &BTreeMap<String, T>,
    curr: &BTreeMap<String, T>,
    squash: impl Fn(&T) -> String,
    unsquash: impl Fn(&str) -> Result<T>,
) -> Result<SubEntityDiff<T>> {
    let prev_tokens: BTreeMap<String, String> =
        prev.iter().map(|(k, v)| (k.clone(), squash(v))).collect();
    let curr_tokens: BTreeMap<String, String> =
        curr.iter().map(|(k, v)| (k.clone(), squash(v))).collect();

    let keys = diff_keys(&prev_tokens, &curr_tokens);
    let mut diff = SubEntityDiff::default();
    for key in &keys.added {
        diff.added.push(unsquash(&curr_tokens[key])?);
    }
    for key in &keys.deleted {
        diff.deleted.push(unsquash(&prev_tokens[key])?);
    }
    for change in diff_tokens(&prev_tokens, &curr_tokens) {
        diff.altered.push(Altered {
            before: unsquash(&change.before)?,
            after: unsquash(&change.after)?,
        });
    }
    Ok(diff)
}

/// Compares two tables assumed to share an identity (post-resolution).
///
/// Column renames must already have been applied to `prev` by the
/// cross-reference patcher; anything still differing here is a real
/// addition, deletion or in-place alteration.
pub fn diff_matched_tables(prev: &Table, curr: &Table) -> Result<TableAlteration> {
    let mut alteration = TableAlteration {
        name: curr.name.clone(),
        schema: curr.schema.clone(),
        ..TableAlteration::default()
    };

    let columns = diff_keys(&prev.columns, &curr.columns);
    for key in &columns.added {
        alteration.added_columns.push(curr.columns[key].clone());
    }
    for key in &columns.deleted {
        alteration.dropped_columns.push(prev.columns[key].clone());
    }
    for (name, prev_col) in &prev.columns {
        let Some(curr_col) = curr.columns.get(name) else {
            continue;
        };
        let changes = diff_columns(prev_col, curr_col);
        if !changes.is_empty() {
            alteration.altered_columns.push(AlteredColumn {
                column: curr_col.clone(),
                changes,
            });
        }
    }

    alteration.indexes =
        diff_sub_entities(&prev.indexes, &curr.indexes, squash_index, unsquash_index)?;
    alteration.foreign_keys =
        diff_sub_entities(&prev.foreign_keys, &curr.foreign_keys, squash_fk, unsquash_fk)?;
    alteration.composite_pks = diff_sub_entities(
        &prev.composite_primary_keys,
        &curr.composite_primary_keys,
        squash_pk,
        unsquash_pk,
    )?;
    alteration.unique_constraints = diff_sub_entities(
        &prev.unique_constraints,
        &curr.unique_constraints,
        squash_unique,
        unsquash_unique,
    )?;
    alteration.check_constraints = diff_sub_entities(
        &prev.check_constraints,
        &curr.check_constraints,
        squash_check,
        unsquash_check,
    )?;
    alteration.policies = diff_sub_entities(
        &prev.policies,
        &curr.policies,
        squash_policy,
        unsquash_policy,
    )?;

    if prev.is_rls_enabled != curr.is_rls_enabled {
        alteration.rls_changed = Some(curr.is_rls_enabled);
    }

    Ok(alteration)
}

/// A resolved column rename within one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRename {
    /// Collection key of the table.
    pub table: String,
    /// Previous column name.
    pub from: String,
    /// New column name.
    pub to: String,
}

/// A resolved policy rename on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRename {
    /// Collection key of the table.
    pub table: String,
    /// Previous policy name.
    pub from: String,
    /// New policy name.
    pub to: String,
}

/// Structured result of diffing two snapshots, consumed by the planner.
///
/// Built once per diff invocation and never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    /// Schema-name changes.
    pub schemas: EntityDiff<String>,
    /// Enum type changes.
    pub enums: EntityDiff<EnumDef>,
    /// Matched enums whose value lists changed.
    pub altered_enums: Vec<Altered<EnumDef>>,
    /// Sequence changes.
    pub sequences: EntityDiff<Sequence>,
    /// Matched sequences whose parameters changed.
    pub altered_sequences: Vec<Altered<Sequence>>,
    /// Role changes.
    pub roles: EntityDiff<Role>,
    /// Matched roles whose privileges changed.
    pub altered_roles: Vec<Altered<Role>>,
    /// Table-level changes.
    pub tables: EntityDiff<Table>,
    /// Matched tables with in-place alterations.
    pub altered_tables: Vec<TableAlteration>,
    /// Column renames resolved inside matched tables.
    pub renamed_columns: Vec<ColumnRename>,
    /// Policy renames resolved inside matched tables.
    pub renamed_policies: Vec<PolicyRename>,
    /// View changes.
    pub views: EntityDiff<View>,
    /// Matched views whose metadata or definition changed.
    pub altered_views: Vec<Altered<View>>,
    /// Table-independent policy changes.
    pub linked_policies: SubEntityDiff<LinkedPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Column;

    #[test]
    fn key_diff_partitions_exclusive_keys() {
        let mut prev = BTreeMap::new();
        prev.insert("a".to_string(), 1);
        prev.insert("b".to_string(), 2);
        let mut curr = BTreeMap::new();
        curr.insert("b".to_string(), 2);
        curr.insert("c".to_string(), 3);

        let diff = diff_keys(&prev, &curr);
        assert_eq!(diff.added, vec!["c"]);
        assert_eq!(diff.deleted, vec!["a"]);
    }

    #[test]
    fn identical_maps_diff_empty() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), "token".to_string());
        assert!(diff_keys(&map, &map).is_empty());
        assert!(diff_tokens(&map, &map).is_empty());
    }

    #[test]
    fn token_change_detected_for_shared_key() {
        let mut prev = BTreeMap::new();
        prev.insert("idx".to_string(), "idx;a;false;;".to_string());
        let mut curr = BTreeMap::new();
        curr.insert("idx".to_string(), "idx;a;true;;".to_string());

        let changes = diff_tokens(&prev, &curr);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "idx");
    }

    #[test]
    fn column_type_change_detected() {
        let prev = Column::new("score", "integer");
        let curr = Column::new("score", "bigint");
        let changes = diff_columns(&prev, &curr);
        assert_eq!(
            changes,
            vec![ColumnChange::Type {
                from: "integer".into(),
                to: "bigint".into()
            }]
        );
    }

    #[test]
    fn column_default_and_nullability_changes() {
        let prev = Column::new("email", "text");
        let curr = Column::new("email", "text").not_null().default_sql("'x'");
        let changes = diff_columns(&prev, &curr);
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&ColumnChange::Default {
            to: Some("'x'".into())
        }));
        assert!(changes.contains(&ColumnChange::NotNull { to: true }));
    }

    #[test]
    fn matched_table_diff_finds_added_column() {
        let prev = crate::snapshot::Table::new("users", "public")
            .column(Column::new("id", "bigint").primary_key());
        let curr = prev
            .clone()
            .column(Column::new("email", "text").default_sql("'x'"));

        let alteration = diff_matched_tables(&prev, &curr).unwrap();
        assert_eq!(alteration.added_columns.len(), 1);
        assert_eq!(alteration.added_columns[0].name, "email");
        assert!(alteration.dropped_columns.is_empty());
        assert!(alteration.altered_columns.is_empty());
    }

    #[test]
    fn identical_tables_produce_empty_alteration() {
        let table = crate::snapshot::Table::new("users", "public")
            .column(Column::new("id", "bigint").primary_key());
        let alteration = diff_matched_tables(&table, &table).unwrap();
        assert!(alteration.is_empty());
    }
}
