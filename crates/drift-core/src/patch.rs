//! Cross-reference patching of the previous snapshot.
//!
//! After each resolution stage the working copy of the previous snapshot
//! is rewritten so that later stages diff against corrected identities: a
//! renamed entity is re-keyed, and every cross-reference to it (a
//! column's enum type, a foreign key's target table, an index's column
//! list) is updated in place. Skipping or reordering these rewrites would
//! make later stages see spurious add/delete pairs instead of a match.
//!
//! Stages must run in dependency order: schemas, enums, sequences, roles,
//! tables, columns, policies, views.

use crate::error::{DiffError, Result};
use crate::snapshot::{entity_key, Snapshot, Table};

fn unknown(kind: &'static str, key: &str) -> DiffError {
    DiffError::UnknownEntity {
        kind,
        key: key.to_string(),
    }
}

/// Renames a schema and rewrites every entity and reference inside it.
pub fn rename_schema(snapshot: &mut Snapshot, from: &str, to: &str) -> Result<()> {
    snapshot
        .schemas
        .remove(from)
        .ok_or_else(|| unknown("schema", from))?;
    snapshot.schemas.insert(to.to_string(), to.to_string());

    snapshot.enums = std::mem::take(&mut snapshot.enums)
        .into_values()
        .map(|mut def| {
            if def.schema == from {
                def.schema = to.to_string();
            }
            (def.key(), def)
        })
        .collect();
    snapshot.sequences = std::mem::take(&mut snapshot.sequences)
        .into_values()
        .map(|mut seq| {
            if seq.schema == from {
                seq.schema = to.to_string();
            }
            (seq.key(), seq)
        })
        .collect();
    snapshot.views = std::mem::take(&mut snapshot.views)
        .into_values()
        .map(|mut view| {
            if view.schema == from {
                view.schema = to.to_string();
            }
            (view.key(), view)
        })
        .collect();
    snapshot.tables = std::mem::take(&mut snapshot.tables)
        .into_values()
        .map(|mut table| {
            if table.schema == from {
                table.schema = to.to_string();
            }
            patch_schema_refs(&mut table, from, to);
            (table.key(), table)
        })
        .collect();
    snapshot.policies = std::mem::take(&mut snapshot.policies)
        .into_values()
        .map(|mut linked| {
            if linked.schema == from {
                linked.schema = to.to_string();
            }
            (linked.key(), linked)
        })
        .collect();
    Ok(())
}

fn patch_schema_refs(table: &mut Table, from: &str, to: &str) {
    for column in table.columns.values_mut() {
        if column.type_schema.as_deref() == Some(from) {
            column.type_schema = Some(to.to_string());
        }
    }
    for fk in table.foreign_keys.values_mut() {
        if fk.schema_to == from {
            fk.schema_to = to.to_string();
        }
    }
}

/// Renames an enum type and rewrites columns typed by it.
pub fn rename_enum(snapshot: &mut Snapshot, schema: &str, from: &str, to: &str) -> Result<()> {
    let key = entity_key(schema, from);
    let mut def = snapshot
        .enums
        .remove(&key)
        .ok_or_else(|| unknown("enum", &key))?;
    def.name = to.to_string();
    snapshot.enums.insert(def.key(), def);

    for table in snapshot.tables.values_mut() {
        for column in table.columns.values_mut() {
            let same_schema = column.type_schema.as_deref().unwrap_or("public") == schema
                || (schema.is_empty() && column.type_schema.is_none());
            if column.sql_type == from && same_schema {
                column.sql_type = to.to_string();
            }
        }
    }
    Ok(())
}

/// Moves an enum type to another schema and rewrites column type schemas.
pub fn move_enum(
    snapshot: &mut Snapshot,
    name: &str,
    schema_from: &str,
    schema_to: &str,
) -> Result<()> {
    let key = entity_key(schema_from, name);
    let mut def = snapshot
        .enums
        .remove(&key)
        .ok_or_else(|| unknown("enum", &key))?;
    def.schema = schema_to.to_string();
    snapshot.enums.insert(def.key(), def);

    for table in snapshot.tables.values_mut() {
        for column in table.columns.values_mut() {
            if column.sql_type == name
                && column.type_schema.as_deref().unwrap_or("public") == schema_from
            {
                column.type_schema = Some(schema_to.to_string());
            }
        }
    }
    Ok(())
}

/// Renames a sequence.
pub fn rename_sequence(snapshot: &mut Snapshot, schema: &str, from: &str, to: &str) -> Result<()> {
    let key = entity_key(schema, from);
    let mut seq = snapshot
        .sequences
        .remove(&key)
        .ok_or_else(|| unknown("sequence", &key))?;
    seq.name = to.to_string();
    snapshot.sequences.insert(seq.key(), seq);
    Ok(())
}

/// Moves a sequence to another schema.
pub fn move_sequence(
    snapshot: &mut Snapshot,
    name: &str,
    schema_from: &str,
    schema_to: &str,
) -> Result<()> {
    let key = entity_key(schema_from, name);
    let mut seq = snapshot
        .sequences
        .remove(&key)
        .ok_or_else(|| unknown("sequence", &key))?;
    seq.schema = schema_to.to_string();
    snapshot.sequences.insert(seq.key(), seq);
    Ok(())
}

/// Renames a role.
pub fn rename_role(snapshot: &mut Snapshot, from: &str, to: &str) -> Result<()> {
    let mut role = snapshot
        .roles
        .remove(from)
        .ok_or_else(|| unknown("role", from))?;
    role.name = to.to_string();
    snapshot.roles.insert(role.name.clone(), role);

    for table in snapshot.tables.values_mut() {
        for policy in table.policies.values_mut() {
            for target in &mut policy.to_roles {
                if target == from {
                    *target = to.to_string();
                }
            }
        }
    }
    for linked in snapshot.policies.values_mut() {
        for target in &mut linked.policy.to_roles {
            if target == from {
                *target = to.to_string();
            }
        }
    }
    Ok(())
}

/// Renames a table and rewrites foreign keys referencing it.
pub fn rename_table(snapshot: &mut Snapshot, schema: &str, from: &str, to: &str) -> Result<()> {
    let key = entity_key(schema, from);
    let mut table = snapshot
        .tables
        .remove(&key)
        .ok_or_else(|| unknown("table", &key))?;
    table.name = to.to_string();
    for fk in table.foreign_keys.values_mut() {
        if fk.table_from == from {
            fk.table_from = to.to_string();
        }
        // Self-references point back at the renamed table too.
        if fk.table_to == from && fk.schema_to == schema {
            fk.table_to = to.to_string();
        }
    }
    snapshot.tables.insert(table.key(), table);

    for other in snapshot.tables.values_mut() {
        for fk in other.foreign_keys.values_mut() {
            if fk.table_to == from && fk.schema_to == schema {
                fk.table_to = to.to_string();
            }
        }
    }
    snapshot.policies = std::mem::take(&mut snapshot.policies)
        .into_values()
        .map(|mut linked| {
            if linked.table == from && linked.schema == schema {
                linked.table = to.to_string();
            }
            (linked.key(), linked)
        })
        .collect();
    Ok(())
}

/// Moves a table to another schema and rewrites referencing foreign keys.
pub fn move_table(
    snapshot: &mut Snapshot,
    name: &str,
    schema_from: &str,
    schema_to: &str,
) -> Result<()> {
    let key = entity_key(schema_from, name);
    let mut table = snapshot
        .tables
        .remove(&key)
        .ok_or_else(|| unknown("table", &key))?;
    table.schema = schema_to.to_string();
    snapshot.tables.insert(table.key(), table);

    for other in snapshot.tables.values_mut() {
        for fk in other.foreign_keys.values_mut() {
            if fk.table_to == name && fk.schema_to == schema_from {
                fk.schema_to = schema_to.to_string();
            }
        }
    }
    snapshot.policies = std::mem::take(&mut snapshot.policies)
        .into_values()
        .map(|mut linked| {
            if linked.table == name && linked.schema == schema_from {
                linked.schema = schema_to.to_string();
            }
            (linked.key(), linked)
        })
        .collect();
    Ok(())
}

/// Renames a column and rewrites every sub-entity referencing it.
///
/// Check expressions are opaque SQL fragments and are left verbatim.
pub fn rename_column(snapshot: &mut Snapshot, table_key: &str, from: &str, to: &str) -> Result<()> {
    let table = snapshot
        .tables
        .get_mut(table_key)
        .ok_or_else(|| unknown("table", table_key))?;
    let mut column = table
        .columns
        .remove(from)
        .ok_or_else(|| unknown("column", from))?;
    column.name = to.to_string();
    table.columns.insert(column.name.clone(), column);

    let rename = |columns: &mut Vec<String>| {
        for col in columns {
            if col == from {
                *col = to.to_string();
            }
        }
    };
    for index in table.indexes.values_mut() {
        rename(&mut index.columns);
    }
    for fk in table.foreign_keys.values_mut() {
        rename(&mut fk.columns_from);
    }
    for pk in table.composite_primary_keys.values_mut() {
        rename(&mut pk.columns);
    }
    for uc in table.unique_constraints.values_mut() {
        rename(&mut uc.columns);
    }

    let (table_name, table_schema) = (table.name.clone(), table.schema.clone());
    for other in snapshot.tables.values_mut() {
        for fk in other.foreign_keys.values_mut() {
            if fk.table_to == table_name && fk.schema_to == table_schema {
                rename(&mut fk.columns_to);
            }
        }
    }
    Ok(())
}

/// Renames a policy on a table.
pub fn rename_policy(snapshot: &mut Snapshot, table_key: &str, from: &str, to: &str) -> Result<()> {
    let table = snapshot
        .tables
        .get_mut(table_key)
        .ok_or_else(|| unknown("table", table_key))?;
    let mut policy = table
        .policies
        .remove(from)
        .ok_or_else(|| unknown("policy", from))?;
    policy.name = to.to_string();
    table.policies.insert(policy.name.clone(), policy);
    Ok(())
}

/// Renames a view.
pub fn rename_view(snapshot: &mut Snapshot, schema: &str, from: &str, to: &str) -> Result<()> {
    let key = entity_key(schema, from);
    let mut view = snapshot
        .views
        .remove(&key)
        .ok_or_else(|| unknown("view", &key))?;
    view.name = to.to_string();
    snapshot.views.insert(view.key(), view);
    Ok(())
}

/// Moves a view to another schema.
pub fn move_view(
    snapshot: &mut Snapshot,
    name: &str,
    schema_from: &str,
    schema_to: &str,
) -> Result<()> {
    let key = entity_key(schema_from, name);
    let mut view = snapshot
        .views
        .remove(&key)
        .ok_or_else(|| unknown("view", &key))?;
    view.schema = schema_to.to_string();
    snapshot.views.insert(view.key(), view);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::snapshot::{Column, EnumDef, ForeignKey};

    fn snapshot_with_fk() -> Snapshot {
        let users = Table::new("users", "public")
            .column(Column::new("id", "bigint").primary_key());
        let posts = Table::new("posts", "public")
            .column(Column::new("id", "bigint").primary_key())
            .column(Column::new("author_id", "bigint"))
            .foreign_key(ForeignKey {
                name: "posts_author_fk".into(),
                table_from: "posts".into(),
                columns_from: vec!["author_id".into()],
                table_to: "users".into(),
                columns_to: vec!["id".into()],
                schema_to: "public".into(),
                on_update: String::new(),
                on_delete: String::new(),
            });
        Snapshot::new(Dialect::Postgres).table(users).table(posts)
    }

    #[test]
    fn table_rename_rekeys_and_patches_fks() {
        let mut snapshot = snapshot_with_fk();
        rename_table(&mut snapshot, "public", "users", "accounts").unwrap();

        assert!(snapshot.tables.contains_key("accounts"));
        assert!(!snapshot.tables.contains_key("users"));
        let fk = &snapshot.tables["posts"].foreign_keys["posts_author_fk"];
        assert_eq!(fk.table_to, "accounts");
    }

    #[test]
    fn column_rename_patches_referencing_fks() {
        let mut snapshot = snapshot_with_fk();
        rename_column(&mut snapshot, "users", "id", "user_id").unwrap();

        assert!(snapshot.tables["users"].columns.contains_key("user_id"));
        let fk = &snapshot.tables["posts"].foreign_keys["posts_author_fk"];
        assert_eq!(fk.columns_to, vec!["user_id"]);
    }

    #[test]
    fn enum_rename_patches_column_types() {
        let mut snapshot = Snapshot::new(Dialect::Postgres).table(
            Table::new("users", "public").column({
                let mut c = Column::new("status", "status");
                c.type_schema = Some("public".into());
                c
            }),
        );
        snapshot.enums.insert(
            "status".into(),
            EnumDef {
                name: "status".into(),
                schema: "public".into(),
                values: vec!["active".into(), "banned".into()],
            },
        );

        rename_enum(&mut snapshot, "public", "status", "account_status").unwrap();
        assert!(snapshot.enums.contains_key("account_status"));
        assert_eq!(
            snapshot.tables["users"].columns["status"].sql_type,
            "account_status"
        );
    }

    #[test]
    fn schema_rename_rewrites_nested_entities() {
        let mut snapshot = Snapshot::new(Dialect::Postgres)
            .table(Table::new("events", "audit").column(Column::new("id", "bigint")));
        snapshot.schemas.insert("audit".into(), "audit".into());

        rename_schema(&mut snapshot, "audit", "history").unwrap();
        assert!(snapshot.schemas.contains_key("history"));
        assert!(snapshot.tables.contains_key("history.events"));
        assert_eq!(snapshot.tables["history.events"].schema, "history");
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let mut snapshot = snapshot_with_fk();
        let err = rename_table(&mut snapshot, "public", "missing", "x").unwrap_err();
        assert!(matches!(err, DiffError::UnknownEntity { kind: "table", .. }));
    }
}
