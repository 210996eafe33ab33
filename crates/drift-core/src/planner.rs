//! Statement planning.
//!
//! Orchestrates the differ, resolver and cross-reference patcher over two
//! snapshots, then materializes one [`Statement`] per schema change in a
//! fixed, dependency-respecting phase order. The phase order is the
//! single source of truth for dependency safety: drops of dependent
//! objects precede drops of what they depend on, and creates of
//! referenced objects precede creates of their dependents.
//!
//! Resolution stages run strictly sequentially (schemas, enums,
//! sequences, roles, tables, columns, policies, views): each stage diffs
//! against the snapshot as patched by the stages before it, so running
//! them out of order would surface spurious add/delete pairs.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::codegen::render_plan;
use crate::dialect::{ApplyMode, Dialect};
use crate::diff::{
    diff_keys, diff_matched_tables, Altered, ColumnRename, DiffResult, Moved, PolicyRename,
    Renamed,
};
use crate::error::{DiffError, Result};
use crate::patch;
use crate::resolver::{verify_partition, EntityKind, EntityRef, Resolution, Resolver};
use crate::snapshot::{entity_key, Column, EnumDef, Snapshot, Table, View};
use crate::statement::{EnumColumnUse, Statement};

/// Output of a diff run: the abstract plan and its rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Ordered abstract statements.
    pub statements: Vec<Statement>,
    /// Rendered, de-duplicated SQL text.
    pub sql: Vec<String>,
}

impl Plan {
    /// Returns `true` when the snapshots were identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Computes the statements required to transform `prev` into `curr`.
///
/// Both snapshots must carry the current format version and the same
/// dialect. The resolver is consulted once per entity kind that has both
/// created and deleted entities; a resolver error aborts the whole diff
/// with no partial output.
pub async fn diff_snapshots<R: Resolver>(
    prev: &Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    mode: ApplyMode,
) -> Result<Plan> {
    prev.validate()?;
    curr.validate()?;
    if prev.dialect != curr.dialect {
        return Err(DiffError::DialectMismatch {
            prev: prev.dialect,
            curr: curr.dialect,
        });
    }
    let dialect = curr.dialect;

    let mut working = prev.clone();
    let diff = compute_diff(&mut working, curr, resolver, dialect).await?;

    let mut statements = assemble(&diff, curr, dialect, mode);
    if dialect == Dialect::Sqlite {
        statements = crate::recreate::merge_recreates(statements, &working, curr)?;
    }

    let sql = render_plan(&statements, dialect, mode)?;
    Ok(Plan { statements, sql })
}

async fn resolve_stage<R: Resolver>(
    resolver: &mut R,
    kind: EntityKind,
    created: Vec<EntityRef>,
    deleted: Vec<EntityRef>,
) -> Result<Resolution> {
    if created.is_empty() || deleted.is_empty() {
        // Nothing ambiguous; the differ's sets stand unchanged.
        return Ok(Resolution {
            created,
            deleted,
            renamed: Vec::new(),
        });
    }
    debug!(
        kind = kind.as_str(),
        created = created.len(),
        deleted = deleted.len(),
        "resolving ambiguous sets"
    );
    let resolution = resolver
        .resolve(kind, created.clone(), deleted.clone())
        .await?;
    verify_partition(kind, &created, &deleted, &resolution)?;
    Ok(resolution)
}

fn table_fingerprint(table: &Table) -> String {
    table
        .columns
        .values()
        .map(|c| format!("{}:{}", c.name, c.sql_type))
        .collect::<Vec<_>>()
        .join(",")
}

fn column_fingerprint(column: &Column) -> String {
    format!(
        "{}|{}|{}",
        column.sql_type,
        column.not_null,
        column.default.as_deref().unwrap_or("")
    )
}

fn enum_fingerprint(def: &EnumDef) -> String {
    def.values.join(",")
}

fn view_fingerprint(view: &View) -> String {
    format!("{}|{}", view.materialized, view.definition)
}

async fn compute_diff<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    dialect: Dialect,
) -> Result<DiffResult> {
    let mut diff = DiffResult::default();

    if dialect == Dialect::Postgres {
        diff_schemas(prev, curr, resolver, &mut diff).await?;
        diff_enums(prev, curr, resolver, &mut diff).await?;
        diff_sequences(prev, curr, resolver, &mut diff).await?;
        diff_roles(prev, curr, resolver, &mut diff).await?;
    }
    diff_tables(prev, curr, resolver, dialect, &mut diff).await?;
    if dialect == Dialect::Postgres {
        diff_linked_policies(prev, curr, &mut diff);
    }
    diff_views(prev, curr, resolver, &mut diff).await?;

    Ok(diff)
}

/// Diffs policies declared independently of their table's definition.
///
/// These are keyed by `schema.table.name`; the table-rename patch has
/// already re-keyed survivors, so a key-set diff is sufficient.
fn diff_linked_policies(prev: &Snapshot, curr: &Snapshot, diff: &mut DiffResult) {
    let keys = diff_keys(&prev.policies, &curr.policies);
    for key in &keys.added {
        diff.linked_policies.added.push(curr.policies[key].clone());
    }
    for key in &keys.deleted {
        diff.linked_policies.deleted.push(prev.policies[key].clone());
    }
    for (key, before) in &prev.policies {
        let Some(after) = curr.policies.get(key) else {
            continue;
        };
        if before != after {
            diff.linked_policies.altered.push(Altered {
                before: before.clone(),
                after: after.clone(),
            });
        }
    }
}

async fn diff_schemas<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.schemas, &curr.schemas);
    let created: Vec<EntityRef> = keys.added.iter().map(|n| EntityRef::new("", n)).collect();
    let deleted: Vec<EntityRef> = keys.deleted.iter().map(|n| EntityRef::new("", n)).collect();
    let resolution = resolve_stage(resolver, EntityKind::Schema, created, deleted).await?;

    for pair in &resolution.renamed {
        patch::rename_schema(prev, &pair.from.name, &pair.to.name)?;
        diff.schemas.renamed.push(Renamed {
            from: pair.from.name.clone(),
            to: pair.to.name.clone(),
        });
    }
    diff.schemas.created = resolution.created.iter().map(|r| r.name.clone()).collect();
    diff.schemas.deleted = resolution.deleted.iter().map(|r| r.name.clone()).collect();
    Ok(())
}

async fn diff_enums<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.enums, &curr.enums);
    let created: Vec<EntityRef> = keys
        .added
        .iter()
        .map(|k| {
            let def = &curr.enums[k];
            EntityRef::new(def.schema.clone(), def.name.clone())
                .with_fingerprint(enum_fingerprint(def))
        })
        .collect();
    let deleted: Vec<EntityRef> = keys
        .deleted
        .iter()
        .map(|k| {
            let def = &prev.enums[k];
            EntityRef::new(def.schema.clone(), def.name.clone())
                .with_fingerprint(enum_fingerprint(def))
        })
        .collect();
    let resolution = resolve_stage(resolver, EntityKind::Enum, created, deleted).await?;

    for pair in &resolution.renamed {
        let mut schema = pair.from.schema.clone();
        if pair.from.schema != pair.to.schema {
            patch::move_enum(prev, &pair.from.name, &pair.from.schema, &pair.to.schema)?;
            diff.enums.moved.push(Moved {
                name: pair.from.name.clone(),
                schema_from: pair.from.schema.clone(),
                schema_to: pair.to.schema.clone(),
            });
            schema = pair.to.schema.clone();
        }
        if pair.from.name != pair.to.name {
            let from_def = prev.enums[&entity_key(&schema, &pair.from.name)].clone();
            patch::rename_enum(prev, &schema, &pair.from.name, &pair.to.name)?;
            let key = entity_key(&schema, &pair.to.name);
            diff.enums.renamed.push(Renamed {
                from: from_def,
                to: curr.enums[&key].clone(),
            });
        }
    }
    for r in &resolution.created {
        diff.enums
            .created
            .push(curr.enums[&entity_key(&r.schema, &r.name)].clone());
    }
    for r in &resolution.deleted {
        diff.enums
            .deleted
            .push(prev.enums[&entity_key(&r.schema, &r.name)].clone());
    }

    for (key, before) in &prev.enums {
        let Some(after) = curr.enums.get(key) else {
            continue;
        };
        if before.values != after.values {
            diff.altered_enums.push(Altered {
                before: before.clone(),
                after: after.clone(),
            });
        }
    }
    Ok(())
}

async fn diff_sequences<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.sequences, &curr.sequences);
    let created: Vec<EntityRef> = keys
        .added
        .iter()
        .map(|k| {
            let seq = &curr.sequences[k];
            EntityRef::new(seq.schema.clone(), seq.name.clone())
        })
        .collect();
    let deleted: Vec<EntityRef> = keys
        .deleted
        .iter()
        .map(|k| {
            let seq = &prev.sequences[k];
            EntityRef::new(seq.schema.clone(), seq.name.clone())
        })
        .collect();
    let resolution = resolve_stage(resolver, EntityKind::Sequence, created, deleted).await?;

    for pair in &resolution.renamed {
        let mut schema = pair.from.schema.clone();
        if pair.from.schema != pair.to.schema {
            patch::move_sequence(prev, &pair.from.name, &pair.from.schema, &pair.to.schema)?;
            diff.sequences.moved.push(Moved {
                name: pair.from.name.clone(),
                schema_from: pair.from.schema.clone(),
                schema_to: pair.to.schema.clone(),
            });
            schema = pair.to.schema.clone();
        }
        if pair.from.name != pair.to.name {
            let from_seq = prev.sequences[&entity_key(&schema, &pair.from.name)].clone();
            patch::rename_sequence(prev, &schema, &pair.from.name, &pair.to.name)?;
            let key = entity_key(&schema, &pair.to.name);
            diff.sequences.renamed.push(Renamed {
                from: from_seq,
                to: curr.sequences[&key].clone(),
            });
        }
    }
    for r in &resolution.created {
        diff.sequences
            .created
            .push(curr.sequences[&entity_key(&r.schema, &r.name)].clone());
    }
    for r in &resolution.deleted {
        diff.sequences
            .deleted
            .push(prev.sequences[&entity_key(&r.schema, &r.name)].clone());
    }

    for (key, before) in &prev.sequences {
        let Some(after) = curr.sequences.get(key) else {
            continue;
        };
        if before != after {
            diff.altered_sequences.push(Altered {
                before: before.clone(),
                after: after.clone(),
            });
        }
    }
    Ok(())
}

async fn diff_roles<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.roles, &curr.roles);
    let created: Vec<EntityRef> = keys.added.iter().map(|n| EntityRef::new("", n)).collect();
    let deleted: Vec<EntityRef> = keys.deleted.iter().map(|n| EntityRef::new("", n)).collect();
    let resolution = resolve_stage(resolver, EntityKind::Role, created, deleted).await?;

    for pair in &resolution.renamed {
        let from_role = prev.roles[&pair.from.name].clone();
        patch::rename_role(prev, &pair.from.name, &pair.to.name)?;
        diff.roles.renamed.push(Renamed {
            from: from_role,
            to: curr.roles[&pair.to.name].clone(),
        });
    }
    for r in &resolution.created {
        diff.roles.created.push(curr.roles[&r.name].clone());
    }
    for r in &resolution.deleted {
        diff.roles.deleted.push(prev.roles[&r.name].clone());
    }

    for (name, before) in &prev.roles {
        let Some(after) = curr.roles.get(name) else {
            continue;
        };
        if before != after {
            diff.altered_roles.push(Altered {
                before: before.clone(),
                after: after.clone(),
            });
        }
    }
    Ok(())
}

async fn diff_tables<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    dialect: Dialect,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.tables, &curr.tables);
    let created: Vec<EntityRef> = keys
        .added
        .iter()
        .map(|k| {
            let table = &curr.tables[k];
            EntityRef::new(table.schema.clone(), table.name.clone())
                .with_fingerprint(table_fingerprint(table))
        })
        .collect();
    let deleted: Vec<EntityRef> = keys
        .deleted
        .iter()
        .map(|k| {
            let table = &prev.tables[k];
            EntityRef::new(table.schema.clone(), table.name.clone())
                .with_fingerprint(table_fingerprint(table))
        })
        .collect();
    let resolution = resolve_stage(resolver, EntityKind::Table, created, deleted).await?;

    for pair in &resolution.renamed {
        let mut schema = pair.from.schema.clone();
        if pair.from.schema != pair.to.schema {
            patch::move_table(prev, &pair.from.name, &pair.from.schema, &pair.to.schema)?;
            diff.tables.moved.push(Moved {
                name: pair.from.name.clone(),
                schema_from: pair.from.schema.clone(),
                schema_to: pair.to.schema.clone(),
            });
            schema = pair.to.schema.clone();
        }
        if pair.from.name != pair.to.name {
            let from_table = prev.tables[&entity_key(&schema, &pair.from.name)].clone();
            patch::rename_table(prev, &schema, &pair.from.name, &pair.to.name)?;
            let key = entity_key(&schema, &pair.to.name);
            diff.tables.renamed.push(Renamed {
                from: from_table,
                to: curr.tables[&key].clone(),
            });
        }
    }
    for r in &resolution.created {
        diff.tables
            .created
            .push(curr.tables[&entity_key(&r.schema, &r.name)].clone());
    }
    for r in &resolution.deleted {
        diff.tables
            .deleted
            .push(prev.tables[&entity_key(&r.schema, &r.name)].clone());
    }

    // Column stage: resolve renames inside every matched table before the
    // structural diff, so a renamed column is not seen as add + drop.
    let matched: Vec<String> = prev
        .tables
        .keys()
        .filter(|k| curr.tables.contains_key(*k))
        .cloned()
        .collect();
    for key in &matched {
        let prev_table = &prev.tables[key];
        let curr_table = &curr.tables[key];
        let column_keys = diff_keys(&prev_table.columns, &curr_table.columns);
        let created: Vec<EntityRef> = column_keys
            .added
            .iter()
            .map(|n| {
                EntityRef::new(curr_table.schema.clone(), n.clone())
                    .in_table(key.clone())
                    .with_fingerprint(column_fingerprint(&curr_table.columns[n]))
            })
            .collect();
        let deleted: Vec<EntityRef> = column_keys
            .deleted
            .iter()
            .map(|n| {
                EntityRef::new(prev_table.schema.clone(), n.clone())
                    .in_table(key.clone())
                    .with_fingerprint(column_fingerprint(&prev_table.columns[n]))
            })
            .collect();
        let resolution = resolve_stage(resolver, EntityKind::Column, created, deleted).await?;
        for pair in &resolution.renamed {
            patch::rename_column(prev, key, &pair.from.name, &pair.to.name)?;
            diff.renamed_columns.push(ColumnRename {
                table: key.clone(),
                from: pair.from.name.clone(),
                to: pair.to.name.clone(),
            });
        }
    }

    // Policy stage (Postgres only): same treatment for per-table policies.
    if dialect == Dialect::Postgres {
        for key in &matched {
            let prev_table = &prev.tables[key];
            let curr_table = &curr.tables[key];
            let policy_keys = diff_keys(&prev_table.policies, &curr_table.policies);
            let created: Vec<EntityRef> = policy_keys
                .added
                .iter()
                .map(|n| {
                    EntityRef::new(curr_table.schema.clone(), n.clone()).in_table(key.clone())
                })
                .collect();
            let deleted: Vec<EntityRef> = policy_keys
                .deleted
                .iter()
                .map(|n| {
                    EntityRef::new(prev_table.schema.clone(), n.clone()).in_table(key.clone())
                })
                .collect();
            let resolution = resolve_stage(resolver, EntityKind::Policy, created, deleted).await?;
            for pair in &resolution.renamed {
                patch::rename_policy(prev, key, &pair.from.name, &pair.to.name)?;
                diff.renamed_policies.push(PolicyRename {
                    table: key.clone(),
                    from: pair.from.name.clone(),
                    to: pair.to.name.clone(),
                });
            }
        }
    }

    for key in &matched {
        let alteration = diff_matched_tables(&prev.tables[key], &curr.tables[key])?;
        if !alteration.is_empty() {
            diff.altered_tables.push(alteration);
        }
    }
    Ok(())
}

async fn diff_views<R: Resolver>(
    prev: &mut Snapshot,
    curr: &Snapshot,
    resolver: &mut R,
    diff: &mut DiffResult,
) -> Result<()> {
    let keys = diff_keys(&prev.views, &curr.views);
    let created: Vec<EntityRef> = keys
        .added
        .iter()
        .map(|k| {
            let view = &curr.views[k];
            EntityRef::new(view.schema.clone(), view.name.clone())
                .with_fingerprint(view_fingerprint(view))
        })
        .collect();
    let deleted: Vec<EntityRef> = keys
        .deleted
        .iter()
        .map(|k| {
            let view = &prev.views[k];
            EntityRef::new(view.schema.clone(), view.name.clone())
                .with_fingerprint(view_fingerprint(view))
        })
        .collect();
    let resolution = resolve_stage(resolver, EntityKind::View, created, deleted).await?;

    for pair in &resolution.renamed {
        let mut schema = pair.from.schema.clone();
        if pair.from.schema != pair.to.schema {
            patch::move_view(prev, &pair.from.name, &pair.from.schema, &pair.to.schema)?;
            diff.views.moved.push(Moved {
                name: pair.from.name.clone(),
                schema_from: pair.from.schema.clone(),
                schema_to: pair.to.schema.clone(),
            });
            schema = pair.to.schema.clone();
        }
        if pair.from.name != pair.to.name {
            let from_view = prev.views[&entity_key(&schema, &pair.from.name)].clone();
            patch::rename_view(prev, &schema, &pair.from.name, &pair.to.name)?;
            let key = entity_key(&schema, &pair.to.name);
            diff.views.renamed.push(Renamed {
                from: from_view,
                to: curr.views[&key].clone(),
            });
        }
    }
    for r in &resolution.created {
        diff.views
            .created
            .push(curr.views[&entity_key(&r.schema, &r.name)].clone());
    }
    for r in &resolution.deleted {
        diff.views
            .deleted
            .push(prev.views[&entity_key(&r.schema, &r.name)].clone());
    }

    for (key, before) in &prev.views {
        let Some(after) = curr.views.get(key) else {
            continue;
        };
        if before != after {
            diff.altered_views.push(Altered {
                before: before.clone(),
                after: after.clone(),
            });
        }
    }
    Ok(())
}

/// Computes the positions for values added to an enum.
///
/// Returns `None` when a value was removed or the survivors reordered,
/// which forces a type rebuild instead of `ADD VALUE` statements.
fn enum_additions(prev: &[String], curr: &[String]) -> Option<Vec<(String, Option<String>)>> {
    let positions: BTreeMap<&str, usize> = curr
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();

    let mut last = None;
    for value in prev {
        let pos = *positions.get(value.as_str())?;
        if let Some(previous) = last {
            if pos < previous {
                return None;
            }
        }
        last = Some(pos);
    }

    let prev_set: BTreeSet<&str> = prev.iter().map(String::as_str).collect();
    let additions = curr
        .iter()
        .enumerate()
        .filter(|(_, v)| !prev_set.contains(v.as_str()))
        .map(|(i, v)| {
            let before = curr[i + 1..]
                .iter()
                .find(|next| prev_set.contains(next.as_str()))
                .cloned();
            (v.clone(), before)
        })
        .collect();
    Some(additions)
}

fn enum_column_uses(curr: &Snapshot, def: &EnumDef) -> Vec<EnumColumnUse> {
    let mut uses = Vec::new();
    for table in curr.tables.values() {
        for column in table.columns.values() {
            if column.sql_type == def.name
                && column.type_schema.as_deref().unwrap_or("public") == def.schema
            {
                uses.push(EnumColumnUse {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    column: column.name.clone(),
                    default: column.default.clone(),
                });
            }
        }
    }
    uses
}

fn assemble(
    diff: &DiffResult,
    curr: &Snapshot,
    dialect: Dialect,
    mode: ApplyMode,
) -> Vec<Statement> {
    let mut out = Vec::new();

    // Phase: create-schema, rename-schema.
    for name in &diff.schemas.created {
        out.push(Statement::CreateSchema { name: name.clone() });
    }
    for pair in &diff.schemas.renamed {
        out.push(Statement::RenameSchema {
            from: pair.from.clone(),
            to: pair.to.clone(),
        });
    }

    // Phase: enums, sequences, roles (creates, renames, moves, alters).
    for def in &diff.enums.created {
        out.push(Statement::CreateEnum { def: def.clone() });
    }
    for moved in &diff.enums.moved {
        out.push(Statement::MoveEnum {
            name: moved.name.clone(),
            schema_from: moved.schema_from.clone(),
            schema_to: moved.schema_to.clone(),
        });
    }
    for pair in &diff.enums.renamed {
        out.push(Statement::RenameEnum {
            schema: pair.to.schema.clone(),
            from: pair.from.name.clone(),
            to: pair.to.name.clone(),
        });
    }
    let mut enum_rebuilds = Vec::new();
    for altered in &diff.altered_enums {
        match enum_additions(&altered.before.values, &altered.after.values) {
            Some(additions) => {
                for (value, before) in additions {
                    out.push(Statement::AddEnumValue {
                        schema: altered.after.schema.clone(),
                        name: altered.after.name.clone(),
                        value,
                        before,
                    });
                }
            }
            // Value removal cannot be expressed incrementally; rebuild
            // the type in the drop-enum-value phase further down.
            None => enum_rebuilds.push(Statement::RecreateEnum {
                def: altered.after.clone(),
                columns: enum_column_uses(curr, &altered.after),
            }),
        }
    }
    for seq in &diff.sequences.created {
        out.push(Statement::CreateSequence { seq: seq.clone() });
    }
    for moved in &diff.sequences.moved {
        out.push(Statement::MoveSequence {
            name: moved.name.clone(),
            schema_from: moved.schema_from.clone(),
            schema_to: moved.schema_to.clone(),
        });
    }
    for pair in &diff.sequences.renamed {
        out.push(Statement::RenameSequence {
            schema: pair.to.schema.clone(),
            from: pair.from.name.clone(),
            to: pair.to.name.clone(),
        });
    }
    for altered in &diff.altered_sequences {
        out.push(Statement::AlterSequence {
            seq: altered.after.clone(),
        });
    }
    for role in &diff.roles.created {
        out.push(Statement::CreateRole { role: role.clone() });
    }
    for pair in &diff.roles.renamed {
        out.push(Statement::RenameRole {
            from: pair.from.name.clone(),
            to: pair.to.name.clone(),
        });
    }
    for altered in &diff.altered_roles {
        out.push(Statement::AlterRole {
            role: altered.after.clone(),
        });
    }

    // Phase: create-table.
    for table in &diff.tables.created {
        out.push(Statement::CreateTable {
            table: table.clone(),
        });
    }

    // Phase: enable/disable RLS.
    if dialect == Dialect::Postgres {
        for table in &diff.tables.created {
            if table.is_rls_enabled {
                out.push(Statement::EnableRls {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                });
            }
        }
        for alteration in &diff.altered_tables {
            if let Some(enabled) = alteration.rls_changed {
                out.push(if enabled {
                    Statement::EnableRls {
                        schema: alteration.schema.clone(),
                        table: alteration.name.clone(),
                    }
                } else {
                    Statement::DisableRls {
                        schema: alteration.schema.clone(),
                        table: alteration.name.clone(),
                    }
                });
            }
        }
    }

    // Phase: drop-view, rename-view, alter-view.
    for view in &diff.views.deleted {
        out.push(Statement::DropView {
            schema: view.schema.clone(),
            name: view.name.clone(),
            materialized: view.materialized,
        });
    }
    for moved in &diff.views.moved {
        let materialized = curr
            .views
            .get(&entity_key(&moved.schema_to, &moved.name))
            .is_some_and(|v| v.materialized);
        out.push(Statement::MoveView {
            name: moved.name.clone(),
            schema_from: moved.schema_from.clone(),
            schema_to: moved.schema_to.clone(),
            materialized,
        });
    }
    for pair in &diff.views.renamed {
        if dialect == Dialect::Sqlite {
            // SQLite has no view rename; rebuild under the new name.
            out.push(Statement::DropView {
                schema: pair.from.schema.clone(),
                name: pair.from.name.clone(),
                materialized: false,
            });
            out.push(Statement::CreateView {
                view: pair.to.clone(),
            });
        } else {
            out.push(Statement::RenameView {
                schema: pair.to.schema.clone(),
                from: pair.from.name.clone(),
                to: pair.to.name.clone(),
                materialized: pair.to.materialized,
            });
        }
    }
    for altered in &diff.altered_views {
        if altered.before.materialized != altered.after.materialized {
            // A flag flip cannot be altered in place anywhere.
            out.push(Statement::DropView {
                schema: altered.before.schema.clone(),
                name: altered.before.name.clone(),
                materialized: altered.before.materialized,
            });
            out.push(Statement::CreateView {
                view: altered.after.clone(),
            });
        } else {
            out.push(Statement::AlterView {
                view: altered.after.clone(),
            });
        }
    }

    // Phase: drop-table, preceded by drops of foreign keys that still
    // point at a table being dropped from a surviving table.
    let dropped_tables: BTreeSet<String> =
        diff.tables.deleted.iter().map(Table::key).collect();
    let mut early_fk_drops: BTreeSet<(String, String)> = BTreeSet::new();
    for alteration in &diff.altered_tables {
        for fk in alteration
            .foreign_keys
            .deleted
            .iter()
            .chain(alteration.foreign_keys.altered.iter().map(|a| &a.before))
        {
            if dropped_tables.contains(&entity_key(&fk.schema_to, &fk.table_to)) {
                early_fk_drops.insert((alteration.key(), fk.name.clone()));
                out.push(Statement::DropReference {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    name: fk.name.clone(),
                });
            }
        }
    }
    if dialect != Dialect::Sqlite {
        // Two dropped tables may reference each other; the constraint
        // must go before either table does.
        for table in &diff.tables.deleted {
            for fk in table.foreign_keys.values() {
                let target = entity_key(&fk.schema_to, &fk.table_to);
                if dropped_tables.contains(&target) && target != table.key() {
                    out.push(Statement::DropReference {
                        schema: table.schema.clone(),
                        table: table.name.clone(),
                        name: fk.name.clone(),
                    });
                }
            }
        }
    }
    for table in &diff.tables.deleted {
        out.push(Statement::DropTable {
            schema: table.schema.clone(),
            name: table.name.clone(),
        });
    }

    // Phase: set-table-schema, rename-table, rename-column.
    for moved in &diff.tables.moved {
        out.push(Statement::SetTableSchema {
            name: moved.name.clone(),
            schema_from: moved.schema_from.clone(),
            schema_to: moved.schema_to.clone(),
        });
    }
    for pair in &diff.tables.renamed {
        out.push(Statement::RenameTable {
            schema: pair.to.schema.clone(),
            from: pair.from.name.clone(),
            to: pair.to.name.clone(),
        });
    }
    for rename in &diff.renamed_columns {
        let (schema, table) = split_key(&rename.table);
        out.push(Statement::RenameColumn {
            schema,
            table,
            from: rename.from.clone(),
            to: rename.to.clone(),
        });
    }

    // Phase: drop-unique, drop-check.
    let altered_checks_skipped = mode == ApplyMode::Push;
    for alteration in &diff.altered_tables {
        for uc in alteration
            .unique_constraints
            .deleted
            .iter()
            .chain(alteration.unique_constraints.altered.iter().map(|a| &a.before))
        {
            out.push(Statement::DropUnique {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                name: uc.name.clone(),
            });
        }
        for check in &alteration.check_constraints.deleted {
            out.push(Statement::DropCheck {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                name: check.name.clone(),
            });
        }
        for altered in &alteration.check_constraints.altered {
            if altered_checks_skipped {
                // Redefining a check needs review; only a generated
                // migration file may carry it.
                warn!(
                    table = %alteration.name,
                    check = %altered.after.name,
                    "skipping check constraint redefinition in push mode"
                );
                continue;
            }
            out.push(Statement::DropCheck {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                name: altered.before.name.clone(),
            });
        }
    }

    // Phase: drop-foreign-key.
    for alteration in &diff.altered_tables {
        for fk in alteration
            .foreign_keys
            .deleted
            .iter()
            .chain(alteration.foreign_keys.altered.iter().map(|a| &a.before))
        {
            if early_fk_drops.contains(&(alteration.key(), fk.name.clone())) {
                continue;
            }
            out.push(Statement::DropReference {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                name: fk.name.clone(),
            });
        }
    }

    // Phase: drop-enum-value (type rebuilds).
    out.append(&mut enum_rebuilds);

    // Phase: drop-index, drop-composite-pk.
    for alteration in &diff.altered_tables {
        for index in alteration
            .indexes
            .deleted
            .iter()
            .chain(alteration.indexes.altered.iter().map(|a| &a.before))
        {
            out.push(Statement::DropIndex {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                index: index.clone(),
            });
        }
    }
    for alteration in &diff.altered_tables {
        for pk in alteration
            .composite_pks
            .deleted
            .iter()
            .chain(alteration.composite_pks.altered.iter().map(|a| &a.before))
        {
            out.push(Statement::DropCompositePk {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                name: pk.name.clone(),
            });
        }
    }

    // Phase: drop-column, alter-column.
    for alteration in &diff.altered_tables {
        for column in &alteration.dropped_columns {
            out.push(Statement::DropColumn {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                column: column.name.clone(),
            });
        }
    }
    for alteration in &diff.altered_tables {
        for altered in &alteration.altered_columns {
            for change in &altered.changes {
                out.push(Statement::AlterColumn {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    column: altered.column.clone(),
                    change: change.clone(),
                });
            }
        }
    }

    // Phase: add-composite-pk, add-column, add-unique.
    for alteration in &diff.altered_tables {
        for pk in alteration
            .composite_pks
            .added
            .iter()
            .chain(alteration.composite_pks.altered.iter().map(|a| &a.after))
        {
            out.push(Statement::CreateCompositePk {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                pk: pk.clone(),
            });
        }
    }
    for alteration in &diff.altered_tables {
        for column in &alteration.added_columns {
            out.push(Statement::AddColumn {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                column: column.clone(),
            });
        }
    }
    for alteration in &diff.altered_tables {
        for uc in alteration
            .unique_constraints
            .added
            .iter()
            .chain(alteration.unique_constraints.altered.iter().map(|a| &a.after))
        {
            out.push(Statement::CreateUnique {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                unique: uc.clone(),
            });
        }
    }

    // Phase: create-index (new tables' indexes included; CREATE TABLE
    // does not render them).
    for table in &diff.tables.created {
        for index in table.indexes.values() {
            out.push(Statement::CreateIndex {
                schema: table.schema.clone(),
                table: table.name.clone(),
                index: index.clone(),
            });
        }
    }
    for alteration in &diff.altered_tables {
        for index in alteration
            .indexes
            .added
            .iter()
            .chain(alteration.indexes.altered.iter().map(|a| &a.after))
        {
            out.push(Statement::CreateIndex {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                index: index.clone(),
            });
        }
    }

    // Phase: add-foreign-key. SQLite embeds them in CREATE TABLE.
    if dialect != Dialect::Sqlite {
        for table in &diff.tables.created {
            for fk in table.foreign_keys.values() {
                out.push(Statement::CreateReference {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    fk: fk.clone(),
                });
            }
        }
    }
    for alteration in &diff.altered_tables {
        for fk in alteration
            .foreign_keys
            .added
            .iter()
            .chain(alteration.foreign_keys.altered.iter().map(|a| &a.after))
        {
            out.push(Statement::CreateReference {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                fk: fk.clone(),
            });
        }
    }

    // Phase: add-check.
    for alteration in &diff.altered_tables {
        for check in &alteration.check_constraints.added {
            out.push(Statement::CreateCheck {
                schema: alteration.schema.clone(),
                table: alteration.name.clone(),
                check: check.clone(),
            });
        }
        if !altered_checks_skipped {
            for altered in &alteration.check_constraints.altered {
                out.push(Statement::CreateCheck {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    check: altered.after.clone(),
                });
            }
        }
    }

    // Phase: create-view.
    for view in &diff.views.created {
        out.push(Statement::CreateView { view: view.clone() });
    }

    // Phase: policies (create, alter, rename, drop).
    if dialect == Dialect::Postgres {
        for table in &diff.tables.created {
            for policy in table.policies.values() {
                out.push(Statement::CreatePolicy {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                    policy: policy.clone(),
                });
            }
        }
        for alteration in &diff.altered_tables {
            for policy in &alteration.policies.added {
                out.push(Statement::CreatePolicy {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    policy: policy.clone(),
                });
            }
            for altered in &alteration.policies.altered {
                out.push(Statement::AlterPolicy {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    policy: altered.after.clone(),
                });
            }
        }
        for rename in &diff.renamed_policies {
            let (schema, table) = split_key(&rename.table);
            out.push(Statement::RenamePolicy {
                schema,
                table,
                from: rename.from.clone(),
                to: rename.to.clone(),
            });
        }
        for alteration in &diff.altered_tables {
            for policy in &alteration.policies.deleted {
                out.push(Statement::DropPolicy {
                    schema: alteration.schema.clone(),
                    table: alteration.name.clone(),
                    name: policy.name.clone(),
                });
            }
        }
        for linked in &diff.linked_policies.added {
            out.push(Statement::CreatePolicy {
                schema: linked.schema.clone(),
                table: linked.table.clone(),
                policy: linked.policy.clone(),
            });
        }
        for altered in &diff.linked_policies.altered {
            out.push(Statement::AlterPolicy {
                schema: altered.after.schema.clone(),
                table: altered.after.table.clone(),
                policy: altered.after.policy.clone(),
            });
        }
        for linked in &diff.linked_policies.deleted {
            // Policies on a dropped table die with it.
            if dropped_tables.contains(&entity_key(&linked.schema, &linked.table)) {
                continue;
            }
            out.push(Statement::DropPolicy {
                schema: linked.schema.clone(),
                table: linked.table.clone(),
                name: linked.policy.name.clone(),
            });
        }
    }

    // Phase: drop-enum, drop-sequence, drop-role, drop-schema.
    for def in &diff.enums.deleted {
        out.push(Statement::DropEnum {
            schema: def.schema.clone(),
            name: def.name.clone(),
        });
    }
    for seq in &diff.sequences.deleted {
        out.push(Statement::DropSequence {
            schema: seq.schema.clone(),
            name: seq.name.clone(),
        });
    }
    for role in &diff.roles.deleted {
        out.push(Statement::DropRole {
            name: role.name.clone(),
        });
    }
    for name in &diff.schemas.deleted {
        out.push(Statement::DropSchema { name: name.clone() });
    }

    out
}

/// Splits a collection key back into `(schema, name)`.
fn split_key(key: &str) -> (String, String) {
    match key.split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => (String::new(), key.to_string()),
    }
}

impl crate::diff::TableAlteration {
    fn key(&self) -> String {
        entity_key(&self.schema, &self.name)
    }
}
