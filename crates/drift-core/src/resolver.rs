//! Rename/move resolution boundary.
//!
//! When the differ finds both created and deleted entities of one kind,
//! the pair may really be a rename (or a schema move). Deciding that is
//! not the engine's job: a [`Resolver`] implementation is injected into
//! the planner and asked, once per ambiguous entity kind, to partition
//! the sets. Implementations may consult a human, a heuristic, or nothing
//! at all; the planner only enforces the partition contract and aborts
//! the whole diff if the resolver fails.

use std::collections::BTreeSet;
use std::future::Future;

use crate::diff::Renamed;
use crate::error::{DiffError, Result};

/// Entity kinds subject to rename resolution, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Named schema.
    Schema,
    /// Enum type.
    Enum,
    /// Sequence.
    Sequence,
    /// Role.
    Role,
    /// Table.
    Table,
    /// Column within one table.
    Column,
    /// Row-level-security policy.
    Policy,
    /// View.
    View,
}

impl EntityKind {
    /// Stable display name, used in errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Enum => "enum",
            Self::Sequence => "sequence",
            Self::Role => "role",
            Self::Table => "table",
            Self::Column => "column",
            Self::Policy => "policy",
            Self::View => "view",
        }
    }
}

/// Identity of an entity offered for resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityRef {
    /// Schema the entity lives in. Empty for schema-less kinds/dialects.
    pub schema: String,
    /// Owning table, for table-scoped kinds (columns, policies).
    pub table: Option<String>,
    /// Entity name.
    pub name: String,
    /// Structural fingerprint (squashed shape), for heuristic matching.
    pub fingerprint: String,
}

impl EntityRef {
    /// Creates a ref for a top-level entity.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: None,
            name: name.into(),
            fingerprint: String::new(),
        }
    }

    /// Attaches the owning table.
    #[must_use]
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Attaches a structural fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    fn identity(&self) -> (String, Option<String>, String) {
        (self.schema.clone(), self.table.clone(), self.name.clone())
    }
}

/// Partition returned by a resolver.
///
/// `renamed` pairs cover plain renames, schema moves, and combined
/// rename+move; the planner tells them apart by comparing the two refs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Entities that really are new.
    pub created: Vec<EntityRef>,
    /// Entities that really were deleted.
    pub deleted: Vec<EntityRef>,
    /// Deleted/created pairs that are the same entity.
    pub renamed: Vec<Renamed<EntityRef>>,
}

/// Disambiguates created/deleted sets into creates, deletes and renames.
///
/// Called only when both sets are non-empty for a kind. The returned
/// partition must account for every input exactly once; the planner
/// verifies this with [`verify_partition`].
pub trait Resolver {
    /// Partitions one entity kind's ambiguous sets.
    fn resolve(
        &mut self,
        kind: EntityKind,
        created: Vec<EntityRef>,
        deleted: Vec<EntityRef>,
    ) -> impl Future<Output = Result<Resolution>> + Send;
}

/// Treats every ambiguity as an independent create + delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl Resolver for NoopResolver {
    async fn resolve(
        &mut self,
        _kind: EntityKind,
        created: Vec<EntityRef>,
        deleted: Vec<EntityRef>,
    ) -> Result<Resolution> {
        Ok(Resolution {
            created,
            deleted,
            renamed: Vec::new(),
        })
    }
}

/// Pairs entities whose structural fingerprints are identical.
///
/// Greedy and deterministic: each deleted entity takes the first created
/// entity with an equal, non-empty fingerprint that has not been claimed
/// yet. Everything unpaired stays an independent create/delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralResolver;

impl Resolver for StructuralResolver {
    async fn resolve(
        &mut self,
        _kind: EntityKind,
        created: Vec<EntityRef>,
        deleted: Vec<EntityRef>,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut remaining = created;
        for from in deleted {
            let matched = remaining
                .iter()
                .position(|to| !to.fingerprint.is_empty() && to.fingerprint == from.fingerprint);
            match matched {
                Some(i) => {
                    let to = remaining.remove(i);
                    resolution.renamed.push(Renamed { from, to });
                }
                None => resolution.deleted.push(from),
            }
        }
        resolution.created = remaining;
        Ok(resolution)
    }
}

/// Verifies that a resolution is an exact partition of its inputs.
pub fn verify_partition(
    kind: EntityKind,
    created_in: &[EntityRef],
    deleted_in: &[EntityRef],
    resolution: &Resolution,
) -> Result<()> {
    let fail = |detail: String| DiffError::InconsistentResolution {
        kind: kind.as_str(),
        detail,
    };

    let created_set: BTreeSet<_> = created_in.iter().map(EntityRef::identity).collect();
    let deleted_set: BTreeSet<_> = deleted_in.iter().map(EntityRef::identity).collect();

    let mut created_seen = BTreeSet::new();
    for item in resolution
        .created
        .iter()
        .chain(resolution.renamed.iter().map(|r| &r.to))
    {
        let id = item.identity();
        if !created_set.contains(&id) {
            return Err(fail(format!("'{}' was not in the created set", item.name)));
        }
        if !created_seen.insert(id) {
            return Err(fail(format!("'{}' appears twice", item.name)));
        }
    }
    let mut deleted_seen = BTreeSet::new();
    for item in resolution
        .deleted
        .iter()
        .chain(resolution.renamed.iter().map(|r| &r.from))
    {
        let id = item.identity();
        if !deleted_set.contains(&id) {
            return Err(fail(format!("'{}' was not in the deleted set", item.name)));
        }
        if !deleted_seen.insert(id) {
            return Err(fail(format!("'{}' appears twice", item.name)));
        }
    }

    if created_seen.len() != created_set.len() {
        return Err(fail(format!(
            "{} created entities unaccounted for",
            created_set.len() - created_seen.len()
        )));
    }
    if deleted_seen.len() != deleted_set.len() {
        return Err(fail(format!(
            "{} deleted entities unaccounted for",
            deleted_set.len() - deleted_seen.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn table_ref(name: &str, fingerprint: &str) -> EntityRef {
        EntityRef::new("public", name).with_fingerprint(fingerprint)
    }

    #[test]
    fn noop_keeps_sets_unchanged() {
        let created = vec![table_ref("b", "cols:id")];
        let deleted = vec![table_ref("a", "cols:id")];
        let resolution = block_on(NoopResolver.resolve(
            EntityKind::Table,
            created.clone(),
            deleted.clone(),
        ))
        .unwrap();
        assert_eq!(resolution.created, created);
        assert_eq!(resolution.deleted, deleted);
        assert!(resolution.renamed.is_empty());
        verify_partition(EntityKind::Table, &created, &deleted, &resolution).unwrap();
    }

    #[test]
    fn structural_resolver_pairs_equal_fingerprints() {
        let created = vec![table_ref("accounts", "cols:id,name")];
        let deleted = vec![table_ref("users", "cols:id,name")];
        let resolution = block_on(StructuralResolver.resolve(
            EntityKind::Table,
            created.clone(),
            deleted.clone(),
        ))
        .unwrap();
        assert!(resolution.created.is_empty());
        assert!(resolution.deleted.is_empty());
        assert_eq!(resolution.renamed.len(), 1);
        assert_eq!(resolution.renamed[0].from.name, "users");
        assert_eq!(resolution.renamed[0].to.name, "accounts");
        verify_partition(EntityKind::Table, &created, &deleted, &resolution).unwrap();
    }

    #[test]
    fn structural_resolver_leaves_unmatched_apart() {
        let created = vec![table_ref("audit", "cols:id,at")];
        let deleted = vec![table_ref("users", "cols:id,name")];
        let resolution = block_on(StructuralResolver.resolve(
            EntityKind::Table,
            created.clone(),
            deleted.clone(),
        ))
        .unwrap();
        assert_eq!(resolution.created.len(), 1);
        assert_eq!(resolution.deleted.len(), 1);
        assert!(resolution.renamed.is_empty());
    }

    #[test]
    fn partition_rejects_duplicated_entity() {
        let created = vec![table_ref("b", "")];
        let deleted = vec![table_ref("a", "")];
        let resolution = Resolution {
            created: created.clone(),
            deleted: deleted.clone(),
            renamed: vec![Renamed {
                from: deleted[0].clone(),
                to: created[0].clone(),
            }],
        };
        let err = verify_partition(EntityKind::Table, &created, &deleted, &resolution).unwrap_err();
        assert!(matches!(err, DiffError::InconsistentResolution { .. }));
    }

    #[test]
    fn partition_rejects_missing_entity() {
        let created = vec![table_ref("b", "")];
        let deleted = vec![table_ref("a", "")];
        let resolution = Resolution {
            created: created.clone(),
            deleted: Vec::new(),
            renamed: Vec::new(),
        };
        let err = verify_partition(EntityKind::Table, &created, &deleted, &resolution).unwrap_err();
        assert!(matches!(err, DiffError::InconsistentResolution { .. }));
    }
}
