//! Canonical "squash" token encoding for structural sub-entities.
//!
//! Every sub-entity of a table (index, foreign key, composite primary key,
//! unique constraint, check constraint, policy) and the view metadata has
//! a `squash_*` function producing a single string token - fields joined
//! with `;` in a fixed order, list fields joined with `,` - and an
//! `unsquash_*` function that is its exact left inverse. Tokens make
//! change detection a string comparison while keeping full fidelity for
//! code generation.
//!
//! Free-text fields (check expressions, policy WITH CHECK, view
//! definitions) always occupy the final position and are decoded with
//! `splitn`, so they may contain the field delimiter. Everything else is
//! rejected at snapshot validation if it embeds `;`.
//!
//! Malformed tokens (wrong field count) are a data-corruption error and
//! fail fast with [`DiffError::MalformedToken`].

use std::collections::BTreeMap;

use crate::error::{DiffError, Result};
use crate::snapshot::{
    CheckConstraint, CompositePk, ForeignKey, Index, Policy, Table, UniqueConstraint, View,
};

const FIELD: char = ';';
const ITEM: char = ',';

fn join_list(items: &[String]) -> String {
    items.join(",")
}

fn split_list(field: &str) -> Vec<String> {
    if field.is_empty() {
        Vec::new()
    } else {
        field.split(ITEM).map(str::to_string).collect()
    }
}

fn parse_bool(kind: &'static str, token: &str, field: &str) -> Result<bool> {
    match field {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(malformed(kind, token)),
    }
}

fn malformed(kind: &'static str, token: &str) -> DiffError {
    DiffError::MalformedToken {
        kind,
        token: token.to_string(),
    }
}

fn opt(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

fn opt_str(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Encodes an index as `name;columns;unique;where;method`.
#[must_use]
pub fn squash_index(index: &Index) -> String {
    format!(
        "{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}",
        index.name,
        join_list(&index.columns),
        index.unique,
        opt_str(&index.where_clause),
        index.method,
    )
}

/// Decodes an index token.
pub fn unsquash_index(token: &str) -> Result<Index> {
    let fields: Vec<&str> = token.split(FIELD).collect();
    let [name, columns, unique, where_clause, method] = fields[..] else {
        return Err(malformed("index", token));
    };
    Ok(Index {
        name: name.to_string(),
        columns: split_list(columns),
        unique: parse_bool("index", token, unique)?,
        where_clause: opt(where_clause),
        method: method.to_string(),
    })
}

/// Encodes a foreign key as
/// `name;tableFrom;columnsFrom;tableTo;columnsTo;onUpdate;onDelete;schemaTo`.
#[must_use]
pub fn squash_fk(fk: &ForeignKey) -> String {
    format!(
        "{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}",
        fk.name,
        fk.table_from,
        join_list(&fk.columns_from),
        fk.table_to,
        join_list(&fk.columns_to),
        fk.on_update,
        fk.on_delete,
        fk.schema_to,
    )
}

/// Decodes a foreign key token.
pub fn unsquash_fk(token: &str) -> Result<ForeignKey> {
    let fields: Vec<&str> = token.split(FIELD).collect();
    let [name, table_from, columns_from, table_to, columns_to, on_update, on_delete, schema_to] =
        fields[..]
    else {
        return Err(malformed("foreign key", token));
    };
    Ok(ForeignKey {
        name: name.to_string(),
        table_from: table_from.to_string(),
        columns_from: split_list(columns_from),
        table_to: table_to.to_string(),
        columns_to: split_list(columns_to),
        on_update: on_update.to_string(),
        on_delete: on_delete.to_string(),
        schema_to: schema_to.to_string(),
    })
}

/// Encodes a composite primary key as `name;columns`.
#[must_use]
pub fn squash_pk(pk: &CompositePk) -> String {
    format!("{}{FIELD}{}", pk.name, join_list(&pk.columns))
}

/// Decodes a composite primary key token.
pub fn unsquash_pk(token: &str) -> Result<CompositePk> {
    let fields: Vec<&str> = token.split(FIELD).collect();
    let [name, columns] = fields[..] else {
        return Err(malformed("composite primary key", token));
    };
    Ok(CompositePk {
        name: name.to_string(),
        columns: split_list(columns),
    })
}

/// Encodes a unique constraint as `name;columns;nullsNotDistinct`.
#[must_use]
pub fn squash_unique(uc: &UniqueConstraint) -> String {
    format!(
        "{}{FIELD}{}{FIELD}{}",
        uc.name,
        join_list(&uc.columns),
        uc.nulls_not_distinct,
    )
}

/// Decodes a unique constraint token.
pub fn unsquash_unique(token: &str) -> Result<UniqueConstraint> {
    let fields: Vec<&str> = token.split(FIELD).collect();
    let [name, columns, nulls_not_distinct] = fields[..] else {
        return Err(malformed("unique constraint", token));
    };
    Ok(UniqueConstraint {
        name: name.to_string(),
        columns: split_list(columns),
        nulls_not_distinct: parse_bool("unique constraint", token, nulls_not_distinct)?,
    })
}

/// Encodes a check constraint as `name;value`.
///
/// The expression is the final field, so it may itself contain `;`.
#[must_use]
pub fn squash_check(check: &CheckConstraint) -> String {
    format!("{}{FIELD}{}", check.name, check.value)
}

/// Decodes a check constraint token.
pub fn unsquash_check(token: &str) -> Result<CheckConstraint> {
    let mut fields = token.splitn(2, FIELD);
    let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
        return Err(malformed("check constraint", token));
    };
    Ok(CheckConstraint {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Encodes a policy as `name;action;for;roles;using;withCheck`.
///
/// `using` travels mid-token, so both expressions are
/// delimiter-validated at snapshot load.
#[must_use]
pub fn squash_policy(policy: &Policy) -> String {
    format!(
        "{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}",
        policy.name,
        policy.action,
        policy.for_kind,
        join_list(&policy.to_roles),
        opt_str(&policy.using_expr),
        opt_str(&policy.with_check),
    )
}

/// Decodes a policy token.
pub fn unsquash_policy(token: &str) -> Result<Policy> {
    let fields: Vec<&str> = token.splitn(6, FIELD).collect();
    let [name, action, for_kind, to_roles, using_expr, with_check] = fields[..] else {
        return Err(malformed("policy", token));
    };
    Ok(Policy {
        name: name.to_string(),
        action: action.to_string(),
        for_kind: for_kind.to_string(),
        to_roles: split_list(to_roles),
        using_expr: opt(using_expr),
        with_check: opt(with_check),
    })
}

/// Encodes view metadata as `name;schema;materialized;withNoData;definition`.
///
/// The definition is the final field, so it may contain `;`.
#[must_use]
pub fn squash_view(view: &View) -> String {
    format!(
        "{}{FIELD}{}{FIELD}{}{FIELD}{}{FIELD}{}",
        view.name, view.schema, view.materialized, view.with_no_data, view.definition,
    )
}

/// Decodes a view metadata token.
pub fn unsquash_view(token: &str) -> Result<View> {
    let fields: Vec<&str> = token.splitn(5, FIELD).collect();
    let [name, schema, materialized, with_no_data, definition] = fields[..] else {
        return Err(malformed("view", token));
    };
    Ok(View {
        name: name.to_string(),
        schema: schema.to_string(),
        materialized: parse_bool("view", token, materialized)?,
        with_no_data: parse_bool("view", token, with_no_data)?,
        definition: definition.to_string(),
    })
}

/// A table with every sub-entity collection flattened to squash tokens.
///
/// Columns stay structured (they are compared field-by-field, not as
/// tokens); everything else becomes a `name -> token` map for O(1)
/// equality diffing.
#[derive(Debug, Clone, PartialEq)]
pub struct SquashedTable {
    /// Table name.
    pub name: String,
    /// Schema the table lives in.
    pub schema: String,
    /// Structured columns keyed by name.
    pub columns: BTreeMap<String, crate::snapshot::Column>,
    /// Index tokens keyed by index name.
    pub indexes: BTreeMap<String, String>,
    /// Foreign key tokens keyed by constraint name.
    pub foreign_keys: BTreeMap<String, String>,
    /// Composite primary key tokens keyed by constraint name.
    pub composite_primary_keys: BTreeMap<String, String>,
    /// Unique constraint tokens keyed by constraint name.
    pub unique_constraints: BTreeMap<String, String>,
    /// Check constraint tokens keyed by constraint name.
    pub check_constraints: BTreeMap<String, String>,
    /// Policy tokens keyed by policy name.
    pub policies: BTreeMap<String, String>,
    /// Row-level-security flag.
    pub is_rls_enabled: bool,
}

fn squash_map<T>(map: &BTreeMap<String, T>, squash: impl Fn(&T) -> String) -> BTreeMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), squash(v))).collect()
}

/// Flattens a table into its squashed form.
#[must_use]
pub fn squash_table(table: &Table) -> SquashedTable {
    SquashedTable {
        name: table.name.clone(),
        schema: table.schema.clone(),
        columns: table.columns.clone(),
        indexes: squash_map(&table.indexes, squash_index),
        foreign_keys: squash_map(&table.foreign_keys, squash_fk),
        composite_primary_keys: squash_map(&table.composite_primary_keys, squash_pk),
        unique_constraints: squash_map(&table.unique_constraints, squash_unique),
        check_constraints: squash_map(&table.check_constraints, squash_check),
        policies: squash_map(&table.policies, squash_policy),
        is_rls_enabled: table.is_rls_enabled,
    }
}

/// Restores a structured table from its squashed form.
pub fn unsquash_table(squashed: &SquashedTable) -> Result<Table> {
    let mut table = Table::new(squashed.name.clone(), squashed.schema.clone());
    table.columns = squashed.columns.clone();
    for (name, token) in &squashed.indexes {
        table.indexes.insert(name.clone(), unsquash_index(token)?);
    }
    for (name, token) in &squashed.foreign_keys {
        table.foreign_keys.insert(name.clone(), unsquash_fk(token)?);
    }
    for (name, token) in &squashed.composite_primary_keys {
        table
            .composite_primary_keys
            .insert(name.clone(), unsquash_pk(token)?);
    }
    for (name, token) in &squashed.unique_constraints {
        table
            .unique_constraints
            .insert(name.clone(), unsquash_unique(token)?);
    }
    for (name, token) in &squashed.check_constraints {
        table
            .check_constraints
            .insert(name.clone(), unsquash_check(token)?);
    }
    for (name, token) in &squashed.policies {
        table.policies.insert(name.clone(), unsquash_policy(token)?);
    }
    table.is_rls_enabled = squashed.is_rls_enabled;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Index {
        Index {
            name: "users_email_idx".into(),
            columns: vec!["email".into(), "tenant_id".into()],
            unique: true,
            where_clause: Some("deleted_at IS NULL".into()),
            method: "btree".into(),
        }
    }

    fn sample_fk() -> ForeignKey {
        ForeignKey {
            name: "posts_author_fk".into(),
            table_from: "posts".into(),
            columns_from: vec!["author_id".into()],
            table_to: "users".into(),
            columns_to: vec!["id".into()],
            schema_to: "public".into(),
            on_update: "no action".into(),
            on_delete: "cascade".into(),
        }
    }

    #[test]
    fn index_round_trip() {
        let index = sample_index();
        assert_eq!(unsquash_index(&squash_index(&index)).unwrap(), index);
    }

    #[test]
    fn index_without_predicate_round_trip() {
        let mut index = sample_index();
        index.where_clause = None;
        index.method = String::new();
        assert_eq!(unsquash_index(&squash_index(&index)).unwrap(), index);
    }

    #[test]
    fn fk_round_trip() {
        let fk = sample_fk();
        assert_eq!(unsquash_fk(&squash_fk(&fk)).unwrap(), fk);
    }

    #[test]
    fn pk_round_trip() {
        let pk = CompositePk {
            name: "orders_pk".into(),
            columns: vec!["tenant_id".into(), "order_id".into()],
        };
        assert_eq!(unsquash_pk(&squash_pk(&pk)).unwrap(), pk);
    }

    #[test]
    fn unique_round_trip() {
        let uc = UniqueConstraint {
            name: "users_email_unique".into(),
            columns: vec!["email".into()],
            nulls_not_distinct: true,
        };
        assert_eq!(unsquash_unique(&squash_unique(&uc)).unwrap(), uc);
    }

    #[test]
    fn check_round_trip_with_embedded_delimiter() {
        let check = CheckConstraint {
            name: "price_positive".into(),
            value: "price > 0; -- enforced".into(),
        };
        assert_eq!(unsquash_check(&squash_check(&check)).unwrap(), check);
    }

    #[test]
    fn policy_round_trip() {
        let policy = Policy {
            name: "tenant_isolation".into(),
            action: "PERMISSIVE".into(),
            for_kind: "ALL".into(),
            to_roles: vec!["app_user".into(), "admin".into()],
            using_expr: Some("tenant_id = current_tenant()".into()),
            with_check: Some("tenant_id = current_tenant()".into()),
        };
        assert_eq!(unsquash_policy(&squash_policy(&policy)).unwrap(), policy);
    }

    #[test]
    fn policy_without_expressions_round_trip() {
        let policy = Policy {
            name: "open_read".into(),
            action: "PERMISSIVE".into(),
            for_kind: "SELECT".into(),
            to_roles: vec![],
            using_expr: None,
            with_check: None,
        };
        assert_eq!(unsquash_policy(&squash_policy(&policy)).unwrap(), policy);
    }

    #[test]
    fn view_round_trip() {
        let view = View {
            name: "active_users".into(),
            schema: "public".into(),
            definition: "SELECT * FROM users WHERE active".into(),
            materialized: true,
            with_no_data: false,
        };
        assert_eq!(unsquash_view(&squash_view(&view)).unwrap(), view);
    }

    #[test]
    fn malformed_token_names_the_kind() {
        let err = unsquash_fk("only;three;fields").unwrap_err();
        match err {
            crate::error::DiffError::MalformedToken { kind, token } => {
                assert_eq!(kind, "foreign key");
                assert_eq!(token, "only;three;fields");
            }
            other => panic!("expected MalformedToken, got {other:?}"),
        }
    }

    #[test]
    fn table_squash_round_trip() {
        let table = Table::new("users", "public")
            .column(crate::snapshot::Column::new("id", "bigint").primary_key())
            .index(sample_index());
        let squashed = squash_table(&table);
        assert_eq!(unsquash_table(&squashed).unwrap(), table);
    }
}
