//! Abstract DDL statements.
//!
//! One [`Statement`] is materialized per schema change, in the planner's
//! fixed phase order, before any dialect-specific text exists. Each
//! variant owns exactly the fields needed to render itself; statements
//! are value types with no back-references into the snapshots.

use crate::diff::ColumnChange;
use crate::snapshot::{
    CheckConstraint, Column, CompositePk, EnumDef, ForeignKey, Index, Policy, Role, Sequence,
    Table, UniqueConstraint, View,
};

/// A column whose type references an enum being rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumnUse {
    /// Schema of the owning table.
    pub schema: String,
    /// Owning table name.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Default to restore after the retype, if any.
    pub default: Option<String>,
}

/// One abstract DDL operation in the generated migration plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Create a named schema.
    CreateSchema {
        /// Schema name.
        name: String,
    },
    /// Rename a schema.
    RenameSchema {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a schema.
    DropSchema {
        /// Schema name.
        name: String,
    },

    /// Create an enum type.
    CreateEnum {
        /// Full definition.
        def: EnumDef,
    },
    /// Append a value to an enum type.
    AddEnumValue {
        /// Schema of the type.
        schema: String,
        /// Type name.
        name: String,
        /// Value to add.
        value: String,
        /// Existing value to insert before, or `None` to append.
        before: Option<String>,
    },
    /// Rebuild an enum type whose value set shrank or reordered.
    ///
    /// Emits a retype-to-text / drop / create / retype-back sequence for
    /// every column using the type. Unsafe without review, so skipped in
    /// push mode.
    RecreateEnum {
        /// Target definition.
        def: EnumDef,
        /// Columns typed by this enum.
        columns: Vec<EnumColumnUse>,
    },
    /// Rename an enum type.
    RenameEnum {
        /// Schema of the type.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Move an enum type between schemas.
    MoveEnum {
        /// Type name.
        name: String,
        /// Schema it moves out of.
        schema_from: String,
        /// Schema it moves into.
        schema_to: String,
    },
    /// Drop an enum type.
    DropEnum {
        /// Schema of the type.
        schema: String,
        /// Type name.
        name: String,
    },

    /// Create a sequence.
    CreateSequence {
        /// Full definition.
        seq: Sequence,
    },
    /// Re-state a sequence's parameters.
    AlterSequence {
        /// Target definition.
        seq: Sequence,
    },
    /// Rename a sequence.
    RenameSequence {
        /// Schema of the sequence.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Move a sequence between schemas.
    MoveSequence {
        /// Sequence name.
        name: String,
        /// Schema it moves out of.
        schema_from: String,
        /// Schema it moves into.
        schema_to: String,
    },
    /// Drop a sequence.
    DropSequence {
        /// Schema of the sequence.
        schema: String,
        /// Sequence name.
        name: String,
    },

    /// Create a role.
    CreateRole {
        /// Full definition.
        role: Role,
    },
    /// Re-state a role's options.
    AlterRole {
        /// Target definition.
        role: Role,
    },
    /// Rename a role.
    RenameRole {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a role.
    DropRole {
        /// Role name.
        name: String,
    },

    /// Create a table with its columns and table-level constraints.
    CreateTable {
        /// Full target definition.
        table: Table,
    },
    /// Drop a table.
    DropTable {
        /// Schema of the table.
        schema: String,
        /// Table name.
        name: String,
    },
    /// Rename a table.
    RenameTable {
        /// Schema of the table.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Move a table between schemas.
    SetTableSchema {
        /// Table name.
        name: String,
        /// Schema it moves out of.
        schema_from: String,
        /// Schema it moves into.
        schema_to: String,
    },

    /// Enable row-level security on a table.
    EnableRls {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
    },
    /// Disable row-level security on a table.
    DisableRls {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
    },

    /// Create a view.
    CreateView {
        /// Full definition.
        view: View,
    },
    /// Drop a view.
    DropView {
        /// Schema of the view.
        schema: String,
        /// View name.
        name: String,
        /// Whether the view is materialized.
        materialized: bool,
    },
    /// Rename a view.
    RenameView {
        /// Schema of the view.
        schema: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
        /// Whether the view is materialized.
        materialized: bool,
    },
    /// Move a view between schemas.
    MoveView {
        /// View name.
        name: String,
        /// Schema it moves out of.
        schema_from: String,
        /// Schema it moves into.
        schema_to: String,
        /// Whether the view is materialized.
        materialized: bool,
    },
    /// Redefine a view in place.
    AlterView {
        /// Target definition.
        view: View,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },
    /// Drop a column.
    DropColumn {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Apply one in-place column alteration.
    ///
    /// Carries the full target column because the MySQL family re-states
    /// the whole definition (`MODIFY COLUMN`) where the Postgres family
    /// issues a single `ALTER COLUMN` clause.
    AlterColumn {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Target state of the column.
        column: Column,
        /// The specific change.
        change: ColumnChange,
    },

    /// Create an index.
    CreateIndex {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },
    /// Drop an index.
    DropIndex {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Index definition as it existed.
        index: Index,
    },
    /// Add a foreign key constraint.
    CreateReference {
        /// Schema of the referencing table.
        schema: String,
        /// Referencing table name.
        table: String,
        /// Constraint definition.
        fk: ForeignKey,
    },
    /// Drop a foreign key constraint.
    DropReference {
        /// Schema of the referencing table.
        schema: String,
        /// Referencing table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Add a composite primary key.
    CreateCompositePk {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint definition.
        pk: CompositePk,
    },
    /// Drop a composite primary key.
    DropCompositePk {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Add a unique constraint.
    CreateUnique {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint definition.
        unique: UniqueConstraint,
    },
    /// Drop a unique constraint.
    DropUnique {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Add a check constraint.
    CreateCheck {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint definition.
        check: CheckConstraint,
    },
    /// Drop a check constraint.
    DropCheck {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Create a policy on a table.
    CreatePolicy {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Policy definition.
        policy: Policy,
    },
    /// Re-state a policy's USING/WITH CHECK/roles.
    AlterPolicy {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Target definition.
        policy: Policy,
    },
    /// Rename a policy.
    RenamePolicy {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a policy.
    DropPolicy {
        /// Schema of the table.
        schema: String,
        /// Table name.
        table: String,
        /// Policy name.
        name: String,
    },

    /// Rebuild a table under its target definition (SQLite fallback).
    ///
    /// Renders as: rename old aside, create new, copy surviving rows,
    /// drop old, re-create the target table's indexes.
    RecreateTable {
        /// Target definition.
        table: Table,
        /// Columns surviving the rebuild, used for the row copy.
        copy_columns: Vec<String>,
    },
}

impl Statement {
    /// Stable kind name, used in errors and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create_schema",
            Self::RenameSchema { .. } => "rename_schema",
            Self::DropSchema { .. } => "drop_schema",
            Self::CreateEnum { .. } => "create_enum",
            Self::AddEnumValue { .. } => "add_enum_value",
            Self::RecreateEnum { .. } => "recreate_enum",
            Self::RenameEnum { .. } => "rename_enum",
            Self::MoveEnum { .. } => "move_enum",
            Self::DropEnum { .. } => "drop_enum",
            Self::CreateSequence { .. } => "create_sequence",
            Self::AlterSequence { .. } => "alter_sequence",
            Self::RenameSequence { .. } => "rename_sequence",
            Self::MoveSequence { .. } => "move_sequence",
            Self::DropSequence { .. } => "drop_sequence",
            Self::CreateRole { .. } => "create_role",
            Self::AlterRole { .. } => "alter_role",
            Self::RenameRole { .. } => "rename_role",
            Self::DropRole { .. } => "drop_role",
            Self::CreateTable { .. } => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::RenameTable { .. } => "rename_table",
            Self::SetTableSchema { .. } => "set_table_schema",
            Self::EnableRls { .. } => "enable_rls",
            Self::DisableRls { .. } => "disable_rls",
            Self::CreateView { .. } => "create_view",
            Self::DropView { .. } => "drop_view",
            Self::RenameView { .. } => "rename_view",
            Self::MoveView { .. } => "move_view",
            Self::AlterView { .. } => "alter_view",
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::AlterColumn { .. } => "alter_column",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::CreateReference { .. } => "create_reference",
            Self::DropReference { .. } => "drop_reference",
            Self::CreateCompositePk { .. } => "create_composite_pk",
            Self::DropCompositePk { .. } => "drop_composite_pk",
            Self::CreateUnique { .. } => "create_unique",
            Self::DropUnique { .. } => "drop_unique",
            Self::CreateCheck { .. } => "create_check",
            Self::DropCheck { .. } => "drop_check",
            Self::CreatePolicy { .. } => "create_policy",
            Self::AlterPolicy { .. } => "alter_policy",
            Self::RenamePolicy { .. } => "rename_policy",
            Self::DropPolicy { .. } => "drop_policy",
            Self::RecreateTable { .. } => "recreate_table",
        }
    }

    /// Key of the table this statement touches, if it is table-scoped.
    ///
    /// Used by the SQLite recreate merger to group statements per table.
    #[must_use]
    pub fn table_key(&self) -> Option<String> {
        use crate::snapshot::entity_key;
        match self {
            Self::CreateTable { table } | Self::RecreateTable { table, .. } => Some(table.key()),
            Self::DropTable { schema, name } => Some(entity_key(schema, name)),
            Self::RenameTable { schema, to, .. } => Some(entity_key(schema, to)),
            Self::EnableRls { schema, table }
            | Self::DisableRls { schema, table }
            | Self::AddColumn { schema, table, .. }
            | Self::DropColumn { schema, table, .. }
            | Self::RenameColumn { schema, table, .. }
            | Self::AlterColumn { schema, table, .. }
            | Self::CreateIndex { schema, table, .. }
            | Self::DropIndex { schema, table, .. }
            | Self::CreateReference { schema, table, .. }
            | Self::DropReference { schema, table, .. }
            | Self::CreateCompositePk { schema, table, .. }
            | Self::DropCompositePk { schema, table, .. }
            | Self::CreateUnique { schema, table, .. }
            | Self::DropUnique { schema, table, .. }
            | Self::CreateCheck { schema, table, .. }
            | Self::DropCheck { schema, table, .. }
            | Self::CreatePolicy { schema, table, .. }
            | Self::AlterPolicy { schema, table, .. }
            | Self::RenamePolicy { schema, table, .. }
            | Self::DropPolicy { schema, table, .. } => Some(entity_key(schema, table)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Column;

    #[test]
    fn kind_names_are_stable() {
        let stmt = Statement::CreateSchema {
            name: "audit".into(),
        };
        assert_eq!(stmt.kind(), "create_schema");
    }

    #[test]
    fn table_key_groups_table_scoped_statements() {
        let add = Statement::AddColumn {
            schema: "public".into(),
            table: "users".into(),
            column: Column::new("email", "text"),
        };
        assert_eq!(add.table_key().as_deref(), Some("users"));

        let schema = Statement::CreateSchema {
            name: "audit".into(),
        };
        assert_eq!(schema.table_key(), None);
    }
}
