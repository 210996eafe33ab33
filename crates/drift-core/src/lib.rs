//! Schema snapshot diffing and dialect-aware DDL generation.
//!
//! `drift-core` computes the DDL statements required to transform a
//! database schema from one declared state to another, across a
//! Postgres-family, a MySQL-family and a SQLite-family dialect. Given
//! two versioned [`Snapshot`](snapshot::Snapshot)s it produces an
//! ordered [`Plan`](planner::Plan): abstract statements plus their
//! rendered, de-duplicated SQL text.
//!
//! # Architecture
//!
//! - **Snapshot model** ([`snapshot`]) - versioned, JSON-serializable
//!   schema descriptions with deterministic `BTreeMap` collections.
//! - **Squash codec** ([`squash`]) - canonical string tokens for
//!   sub-entities, making change detection a string comparison.
//! - **Differ** ([`diff`]) - generic key-set and token diffing.
//! - **Resolver boundary** ([`resolver`]) - injected async callback that
//!   disambiguates add+delete pairs into renames and moves.
//! - **Patcher** ([`patch`]) - rewrites the previous snapshot after each
//!   resolution stage so later stages diff corrected identities.
//! - **Planner** ([`planner`]) - fixed, dependency-respecting statement
//!   ordering.
//! - **Code generators** ([`codegen`]) - exhaustive per-dialect
//!   rendering.
//! - **Recreate merger** ([`recreate`]) - SQLite whole-table-rebuild
//!   fallback for alterations the dialect cannot express.
//!
//! # Example
//!
//! ```rust
//! use drift_core::prelude::*;
//!
//! let prev = Snapshot::new(Dialect::Postgres)
//!     .table(Table::new("users", "public").column(Column::new("id", "bigint").primary_key()));
//! let curr = Snapshot::new(Dialect::Postgres).table(
//!     Table::new("users", "public")
//!         .column(Column::new("id", "bigint").primary_key())
//!         .column(Column::new("email", "text")),
//! );
//!
//! let plan = tokio_test::block_on(diff_snapshots(
//!     &prev,
//!     &curr,
//!     &mut NoopResolver,
//!     ApplyMode::Generate,
//! ))
//! .unwrap();
//! assert_eq!(plan.sql, vec!["ALTER TABLE \"users\" ADD COLUMN \"email\" text;"]);
//! ```

pub mod codegen;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod patch;
pub mod planner;
pub mod recreate;
pub mod resolver;
pub mod snapshot;
pub mod squash;
pub mod statement;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{ApplyMode, Dialect};
    pub use crate::diff::DiffResult;
    pub use crate::error::{DiffError, Result};
    pub use crate::planner::{diff_snapshots, Plan};
    pub use crate::resolver::{
        EntityKind, EntityRef, NoopResolver, Resolution, Resolver, StructuralResolver,
    };
    pub use crate::snapshot::{Column, Snapshot, Table, SNAPSHOT_VERSION};
    pub use crate::statement::Statement;
}
