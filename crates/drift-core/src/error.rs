//! Error types for the diff engine.

use crate::dialect::Dialect;

/// Errors that can occur while diffing snapshots or rendering SQL.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The snapshot was written by an unsupported format version.
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the snapshot.
        found: u32,
        /// Version this engine understands.
        expected: u32,
    },

    /// The two snapshots were taken for different dialects.
    #[error("Dialect mismatch: previous snapshot is {prev}, current is {curr}")]
    DialectMismatch {
        /// Dialect of the previous snapshot.
        prev: Dialect,
        /// Dialect of the current snapshot.
        curr: Dialect,
    },

    /// A squashed entity token could not be decoded.
    #[error("Malformed {kind} token: '{token}'")]
    MalformedToken {
        /// Entity kind the token was supposed to encode.
        kind: &'static str,
        /// The offending token.
        token: String,
    },

    /// A name or expression contains the squash field delimiter.
    #[error("{kind} '{value}' contains the reserved delimiter ';'")]
    ReservedDelimiter {
        /// What the value is (table name, policy expression, ...).
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    /// A snapshot violates a structural invariant.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The resolver aborted instead of returning a partition.
    #[error("Resolution aborted while resolving {kind} changes")]
    ResolverAborted {
        /// Entity kind being resolved.
        kind: &'static str,
    },

    /// The resolver returned a partition that does not account for every
    /// input entity exactly once.
    #[error("Inconsistent {kind} resolution: {detail}")]
    InconsistentResolution {
        /// Entity kind being resolved.
        kind: &'static str,
        /// What was missing or duplicated.
        detail: String,
    },

    /// A statement reached a dialect that cannot express it.
    #[error("Statement {statement} is not supported by the {dialect} dialect")]
    UnsupportedStatement {
        /// Statement kind name.
        statement: &'static str,
        /// The active dialect.
        dialect: Dialect,
    },

    /// An entity referenced during planning does not exist in the snapshot.
    #[error("Unknown {kind} '{key}' referenced during planning")]
    UnknownEntity {
        /// Entity kind.
        kind: &'static str,
        /// Lookup key that failed.
        key: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for diff operations.
pub type Result<T> = std::result::Result<T, DiffError>;
