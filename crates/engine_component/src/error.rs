//! Component storage error types.

use std::fmt;

/// How a table was borrowed when a conflicting borrow was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowKind {
    /// One or more shared (read) borrows are live.
    Shared,
    /// An exclusive (write) borrow is live.
    Exclusive,
}

impl fmt::Display for BorrowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Errors raised by component tables, the table registry and views.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    /// The entity already holds a component of this type.
    #[error("entity {entity} already has a `{table}` component")]
    DuplicateEntity {
        /// The offending entity.
        entity: u64,
        /// Component type name of the table.
        table: &'static str,
    },

    /// The entity holds no component of this type.
    #[error("entity {entity} has no `{table}` component")]
    MissingEntity {
        /// The offending entity.
        entity: u64,
        /// Component type name of the table.
        table: &'static str,
    },

    /// A table for this component type is already registered.
    #[error("component `{0}` is already registered")]
    DuplicateTable(&'static str),

    /// No table is registered for this component type.
    #[error("component `{0}` is not registered")]
    MissingTable(&'static str),

    /// The reserved null entity was passed where a live id is required.
    #[error("the null entity cannot hold components")]
    NullEntity,

    /// The table is already borrowed in a way that forbids this access.
    #[error("component table `{table}` is already borrowed ({held})")]
    BorrowConflict {
        /// Component type name of the table.
        table: &'static str,
        /// The kind of borrow currently held.
        held: BorrowKind,
    },

    /// A view was asked to drive iteration from a type it does not join.
    #[error("component `{0}` is not part of this view")]
    NotInView(&'static str),
}
