use thiserror::Error;

use crate::catalog::CatalogError;
use crate::common::MAX_RELATIONS;

/// Errors raised while building or rewriting a join tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RewriteError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    #[error("Column {column} not found in relation {relation}")]
    ColumnNotFound { relation: String, column: String },

    #[error("Duplicate relation name: {0}")]
    DuplicateRelation(String),

    #[error("Too many relations in one query block (limit is {})", MAX_RELATIONS)]
    TooManyRelations,

    #[error("Invalid join tree: {0}")]
    InvalidTree(String),

    #[error("Rewrite cancelled")]
    Cancelled,

    #[error("Rewrite deadline exceeded")]
    DeadlineExceeded,

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type RewriteResult<T> = Result<T, RewriteError>;
