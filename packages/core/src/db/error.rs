//! Database Error Types
//!
//! This module defines error types for store operations, covering pool and
//! connection failures, statement errors, rows that cannot be decoded, and
//! topology violations detected inside a store transaction.

use crate::models::TopologyError;
use thiserror::Error;

/// Store operation errors
///
/// Lookup misses and version mismatches are not errors at this layer: stores report
/// them as `None` / zero rows affected and the service layer decides what they mean.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to take a connection from the pool
    #[error("Failed to get a database connection: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Failed to build the connection pool
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] deadpool_postgres::CreatePoolError),

    /// tokio-postgres statement or protocol error
    #[error("Database operation failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be decoded
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),

    /// A link write would break its link type's topology
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl DatabaseError {
    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a corrupt data error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
