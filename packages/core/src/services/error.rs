//! Service Layer Error Types
//!
//! Every layer below the services has its own error enum. This module folds them
//! into the four outcomes callers act on: bad input, a missing entity, a lost
//! optimistic-lock race, or an internal failure.

use crate::criteria::CompileErrors;
use crate::db::DatabaseError;
use crate::models::{FieldError, TopologyError, WorkItemTypeError};
use thiserror::Error;
use uuid::Uuid;

/// Service operation errors
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The caller supplied something invalid: field values, criteria, schema or links
    #[error("Bad parameter '{parameter}': {reason}")]
    BadParameter { parameter: String, reason: String },

    /// Primary-key lookup miss
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Version conflict (optimistic concurrency control)
    #[error("Version conflict for {entity} {id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        entity: &'static str,
        id: Uuid,
        expected_version: i64,
        actual_version: i64,
    },

    /// Store failure not attributable to the caller
    #[error("Internal error: {0}")]
    Internal(DatabaseError),
}

impl TrackerError {
    /// Create a bad parameter error
    pub fn bad_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a version conflict error
    pub fn version_conflict(
        entity: &'static str,
        id: Uuid,
        expected_version: i64,
        actual_version: i64,
    ) -> Self {
        Self::VersionConflict {
            entity,
            id,
            expected_version,
            actual_version,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn is_bad_parameter(&self) -> bool {
        matches!(self, Self::BadParameter { .. })
    }
}

impl From<FieldError> for TrackerError {
    fn from(err: FieldError) -> Self {
        Self::bad_parameter(err.field().to_string(), err.to_string())
    }
}

impl From<CompileErrors> for TrackerError {
    fn from(err: CompileErrors) -> Self {
        Self::bad_parameter("criteria", err.to_string())
    }
}

impl From<WorkItemTypeError> for TrackerError {
    fn from(err: WorkItemTypeError) -> Self {
        Self::bad_parameter("work item type", err.to_string())
    }
}

impl From<TopologyError> for TrackerError {
    fn from(err: TopologyError) -> Self {
        Self::bad_parameter("link", err.to_string())
    }
}

impl From<DatabaseError> for TrackerError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Topology(topology) => topology.into(),
            other => Self::Internal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_is_bad_parameter() {
        let err: TrackerError = FieldError::Required {
            field: "system.title".into(),
        }
        .into();
        match err {
            TrackerError::BadParameter { parameter, reason } => {
                assert_eq!(parameter, "system.title");
                assert!(reason.contains("value required"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrapped_topology_error_is_bad_parameter() {
        let topology = TopologyError::MultipleParents {
            link_type_id: Uuid::new_v4(),
            link_type_name: "parenting".into(),
            target_id: Uuid::new_v4(),
            existing_parent: Uuid::new_v4(),
        };
        let err: TrackerError = DatabaseError::Topology(topology).into();
        assert!(err.is_bad_parameter());
        assert!(err.to_string().contains("single parent in tree topology"));
    }

    #[test]
    fn test_other_database_errors_are_internal() {
        let err: TrackerError = DatabaseError::corrupt("bad row").into();
        assert!(matches!(err, TrackerError::Internal(_)));
    }

    #[test]
    fn test_version_conflict_message() {
        let id = Uuid::new_v4();
        let err = TrackerError::version_conflict("work item", id, 2, 3);
        assert!(err.is_version_conflict());
        assert_eq!(
            err.to_string(),
            format!("Version conflict for work item {id}: expected version 2, found 3")
        );
    }
}
