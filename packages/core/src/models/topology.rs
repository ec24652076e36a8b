//! Link topology validation
//!
//! Pure checks over a link and the links already stored for its target. Stores run
//! them inside the same transaction (or lock scope) as the link write.

use crate::models::link::{Topology, WorkItemLink, WorkItemLinkType};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error(
        "work item {target_id} already has parent {existing_parent} via link type '{link_type_name}' ({link_type_id}); a work item can have only a single parent in tree topology"
    )]
    MultipleParents {
        link_type_id: Uuid,
        link_type_name: String,
        target_id: Uuid,
        existing_parent: Uuid,
    },

    #[error("link {link_id} uses link type {actual} but was validated against {expected}")]
    LinkTypeMismatch {
        link_id: Uuid,
        expected: Uuid,
        actual: Uuid,
    },
}

/// Enforce the single-parent rule for tree link types
///
/// `existing` holds links already stored for the target. Deleted links, links of
/// another type and links from the same source (re-saving the current parent link)
/// never conflict.
pub fn ensure_single_parent(
    link_type: &WorkItemLinkType,
    link: &WorkItemLink,
    existing: &[WorkItemLink],
) -> Result<(), TopologyError> {
    if link.link_type_id != link_type.id {
        return Err(TopologyError::LinkTypeMismatch {
            link_id: link.id,
            expected: link_type.id,
            actual: link.link_type_id,
        });
    }

    if link_type.topology != Topology::Tree {
        return Ok(());
    }

    let conflict = existing.iter().find(|other| {
        other.is_active()
            && other.link_type_id == link.link_type_id
            && other.target_id == link.target_id
            && other.source_id != link.source_id
            && other.id != link.id
    });

    match conflict {
        Some(other) => Err(TopologyError::MultipleParents {
            link_type_id: link_type.id,
            link_type_name: link_type.name.clone(),
            target_id: link.target_id,
            existing_parent: other.source_id,
        }),
        None => Ok(()),
    }
}
