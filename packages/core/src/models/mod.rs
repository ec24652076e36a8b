//! Data Models
//!
//! This module contains the schema and record types of the tracker:
//!
//! - `FieldType` / `FieldDefinition` - per-field conversion between external and stored values
//! - `WorkItemType` - append-only field schema with a materialized type hierarchy
//! - `WorkItem` / `WorkItemRecord` - external and persisted work items
//! - `WorkItemLinkType` / `WorkItemLink` - typed links and their topology rules
//!
//! Field values of a work item live in a single JSON document (`Fields`), keyed by
//! field name and already converted by the owning type.

pub mod field_definition;
pub mod field_type;
pub mod link;
pub mod markup;
pub mod topology;
pub mod work_item;
pub mod work_item_type;

pub use field_definition::FieldDefinition;
pub use field_type::{
    EnumType, FieldConverter, FieldError, FieldType, FieldValue, Kind, ListType, SimpleType,
};
pub use link::{Topology, WorkItemLink, WorkItemLinkType};
pub use markup::{CodebaseContent, MarkupContent, MarkupKind};
pub use topology::{ensure_single_parent, TopologyError};
pub use work_item::{
    planner_item_fields, system, NewWorkItemRecord, RevisionKind, WorkItem, WorkItemRecord,
    WorkItemRevision,
};
pub use work_item_type::{safe_id, NewWorkItemType, TypePath, WorkItemType, WorkItemTypeError};
