//! Work items in storage and external form
//!
//! [`WorkItemRecord`] is the row as persisted: its `fields` document has already passed
//! through the type's conversion layer. [`WorkItem`] is what callers read and write,
//! with typed [`FieldValue`]s.

use crate::models::field_definition::FieldDefinition;
use crate::models::field_type::{FieldError, FieldType, FieldValue, Kind};
use crate::models::work_item_type::WorkItemType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Well-known field names shared by every planner item type
pub mod system {
    pub const TITLE: &str = "system.title";
    pub const DESCRIPTION: &str = "system.description";
    pub const STATE: &str = "system.state";
    pub const ASSIGNEES: &str = "system.assignees";
    pub const CREATOR: &str = "system.creator";
    pub const ITERATION: &str = "system.iteration";
    pub const AREA: &str = "system.area";
    pub const CODEBASE: &str = "system.codebase";
    pub const LABELS: &str = "system.labels";
    pub const REMOTE_ITEM_ID: &str = "system.remote_item_id";

    pub const STATE_NEW: &str = "new";
    pub const STATE_OPEN: &str = "open";
    pub const STATE_IN_PROGRESS: &str = "in progress";
    pub const STATE_RESOLVED: &str = "resolved";
    pub const STATE_CLOSED: &str = "closed";
}

/// Canonical base field set that concrete planner item types extend
pub fn planner_item_fields() -> BTreeMap<String, FieldDefinition> {
    let states: Vec<Value> = [
        system::STATE_NEW,
        system::STATE_OPEN,
        system::STATE_IN_PROGRESS,
        system::STATE_RESOLVED,
        system::STATE_CLOSED,
    ]
    .into_iter()
    .map(Value::from)
    .collect();

    BTreeMap::from([
        (
            system::TITLE.to_string(),
            FieldDefinition::required("Title", FieldType::simple(Kind::String)),
        ),
        (
            system::DESCRIPTION.to_string(),
            FieldDefinition::new("Description", FieldType::simple(Kind::Markup)),
        ),
        (
            system::STATE.to_string(),
            FieldDefinition::required("State", FieldType::enumeration(Kind::String, states)),
        ),
        (
            system::ASSIGNEES.to_string(),
            FieldDefinition::new("Assignees", FieldType::list(Kind::User)),
        ),
        (
            system::CREATOR.to_string(),
            FieldDefinition::new("Creator", FieldType::simple(Kind::User)),
        ),
        (
            system::ITERATION.to_string(),
            FieldDefinition::new("Iteration", FieldType::simple(Kind::Iteration)),
        ),
        (
            system::AREA.to_string(),
            FieldDefinition::new("Area", FieldType::simple(Kind::Area)),
        ),
        (
            system::CODEBASE.to_string(),
            FieldDefinition::new("Codebase", FieldType::simple(Kind::Codebase)),
        ),
        (
            system::LABELS.to_string(),
            FieldDefinition::new("Labels", FieldType::list(Kind::String)),
        ),
        (
            system::REMOTE_ITEM_ID.to_string(),
            FieldDefinition::new("Remote item", FieldType::simple(Kind::String)),
        ),
    ])
}

/// Persisted form of a work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRecord {
    pub id: Uuid,
    pub number: i64,
    pub type_id: Uuid,
    pub version: i64,
    pub fields: Map<String, Value>,
    pub execution_order: f64,
    pub space_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a row the store has not numbered or ordered yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkItemRecord {
    pub id: Uuid,
    pub type_id: Uuid,
    pub fields: Map<String, Value>,
    pub space_id: Uuid,
}

/// External form of a work item
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: Uuid,
    pub number: i64,
    pub type_id: Uuid,
    pub version: i64,
    pub fields: BTreeMap<String, FieldValue>,
    pub execution_order: f64,
    pub space_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn from_record(record: WorkItemRecord, wit: &WorkItemType) -> Result<Self, FieldError> {
        let fields = wit.convert_fields_from_model(&record.fields)?;
        Ok(Self {
            id: record.id,
            number: record.number,
            type_id: record.type_id,
            version: record.version,
            fields,
            execution_order: record.execution_order,
            space_id: record.space_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn title(&self) -> Option<&str> {
        match self.field(system::TITLE) {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionKind {
    Create,
    Update,
    Delete,
}

impl RevisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Create => "create",
            RevisionKind::Update => "update",
            RevisionKind::Delete => "delete",
        }
    }
}

/// Audit record stamped with the acting identity on every work item mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRevision {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub kind: RevisionKind,
    pub modifier: Uuid,
    pub version: i64,
    pub fields: Option<Map<String, Value>>,
    pub recorded_at: DateTime<Utc>,
}

impl WorkItemRevision {
    pub fn new(kind: RevisionKind, modifier: Uuid, record: &WorkItemRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_item_id: record.id,
            kind,
            modifier,
            version: record.version,
            fields: match kind {
                RevisionKind::Delete => None,
                _ => Some(record.fields.clone()),
            },
            recorded_at: Utc::now(),
        }
    }
}
