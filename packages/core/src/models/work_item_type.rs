//! Work Item Types
//!
//! A work item type is the schema of a family of work items: a map of field name to
//! [`FieldDefinition`]. Types are append-only. A new type may extend a base type,
//! inheriting its fields and its position in the type hierarchy, but an existing
//! type's fields never change after creation.
//!
//! # Type Hierarchy
//!
//! Each type carries a materialized [`TypePath`], the chain of ltree-safe ids from the
//! root type down to itself:
//!
//! ```text
//! planner_item                         (root)
//! planner_item.bug_type                (extends planner_item)
//! planner_item.bug_type.security_bug   (extends bug_type)
//! ```
//!
//! Subtype checks are segment lookups on that path, so ancestor queries never need a
//! recursive walk.

use crate::models::field_definition::FieldDefinition;
use crate::models::field_type::{FieldError, FieldValue};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

pub const PATH_SEPARATOR: char = '.';

static PATH_SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid path segment pattern"));

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkItemTypeError {
    #[error(
        "field '{field}' of work item type '{type_name}' is incompatible with the definition inherited from '{base_name}'"
    )]
    IncompatibleField {
        field: String,
        type_name: String,
        base_name: String,
    },

    #[error("invalid type path '{0}'")]
    InvalidPath(String),

    #[error("work item type name must not be empty")]
    EmptyName,
}

/// Ltree-safe form of a type id: the UUID with `-` replaced by `_`
pub fn safe_id(id: Uuid) -> String {
    id.to_string().replace('-', "_")
}

/// `.`-separated chain of ltree-safe ids from the root type to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypePath(String);

impl TypePath {
    pub fn root(id: Uuid) -> Self {
        Self(safe_id(id))
    }

    pub fn child(&self, id: Uuid) -> Self {
        Self(format!("{}{}{}", self.0, PATH_SEPARATOR, safe_id(id)))
    }

    pub fn parse(path: &str) -> Result<Self, WorkItemTypeError> {
        let valid = !path.is_empty()
            && path
                .split(PATH_SEPARATOR)
                .all(|segment| PATH_SEGMENT_PATTERN.is_match(segment));
        if valid {
            Ok(Self(path.to_string()))
        } else {
            Err(WorkItemTypeError::InvalidPath(path.to_string()))
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        let needle = safe_id(id);
        self.segments().any(|segment| segment == needle)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub version: i64,
    pub path: TypePath,
    pub fields: BTreeMap<String, FieldDefinition>,
    pub space_id: Uuid,
    pub extended_type_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a work item type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkItemType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub fields: BTreeMap<String, FieldDefinition>,
    pub space_id: Uuid,
}

impl NewWorkItemType {
    pub fn new(name: impl Into<String>, space_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            icon: String::new(),
            fields: BTreeMap::new(),
            space_id,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.fields.insert(name.into(), definition);
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, FieldDefinition>) -> Self {
        self.fields.extend(fields);
        self
    }
}

impl WorkItemType {
    /// Build a type from `new`, inheriting every field of `base`
    ///
    /// The new type's own fields are overlaid on the inherited set. An override must be
    /// compatible with the inherited definition; the first one that is not aborts the
    /// whole extension.
    pub fn extend(
        base: Option<&WorkItemType>,
        new: NewWorkItemType,
    ) -> Result<WorkItemType, WorkItemTypeError> {
        if new.name.trim().is_empty() {
            return Err(WorkItemTypeError::EmptyName);
        }

        let mut fields = base.map(|b| b.fields.clone()).unwrap_or_default();
        for (name, definition) in new.fields {
            if let (Some(base), Some(inherited)) = (base, fields.get(&name)) {
                if !inherited.is_compatible_with(&definition) {
                    return Err(WorkItemTypeError::IncompatibleField {
                        field: name,
                        type_name: new.name,
                        base_name: base.name.clone(),
                    });
                }
            }
            fields.insert(name, definition);
        }

        let path = match base {
            Some(base) => base.path.child(new.id),
            None => TypePath::root(new.id),
        };

        let now = Utc::now();
        Ok(WorkItemType {
            id: new.id,
            name: new.name,
            description: new.description,
            icon: new.icon,
            version: 0,
            path,
            fields,
            space_id: new.space_id,
            extended_type_id: base.map(|b| b.id),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_subtype_of(&self, ancestor_id: Uuid) -> bool {
        self.id == ancestor_id || self.path.contains(ancestor_id)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Convert external field values into the stored `Fields` document
    ///
    /// Fields absent from `values` are converted as `Null`, so a missing required
    /// field is rejected. Null results are left out of the document.
    pub fn convert_fields_to_model(
        &self,
        values: &BTreeMap<String, FieldValue>,
    ) -> Result<Map<String, Value>, FieldError> {
        if let Some(unknown) = values.keys().find(|name| !self.fields.contains_key(*name)) {
            return Err(self.unknown_field(unknown));
        }

        let mut stored = Map::new();
        for (name, definition) in &self.fields {
            let value = values.get(name).unwrap_or(&FieldValue::Null);
            let converted = definition.convert_to_model(name, value)?;
            if !converted.is_null() {
                stored.insert(name.clone(), converted);
            }
        }
        Ok(stored)
    }

    pub fn convert_fields_from_model(
        &self,
        stored: &Map<String, Value>,
    ) -> Result<BTreeMap<String, FieldValue>, FieldError> {
        if let Some(unknown) = stored.keys().find(|name| !self.fields.contains_key(*name)) {
            return Err(self.unknown_field(unknown));
        }

        self.fields
            .iter()
            .map(|(name, definition)| {
                let value = stored.get(name).unwrap_or(&Value::Null);
                definition
                    .convert_from_model(name, value)
                    .map(|converted| (name.clone(), converted))
            })
            .collect()
    }

    fn unknown_field(&self, name: &str) -> FieldError {
        FieldError::UnknownField {
            field: name.to_string(),
            type_name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field_type::{FieldType, Kind};

    fn space() -> Uuid {
        Uuid::new_v4()
    }

    fn base_type() -> WorkItemType {
        let new = NewWorkItemType::new("Planner Item", space())
            .with_field("foo", FieldDefinition::new("Foo", FieldType::list(Kind::String)))
            .with_field(
                "system.title",
                FieldDefinition::required("Title", FieldType::simple(Kind::String)),
            );
        WorkItemType::extend(None, new).unwrap()
    }

    #[test]
    fn test_root_type_path_is_own_safe_id() {
        let base = base_type();
        assert_eq!(base.path.as_str(), safe_id(base.id));
        assert!(!base.path.as_str().contains('-'));
        assert_eq!(base.extended_type_id, None);
    }

    #[test]
    fn test_extend_inherits_fields_and_path() {
        let base = base_type();
        let child = WorkItemType::extend(
            Some(&base),
            NewWorkItemType::new("Bug", base.space_id)
                .with_field("severity", FieldDefinition::new("Severity", FieldType::simple(Kind::Integer))),
        )
        .unwrap();

        assert_eq!(child.fields.get("foo"), base.fields.get("foo"));
        assert!(child.fields.contains_key("severity"));
        assert_eq!(child.path.as_str(), format!("{}.{}", base.path, safe_id(child.id)));
        assert_eq!(child.extended_type_id, Some(base.id));
        assert_eq!(child.path.depth(), 2);
    }

    #[test]
    fn test_compatible_override_replaces_label() {
        let base = base_type();
        let child = WorkItemType::extend(
            Some(&base),
            NewWorkItemType::new("Bug", base.space_id)
                .with_field("foo", FieldDefinition::new("Renamed Foo", FieldType::list(Kind::String))),
        )
        .unwrap();
        assert_eq!(child.fields["foo"].label, "Renamed Foo");
    }

    #[test]
    fn test_incompatible_override_rejected() {
        let base = base_type();
        let result = WorkItemType::extend(
            Some(&base),
            NewWorkItemType::new("Bug", base.space_id)
                .with_field("foo", FieldDefinition::required("Foo", FieldType::list(Kind::String))),
        );
        assert!(matches!(
            result,
            Err(WorkItemTypeError::IncompatibleField { ref field, .. }) if field == "foo"
        ));
    }

    #[test]
    fn test_subtype_checks() {
        let base = base_type();
        let child = WorkItemType::extend(Some(&base), NewWorkItemType::new("Bug", base.space_id)).unwrap();
        let grandchild =
            WorkItemType::extend(Some(&child), NewWorkItemType::new("Security Bug", base.space_id)).unwrap();

        assert!(grandchild.is_subtype_of(grandchild.id));
        assert!(grandchild.is_subtype_of(child.id));
        assert!(grandchild.is_subtype_of(base.id));
        assert!(!base.is_subtype_of(child.id));
        assert!(!child.is_subtype_of(Uuid::new_v4()));
    }

    #[test]
    fn test_type_path_parse() {
        assert!(TypePath::parse("abc_1.def_2").is_ok());
        assert!(TypePath::parse("").is_err());
        assert!(TypePath::parse("abc..def").is_err());
        assert!(TypePath::parse("abc-def").is_err());
    }

    #[test]
    fn test_convert_fields_rejects_unknown_key() {
        let base = base_type();
        let mut values = BTreeMap::new();
        values.insert("system.title".to_string(), FieldValue::from("Hello"));
        values.insert("bogus".to_string(), FieldValue::from("x"));

        let err = base.convert_fields_to_model(&values).unwrap_err();
        assert!(matches!(err, FieldError::UnknownField { ref field, .. } if field == "bogus"));
    }

    #[test]
    fn test_convert_fields_enforces_required() {
        let base = base_type();
        let err = base.convert_fields_to_model(&BTreeMap::new()).unwrap_err();
        assert_eq!(err.field(), "system.title");
    }

    #[test]
    fn test_convert_fields_round_trip() {
        let base = base_type();
        let mut values = BTreeMap::new();
        values.insert("system.title".to_string(), FieldValue::from("Hello"));
        values.insert("foo".to_string(), FieldValue::from(vec!["a", "b"]));

        let stored = base.convert_fields_to_model(&values).unwrap();
        assert_eq!(stored.len(), 2);
        let back = base.convert_fields_from_model(&stored).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_absent_optional_field_reads_back_as_null() {
        let base = base_type();
        let mut values = BTreeMap::new();
        values.insert("system.title".to_string(), FieldValue::from("Hello"));

        let stored = base.convert_fields_to_model(&values).unwrap();
        assert!(!stored.contains_key("foo"));
        let back = base.convert_fields_from_model(&stored).unwrap();
        assert_eq!(back.get("foo"), Some(&FieldValue::Null));
    }
}
