//! Work item links and link types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Structural constraint a link type imposes on the graph it forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Network,
    DirectedNetwork,
    Dependency,
    /// Every target has at most one active parent
    Tree,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Network => "network",
            Topology::DirectedNetwork => "directed_network",
            Topology::Dependency => "dependency",
            Topology::Tree => "tree",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Topology::Network),
            "directed_network" => Ok(Topology::DirectedNetwork),
            "dependency" => Ok(Topology::Dependency),
            "tree" => Ok(Topology::Tree),
            other => Err(format!("unknown link topology: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemLinkType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub forward_name: String,
    pub reverse_name: String,
    pub topology: Topology,
    pub link_category_id: Uuid,
    pub space_id: Uuid,
    pub version: i64,
}

impl WorkItemLinkType {
    pub fn new(
        name: impl Into<String>,
        topology: Topology,
        link_category_id: Uuid,
        space_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            forward_name: String::new(),
            reverse_name: String::new(),
            topology,
            link_category_id,
            space_id,
            version: 0,
        }
    }

    pub fn with_names(mut self, forward: impl Into<String>, reverse: impl Into<String>) -> Self {
        self.forward_name = forward.into();
        self.reverse_name = reverse.into();
        self
    }
}

/// Directed link from `source_id` (the parent, for tree types) to `target_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemLink {
    pub id: Uuid,
    pub version: i64,
    pub link_type_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkItemLink {
    pub fn new(link_type_id: Uuid, source_id: Uuid, target_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 0,
            link_type_id,
            source_id,
            target_id,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
