//! Serialized topology document
//!
//! The wire form of a topology is base64 encoded JSON:
//!
//! ```json
//! {
//!   "id": "es-1", "type": "EnergySystem",
//!   "contents": [
//!     { "id": "hp-1", "type": "HeatPump",
//!       "ports": [{ "id": "hp-1-in", "direction": "in", "connected_to": ["pv-1-out"] }] },
//!     { "id": "pv-1", "type": "PVInstallation",
//!       "ports": [{ "id": "pv-1-out", "direction": "out", "connected_to": ["hp-1-in"] }] },
//!     { "id": "weather", "type": "WeatherProfile" }
//!   ]
//! }
//! ```
//!
//! A node that carries a `ports` array (even an empty one) is a connectable
//! asset.

use crate::graph::PortDirection;
use dots_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of the serialized topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Node id, unique within the document
    pub id: NodeId,
    /// Node type, matched against the run's service mapping
    #[serde(rename = "type")]
    pub node_type: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Ports; present only on connectable assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortDocument>>,
    /// Nested nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<NodeDocument>,
}

impl NodeDocument {
    /// Create an informational node without ports
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: None,
            attributes: BTreeMap::new(),
            ports: None,
            contents: Vec::new(),
        }
    }

    /// Create a connectable asset with the given ports
    pub fn asset(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        ports: Vec<PortDocument>,
    ) -> Self {
        Self {
            ports: Some(ports),
            ..Self::new(id, node_type)
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Append a nested node
    pub fn with_child(mut self, child: NodeDocument) -> Self {
        self.contents.push(child);
        self
    }
}

/// One port of a connectable asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDocument {
    /// Port id, unique within the document
    pub id: String,
    /// Flow direction
    pub direction: PortDirection,
    /// Ids of the ports this port links to
    #[serde(default)]
    pub connected_to: Vec<String>,
}

impl PortDocument {
    /// Create an inbound port
    pub fn inbound(id: impl Into<String>, connected_to: &[&str]) -> Self {
        Self::new(id, PortDirection::In, connected_to)
    }

    /// Create an outbound port
    pub fn outbound(id: impl Into<String>, connected_to: &[&str]) -> Self {
        Self::new(id, PortDirection::Out, connected_to)
    }

    fn new(id: impl Into<String>, direction: PortDirection, connected_to: &[&str]) -> Self {
        Self {
            id: id.into(),
            direction,
            connected_to: connected_to.iter().map(|p| p.to_string()).collect(),
        }
    }
}
