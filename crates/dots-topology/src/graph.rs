//! Parsed topology graph
//!
//! Nodes are stored in document pre-order with the root first. The graph is
//! read-only once built.

use crate::document::NodeDocument;
use crate::error::TopologyError;
use dots_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Inbound port, receives flow from connected ports
    In,
    /// Outbound port, sends flow to connected ports
    Out,
}

/// Directional attachment point of a connectable asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    id: String,
    direction: PortDirection,
    connected_to: Vec<String>,
}

impl Port {
    /// Port id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Port direction
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Ids of linked ports
    pub fn connected_to(&self) -> &[String] {
        &self.connected_to
    }
}

/// One addressable unit of the topology
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    node_type: String,
    name: Option<String>,
    attributes: BTreeMap<String, serde_json::Value>,
    ports: Option<Vec<Port>>,
    parent: Option<usize>,
}

impl Node {
    /// Node id
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Node type
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Display name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Whether the node has directional ports
    pub fn is_connectable(&self) -> bool {
        self.ports.is_some()
    }

    /// Ports of the node (empty for informational nodes)
    pub fn ports(&self) -> &[Port] {
        self.ports.as_deref().unwrap_or(&[])
    }

    /// Ports of one direction
    pub fn ports_in(&self, direction: PortDirection) -> impl Iterator<Item = &Port> {
        self.ports()
            .iter()
            .filter(move |port| port.direction == direction)
    }
}

/// Parsed topology
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    port_owners: HashMap<String, usize>,
}

impl Graph {
    /// Build a graph from a topology document
    ///
    /// Fails on duplicate node or port ids and on connections to unknown ports.
    pub fn from_document(root: NodeDocument) -> Result<Self, TopologyError> {
        let mut nodes = Vec::new();
        let mut index = HashMap::new();
        let mut port_owners = HashMap::new();

        let mut stack = vec![(root, None)];
        while let Some((mut doc, parent)) = stack.pop() {
            let position = nodes.len();
            if index.insert(doc.id.clone(), position).is_some() {
                return Err(TopologyError::DuplicateNode(doc.id));
            }

            let ports = match doc.ports.take() {
                Some(port_docs) => {
                    let mut ports = Vec::with_capacity(port_docs.len());
                    for port in port_docs {
                        if port_owners.insert(port.id.clone(), position).is_some() {
                            return Err(TopologyError::DuplicatePort(port.id));
                        }
                        ports.push(Port {
                            id: port.id,
                            direction: port.direction,
                            connected_to: port.connected_to,
                        });
                    }
                    Some(ports)
                }
                None => None,
            };

            let children = std::mem::take(&mut doc.contents);
            for child in children.into_iter().rev() {
                stack.push((child, Some(position)));
            }

            nodes.push(Node {
                id: doc.id,
                node_type: doc.node_type,
                name: doc.name,
                attributes: doc.attributes,
                ports,
                parent,
            });
        }

        let graph = Self {
            nodes,
            index,
            port_owners,
        };
        graph.check_connections()?;
        Ok(graph)
    }

    fn check_connections(&self) -> Result<(), TopologyError> {
        for port in self.nodes.iter().flat_map(Node::ports) {
            if let Some(target) = port
                .connected_to
                .iter()
                .find(|target| !self.port_owners.contains_key(target.as_str()))
            {
                return Err(TopologyError::DanglingConnection {
                    port: port.id.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    /// The root node
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// All nodes in pre-order, root first
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All nodes below the root, in pre-order
    pub fn contents(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().skip(1)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    /// The node owning a port
    pub fn port_owner(&self, port_id: &str) -> Option<&Node> {
        self.port_owners
            .get(port_id)
            .map(|&position| &self.nodes[position])
    }

    /// The node containing `node`, `None` for the root
    pub fn parent_of(&self, node: &Node) -> Option<&Node> {
        node.parent.map(|position| &self.nodes[position])
    }

    /// Number of nodes including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a graph has at least its root
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PortDocument;
    use assert_matches::assert_matches;

    fn sample() -> NodeDocument {
        NodeDocument::new("root", "EnergySystem")
            .with_child(
                NodeDocument::new("area", "Area").with_child(NodeDocument::asset(
                    "hp",
                    "HeatPump",
                    vec![PortDocument::inbound("hp-in", &["pv-out"])],
                )),
            )
            .with_child(NodeDocument::asset(
                "pv",
                "PVInstallation",
                vec![PortDocument::outbound("pv-out", &["hp-in"])],
            ))
    }

    #[test]
    fn test_nodes_are_in_preorder() {
        let graph = Graph::from_document(sample()).unwrap();
        let ids: Vec<&str> = graph.nodes().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["root", "area", "hp", "pv"]);
        assert_eq!(graph.root().id().as_str(), "root");
        assert_eq!(graph.contents().count(), 3);
    }

    #[test]
    fn test_port_owner_and_parent() {
        let graph = Graph::from_document(sample()).unwrap();
        assert_eq!(graph.port_owner("pv-out").unwrap().id().as_str(), "pv");

        let hp = graph.node("hp").unwrap();
        assert!(hp.is_connectable());
        assert_eq!(graph.parent_of(hp).unwrap().id().as_str(), "area");
        assert!(graph.parent_of(graph.root()).is_none());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let doc = NodeDocument::new("root", "EnergySystem")
            .with_child(NodeDocument::new("x", "A"))
            .with_child(NodeDocument::new("x", "B"));
        assert_matches!(
            Graph::from_document(doc),
            Err(TopologyError::DuplicateNode(id)) if id.as_str() == "x"
        );
    }

    #[test]
    fn test_dangling_connection_rejected() {
        let doc = NodeDocument::new("root", "EnergySystem").with_child(NodeDocument::asset(
            "hp",
            "HeatPump",
            vec![PortDocument::inbound("hp-in", &["missing"])],
        ));
        assert_matches!(
            Graph::from_document(doc),
            Err(TopologyError::DanglingConnection { .. })
        );
    }
}
