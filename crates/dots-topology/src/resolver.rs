//! Upstream and downstream connectivity resolution
//!
//! For a subject node the resolver answers which nodes (grouped by the
//! service that calculates them) send input to it, and which nodes it sends
//! output to.
//!
//! Node types are mapped to services through the run's service descriptions.
//! The first description whose node type matches decides the service; the
//! node is kept only when that service is on the resolver's allow list.

use crate::error::TopologyError;
use crate::graph::{Graph, Node, PortDirection};
use dots_core::{CalculationServiceDescription, NodeId, ServiceName};
use indexmap::IndexMap;
use tracing::debug;

/// Connected nodes per service, in first-seen order
pub type ConnectivityMap = IndexMap<ServiceName, Vec<NodeId>>;

/// Resolves connectivity for the nodes a service owns
#[derive(Debug, Clone)]
pub struct TopologyResolver {
    services: Vec<CalculationServiceDescription>,
    allow_list: Vec<ServiceName>,
}

impl TopologyResolver {
    /// Create a resolver for one run's service mapping
    ///
    /// `allow_list` names the services whose output the calling service
    /// consumes.
    pub fn new(
        services: Vec<CalculationServiceDescription>,
        allow_list: impl IntoIterator<Item = ServiceName>,
    ) -> Self {
        Self {
            services,
            allow_list: allow_list.into_iter().collect(),
        }
    }

    /// Service descriptions of the run
    pub fn services(&self) -> &[CalculationServiceDescription] {
        &self.services
    }

    /// Services this resolver accepts
    pub fn allow_list(&self) -> &[ServiceName] {
        &self.allow_list
    }

    /// Nodes that feed input to `id`
    ///
    /// A connectable asset sees the assets linked to its inbound ports plus
    /// every informational node, the root included. Any other node sees the
    /// whole graph.
    pub fn resolve_inputs(
        &self,
        graph: &Graph,
        id: &str,
    ) -> Result<ConnectivityMap, TopologyError> {
        let subject = find_node(graph, id)?;
        let mut connectivity = ConnectivityMap::new();

        if subject.is_connectable() {
            for node in linked_assets(graph, subject, PortDirection::In) {
                self.classify(&mut connectivity, node);
            }
            for node in graph.nodes().filter(|node| !node.is_connectable()) {
                self.classify(&mut connectivity, node);
            }
        } else {
            // The root and the subject itself are included.
            for node in graph.nodes() {
                self.classify(&mut connectivity, node);
            }
        }

        debug!(node_id = id, services = connectivity.len(), "Resolved inputs");
        Ok(connectivity)
    }

    /// Nodes that `id` sends output to
    ///
    /// Only connectable assets have outputs; they follow outbound ports.
    pub fn resolve_outputs(
        &self,
        graph: &Graph,
        id: &str,
    ) -> Result<ConnectivityMap, TopologyError> {
        let subject = find_node(graph, id)?;
        let mut connectivity = ConnectivityMap::new();

        if subject.is_connectable() {
            for node in linked_assets(graph, subject, PortDirection::Out) {
                self.classify(&mut connectivity, node);
            }
        }

        debug!(node_id = id, services = connectivity.len(), "Resolved outputs");
        Ok(connectivity)
    }

    /// Service responsible for a node, if any
    pub fn service_for(&self, node: &Node) -> Option<&ServiceName> {
        let description = self
            .services
            .iter()
            .find(|description| description.node_type == node.node_type())?;
        self.allow_list
            .contains(&description.service_name)
            .then_some(&description.service_name)
    }

    fn classify(&self, connectivity: &mut ConnectivityMap, node: &Node) {
        match self.service_for(node) {
            Some(service) => {
                let ids = connectivity.entry(service.clone()).or_default();
                if !ids.contains(node.id()) {
                    ids.push(node.id().clone());
                }
            }
            None => debug!(
                node_type = node.node_type(),
                "No calculation service found for node type"
            ),
        }
    }
}

/// Look up a node anywhere in the graph, the root included
pub fn find_node<'g>(graph: &'g Graph, id: &str) -> Result<&'g Node, TopologyError> {
    graph
        .node(id)
        .ok_or_else(|| TopologyError::NotFound(NodeId::new(id)))
}

fn linked_assets<'g>(
    graph: &'g Graph,
    subject: &'g Node,
    direction: PortDirection,
) -> impl Iterator<Item = &'g Node> {
    subject
        .ports_in(direction)
        .flat_map(|port| port.connected_to())
        .filter_map(move |target| graph.port_owner(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{NodeDocument, PortDocument};
    use assert_matches::assert_matches;

    fn services() -> Vec<CalculationServiceDescription> {
        vec![
            CalculationServiceDescription::new("PVInstallation", "pv_service"),
            CalculationServiceDescription::new("HeatPump", "hp_service"),
            CalculationServiceDescription::new("WeatherProfile", "weather_service"),
            CalculationServiceDescription::new("EnergySystem", "es_service"),
            CalculationServiceDescription::new("Battery", "battery_service"),
        ]
    }

    fn allow_all() -> Vec<ServiceName> {
        ["pv_service", "hp_service", "weather_service", "es_service", "battery_service"]
            .into_iter()
            .map(ServiceName::from)
            .collect()
    }

    // pv-1 and pv-2 feed hp-1; hp-1 feeds battery; bat-2 only has an outbound
    // port linked to pv-2's outbound port.
    fn graph() -> Graph {
        let doc = NodeDocument::new("es", "EnergySystem")
            .with_child(NodeDocument::asset(
                "pv-1",
                "PVInstallation",
                vec![PortDocument::outbound("pv-1-out", &["hp-1-in"])],
            ))
            .with_child(NodeDocument::asset(
                "pv-2",
                "PVInstallation",
                vec![PortDocument::outbound("pv-2-out", &["hp-1-in", "bat-2-out"])],
            ))
            .with_child(NodeDocument::asset(
                "hp-1",
                "HeatPump",
                vec![
                    PortDocument::inbound("hp-1-in", &["pv-1-out", "pv-2-out", "pv-1-out"]),
                    PortDocument::outbound("hp-1-out", &["bat-1-in"]),
                ],
            ))
            .with_child(NodeDocument::asset(
                "bat-1",
                "Battery",
                vec![PortDocument::inbound("bat-1-in", &["hp-1-out"])],
            ))
            .with_child(NodeDocument::asset(
                "bat-2",
                "Battery",
                vec![PortDocument::outbound("bat-2-out", &["pv-2-out"])],
            ))
            .with_child(NodeDocument::new("weather", "WeatherProfile"))
            .with_child(NodeDocument::new("note", "Annotation"));
        Graph::from_document(doc).unwrap()
    }

    fn ids(connectivity: &ConnectivityMap, service: &str) -> Vec<String> {
        connectivity
            .get(service)
            .map(|ids| ids.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_find_node_includes_root() {
        let graph = graph();
        assert_eq!(find_node(&graph, "es").unwrap().node_type(), "EnergySystem");
        assert_matches!(find_node(&graph, "nope"), Err(TopologyError::NotFound(_)));
    }

    #[test]
    fn test_connectable_inputs_follow_inbound_ports() {
        let resolver = TopologyResolver::new(services(), allow_all());
        let inputs = resolver.resolve_inputs(&graph(), "hp-1").unwrap();

        assert_eq!(ids(&inputs, "pv_service"), vec!["pv-1", "pv-2"]);
        assert_eq!(ids(&inputs, "weather_service"), vec!["weather"]);
        assert_eq!(ids(&inputs, "es_service"), vec!["es"]);
        assert!(!inputs.contains_key("battery_service"));
        assert!(!inputs.contains_key("hp_service"));
    }

    #[test]
    fn test_outbound_to_outbound_link_is_not_an_input() {
        let resolver = TopologyResolver::new(services(), allow_all());
        let inputs = resolver.resolve_inputs(&graph(), "pv-2").unwrap();
        assert!(!inputs.contains_key("battery_service"));
        assert!(!inputs.contains_key("pv_service"));
    }

    #[test]
    fn test_non_connectable_subject_sees_whole_graph() {
        let resolver = TopologyResolver::new(services(), allow_all());
        let inputs = resolver.resolve_inputs(&graph(), "weather").unwrap();

        assert_eq!(ids(&inputs, "pv_service"), vec!["pv-1", "pv-2"]);
        assert_eq!(ids(&inputs, "hp_service"), vec!["hp-1"]);
        assert_eq!(ids(&inputs, "battery_service"), vec!["bat-1", "bat-2"]);
        assert_eq!(ids(&inputs, "es_service"), vec!["es"]);
    }

    #[test]
    fn test_root_is_an_input_of_every_subject() {
        let resolver = TopologyResolver::new(services(), allow_all());
        for subject in ["es", "weather", "hp-1"] {
            let inputs = resolver.resolve_inputs(&graph(), subject).unwrap();
            assert_eq!(ids(&inputs, "es_service"), vec!["es"], "subject {subject}");
        }
    }

    #[test]
    fn test_allow_list_filters_services() {
        let resolver = TopologyResolver::new(services(), vec![ServiceName::from("pv_service")]);
        let inputs = resolver.resolve_inputs(&graph(), "hp-1").unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(ids(&inputs, "pv_service"), vec!["pv-1", "pv-2"]);
    }

    #[test]
    fn test_first_matching_description_decides() {
        let mut services = services();
        services.insert(0, CalculationServiceDescription::new("PVInstallation", "other"));
        let resolver = TopologyResolver::new(services, allow_all());
        let inputs = resolver.resolve_inputs(&graph(), "hp-1").unwrap();
        assert!(!inputs.contains_key("pv_service"));
    }

    #[test]
    fn test_outputs() {
        let resolver = TopologyResolver::new(services(), allow_all());
        let graph = graph();

        let outputs = resolver.resolve_outputs(&graph, "hp-1").unwrap();
        assert_eq!(ids(&outputs, "battery_service"), vec!["bat-1"]);
        assert_eq!(outputs.len(), 1);

        assert!(resolver.resolve_outputs(&graph, "weather").unwrap().is_empty());
        assert_matches!(
            resolver.resolve_outputs(&graph, "missing"),
            Err(TopologyError::NotFound(_))
        );
    }
}
