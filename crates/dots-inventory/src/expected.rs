//! Expected senders per main topic

use dots_core::topics::{data_main_topic, LIFECYCLE_MAIN_TOPIC, ORCHESTRATOR_ID};
use dots_core::{NodeId, TopicScheme};
use dots_topology::ConnectivityMap;
use indexmap::{IndexMap, IndexSet};

/// Expected sender node ids per main topic
///
/// Always contains the lifecycle main topic with the orchestrator as its only
/// sender, so exactly one step marker is expected per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTable {
    senders: IndexMap<String, Vec<NodeId>>,
}

impl ExpectedTable {
    /// Build the table from the input connectivity of every owned node
    pub fn from_connectivity<'a>(per_node: impl IntoIterator<Item = &'a ConnectivityMap>) -> Self {
        let mut senders = IndexMap::new();
        senders.insert(
            LIFECYCLE_MAIN_TOPIC.to_string(),
            vec![NodeId::new(ORCHESTRATOR_ID)],
        );

        for connectivity in per_node {
            for (service, node_ids) in connectivity {
                let expected: &mut Vec<NodeId> =
                    senders.entry(data_main_topic(service)).or_default();
                for node_id in node_ids {
                    if !expected.contains(node_id) {
                        expected.push(node_id.clone());
                    }
                }
            }
        }

        Self { senders }
    }

    /// Number of records expected per step on `main_topic`
    pub fn expected_count(&self, main_topic: &str) -> usize {
        self.senders.get(main_topic).map_or(0, Vec::len)
    }

    /// Expected senders on `main_topic`
    pub fn senders(&self, main_topic: &str) -> &[NodeId] {
        self.senders.get(main_topic).map_or(&[], Vec::as_slice)
    }

    /// Iterate main topics and their senders in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.senders
            .iter()
            .map(|(topic, ids)| (topic.as_str(), ids.as_slice()))
    }

    /// Distinct wildcard subscriptions covering every expected sender
    pub fn subscriptions(&self, scheme: &TopicScheme) -> Vec<String> {
        let topics: IndexSet<String> = self
            .iter()
            .flat_map(|(main_topic, ids)| {
                ids.iter()
                    .map(move |id| scheme.data_subscription(main_topic, id))
            })
            .collect();
        topics.into_iter().collect()
    }
}
