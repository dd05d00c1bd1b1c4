//! Topic grammar
//!
//! ```text
//! lifecycle in : /lifecycle/dots-so/model/<runId>/<instanceId>/<MessageName>
//! lifecycle out: /lifecycle/model/<recipient>/<runId>/<instanceId>/<MessageName>
//! data         : /data/<serviceName>/model/<runId>/<nodeId>/<MessageName>
//! log          : /log/model/dots-so/<runId>/<instanceId>
//! ```
//!
//! The message name always sits in segment 6 (counting the empty segment
//! before the leading slash), which is how inbound messages are classified.

use crate::errors::{DotsError, DotsResult};
use crate::identifiers::{NodeId, ServiceName};
use crate::messages::{Acknowledgement, LifecycleKind};

/// Main topic of all orchestrator-to-model lifecycle messages
pub const LIFECYCLE_MAIN_TOPIC: &str = "/lifecycle/dots-so/model";

/// Synthetic sender id of the step marker in the expected table
pub const ORCHESTRATOR_ID: &str = "dots-so";

/// Recipient segment for messages addressed to the simulation orchestrator
pub const ORCHESTRATOR_RECIPIENT: &str = "dots-so";

/// Recipient segment for messages addressed to the model services orchestrator
pub const MODEL_RECIPIENT: &str = "mso";

const MESSAGE_NAME_SEGMENT: usize = 6;
const MAIN_TOPIC_SEGMENTS: usize = 4;
const NODE_ID_SEGMENT: usize = 5;

/// Main topic carrying the data published by `service`
pub fn data_main_topic(service: &ServiceName) -> String {
    format!("/data/{service}/model")
}

/// Classification of an inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    /// A lifecycle message from the orchestrator
    Lifecycle(LifecycleKind),
    /// A data record published by another service
    Data {
        /// Main topic, e.g. `/data/input_service/model`
        main_topic: String,
        /// Node the record was published for
        node_id: NodeId,
        /// Class name of the record
        class_name: String,
    },
}

impl InboundTopic {
    /// Classify a topic by its fixed path segments
    pub fn parse(topic: &str) -> DotsResult<Self> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() <= MESSAGE_NAME_SEGMENT {
            return Err(DotsError::protocol(format!("Malformed topic: '{topic}'")));
        }
        let message_name = segments[MESSAGE_NAME_SEGMENT];

        if topic.starts_with(LIFECYCLE_MAIN_TOPIC)
            && topic[LIFECYCLE_MAIN_TOPIC.len()..].starts_with('/')
        {
            return LifecycleKind::from_message_name(message_name).map(Self::Lifecycle);
        }

        Ok(Self::Data {
            main_topic: segments[..MAIN_TOPIC_SEGMENTS].join("/"),
            node_id: NodeId::from(segments[NODE_ID_SEGMENT]),
            class_name: message_name.to_string(),
        })
    }

    /// Main topic and class name under which the inventory records this message
    pub fn inventory_key(&self) -> (&str, &str) {
        match self {
            Self::Lifecycle(kind) => (LIFECYCLE_MAIN_TOPIC, kind.class_name()),
            Self::Data {
                main_topic,
                class_name,
                ..
            } => (main_topic, class_name),
        }
    }
}

/// Topic builder scoped to one run and one service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    simulation_id: String,
    model_id: String,
}

impl TopicScheme {
    /// Create a scheme for a run and service instance
    pub fn new(simulation_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Run id
    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    /// Service instance id
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Wildcard subscription for this instance's inbound lifecycle messages
    pub fn lifecycle_subscription(&self) -> String {
        format!(
            "{LIFECYCLE_MAIN_TOPIC}/{}/{}/+",
            self.simulation_id, self.model_id
        )
    }

    /// Topic on which the orchestrator sends `kind` to this instance
    pub fn lifecycle_inbound(&self, kind: LifecycleKind) -> String {
        format!(
            "{LIFECYCLE_MAIN_TOPIC}/{}/{}/{}",
            self.simulation_id,
            self.model_id,
            kind.message_name()
        )
    }

    /// Topic for an outbound acknowledgement
    pub fn acknowledgement(&self, ack: &Acknowledgement) -> String {
        format!(
            "/lifecycle/model/{}/{}/{}/{}",
            ack.recipient(),
            self.simulation_id,
            self.model_id,
            ack.message_name()
        )
    }

    /// Topic for a data record of class `name` published for `node_id`
    pub fn data(&self, main_topic: &str, node_id: &NodeId, name: &str) -> String {
        format!("{main_topic}/{}/{node_id}/{name}", self.simulation_id)
    }

    /// Wildcard subscription for everything published for `node_id`
    pub fn data_subscription(&self, main_topic: &str, node_id: &NodeId) -> String {
        format!("{main_topic}/{}/{node_id}/#", self.simulation_id)
    }

    /// Topic carrying remote log lines of this instance
    pub fn log(&self) -> String {
        format!(
            "/log/model/{ORCHESTRATOR_RECIPIENT}/{}/{}",
            self.simulation_id, self.model_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn scheme() -> TopicScheme {
        TopicScheme::new("sim-1", "model-a")
    }

    #[test]
    fn test_lifecycle_topics() {
        let topics = scheme();
        assert_eq!(
            topics.lifecycle_subscription(),
            "/lifecycle/dots-so/model/sim-1/model-a/+"
        );
        assert_eq!(
            topics.acknowledgement(&Acknowledgement::ReadyForProcessing),
            "/lifecycle/model/mso/sim-1/model-a/ReadyForProcessing"
        );
        assert_eq!(
            topics.acknowledgement(&Acknowledgement::CalculationsDone),
            "/lifecycle/model/dots-so/sim-1/model-a/CalculationsDone"
        );
        assert_eq!(topics.log(), "/log/model/dots-so/sim-1/model-a");
    }

    #[test]
    fn test_data_topics() {
        let topics = scheme();
        let main = data_main_topic(&ServiceName::from("input_service"));
        let node = NodeId::from("n1");
        assert_eq!(main, "/data/input_service/model");
        assert_eq!(
            topics.data(&main, &node, "demand"),
            "/data/input_service/model/sim-1/n1/demand"
        );
        assert_eq!(
            topics.data_subscription(&main, &node),
            "/data/input_service/model/sim-1/n1/#"
        );
    }

    #[test]
    fn test_parse_lifecycle_topic() {
        let parsed = InboundTopic::parse("/lifecycle/dots-so/model/sim-1/model-a/NewStep").unwrap();
        assert_eq!(parsed, InboundTopic::Lifecycle(LifecycleKind::NewStep));
        assert_eq!(
            parsed.inventory_key(),
            ("/lifecycle/dots-so/model", "new_step")
        );
    }

    #[test]
    fn test_parse_data_topic() {
        let parsed = InboundTopic::parse("/data/input_service/model/sim-1/n1/demand").unwrap();
        assert_eq!(
            parsed,
            InboundTopic::Data {
                main_topic: "/data/input_service/model".to_string(),
                node_id: NodeId::from("n1"),
                class_name: "demand".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_short_and_unknown_topics() {
        assert_matches!(
            InboundTopic::parse("/data/x/model"),
            Err(DotsError::ProtocolViolation(_))
        );
        assert_matches!(
            InboundTopic::parse("/lifecycle/dots-so/model/sim-1/model-a/Bogus"),
            Err(DotsError::ProtocolViolation(_))
        );
    }
}
