//! Scripted simulation orchestrator
//!
//! Publishes lifecycle and input data directly on a [`MemoryBroker`] and
//! inspects what the service under test sent back.

use crate::fixtures::{MODEL_ID, SIMULATION_ID};
use dots_core::{DataClass, LifecycleKind, ModelParameters, NewStep, NodeId, TopicScheme};
use dots_service::{InboundMessage, MemoryBroker};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrator side of a test run
#[derive(Debug, Clone)]
pub struct FakeOrchestrator {
    broker: MemoryBroker,
    scheme: TopicScheme,
}

impl FakeOrchestrator {
    /// Orchestrator for the fixture run and instance
    pub fn new(broker: MemoryBroker) -> Self {
        Self::for_instance(broker, TopicScheme::new(SIMULATION_ID, MODEL_ID))
    }

    /// Orchestrator for an explicit run and instance
    pub fn for_instance(broker: MemoryBroker, scheme: TopicScheme) -> Self {
        Self { broker, scheme }
    }

    /// Underlying broker
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Send run parameters; returns the number of receivers
    pub fn send_parameters(&self, parameters: &ModelParameters) -> usize {
        self.send_lifecycle(LifecycleKind::ModelParameters, parameters.encode().unwrap())
    }

    /// Send the step marker for a 1-based step
    pub fn send_new_step(&self, time_step_nr: u64) -> usize {
        let marker = NewStep::new(time_step_nr, 0.0);
        self.send_lifecycle(LifecycleKind::NewStep, marker.encode().unwrap())
    }

    /// End the simulation
    pub fn send_simulation_done(&self) -> usize {
        self.send_lifecycle(LifecycleKind::SimulationDone, b"{}".to_vec())
    }

    /// Publish a record as if `node_id` of another service produced it
    pub fn send_data<T: DataClass>(&self, node_id: &str, record: &T) -> usize {
        let topic = self.scheme.data(T::MAIN_TOPIC, &NodeId::from(node_id), T::NAME);
        self.broker.publish(&topic, record.encode().unwrap())
    }

    /// Publish an arbitrary lifecycle message
    pub fn send_lifecycle(&self, kind: LifecycleKind, payload: Vec<u8>) -> usize {
        self.broker.publish(&self.scheme.lifecycle_inbound(kind), payload)
    }

    /// Acknowledgements named `name` the instance sent so far
    pub fn acknowledgements(&self, name: &str) -> Vec<InboundMessage> {
        let filter = format!(
            "/lifecycle/model/+/{}/{}/{name}",
            self.scheme.simulation_id(),
            self.scheme.model_id()
        );
        self.broker.published_matching(&filter)
    }

    /// Wait until at least `count` acknowledgements named `name` were sent
    ///
    /// Panics after a timeout.
    pub async fn wait_for_ack(&self, name: &str, count: usize) -> Vec<InboundMessage> {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let acks = self.acknowledgements(name);
            if acks.len() >= count {
                return acks;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} x {name}, got {}",
                acks.len()
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Records of class `T` published for `node_id`, in publish order
    pub fn outputs<T: DataClass>(&self, node_id: &str) -> Vec<T> {
        let topic = self.scheme.data(T::MAIN_TOPIC, &NodeId::from(node_id), T::NAME);
        self.broker
            .published_matching(&topic)
            .iter()
            .map(|message| T::decode(&message.payload).unwrap())
            .collect()
    }

    /// Lines the instance published on its log topic
    pub fn log_lines(&self) -> Vec<String> {
        self.broker
            .published_matching(&self.scheme.log())
            .into_iter()
            .map(|message| String::from_utf8_lossy(&message.payload).into_owned())
            .collect()
    }
}
