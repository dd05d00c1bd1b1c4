//! Topology, parameter and configuration fixtures
//!
//! The demand topology:
//!
//! ```text
//! es (EnergySystem)
//! ├── in-1 (DemandProfile) out-1 ──┐
//! ├── in-2 (DemandProfile) out-2 ──┼──> 1234 (Consumer) in-1234
//! └── carrier (Carrier)
//! ```

use crate::calc::SummingCalc;
use dots_core::{CalculationServiceDescription, ModelParameters, NodeId, ServiceConfig};
use dots_service::{CalculationService, MemoryBroker, ServiceCalc};
use dots_topology::{NodeDocument, PortDocument};
use std::sync::Arc;

/// Run id used by the fixtures
pub const SIMULATION_ID: &str = "sim-1";

/// Instance id of the service under test
pub const MODEL_ID: &str = "test-model";

/// Node owned by the service under test
pub const OWNED_NODE: &str = "1234";

/// Nodes of `input_service` feeding the owned node
pub const INPUT_NODES: [&str; 2] = ["in-1", "in-2"];

/// 2024-01-01T00:00:00Z
pub const START_TIMESTAMP: f64 = 1_704_067_200.0;

/// Step length of the fixture runs
pub const TIME_STEP_SECONDS: u64 = 900;

/// Topology with two demand profiles feeding one consumer
pub fn demand_topology() -> NodeDocument {
    NodeDocument::new("es", "EnergySystem")
        .with_child(NodeDocument::asset(
            INPUT_NODES[0],
            "DemandProfile",
            vec![PortDocument::outbound("out-1", &["in-1234"])],
        ))
        .with_child(NodeDocument::asset(
            INPUT_NODES[1],
            "DemandProfile",
            vec![PortDocument::outbound("out-2", &["in-1234"])],
        ))
        .with_child(
            NodeDocument::asset(
                OWNED_NODE,
                "Consumer",
                vec![PortDocument::inbound("in-1234", &["out-1", "out-2"])],
            )
            .with_name("Consumer 1234"),
        )
        .with_child(NodeDocument::new("carrier", "Carrier"))
}

/// Node type to service mapping of the demand topology
pub fn service_map() -> Vec<CalculationServiceDescription> {
    vec![
        CalculationServiceDescription::new("DemandProfile", "input_service"),
        CalculationServiceDescription::new("Consumer", "test_service"),
    ]
}

/// Builder for run parameters
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    parameters: ModelParameters,
    topology: NodeDocument,
}

impl ParametersBuilder {
    /// Parameters for `topology` with fixture defaults
    pub fn new(topology: NodeDocument) -> Self {
        Self {
            parameters: ModelParameters {
                simulation_name: "test run".to_string(),
                start_timestamp: START_TIMESTAMP,
                time_step_seconds: TIME_STEP_SECONDS,
                nr_of_time_steps: 2,
                owned_node_ids: Vec::new(),
                calculation_services: service_map(),
                base64_graph: String::new(),
            },
            topology,
        }
    }

    /// Set the owned nodes
    pub fn owned(mut self, ids: &[&str]) -> Self {
        self.parameters.owned_node_ids = ids.iter().map(|id| NodeId::from(*id)).collect();
        self
    }

    /// Set the number of steps
    pub fn steps(mut self, nr_of_time_steps: u64) -> Self {
        self.parameters.nr_of_time_steps = nr_of_time_steps;
        self
    }

    /// Set the node type to service mapping
    pub fn services(mut self, services: Vec<CalculationServiceDescription>) -> Self {
        self.parameters.calculation_services = services;
        self
    }

    /// Encode the topology and return the parameters
    pub fn build(self) -> ModelParameters {
        ModelParameters {
            base64_graph: dots_topology::encode(&self.topology).unwrap(),
            ..self.parameters
        }
    }
}

/// Parameters of a run where the service under test owns [`OWNED_NODE`]
pub fn demand_parameters() -> ModelParameters {
    ParametersBuilder::new(demand_topology())
        .owned(&[OWNED_NODE])
        .build()
}

/// Valid configuration for the service under test
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        simulation_id: SIMULATION_ID.to_string(),
        model_id: MODEL_ID.to_string(),
        max_workers: 4,
        ..ServiceConfig::default()
    }
}

/// Summing service connected to `broker`
pub fn summing_service(broker: &MemoryBroker) -> CalculationService<SummingCalc> {
    service_with(broker, SummingCalc::new())
}

/// Service hosting `calc`, connected to `broker`
pub fn service_with<C: ServiceCalc>(broker: &MemoryBroker, calc: C) -> CalculationService<C> {
    CalculationService::new(test_config(), calc, Arc::new(broker.client())).unwrap()
}
