//! Lifecycle messages exchanged with the simulation orchestrator
//!
//! Inbound lifecycle traffic arrives on
//! `/lifecycle/dots-so/model/<runId>/<instanceId>/<MessageName>`; the three
//! recognised message names map onto [`LifecycleKind`]. Outbound
//! acknowledgements are modelled by [`Acknowledgement`].
//!
//! Payloads are JSON documents whose keys follow the orchestrator's wire
//! format.

use crate::errors::{DotsError, DotsResult};
use crate::identifiers::{NodeId, ServiceName};
use crate::record::{decode_json, encode_json, DataClass};
use crate::topics::{LIFECYCLE_MAIN_TOPIC, MODEL_RECIPIENT, ORCHESTRATOR_RECIPIENT};
use serde::{Deserialize, Serialize};

/// Mapping of a node type onto the calculation service that simulates it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationServiceDescription {
    /// Node type handled by the service, e.g. `HybridHeatPump`
    #[serde(rename = "esdl_type")]
    pub node_type: String,
    /// Service name
    #[serde(rename = "calc_service_name")]
    pub service_name: ServiceName,
    /// Container image the orchestrator deploys for the service
    #[serde(rename = "service_image_url", default)]
    pub image_url: String,
}

impl CalculationServiceDescription {
    /// Create a description
    pub fn new(node_type: impl Into<String>, service_name: impl Into<ServiceName>) -> Self {
        Self {
            node_type: node_type.into(),
            service_name: service_name.into(),
            image_url: String::new(),
        }
    }
}

/// Parameters that configure one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Human readable run name
    pub simulation_name: String,
    /// Start of the simulation as a UNIX timestamp in seconds
    pub start_timestamp: f64,
    /// Length of one step in seconds
    pub time_step_seconds: u64,
    /// Number of steps in the run
    pub nr_of_time_steps: u64,
    /// Nodes owned by this service instance
    #[serde(rename = "esdl_ids")]
    pub owned_node_ids: Vec<NodeId>,
    /// Node type to service mapping for the whole topology
    pub calculation_services: Vec<CalculationServiceDescription>,
    /// Base64 encoded topology document
    #[serde(rename = "esdl_base64string")]
    pub base64_graph: String,
}

impl DataClass for ModelParameters {
    const NAME: &'static str = "model_parameters";
    const MAIN_TOPIC: &'static str = LIFECYCLE_MAIN_TOPIC;

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }

    fn variable_description() -> &'static str {
        "{'parameters_dict': 'dict'}"
    }
}

/// Step marker announcing the start of a simulation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStep {
    /// 1-based step index
    pub time_step_nr: u64,
    /// Step start as a UNIX timestamp in seconds
    pub start_time_stamp: f64,
}

impl NewStep {
    /// Create a step marker
    pub fn new(time_step_nr: u64, start_time_stamp: f64) -> Self {
        Self {
            time_step_nr,
            start_time_stamp,
        }
    }
}

impl DataClass for NewStep {
    const NAME: &'static str = "new_step";
    const MAIN_TOPIC: &'static str = LIFECYCLE_MAIN_TOPIC;

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }

    fn variable_description() -> &'static str {
        "{'parameters_dict': 'dict'}"
    }
}

/// Inbound lifecycle messages recognised by a calculation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    /// Run parameters, the bootstrap message
    ModelParameters,
    /// Step marker
    NewStep,
    /// End of the simulation
    SimulationDone,
}

impl LifecycleKind {
    /// Classify a lifecycle message name (the last topic segment)
    pub fn from_message_name(name: &str) -> DotsResult<Self> {
        match name {
            "ModelParameters" => Ok(Self::ModelParameters),
            "NewStep" => Ok(Self::NewStep),
            "SimulationDone" => Ok(Self::SimulationDone),
            other => Err(DotsError::protocol(format!(
                "Received unknown lifecycle message: '{other}'"
            ))),
        }
    }

    /// Topic segment naming this message
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::ModelParameters => "ModelParameters",
            Self::NewStep => "NewStep",
            Self::SimulationDone => "SimulationDone",
        }
    }

    /// Class name under which the inventory knows this message
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::ModelParameters => ModelParameters::NAME,
            Self::NewStep => NewStep::NAME,
            Self::SimulationDone => "simulations_done",
        }
    }
}

/// Outbound lifecycle messages sent by a calculation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Service connected and waits for parameters
    ReadyForProcessing,
    /// Setup finished and data topics are subscribed
    Parameterized,
    /// All calculations of the current step have run
    CalculationsDone,
    /// The run failed and the service is stopping
    ErrorOccurred {
        /// Error report including context
        error_message: String,
    },
}

#[derive(Serialize)]
struct ErrorOccurredPayload<'a> {
    error_message: &'a str,
}

impl Acknowledgement {
    /// Topic segment naming this message
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::ReadyForProcessing => "ReadyForProcessing",
            Self::Parameterized => "Parameterized",
            Self::CalculationsDone => "CalculationsDone",
            Self::ErrorOccurred { .. } => "ErrorOccurred",
        }
    }

    /// Well-known service the message is addressed to
    pub fn recipient(&self) -> &'static str {
        match self {
            Self::ReadyForProcessing => MODEL_RECIPIENT,
            _ => ORCHESTRATOR_RECIPIENT,
        }
    }

    /// Encode the message payload
    pub fn payload(&self) -> DotsResult<Vec<u8>> {
        match self {
            Self::ErrorOccurred { error_message } => encode_json(
                self.message_name(),
                &ErrorOccurredPayload { error_message },
            ),
            _ => Ok(b"{}".to_vec()),
        }
    }
}
