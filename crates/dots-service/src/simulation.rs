//! Simulation context built from the run parameters

use chrono::{DateTime, Duration, Utc};
use dots_core::{DotsError, DotsResult, ModelParameters, NodeId, ServiceName, TopicScheme};
use dots_topology::{ConnectivityMap, Graph, Node, TopologyResolver};
use indexmap::IndexMap;
use tracing::debug;

/// Node type of static profile nodes
pub const URI_PROFILE_TYPE: &str = "URIProfile";

/// Attribute holding a profile's location
pub const URI_ATTRIBUTE: &str = "uri";

/// Parsed run parameters, topology and resolved connectivity
#[derive(Debug, Clone)]
pub struct Simulation {
    simulation_id: String,
    model_id: String,
    name: String,
    start: DateTime<Utc>,
    time_step_seconds: u64,
    nr_of_time_steps: u64,
    owned_node_ids: Vec<NodeId>,
    graph: Graph,
    inputs: IndexMap<NodeId, ConnectivityMap>,
    outputs: IndexMap<NodeId, ConnectivityMap>,
}

impl Simulation {
    /// Parse the topology and resolve connectivity for every owned node
    ///
    /// An owned node id missing from the topology fails with `NotFound`.
    pub fn from_parameters(
        scheme: &TopicScheme,
        parameters: &ModelParameters,
        receives: Vec<ServiceName>,
    ) -> DotsResult<Self> {
        let start = start_time(parameters.start_timestamp)?;
        let graph = dots_topology::parse(&parameters.base64_graph)?;
        let resolver = TopologyResolver::new(parameters.calculation_services.clone(), receives);

        let mut inputs = IndexMap::new();
        let mut outputs = IndexMap::new();
        for node_id in &parameters.owned_node_ids {
            inputs.insert(node_id.clone(), resolver.resolve_inputs(&graph, node_id.as_str())?);
            outputs.insert(node_id.clone(), resolver.resolve_outputs(&graph, node_id.as_str())?);
        }

        debug!(
            simulation = %parameters.simulation_name,
            owned = parameters.owned_node_ids.len(),
            "Resolved connectivity for owned nodes"
        );

        Ok(Self {
            simulation_id: scheme.simulation_id().to_string(),
            model_id: scheme.model_id().to_string(),
            name: parameters.simulation_name.clone(),
            start,
            time_step_seconds: parameters.time_step_seconds,
            nr_of_time_steps: parameters.nr_of_time_steps,
            owned_node_ids: parameters.owned_node_ids.clone(),
            graph,
            inputs,
            outputs,
        })
    }

    /// Run id
    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    /// Service instance id
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Human readable run name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start of the simulation
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Step length in seconds
    pub fn time_step_seconds(&self) -> u64 {
        self.time_step_seconds
    }

    /// Number of steps in the run
    pub fn nr_of_time_steps(&self) -> u64 {
        self.nr_of_time_steps
    }

    /// Start of the `offset`-th step interval after the simulation start
    pub fn time_after_steps(&self, offset: u64) -> DateTime<Utc> {
        let seconds = offset.saturating_mul(self.time_step_seconds);
        i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|delta| self.start.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Parsed topology
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Ids of the nodes this instance owns
    pub fn owned_node_ids(&self) -> &[NodeId] {
        &self.owned_node_ids
    }

    /// Nodes this instance owns, in parameter order
    pub fn owned_nodes(&self) -> impl Iterator<Item = &Node> {
        self.owned_node_ids
            .iter()
            .filter_map(|id| self.graph.node(id.as_str()))
    }

    /// Input connectivity of every owned node
    pub fn inputs(&self) -> &IndexMap<NodeId, ConnectivityMap> {
        &self.inputs
    }

    /// Output connectivity of every owned node
    pub fn outputs(&self) -> &IndexMap<NodeId, ConnectivityMap> {
        &self.outputs
    }

    /// Input connectivity of one owned node
    pub fn connected_inputs(&self, node_id: &str) -> Option<&ConnectivityMap> {
        self.inputs.get(node_id)
    }

    /// Output connectivity of one owned node
    pub fn connected_outputs(&self, node_id: &str) -> Option<&ConnectivityMap> {
        self.outputs.get(node_id)
    }

    /// Location of a static profile node
    pub fn profile_uri(&self, id: &str) -> DotsResult<&str> {
        self.graph
            .nodes()
            .find(|node| node.node_type() == URI_PROFILE_TYPE && node.id().as_str() == id)
            .and_then(|node| node.attribute(URI_ATTRIBUTE))
            .and_then(|uri| uri.as_str())
            .ok_or_else(|| DotsError::not_found(id, "no URI profile with this id"))
    }
}

fn start_time(timestamp: f64) -> DotsResult<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return Err(DotsError::Parse(format!("Invalid start timestamp {timestamp}")));
    }
    let seconds = timestamp.floor();
    let nanos = ((timestamp - seconds) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(seconds as i64, nanos)
        .ok_or_else(|| DotsError::Parse(format!("Start timestamp {timestamp} is out of range")))
}
