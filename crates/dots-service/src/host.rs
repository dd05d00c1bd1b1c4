//! Calculation host
//!
//! Owns the concrete calculation, its registration table and everything
//! produced during setup.

use crate::calc::{CalcOutput, CalculationFunction, ServiceCalc, StepContext};
use crate::simulation::Simulation;
use crate::timeseries::{DataPoint, TimeSeriesOutput};
use dots_core::{DotsError, DotsResult, ModelParameters, NodeId, TopicScheme};
use dots_inventory::{InputBundle, Requirements};
use dots_topology::ConnectivityMap;
use indexmap::IndexMap;
use tracing::{debug, info};

/// A calculation together with its run context
pub struct CalcHost<C: ServiceCalc> {
    calc: C,
    functions: Vec<CalculationFunction<C>>,
    scheme: TopicScheme,
    simulation: Option<Simulation>,
    output: TimeSeriesOutput,
}

impl<C: ServiceCalc> CalcHost<C> {
    /// Host `calc` for one service instance
    pub fn new(calc: C, scheme: TopicScheme) -> Self {
        Self {
            calc,
            functions: C::calculation_functions(),
            scheme,
            simulation: None,
            output: TimeSeriesOutput::new(),
        }
    }

    /// Input classes per calculation, as registered
    pub fn requirements(&self) -> Requirements {
        self.functions
            .iter()
            .map(|function| (function.name().to_string(), function.inputs().to_vec()))
            .collect()
    }

    /// Hosted calculation
    pub fn calc(&self) -> &C {
        &self.calc
    }

    /// Simulation context, once set up
    pub fn simulation(&self) -> Option<&Simulation> {
        self.simulation.as_ref()
    }

    /// Time-series collector
    pub fn output(&self) -> &TimeSeriesOutput {
        &self.output
    }

    /// Run setup for the run parameters
    ///
    /// Returns the input connectivity of every owned node. Setup runs once per
    /// run; a second call is a protocol violation.
    pub fn setup(
        &mut self,
        parameters: &ModelParameters,
    ) -> DotsResult<IndexMap<NodeId, ConnectivityMap>> {
        if self.simulation.is_some() {
            return Err(DotsError::protocol("Model parameters received twice"));
        }

        let receives = self.calc.receives_service_names();
        let simulation = Simulation::from_parameters(&self.scheme, parameters, receives)?;

        self.calc.base_setup(&simulation)?;
        for node in simulation.owned_nodes() {
            debug!(node_id = %node.id(), node_type = node.node_type(), "Processing owned node");
            self.calc.process_node(&simulation, node)?;
        }
        self.calc.setup_time_series_output(&simulation, &mut self.output)?;

        info!(
            service = %self.calc.service_name(),
            simulation = simulation.name(),
            owned = simulation.owned_node_ids().len(),
            steps = simulation.nr_of_time_steps(),
            "Calculation service set up"
        );

        let inputs = simulation.inputs().clone();
        self.simulation = Some(simulation);
        Ok(inputs)
    }

    /// Run one registered calculation on its inputs
    pub fn run_calculation(&mut self, name: &str, inputs: &InputBundle) -> DotsResult<CalcOutput> {
        let simulation = self
            .simulation
            .as_ref()
            .ok_or_else(|| DotsError::protocol("Calculation requested before setup"))?;
        let function = self
            .functions
            .iter()
            .find(|function| function.name() == name)
            .ok_or_else(|| DotsError::protocol(format!("Unknown calculation '{name}'")))?;

        let mut context = StepContext {
            simulation,
            output: &mut self.output,
        };
        function
            .call(&mut self.calc, &mut context, inputs)
            .map_err(|err| match err {
                err @ (DotsError::Calculation { .. }
                | DotsError::ProtocolViolation(_)
                | DotsError::TypeMismatch { .. }) => err,
                other => DotsError::calculation_caused_by(name, other),
            })
    }

    /// Time-series points collected so far
    pub fn time_series_points(&self) -> Vec<DataPoint> {
        self.output.to_points()
    }
}

impl<C: ServiceCalc> std::fmt::Debug for CalcHost<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalcHost")
            .field("service", &self.calc.service_name())
            .field("functions", &self.functions)
            .field("set_up", &self.simulation.is_some())
            .finish()
    }
}
