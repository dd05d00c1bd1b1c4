//! Sample calculation
//!
//! `test_service` sums the demand of every connected `input_service` node and
//! publishes the total as [`Load`] for each node it owns.

use crate::records::{Demand, Load};
use dots_core::{DotsError, DotsResult, NodeId, Record, ServiceName};
use dots_inventory::InputBundle;
use dots_service::{
    CalcOutput, CalculationFunction, ServiceCalc, Simulation, StepContext, TimeSeriesOutput,
};
use dots_topology::Node;

/// Name of the summing calculation
pub const SUM_DEMAND: &str = "sum_demand";

/// Measurement of the load time series
pub const LOAD_MEASUREMENT: &str = "Consumer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Error,
    Panic,
}

/// Summing calculation of `test_service`
#[derive(Debug, Clone, Default)]
pub struct SummingCalc {
    fault: Option<(u64, Fault)>,
    processed: Vec<NodeId>,
}

impl SummingCalc {
    /// Calculation that succeeds on every step
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculation that returns an error on `step`
    pub fn failing_at(step: u64) -> Self {
        Self {
            fault: Some((step, Fault::Error)),
            ..Self::default()
        }
    }

    /// Calculation that reads past its inputs and panics on `step`
    pub fn panicking_at(step: u64) -> Self {
        Self {
            fault: Some((step, Fault::Panic)),
            ..Self::default()
        }
    }

    /// Owned nodes seen during setup
    pub fn processed(&self) -> &[NodeId] {
        &self.processed
    }

    fn sum_demand(
        &mut self,
        context: &mut StepContext<'_>,
        inputs: &InputBundle,
    ) -> DotsResult<CalcOutput> {
        let step = inputs.step().time_step_nr;
        let demands = inputs.records::<Demand>()?;
        match self.fault {
            Some((at, Fault::Error)) if at == step => {
                return Err(DotsError::calculation(
                    SUM_DEMAND,
                    format!("Refusing step {step}"),
                ));
            }
            Some((at, Fault::Panic)) if at == step => {
                let _fourth = demands[3].demand;
            }
            _ => {}
        }

        let load: f64 = demands.iter().map(|d| d.demand).sum();

        let mut output = CalcOutput::new();
        for node_id in context.simulation.owned_node_ids() {
            context
                .output
                .set_time_step_data_point(node_id, "load", step, load)?;
            output.push((node_id.clone(), Box::new(Load { load }) as Box<dyn Record>));
        }
        Ok(output)
    }
}

impl ServiceCalc for SummingCalc {
    fn service_name(&self) -> ServiceName {
        ServiceName::from("test_service")
    }

    fn receives_service_names(&self) -> Vec<ServiceName> {
        vec![ServiceName::from("input_service")]
    }

    fn calculation_functions() -> Vec<CalculationFunction<Self>> {
        vec![CalculationFunction::new(SUM_DEMAND, Self::sum_demand).input::<Demand>()]
    }

    fn process_node(&mut self, _simulation: &Simulation, node: &Node) -> DotsResult<()> {
        self.processed.push(node.id().clone());
        Ok(())
    }

    fn setup_time_series_output(
        &mut self,
        simulation: &Simulation,
        output: &mut TimeSeriesOutput,
    ) -> DotsResult<()> {
        output.init_profile_output(
            simulation,
            LOAD_MEASUREMENT,
            simulation.owned_node_ids(),
            &["load"],
        );
        Ok(())
    }
}
