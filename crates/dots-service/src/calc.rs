//! Calculation capability
//!
//! A concrete calculation service implements [`ServiceCalc`]. The generic
//! core only talks to it through the callbacks below:
//!
//! - `calculation_functions` is the static registration table: calculation
//!   name, the data classes it waits on each step, and the function to run
//! - `base_setup` runs once after the topology is parsed
//! - `process_node` runs once for every owned node
//! - `setup_time_series_output` prepares the time-series collector
//!
//! ```rust,ignore
//! impl ServiceCalc for BatteryCalc {
//!     fn calculation_functions() -> Vec<CalculationFunction<Self>> {
//!         vec![
//!             CalculationFunction::new("pre_battery", Self::pre_battery)
//!                 .input::<Load>()
//!                 .input::<PvOutput>(),
//!         ]
//!     }
//!     // ...
//! }
//! ```

use crate::simulation::Simulation;
use crate::timeseries::TimeSeriesOutput;
use dots_core::{ClassDescriptor, DataClass, DotsResult, NodeId, Record, ServiceName};
use dots_inventory::InputBundle;
use dots_topology::Node;
use std::fmt;

/// Records a calculation publishes, one per (node, record) pair
pub type CalcOutput = Vec<(NodeId, Box<dyn Record>)>;

/// Signature of a calculation body
pub type CalcFn<C> = fn(&mut C, &mut StepContext<'_>, &InputBundle) -> DotsResult<CalcOutput>;

/// Run state visible to a calculation body
pub struct StepContext<'a> {
    /// Parsed run parameters and connectivity
    pub simulation: &'a Simulation,
    /// Time-series collector
    pub output: &'a mut TimeSeriesOutput,
}

/// Registration entry of one calculation
pub struct CalculationFunction<C> {
    name: String,
    inputs: Vec<ClassDescriptor>,
    run: CalcFn<C>,
}

impl<C> CalculationFunction<C> {
    /// Register `run` under `name` with no data inputs
    ///
    /// The step marker is always an input and need not be listed.
    pub fn new(name: impl Into<String>, run: CalcFn<C>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            run,
        }
    }

    /// Add a data class the calculation waits on
    pub fn input<T: DataClass + Default>(mut self) -> Self {
        self.inputs.push(ClassDescriptor::of::<T>());
        self
    }

    /// Calculation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared input classes
    pub fn inputs(&self) -> &[ClassDescriptor] {
        &self.inputs
    }

    pub(crate) fn call(
        &self,
        calc: &mut C,
        context: &mut StepContext<'_>,
        inputs: &InputBundle,
    ) -> DotsResult<CalcOutput> {
        (self.run)(calc, context, inputs)
    }
}

impl<C> fmt::Debug for CalculationFunction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculationFunction")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// Capability implemented by a concrete calculation service
pub trait ServiceCalc: Send + 'static {
    /// Name of this service
    fn service_name(&self) -> ServiceName;

    /// Services whose output this service consumes
    fn receives_service_names(&self) -> Vec<ServiceName>;

    /// Static registration table of calculations
    fn calculation_functions() -> Vec<CalculationFunction<Self>>
    where
        Self: Sized;

    /// Runs once after the topology is parsed, before any node is processed
    fn base_setup(&mut self, _simulation: &Simulation) -> DotsResult<()> {
        Ok(())
    }

    /// Runs once for every owned node
    fn process_node(&mut self, _simulation: &Simulation, _node: &Node) -> DotsResult<()> {
        Ok(())
    }

    /// Declares time-series outputs; runs at the end of setup
    fn setup_time_series_output(
        &mut self,
        _simulation: &Simulation,
        _output: &mut TimeSeriesOutput,
    ) -> DotsResult<()> {
        Ok(())
    }
}
