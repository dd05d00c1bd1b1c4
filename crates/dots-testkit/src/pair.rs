//! Two calculations in one service instance
//!
//! `count_steps` waits only for the step marker while `sum_demand` waits for
//! every demand, so within a step they usually become ready on different
//! workers. Both bodies stay busy for a moment and count how many bodies were
//! running at the same time.

use crate::calc::SUM_DEMAND;
use crate::records::{Demand, Load, StepCount};
use dots_core::{DotsResult, Record, ServiceName};
use dots_inventory::InputBundle;
use dots_service::{CalcOutput, CalculationFunction, ServiceCalc, StepContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Name of the step counting calculation
pub const COUNT_STEPS: &str = "count_steps";

const BODY_DURATION: Duration = Duration::from_millis(20);

/// Counts body executions and the highest number running at once
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: AtomicUsize,
}

impl ExecutionTracker {
    fn run<T>(&self, body: impl FnOnce() -> T) -> T {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(BODY_DURATION);
        let result = body();
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Highest number of bodies seen running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Completed body executions
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// `test_service` with a summing and a step counting calculation
#[derive(Debug, Clone, Default)]
pub struct PairCalc {
    tracker: Arc<ExecutionTracker>,
}

impl PairCalc {
    /// Create the calculation pair
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker shared by both bodies
    pub fn tracker(&self) -> Arc<ExecutionTracker> {
        Arc::clone(&self.tracker)
    }

    fn sum_demand(
        &mut self,
        context: &mut StepContext<'_>,
        inputs: &InputBundle,
    ) -> DotsResult<CalcOutput> {
        let load = self.tracker.run(|| {
            inputs
                .records::<Demand>()
                .map(|demands| demands.iter().map(|d| d.demand).sum::<f64>())
        })?;
        Ok(per_owned_node(context, || Box::new(Load { load }) as Box<dyn Record>))
    }

    fn count_steps(
        &mut self,
        context: &mut StepContext<'_>,
        inputs: &InputBundle,
    ) -> DotsResult<CalcOutput> {
        let step = self.tracker.run(|| inputs.step().time_step_nr);
        Ok(per_owned_node(context, || {
            Box::new(StepCount::new(step)) as Box<dyn Record>
        }))
    }
}

fn per_owned_node(context: &StepContext<'_>, record: impl Fn() -> Box<dyn Record>) -> CalcOutput {
    let mut output = CalcOutput::new();
    for node_id in context.simulation.owned_node_ids() {
        output.push((node_id.clone(), record()));
    }
    output
}

impl ServiceCalc for PairCalc {
    fn service_name(&self) -> ServiceName {
        ServiceName::from("test_service")
    }

    fn receives_service_names(&self) -> Vec<ServiceName> {
        vec![ServiceName::from("input_service")]
    }

    fn calculation_functions() -> Vec<CalculationFunction<Self>> {
        vec![
            CalculationFunction::new(SUM_DEMAND, Self::sum_demand).input::<Demand>(),
            CalculationFunction::new(COUNT_STEPS, Self::count_steps),
        ]
    }
}
