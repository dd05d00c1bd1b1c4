//! Calculation dispatcher
//!
//! Every access to the hosted calculation goes through one run-scoped lock:
//! at most one calculation body (or setup) executes at a time no matter how
//! many message workers are active. The guard is dropped on every exit path,
//! including errors.

use crate::calc::{CalcOutput, ServiceCalc};
use crate::host::CalcHost;
use crate::timeseries::DataPoint;
use dots_core::{DotsResult, ModelParameters, NodeId};
use dots_inventory::{InputBundle, Requirements};
use dots_topology::ConnectivityMap;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Serialises setup and calculation bodies of one service instance
#[derive(Debug)]
pub struct Dispatcher<C: ServiceCalc> {
    host: Mutex<CalcHost<C>>,
    requirements: Requirements,
}

impl<C: ServiceCalc> Dispatcher<C> {
    /// Wrap a calculation host
    pub fn new(host: CalcHost<C>) -> Self {
        let requirements = host.requirements();
        Self {
            host: Mutex::new(host),
            requirements,
        }
    }

    /// Registered calculations and their input classes
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Run setup; returns the input connectivity of every owned node
    pub async fn setup(
        &self,
        parameters: &ModelParameters,
    ) -> DotsResult<IndexMap<NodeId, ConnectivityMap>> {
        let mut host = self.host.lock().await;
        host.setup(parameters)
    }

    /// Execute one calculation body under the lock
    pub async fn dispatch(&self, calc: &str, inputs: &InputBundle) -> DotsResult<CalcOutput> {
        let mut host = self.host.lock().await;
        debug!(calc, step = inputs.step().time_step_nr, "Running calculation");
        host.run_calculation(calc, inputs)
    }

    /// Time-series points collected so far
    pub async fn time_series_points(&self) -> Vec<DataPoint> {
        self.host.lock().await.time_series_points()
    }
}
