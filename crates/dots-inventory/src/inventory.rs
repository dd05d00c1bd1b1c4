//! Data inventory
//!
//! The inventory is the single source of truth for whether a calculation may
//! run in the current step. Every write recomputes readiness inside the same
//! critical section, so a calculation's transition to ready is observed by
//! exactly one caller no matter how many writers race.

use crate::bundle::InputBundle;
use crate::expected::ExpectedTable;
use dots_core::{
    ClassDescriptor, DataClass, DotsError, DotsResult, ModelParameters, NewStep, NodeId, Record,
    ServiceName,
};
use dots_topology::ConnectivityMap;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Input classes each calculation waits on, keyed by calculation name
pub type Requirements = IndexMap<String, Vec<ClassDescriptor>>;

#[derive(Debug, Default)]
struct InventoryState {
    received: HashMap<&'static str, Vec<Arc<dyn Record>>>,
    expected: Option<ExpectedTable>,
    ready: IndexSet<String>,
    done: IndexSet<String>,
}

/// Barrier-synchronization table for one service instance
#[derive(Debug)]
pub struct DataInventory {
    service_name: ServiceName,
    requirements: Requirements,
    state: Mutex<InventoryState>,
}

impl DataInventory {
    /// Create an inventory for the calculations a service registers
    ///
    /// The step marker is added to every calculation's requirements.
    pub fn new(
        service_name: ServiceName,
        requirements: impl IntoIterator<Item = (String, Vec<ClassDescriptor>)>,
    ) -> Self {
        let step = ClassDescriptor::of::<NewStep>();
        let requirements = requirements
            .into_iter()
            .map(|(calc, mut classes)| {
                if !classes.contains(&step) {
                    classes.insert(0, step);
                }
                (calc, classes)
            })
            .collect();

        let inventory = Self {
            service_name,
            requirements,
            state: Mutex::new(InventoryState::default()),
        };
        inventory.reset();
        inventory
    }

    /// Service owning this inventory
    pub fn service_name(&self) -> &ServiceName {
        &self.service_name
    }

    /// Registered calculations and their input classes
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Clear received data and per-step calculation state
    ///
    /// The expected table is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.received.clear();
        for descriptor in self.requirements.values().flatten() {
            state.received.entry(descriptor.name()).or_default();
        }
        state.ready.clear();
        state.done.clear();
        debug!(service = %self.service_name, "Removed all input data");
    }

    /// Set the expected senders from the input connectivity of every owned node
    ///
    /// The table can be set once per run.
    pub fn set_expected(
        &self,
        connectivity: &IndexMap<NodeId, ConnectivityMap>,
    ) -> DotsResult<()> {
        let mut state = self.state.lock();
        if state.expected.is_some() {
            return Err(DotsError::protocol(
                "Model parameters received twice; expected inputs are already set",
            ));
        }

        let table = ExpectedTable::from_connectivity(connectivity.values());
        debug!(service = %self.service_name, expected = ?table, "Set expected input senders");
        state.expected = Some(table);
        Ok(())
    }

    /// Expected table, once set
    pub fn expected(&self) -> Option<ExpectedTable> {
        self.state.lock().expected.clone()
    }

    /// Record an inbound payload and report calculations that became ready
    ///
    /// Only calculations whose barrier was satisfied by this call are
    /// returned. Payloads of classes no calculation waits on are ignored.
    pub fn add(
        &self,
        main_topic: &str,
        class_name: &str,
        payload: &[u8],
    ) -> DotsResult<Vec<String>> {
        let mut state = self.state.lock();

        if state.expected.is_none() && class_name != ModelParameters::NAME {
            return Err(DotsError::protocol(
                "Input data received before model parameters were set",
            ));
        }

        let Some(descriptor) = self.find_class(main_topic, class_name) else {
            debug!(main_topic, class_name, "No data class registered for topic");
            return Ok(Vec::new());
        };

        let record = descriptor.instantiate(payload)?;
        state
            .received
            .entry(descriptor.name())
            .or_default()
            .push(record);
        debug!(service = %self.service_name, class_name, "Added input data");

        Ok(self.newly_ready(&mut state))
    }

    fn find_class(&self, main_topic: &str, class_name: &str) -> Option<&ClassDescriptor> {
        self.requirements
            .values()
            .flatten()
            .find(|descriptor| {
                descriptor.main_topic() == main_topic && descriptor.name() == class_name
            })
    }

    fn newly_ready(&self, state: &mut InventoryState) -> Vec<String> {
        let Some(expected) = state.expected.as_ref() else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        for (calc, classes) in &self.requirements {
            if state.ready.contains(calc) || state.done.contains(calc) {
                continue;
            }
            let satisfied = classes.iter().all(|descriptor| {
                let received = state.received.get(descriptor.name()).map_or(0, Vec::len);
                received >= expected.expected_count(descriptor.main_topic())
            });
            if satisfied {
                ready.push(calc.clone());
            }
        }

        for calc in &ready {
            state.ready.insert(calc.clone());
        }
        ready
    }

    /// Inputs of `calc` for the current step
    pub fn get_input_set(&self, calc: &str) -> DotsResult<InputBundle> {
        let classes = self
            .requirements
            .get(calc)
            .ok_or_else(|| DotsError::protocol(format!("Unknown calculation '{calc}'")))?;
        let state = self.state.lock();

        let marker = state
            .received
            .get(NewStep::NAME)
            .and_then(|records| records.first())
            .ok_or_else(|| DotsError::protocol("No step marker received for the current step"))?;
        let step = marker.downcast_ref::<NewStep>().cloned().ok_or_else(|| {
            DotsError::type_mismatch(
                NewStep::NAME,
                format!("step marker is of class '{}'", marker.class_name()),
            )
        })?;

        let inputs = classes
            .iter()
            .filter(|descriptor| descriptor.name() != NewStep::NAME)
            .map(|descriptor| {
                let records = state
                    .received
                    .get(descriptor.name())
                    .cloned()
                    .unwrap_or_default();
                (descriptor.name(), records)
            })
            .collect();

        Ok(InputBundle::new(step, inputs))
    }

    /// Whether a step marker has arrived for the current step
    pub fn is_step_active(&self) -> bool {
        self.state
            .lock()
            .received
            .get(NewStep::NAME)
            .is_some_and(|records| !records.is_empty())
    }

    /// Mark `calc` as executed for the current step
    ///
    /// Returns `true` when this call completed the step, i.e. it was the
    /// last outstanding calculation.
    pub fn mark_done(&self, calc: &str) -> bool {
        let mut state = self.state.lock();
        let inserted = state.done.insert(calc.to_string());
        inserted && state.done.len() == self.requirements.len()
    }

    /// Whether every registered calculation ran this step
    pub fn all_done(&self) -> bool {
        self.state.lock().done.len() == self.requirements.len()
    }

    /// Number of records of `class_name` received this step
    pub fn received_count(&self, class_name: &str) -> usize {
        self.state.lock().received.get(class_name).map_or(0, Vec::len)
    }
}
