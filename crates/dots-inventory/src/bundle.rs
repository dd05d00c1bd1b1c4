//! Input sets handed to calculation bodies

use dots_core::{DataClass, DotsError, DotsResult, NewStep, Record};
use indexmap::IndexMap;
use std::sync::Arc;

/// Inputs of one calculation for the current step
///
/// Holds the step marker plus, for every other required class, all records
/// received this step.
#[derive(Debug, Clone)]
pub struct InputBundle {
    step: NewStep,
    inputs: IndexMap<&'static str, Vec<Arc<dyn Record>>>,
}

impl InputBundle {
    pub(crate) fn new(step: NewStep, inputs: IndexMap<&'static str, Vec<Arc<dyn Record>>>) -> Self {
        Self { step, inputs }
    }

    /// Step marker of the current step
    pub fn step(&self) -> &NewStep {
        &self.step
    }

    /// All records of class `T`
    ///
    /// Fails with `TypeMismatch` when `T` is not an input of the calculation
    /// or a stored record is not a `T`.
    pub fn records<T: DataClass>(&self) -> DotsResult<Vec<&T>> {
        let records = self.inputs.get(T::NAME).ok_or_else(|| {
            DotsError::type_mismatch(T::NAME, "class is not an input of this calculation")
        })?;

        records
            .iter()
            .map(|record| {
                record.downcast_ref::<T>().ok_or_else(|| {
                    DotsError::type_mismatch(
                        T::NAME,
                        format!("stored record is of class '{}'", record.class_name()),
                    )
                })
            })
            .collect()
    }

    /// Raw records of a class by name
    pub fn raw(&self, class_name: &str) -> &[Arc<dyn Record>] {
        self.inputs.get(class_name).map_or(&[], Vec::as_slice)
    }

    /// Class names present in the bundle
    pub fn class_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.keys().copied()
    }
}
