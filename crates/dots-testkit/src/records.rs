//! Sample data classes

use dots_core::record::{decode_json, encode_json};
use dots_core::{DataClass, DotsResult};
use serde::{Deserialize, Serialize};

/// Demand published by `input_service` nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    /// Demand in kW
    pub demand: f64,
}

impl Demand {
    /// Create a demand record
    pub fn new(demand: f64) -> Self {
        Self { demand }
    }
}

impl DataClass for Demand {
    const NAME: &'static str = "demand";
    const MAIN_TOPIC: &'static str = "/data/input_service/model";

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }

    fn variable_description() -> &'static str {
        "{'demand': 'float'}"
    }
}

/// Load published by `test_service`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// Summed demand in kW
    pub load: f64,
}

impl DataClass for Load {
    const NAME: &'static str = "load";
    const MAIN_TOPIC: &'static str = "/data/test_service/model";

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }
}

/// Step number echoed by the `count_steps` calculation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCount {
    /// 1-based step number
    pub step: u64,
}

impl StepCount {
    /// Create a step count record
    pub fn new(step: u64) -> Self {
        Self { step }
    }
}

impl DataClass for StepCount {
    const NAME: &'static str = "step_count";
    const MAIN_TOPIC: &'static str = "/data/test_service/model";

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }
}
