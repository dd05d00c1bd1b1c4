//! Property tests for step readiness

use dots_core::record::{decode_json, encode_json};
use dots_core::topics::LIFECYCLE_MAIN_TOPIC;
use dots_core::{ClassDescriptor, DataClass, DotsResult, NewStep, NodeId, ServiceName};
use dots_inventory::DataInventory;
use dots_topology::ConnectivityMap;
use indexmap::IndexMap;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Alpha {
    value: f64,
}

impl DataClass for Alpha {
    const NAME: &'static str = "alpha";
    const MAIN_TOPIC: &'static str = "/data/alpha_service/model";

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Beta {
    value: f64,
}

impl DataClass for Beta {
    const NAME: &'static str = "beta";
    const MAIN_TOPIC: &'static str = "/data/beta_service/model";

    fn encode(&self) -> DotsResult<Vec<u8>> {
        encode_json(Self::NAME, self)
    }

    fn decode(payload: &[u8]) -> DotsResult<Self> {
        decode_json(Self::NAME, payload)
    }
}

#[derive(Debug, Clone, Copy)]
enum Arrival {
    Step,
    Alpha,
    Beta,
}

impl Arrival {
    fn deliver(self, inventory: &DataInventory) -> Vec<String> {
        let result = match self {
            Arrival::Step => inventory.add(LIFECYCLE_MAIN_TOPIC, NewStep::NAME, b""),
            Arrival::Alpha => inventory.add(Alpha::MAIN_TOPIC, Alpha::NAME, b""),
            Arrival::Beta => inventory.add(Beta::MAIN_TOPIC, Beta::NAME, b""),
        };
        result.unwrap()
    }
}

fn arrival() -> impl Strategy<Value = Arrival> {
    prop_oneof![Just(Arrival::Step), Just(Arrival::Alpha), Just(Arrival::Beta)]
}

/// Two alpha senders and one beta sender
fn inventory() -> DataInventory {
    let inventory = DataInventory::new(
        ServiceName::from("test_service"),
        [
            (
                "both".to_string(),
                vec![ClassDescriptor::of::<Alpha>(), ClassDescriptor::of::<Beta>()],
            ),
            ("alpha_only".to_string(), vec![ClassDescriptor::of::<Alpha>()]),
        ],
    );

    let mut inputs = ConnectivityMap::new();
    inputs.insert(
        ServiceName::from("alpha_service"),
        vec![NodeId::from("a-1"), NodeId::from("a-2")],
    );
    inputs.insert(ServiceName::from("beta_service"), vec![NodeId::from("b-1")]);
    inventory
        .set_expected(&IndexMap::from([(NodeId::from("own"), inputs)]))
        .unwrap();
    inventory
}

proptest! {
    #[test]
    fn test_calc_becomes_ready_at_most_once(arrivals in prop::collection::vec(arrival(), 0..40)) {
        let inventory = inventory();
        let mut seen = HashSet::new();

        for arrival in arrivals {
            for calc in arrival.deliver(&inventory) {
                prop_assert!(seen.insert(calc.clone()), "'{}' reported ready twice", calc);
            }
        }
    }

    #[test]
    fn test_readiness_is_order_independent(order in Just(vec![
        Arrival::Step, Arrival::Alpha, Arrival::Alpha, Arrival::Beta,
    ]).prop_shuffle()) {
        let inventory = inventory();
        let mut alpha = 0;
        let mut beta = 0;
        let mut step = false;
        let mut both_ready_at = None;

        for (position, arrival) in order.iter().enumerate() {
            match arrival {
                Arrival::Step => step = true,
                Arrival::Alpha => alpha += 1,
                Arrival::Beta => beta += 1,
            }
            let ready = arrival.deliver(&inventory);
            if ready.iter().any(|calc| calc == "both") {
                prop_assert!(step && alpha == 2 && beta == 1);
                both_ready_at = Some(position);
            }
        }

        prop_assert_eq!(both_ready_at, Some(3));
    }
}

#[test]
fn test_reset_restarts_the_barrier() {
    let inventory = inventory();
    for arrival in [Arrival::Step, Arrival::Alpha, Arrival::Alpha] {
        arrival.deliver(&inventory);
    }
    assert!(!inventory.mark_done("alpha_only"));

    inventory.reset();
    assert!(Arrival::Alpha.deliver(&inventory).is_empty());
    assert!(Arrival::Alpha.deliver(&inventory).is_empty());
    assert_eq!(Arrival::Step.deliver(&inventory), vec!["alpha_only".to_string()]);
}
