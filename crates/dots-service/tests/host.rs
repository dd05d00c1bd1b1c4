//! Calculation host and dispatcher tests

use assert_matches::assert_matches;
use dots_core::topics::LIFECYCLE_MAIN_TOPIC;
use dots_core::{DataClass, DotsError, NewStep, NodeId, ServiceName, TopicScheme};
use dots_inventory::DataInventory;
use dots_service::{CalcHost, Dispatcher, ServiceCalc};
use dots_testkit::*;

fn host() -> CalcHost<SummingCalc> {
    CalcHost::new(SummingCalc::new(), TopicScheme::new(SIMULATION_ID, MODEL_ID))
}

#[test]
fn test_requirements_follow_registration() {
    let requirements = host().requirements();
    assert_eq!(requirements.len(), 1);
    let classes = &requirements[SUM_DEMAND];
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name(), "demand");
}

#[test]
fn test_setup_processes_owned_nodes_and_resolves_inputs() {
    let mut host = host();
    let connectivity = host.setup(&demand_parameters()).unwrap();

    let inputs = &connectivity[OWNED_NODE];
    assert_eq!(
        inputs[&ServiceName::from("input_service")],
        vec![NodeId::from("in-1"), NodeId::from("in-2")]
    );
    assert_eq!(host.calc().processed(), &[NodeId::from(OWNED_NODE)]);
    assert!(host.output().is_initialized());
    assert_eq!(host.simulation().unwrap().nr_of_time_steps(), 2);
}

#[test]
fn test_second_setup_is_protocol_violation() {
    let mut host = host();
    host.setup(&demand_parameters()).unwrap();
    assert_matches!(
        host.setup(&demand_parameters()),
        Err(DotsError::ProtocolViolation(_))
    );
}

#[test]
fn test_unknown_owned_node_fails_setup() {
    let parameters = ParametersBuilder::new(demand_topology())
        .owned(&["missing"])
        .build();
    assert_matches!(host().setup(&parameters), Err(DotsError::NotFound { .. }));
}

#[tokio::test]
async fn test_dispatch_runs_registered_calculation() {
    let calc = SummingCalc::new();
    let host = CalcHost::new(calc.clone(), TopicScheme::new(SIMULATION_ID, MODEL_ID));
    let inventory = DataInventory::new(calc.service_name(), host.requirements());
    let dispatcher = Dispatcher::new(host);

    let connectivity = dispatcher.setup(&demand_parameters()).await.unwrap();
    inventory.set_expected(&connectivity).unwrap();

    let step = NewStep::new(1, START_TIMESTAMP).encode().unwrap();
    assert!(inventory.add(LIFECYCLE_MAIN_TOPIC, "new_step", &step).unwrap().is_empty());

    let demand = Demand::new(4.0).encode().unwrap();
    assert!(inventory.add(Demand::MAIN_TOPIC, "demand", &demand).unwrap().is_empty());
    let ready = inventory.add(Demand::MAIN_TOPIC, "demand", &demand).unwrap();
    assert_eq!(ready, vec![SUM_DEMAND.to_string()]);

    let inputs = inventory.get_input_set(SUM_DEMAND).unwrap();
    let outputs = dispatcher.dispatch(SUM_DEMAND, &inputs).await.unwrap();
    assert_eq!(outputs.len(), 1);
    let (node_id, record) = &outputs[0];
    assert_eq!(node_id.as_str(), OWNED_NODE);
    assert_eq!(record.downcast_ref::<Load>(), Some(&Load { load: 8.0 }));

    assert_matches!(
        dispatcher.dispatch("unknown", &inputs).await,
        Err(DotsError::ProtocolViolation(_))
    );
    assert_eq!(dispatcher.time_series_points().await.len(), 2);
}
