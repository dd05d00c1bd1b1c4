//! Lifecycle protocol engine
//!
//! The engine owns the pub/sub session of one calculation service instance
//! and drives it through the run lifecycle:
//!
//! ```text
//! Connecting --connect, subscribe, ReadyForProcessing--> AwaitingParameters
//! AwaitingParameters --ModelParameters: setup, subscribe data, Parameterized--> Stepping
//! Stepping --NewStep / data: record, dispatch ready calcs, publish--> Stepping
//! any --SimulationDone or fatal error--> Terminating
//! ```
//!
//! Inbound messages are handled by a bounded pool of workers so a slow
//! calculation never stalls delivery. Which worker dispatches a calculation
//! is decided by the inventory: only the worker whose write made the
//! calculation ready receives its name.
//!
//! Every error raised while handling a message is terminal. The engine
//! reports it as `ErrorOccurred`, closes the session and the run ends with
//! [`RunOutcome::Failed`].

use crate::calc::ServiceCalc;
use crate::dispatcher::Dispatcher;
use crate::log_sink::{LogLevel, LogSink, TracingLogSink};
use crate::timeseries::{NullTimeSeriesSink, TimeSeriesSink};
use crate::transport::{InboundMessage, PubSubTransport, QoS};
use dots_core::{
    Acknowledgement, DataClass, DotsError, DotsResult, InboundTopic, LifecycleKind,
    ModelParameters, TopicScheme,
};
use dots_inventory::DataInventory;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Opening the session
    Connecting,
    /// Announced readiness, waiting for run parameters
    AwaitingParameters,
    /// Set up and processing steps
    Stepping,
    /// Finished or failed; no further messages are processed
    Terminating,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The orchestrator ended the simulation
    Completed,
    /// The run stopped on an error
    Failed {
        /// Report sent to the orchestrator
        message: String,
    },
}

impl RunOutcome {
    /// Whether the run completed normally
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Protocol state machine of one service instance
pub struct ProtocolEngine<C: ServiceCalc> {
    scheme: TopicScheme,
    qos: QoS,
    max_workers: usize,
    transport: Arc<dyn PubSubTransport>,
    inventory: Arc<DataInventory>,
    dispatcher: Arc<Dispatcher<C>>,
    time_series: Arc<dyn TimeSeriesSink>,
    log_sink: Arc<dyn LogSink>,
    state: Mutex<RunState>,
    failure: Mutex<Option<String>>,
}

impl<C: ServiceCalc> ProtocolEngine<C> {
    /// Create an engine in the `Connecting` state
    ///
    /// Sinks default to [`NullTimeSeriesSink`] and [`TracingLogSink`].
    pub fn new(
        scheme: TopicScheme,
        qos: QoS,
        max_workers: usize,
        transport: Arc<dyn PubSubTransport>,
        inventory: Arc<DataInventory>,
        dispatcher: Arc<Dispatcher<C>>,
    ) -> Self {
        Self {
            scheme,
            qos,
            max_workers: max_workers.max(1),
            transport,
            inventory,
            dispatcher,
            time_series: Arc::new(NullTimeSeriesSink),
            log_sink: Arc::new(TracingLogSink),
            state: Mutex::new(RunState::Connecting),
            failure: Mutex::new(None),
        }
    }

    /// Replace the time-series sink
    pub fn with_time_series_sink(mut self, sink: Arc<dyn TimeSeriesSink>) -> Self {
        self.time_series = sink;
        self
    }

    /// Replace the log sink
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Data inventory driven by this engine
    pub fn inventory(&self) -> &Arc<DataInventory> {
        &self.inventory
    }

    /// Drive the session until the simulation ends or fails
    ///
    /// Errors while opening the session are returned directly; errors while
    /// handling messages end the run with [`RunOutcome::Failed`].
    pub async fn run(self: Arc<Self>) -> DotsResult<RunOutcome> {
        let mut inbound = self.transport.connect().await?;
        self.transport
            .subscribe(&self.scheme.lifecycle_subscription(), self.qos)
            .await?;
        self.publish_ack(&Acknowledgement::ReadyForProcessing).await?;
        self.set_state(RunState::AwaitingParameters);
        info!(
            simulation_id = self.scheme.simulation_id(),
            model_id = self.scheme.model_id(),
            transport = self.transport.transport_type(),
            "Ready for processing"
        );

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();
        let mut inbound_open = true;
        loop {
            tokio::select! {
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    self.reap(joined).await;
                }
                message = inbound.recv(), if inbound_open => match message {
                    Some(message) => {
                        let permit = Arc::clone(&permits)
                            .acquire_owned()
                            .await
                            .map_err(|_| DotsError::transport("Worker pool closed"))?;
                        let engine = Arc::clone(&self);
                        workers.spawn(async move {
                            engine.handle(message).await;
                            drop(permit);
                        });
                    }
                    None => inbound_open = false,
                },
                else => break,
            }
        }

        Ok(self.outcome())
    }

    fn outcome(&self) -> RunOutcome {
        if let Some(message) = self.failure.lock().clone() {
            return RunOutcome::Failed { message };
        }
        match self.state() {
            RunState::Terminating => RunOutcome::Completed,
            state => RunOutcome::Failed {
                message: format!("Transport closed before the simulation finished ({state:?})"),
            },
        }
    }

    async fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(err) = joined {
            if err.is_panic() {
                let reason = panic_message(err);
                self.fail(DotsError::protocol(format!("Message worker panicked: {reason}")), None)
                    .await;
            }
        }
    }

    async fn handle(&self, message: InboundMessage) {
        if self.state() == RunState::Terminating {
            debug!(topic = %message.topic, "Ignoring message after termination");
            return;
        }
        if let Err(err) = self.process(&message).await {
            self.fail(err, Some(&message.topic)).await;
        }
    }

    async fn process(&self, message: &InboundMessage) -> DotsResult<()> {
        let topic = InboundTopic::parse(&message.topic)?;
        debug!(topic = %message.topic, bytes = message.payload.len(), "Received message");

        match &topic {
            InboundTopic::Lifecycle(LifecycleKind::SimulationDone) => {
                self.finish(&message.topic).await
            }
            InboundTopic::Lifecycle(LifecycleKind::ModelParameters) => {
                self.parameterize(&message.payload).await
            }
            _ => {
                let (main_topic, class_name) = topic.inventory_key();
                let ready = self.inventory.add(main_topic, class_name, &message.payload)?;
                self.run_ready(ready).await
            }
        }
    }

    async fn parameterize(&self, payload: &[u8]) -> DotsResult<()> {
        let state = self.state();
        if state != RunState::AwaitingParameters {
            return Err(DotsError::protocol(format!(
                "Model parameters received while {state:?}"
            )));
        }

        let parameters = ModelParameters::decode(payload)?;
        info!(
            simulation = %parameters.simulation_name,
            owned = parameters.owned_node_ids.len(),
            steps = parameters.nr_of_time_steps,
            "Received model parameters"
        );

        let connectivity = self.dispatcher.setup(&parameters).await?;
        self.inventory.set_expected(&connectivity)?;
        let expected = self
            .inventory
            .expected()
            .ok_or_else(|| DotsError::protocol("Expected inputs missing after setup"))?;

        for filter in expected.subscriptions(&self.scheme) {
            debug!(filter = %filter, "Subscribing to input data");
            self.transport.subscribe(&filter, self.qos).await?;
        }

        self.set_state(RunState::Stepping);
        self.publish_ack(&Acknowledgement::Parameterized).await?;
        self.log_sink
            .log(
                LogLevel::Info,
                &format!("Parameterized for simulation '{}'", parameters.simulation_name),
            )
            .await;
        Ok(())
    }

    async fn run_ready(&self, ready: Vec<String>) -> DotsResult<()> {
        for calc in ready {
            let inputs = self.inventory.get_input_set(&calc)?;
            let step = inputs.step().time_step_nr;
            let outputs = self.dispatcher.dispatch(&calc, &inputs).await?;

            for (node_id, record) in outputs {
                let topic = self
                    .scheme
                    .data(record.main_topic(), &node_id, record.class_name());
                self.transport.publish(&topic, record.to_payload()?).await?;
                debug!(calc = %calc, topic = %topic, "Published output");
            }

            if self.inventory.mark_done(&calc) {
                self.inventory.reset();
                self.publish_ack(&Acknowledgement::CalculationsDone).await?;
                info!(step, "Calculations done");
            }
        }
        Ok(())
    }

    async fn finish(&self, topic: &str) -> DotsResult<()> {
        if !self.begin_termination() {
            return Ok(());
        }

        let points = self.dispatcher.time_series_points().await;
        if !points.is_empty() {
            if let Err(err) = self.time_series.write(points).await {
                self.report_failure(err, Some(topic)).await;
                return Ok(());
            }
        }

        self.log_sink
            .log(
                LogLevel::Info,
                &format!(
                    "Simulation Orchestrator terminated service {}",
                    self.scheme.model_id()
                ),
            )
            .await;
        self.transport.disconnect().await
    }

    async fn fail(&self, err: DotsError, topic: Option<&str>) {
        if !self.begin_termination() {
            warn!(error = %err, "Error after termination");
            return;
        }
        self.report_failure(err, topic).await;
    }

    /// Publish `ErrorOccurred` and close the session; the caller already moved to `Terminating`
    async fn report_failure(&self, err: DotsError, topic: Option<&str>) {
        let message = failure_report(&err, topic);
        error!(code = err.code(), topic = ?topic, "{err}");
        self.log_sink.log(LogLevel::Error, &message).await;
        *self.failure.lock() = Some(message.clone());

        let ack = Acknowledgement::ErrorOccurred {
            error_message: message,
        };
        if let Err(publish_err) = self.publish_ack(&ack).await {
            warn!(error = %publish_err, "Failed to report error to orchestrator");
        }
        if let Err(disconnect_err) = self.transport.disconnect().await {
            warn!(error = %disconnect_err, "Failed to disconnect");
        }
    }

    async fn publish_ack(&self, ack: &Acknowledgement) -> DotsResult<()> {
        let topic = self.scheme.acknowledgement(ack);
        self.transport.publish(&topic, ack.payload()?).await?;
        debug!(topic = %topic, "Published {}", ack.message_name());
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock();
        if *state != RunState::Terminating {
            debug!(from = ?*state, to = ?next, "Run state transition");
            *state = next;
        }
    }

    /// Move to `Terminating`; `false` if another path already did
    fn begin_termination(&self) -> bool {
        let mut state = self.state.lock();
        if *state == RunState::Terminating {
            return false;
        }
        *state = RunState::Terminating;
        true
    }
}

/// Error report sent to the orchestrator: the error, its code and topic, then its causes
fn failure_report(err: &DotsError, topic: Option<&str>) -> String {
    let mut report = match topic {
        Some(topic) => format!("{err} (code: {}, topic: {topic})", err.code()),
        None => format!("{err} (code: {})", err.code()),
    };
    for cause in err.causes() {
        report.push_str("\ncaused by: ");
        report.push_str(&cause);
    }
    report
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

impl<C: ServiceCalc> fmt::Debug for ProtocolEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("scheme", &self.scheme)
            .field("qos", &self.qos)
            .field("max_workers", &self.max_workers)
            .field("transport", &self.transport.transport_type())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_report_lists_causes_after_context() {
        let err = DotsError::calculation_caused_by("sum_demand", DotsError::codec("demand", "eof"));
        let report = failure_report(&err, Some("/data/input_service/model/sim-1/in-1/demand"));

        let lines: Vec<_> = report.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Calculation 'sum_demand' failed: body returned a codec error \
                 (code: calculation, topic: /data/input_service/model/sim-1/in-1/demand)",
                "caused by: Codec error for 'demand': eof",
            ]
        );
    }

    #[test]
    fn test_failure_report_without_topic_or_causes() {
        let report = failure_report(&DotsError::protocol("late"), None);
        assert_eq!(report, "Protocol violation: late (code: protocol_violation)");
    }

    #[tokio::test]
    async fn test_panic_message_keeps_the_payload() {
        let mut workers = JoinSet::new();
        workers.spawn(async {
            let slots: Vec<u32> = Vec::new();
            assert!(!slots.is_empty(), "slot {} is empty", 3);
        });
        let joined = workers.join_next().await.unwrap();
        assert_eq!(panic_message(joined.unwrap_err()), "slot 3 is empty");
    }
}
