//! Service assembly
//!
//! Wires a concrete calculation to the generic core: inventory from the
//! static registration table, dispatcher, protocol engine and sinks.
//!
//! ```rust,ignore
//! let config = ServiceConfig::load(None)?;
//! telemetry::init_from_config(&config)?;
//! let service = CalculationService::new(config, BatteryCalc::default(), transport)?;
//! match service.run().await? {
//!     RunOutcome::Completed => {}
//!     RunOutcome::Failed { message } => eprintln!("{message}"),
//! }
//! ```

use crate::calc::ServiceCalc;
use crate::dispatcher::Dispatcher;
use crate::engine::{ProtocolEngine, RunOutcome};
use crate::host::CalcHost;
use crate::log_sink::{LogSink, TransportLogSink};
use crate::timeseries::{NullTimeSeriesSink, TimeSeriesSink};
use crate::transport::{PubSubTransport, QoS};
use dots_core::{DotsResult, ServiceConfig, TopicScheme};
use dots_inventory::DataInventory;
use std::sync::Arc;
use tracing::info;

/// One calculation service instance, ready to run
pub struct CalculationService<C: ServiceCalc> {
    config: ServiceConfig,
    calc: C,
    transport: Arc<dyn PubSubTransport>,
    time_series: Arc<dyn TimeSeriesSink>,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl<C: ServiceCalc> CalculationService<C> {
    /// Create a service; the configuration is validated
    pub fn new(
        config: ServiceConfig,
        calc: C,
        transport: Arc<dyn PubSubTransport>,
    ) -> DotsResult<Self> {
        config.validate()?;
        QoS::from_level(config.mqtt_qos)?;
        Ok(Self {
            config,
            calc,
            transport,
            time_series: Arc::new(NullTimeSeriesSink),
            log_sink: None,
        })
    }

    /// Write time-series output to `sink` when the simulation ends
    pub fn with_time_series_sink(mut self, sink: Arc<dyn TimeSeriesSink>) -> Self {
        self.time_series = sink;
        self
    }

    /// Replace the default log sink, which publishes on the instance's log topic
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Configuration of this instance
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run until the orchestrator ends the simulation or an error stops it
    pub async fn run(self) -> DotsResult<RunOutcome> {
        let scheme = TopicScheme::new(&self.config.simulation_id, &self.config.model_id);
        let qos = QoS::from_level(self.config.mqtt_qos)?;
        let service_name = self.calc.service_name();

        let host = CalcHost::new(self.calc, scheme.clone());
        let inventory = Arc::new(DataInventory::new(service_name.clone(), host.requirements()));
        let dispatcher = Arc::new(Dispatcher::new(host));

        let log_sink = self.log_sink.unwrap_or_else(|| {
            Arc::new(TransportLogSink::new(
                Arc::clone(&self.transport),
                scheme.log(),
                service_name.to_string(),
            ))
        });

        info!(
            service = %service_name,
            simulation_id = %self.config.simulation_id,
            model_id = %self.config.model_id,
            calculations = inventory.requirements().len(),
            "Starting calculation service"
        );

        let engine = ProtocolEngine::new(
            scheme,
            qos,
            self.config.max_workers,
            self.transport,
            inventory,
            dispatcher,
        )
        .with_time_series_sink(self.time_series)
        .with_log_sink(log_sink);

        let outcome = Arc::new(engine).run().await?;
        info!(service = %service_name, outcome = ?outcome, "Calculation service stopped");
        Ok(outcome)
    }
}

impl<C: ServiceCalc> std::fmt::Debug for CalculationService<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationService")
            .field("service", &self.calc.service_name())
            .field("config", &self.config)
            .field("transport", &self.transport.transport_type())
            .finish()
    }
}
