//! # DOTS Service - Protocol Engine and Dispatcher
//!
//! Drives one calculation service instance through a simulation run:
//!
//! - **Transport**: the pub/sub seam and an in-memory broker
//! - **Calc**: the capability a concrete calculation implements
//! - **Host / Dispatcher**: setup and mutually exclusive calculation bodies
//! - **Engine**: lifecycle state machine and bounded message workers
//! - **Sinks**: remote log lines and time-series output
//! - **Service**: assembly of all of the above from a `ServiceConfig`

pub mod calc;
pub mod dispatcher;
pub mod engine;
pub mod host;
pub mod log_sink;
pub mod service;
pub mod simulation;
pub mod telemetry;
pub mod timeseries;
pub mod transport;

pub use calc::{CalcOutput, CalculationFunction, ServiceCalc, StepContext};
pub use dispatcher::Dispatcher;
pub use engine::{ProtocolEngine, RunOutcome, RunState};
pub use host::CalcHost;
pub use log_sink::{LogLevel, LogSink, TracingLogSink, TransportLogSink};
pub use service::CalculationService;
pub use simulation::Simulation;
pub use timeseries::{
    DataPoint, MemoryTimeSeriesSink, NullTimeSeriesSink, TimeSeriesOutput, TimeSeriesSink,
};
pub use transport::{InboundMessage, MemoryBroker, MemoryTransport, PubSubTransport, QoS};
