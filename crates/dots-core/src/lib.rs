//! # DOTS Core - Shared Vocabulary
//!
//! Foundation types shared by every layer of a DOTS calculation service:
//!
//! - **Identifiers**: `NodeId` and `ServiceName` newtypes
//! - **Errors**: the `DotsError` taxonomy used for fail-stop reporting
//! - **Records**: the `DataClass` capability contract and `ClassDescriptor`
//!   registration entries consumed by the data inventory
//! - **Messages**: lifecycle payloads exchanged with the simulation orchestrator
//! - **Topics**: the lifecycle and data topic grammar
//! - **Config**: service configuration loading and validation
//!
//! This crate has no coordination logic of its own.

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod messages;
pub mod record;
pub mod topics;

pub use config::ServiceConfig;
pub use errors::{DotsError, DotsResult};
pub use identifiers::{NodeId, ServiceName};
pub use messages::{
    Acknowledgement, CalculationServiceDescription, LifecycleKind, ModelParameters, NewStep,
};
pub use record::{ClassDescriptor, DataClass, Record};
pub use topics::{InboundTopic, TopicScheme};
