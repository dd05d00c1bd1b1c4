//! DOTS Testing Infrastructure
//!
//! Shared fixtures for the workspace's integration tests: sample data
//! classes, a summing calculation, a demand topology with matching run
//! parameters, and a scripted orchestrator on top of the in-memory broker.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dots_testkit::*;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let broker = MemoryBroker::new();
//!     let orchestrator = FakeOrchestrator::new(broker.clone());
//!     let service = summing_service(&broker);
//!     // ... drive the run through `orchestrator`
//! }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod calc;
pub mod fixtures;
pub mod orchestrator;
pub mod pair;
pub mod records;

pub use calc::{SummingCalc, LOAD_MEASUREMENT, SUM_DEMAND};
pub use fixtures::*;
pub use orchestrator::FakeOrchestrator;
pub use pair::{ExecutionTracker, PairCalc, COUNT_STEPS};
pub use records::{Demand, Load, StepCount};

pub use dots_service::{MemoryBroker, RunOutcome};
