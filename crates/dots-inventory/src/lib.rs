//! # DOTS Inventory - Step Barrier
//!
//! Tracks, per simulation step, which inputs a service's calculations have
//! received and decides when each calculation may run.
//!
//! - [`ExpectedTable`]: how many records each main topic delivers per step,
//!   derived once from the resolved input connectivity
//! - [`DataInventory`]: received records, ready and done calculations
//! - [`InputBundle`]: the inputs handed to one calculation body

pub mod bundle;
pub mod expected;
pub mod inventory;

pub use bundle::InputBundle;
pub use expected::ExpectedTable;
pub use inventory::{DataInventory, Requirements};
