//! # DOTS Topology - Connectivity Resolution
//!
//! Parses the shared topology every calculation service receives with its
//! run parameters and answers, for each node a service owns, two questions:
//!
//! - which services (and which of their nodes) feed this node input, and
//! - which services (and nodes) this node feeds output to.
//!
//! ## Model
//!
//! The topology is a tree of nodes (the root plus nested `contents`). Nodes
//! that declare ports are *connectable assets*; ports are directional and
//! link to ports of other assets, forming the adjacency graph. Nodes without
//! ports are informational objects and are visible to every asset.

pub mod document;
pub mod error;
pub mod graph;
pub mod parser;
pub mod resolver;

pub use document::{NodeDocument, PortDocument};
pub use error::TopologyError;
pub use graph::{Graph, Node, Port, PortDirection};
pub use parser::{encode, parse};
pub use resolver::{find_node, ConnectivityMap, TopologyResolver};
