//! Topology errors

use dots_core::{DotsError, NodeId};

/// Errors raised while parsing or querying a topology
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The topology string is not valid base64 or UTF-8
    #[error("Invalid encoded topology: {0}")]
    Encoding(String),

    /// The decoded document does not match the topology schema
    #[error("Invalid topology document: {0}")]
    Document(String),

    /// Two nodes share an id
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(NodeId),

    /// Two ports share an id
    #[error("Duplicate port id '{0}'")]
    DuplicatePort(String),

    /// A port links to a port that does not exist
    #[error("Port '{port}' is connected to unknown port '{target}'")]
    DanglingConnection {
        /// Port declaring the connection
        port: String,
        /// Missing target port
        target: String,
    },

    /// A node id is absent from the topology
    #[error("Node '{0}' not found in provided topology")]
    NotFound(NodeId),
}

impl From<TopologyError> for DotsError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::NotFound(node_id) => {
                DotsError::not_found(node_id, "not present in provided topology")
            }
            other => DotsError::Parse(other.to_string()),
        }
    }
}
