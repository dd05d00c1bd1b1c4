//! Error taxonomy for DOTS calculation services
//!
//! Every error raised while handling a message is terminal for the run: the
//! protocol engine logs it, reports it upstream as an `ErrorOccurred`
//! lifecycle message and closes the session. The variants therefore describe
//! *what* went wrong precisely enough for an operator reading that report.

use crate::identifiers::NodeId;

/// Unified error type for the calculation-service core
#[derive(Debug, thiserror::Error)]
pub enum DotsError {
    /// A message arrived that the lifecycle does not allow at this point
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A node id could not be resolved in the topology
    #[error("Node '{node_id}' not found: {context}")]
    NotFound {
        /// The unresolved node id
        node_id: NodeId,
        /// Where the lookup happened
        context: String,
    },

    /// A required input slot held a record of the wrong class
    #[error("Type mismatch for '{class}': {reason}")]
    TypeMismatch {
        /// Class name of the slot
        class: String,
        /// What was found instead
        reason: String,
    },

    /// Connect, subscribe or publish failed in the transport collaborator
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The serialized topology could not be decoded
    #[error("Failed to parse topology: {0}")]
    Parse(String),

    /// A payload could not be encoded or decoded
    #[error("Codec error for '{class}': {reason}")]
    Codec {
        /// Class name being encoded or decoded
        class: String,
        /// Underlying codec message
        reason: String,
    },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A calculation body reported a failure
    #[error("Calculation '{calc}' failed: {reason}")]
    Calculation {
        /// Calculation name
        calc: String,
        /// Failure reported by the body
        reason: String,
        /// Error the body propagated, if any
        #[source]
        source: Option<Box<DotsError>>,
    },

    /// The time-series sink rejected a write
    #[error("Time-series sink error: {0}")]
    Sink(String),
}

/// Result alias used throughout the workspace
pub type DotsResult<T> = Result<T, DotsError>;

impl DotsError {
    /// Create a protocol violation
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Create a not-found error for a node id
    pub fn not_found(node_id: impl Into<NodeId>, context: impl Into<String>) -> Self {
        Self::NotFound {
            node_id: node_id.into(),
            context: context.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport failure
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure(message.into())
    }

    /// Create a codec error
    pub fn codec(class: impl Into<String>, reason: impl ToString) -> Self {
        Self::Codec {
            class: class.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a calculation failure
    pub fn calculation(calc: impl Into<String>, reason: impl ToString) -> Self {
        Self::Calculation {
            calc: calc.into(),
            reason: reason.to_string(),
            source: None,
        }
    }

    /// Create a calculation failure caused by an error the body propagated
    pub fn calculation_caused_by(calc: impl Into<String>, cause: DotsError) -> Self {
        Self::Calculation {
            calc: calc.into(),
            reason: format!("body returned a {} error", cause.code()),
            source: Some(Box::new(cause)),
        }
    }

    /// Messages of the source chain, outermost cause first
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = std::error::Error::source(cause);
        }
        causes
    }

    /// Stable short code for logs and assertions
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NotFound { .. } => "not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::TransportFailure(_) => "transport_failure",
            Self::Parse(_) => "parse",
            Self::Codec { .. } => "codec",
            Self::Config(_) => "config",
            Self::Calculation { .. } => "calculation",
            Self::Sink(_) => "sink",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_codes_are_unique() {
        let errors = vec![
            DotsError::protocol("x"),
            DotsError::not_found("n", "x"),
            DotsError::type_mismatch("c", "x"),
            DotsError::transport("x"),
            DotsError::Parse("x".to_string()),
            DotsError::codec("c", "x"),
            DotsError::config("x"),
            DotsError::calculation("c", "x"),
            DotsError::Sink("x".to_string()),
        ];

        let codes: HashSet<_> = errors.iter().map(DotsError::code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_not_found_message_names_node() {
        let err = DotsError::not_found("asset-9", "owned node lookup");
        assert_eq!(
            err.to_string(),
            "Node 'asset-9' not found: owned node lookup"
        );
    }

    #[test]
    fn test_causes_walk_the_source_chain() {
        let codec = DotsError::codec("demand", "eof");
        let err = DotsError::calculation_caused_by("sum", codec);
        assert_eq!(err.code(), "calculation");
        assert_eq!(
            err.to_string(),
            "Calculation 'sum' failed: body returned a codec error"
        );
        assert_eq!(err.causes(), vec!["Codec error for 'demand': eof".to_string()]);
        assert!(DotsError::calculation("sum", "x").causes().is_empty());
    }
}
