//! Base64 topology decoding

use crate::document::NodeDocument;
use crate::error::TopologyError;
use crate::graph::Graph;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use tracing::debug;

const TOPOLOGY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64 encoded topology document into a [`Graph`]
///
/// Surrounding whitespace is ignored and trailing padding is optional.
pub fn parse(encoded: &str) -> Result<Graph, TopologyError> {
    let bytes = TOPOLOGY_ENGINE
        .decode(encoded.trim())
        .map_err(|e| TopologyError::Encoding(e.to_string()))?;
    let text = std::str::from_utf8(&bytes).map_err(|e| TopologyError::Encoding(e.to_string()))?;
    let document: NodeDocument =
        serde_json::from_str(text).map_err(|e| TopologyError::Document(e.to_string()))?;

    let graph = Graph::from_document(document)?;
    debug!(nodes = graph.len(), root = %graph.root().id(), "Parsed topology");
    Ok(graph)
}

/// Encode a topology document in its wire form
pub fn encode(document: &NodeDocument) -> Result<String, TopologyError> {
    let json = serde_json::to_vec(document).map_err(|e| TopologyError::Document(e.to_string()))?;
    Ok(TOPOLOGY_ENGINE.encode(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PortDocument;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_encoded_document() {
        let doc = NodeDocument::new("es", "EnergySystem").with_child(NodeDocument::asset(
            "hp",
            "HeatPump",
            vec![PortDocument::inbound("hp-in", &[])],
        ));
        let encoded = encode(&doc).unwrap();

        let graph = parse(&encoded).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.node("hp").unwrap().is_connectable());
    }

    #[test]
    fn test_padding_is_optional() {
        let encoded = encode(&NodeDocument::new("es-1", "EnergySystem")).unwrap();
        let unpadded = encoded.trim_end_matches('=');
        assert_ne!(encoded.len(), unpadded.len());
        assert!(parse(unpadded).is_ok());
        assert!(parse(&format!("  {encoded}\n")).is_ok());
    }

    #[test]
    fn test_invalid_base64() {
        assert_matches!(parse("not base64 !!"), Err(TopologyError::Encoding(_)));
    }

    #[test]
    fn test_invalid_document() {
        let encoded = TOPOLOGY_ENGINE.encode(br#"{"name": "no id"}"#);
        assert_matches!(parse(&encoded), Err(TopologyError::Document(_)));
    }
}
