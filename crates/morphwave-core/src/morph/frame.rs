//! Content frames produced by external generators.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// An externally produced content payload
///
/// Carries the fixed-length parameter vector (the DNA vector) consumed by
/// the renderer's parameter mapper, plus a reference to the generated
/// asset backing this frame. Frames are immutable once accepted;
/// ownership transfers to the scheduler on enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFrame {
    /// Parameter vector consumed by the renderer/mapper
    pub dna: Vec<f32>,
    /// Reference to the generated asset backing this frame
    pub asset: String,
}

impl ContentFrame {
    /// Create a frame, rejecting structurally empty payloads
    pub fn new(dna: Vec<f32>, asset: impl Into<String>) -> Result<Self> {
        let asset = asset.into();
        if dna.is_empty() {
            return Err(CoreError::InvalidFrame("empty DNA vector".into()));
        }
        if asset.is_empty() {
            return Err(CoreError::InvalidFrame("missing asset reference".into()));
        }
        Ok(Self { dna, asset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_payloads() {
        assert!(ContentFrame::new(vec![], "asset://a").is_err());
        assert!(ContentFrame::new(vec![0.5; 64], "").is_err());
        assert!(ContentFrame::new(vec![0.5; 64], "asset://a").is_ok());
    }

    #[test]
    fn test_deserializes_from_producer_payload() {
        // Frames arrive from generation backends as JSON
        let json = r#"{"dna": [0.1, 0.2, 0.3], "asset": "asset://gen/42"}"#;
        let frame: ContentFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.dna.len(), 3);
        assert_eq!(frame.asset, "asset://gen/42");
    }
}
