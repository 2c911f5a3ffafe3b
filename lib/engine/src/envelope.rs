//! Versioned envelope for serialized payloads.
//!
//! Everything that crosses a process boundary (run contexts in the KV
//! store, resume jobs on the delay stream) is wrapped in an envelope so
//! the format can evolve without breaking rolling deployments.

use serde::{Deserialize, Serialize};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload at the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns true if this envelope carries the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Deserializes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_with_current_version() {
        let envelope = Envelope::new("hello".to_string());
        assert_eq!(envelope.version, CURRENT_VERSION);
        assert!(envelope.is_current_version());
        assert_eq!(envelope.into_payload(), "hello");
    }

    #[test]
    fn json_round_trip() {
        let envelope = Envelope::new(vec![1u32, 2, 3]);
        let bytes = envelope.to_json_bytes().unwrap();
        let back: Envelope<Vec<u32>> = Envelope::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn stale_version_is_detectable() {
        let bytes = br#"{"version":0,"payload":{}}"#;
        let envelope: Envelope<serde_json::Value> = Envelope::from_json_bytes(bytes).unwrap();
        assert!(!envelope.is_current_version());
    }
}
