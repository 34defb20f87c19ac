use std::{
    fmt::{self, Display},
    str::FromStr,
};

use rand::Rng as _;
use sha2::{Digest as _, Sha256};

use crate::{
    traits::P2PNodeId,
    types::{P2PError, P2PResult},
};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimulatorNodeId([u8; 32]);

impl SimulatorNodeId {
    /// Create a deterministic node ID from a string seed
    ///
    /// The bytes are the SHA-256 digest of the seed, so the same seed maps to
    /// the same ID in every process.
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        Self(Sha256::digest(seed.as_bytes()).into())
    }

    /// Create a node ID from raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of this node ID
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Format as short hex string for display (first 5 bytes = 10 hex chars)
    #[must_use]
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..5])
    }

    /// Generate a random node ID
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }
}

impl Display for SimulatorNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SimulatorNodeId {
    type Err = P2PError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| P2PError::InvalidNodeId(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl P2PNodeId for SimulatorNodeId {
    fn from_seed(seed: &str) -> Self {
        Self::from_seed(seed)
    }

    fn from_bytes(bytes: &[u8; 32]) -> P2PResult<Self> {
        Ok(Self(*bytes))
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn fmt_short(&self) -> String {
        self.fmt_short()
    }
}

/// Create a deterministic node ID for testing
#[must_use]
pub fn test_node_id(name: &str) -> SimulatorNodeId {
    SimulatorNodeId::from_seed(name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn test_node_id_deterministic() {
        let id1 = test_node_id("alice");
        let id2 = test_node_id("alice");
        assert_eq!(id1, id2);
    }

    #[test_log::test]
    fn test_node_id_different() {
        let alice = test_node_id("alice");
        let bob = test_node_id("bob");
        assert_ne!(alice, bob);
    }

    #[test_log::test]
    fn test_from_seed_is_stable_digest() {
        // sha256("") is a fixed, well known value
        let id = SimulatorNodeId::from_seed("");
        assert_eq!(
            id.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test_log::test]
    fn test_fmt_short() {
        let id = test_node_id("test");
        let short = id.fmt_short();
        assert_eq!(short.len(), 10); // 5 bytes = 10 hex chars
        assert!(id.to_string().starts_with(&short));
    }

    #[test_log::test]
    fn test_fmt_short_length_for_extreme_bytes() {
        for byte in [0x00, 0x0f, 0xff] {
            let id = SimulatorNodeId::new([byte; 32]);
            assert_eq!(id.fmt_short().len(), 10);
        }
    }

    #[test_log::test]
    fn test_from_bytes_round_trip() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = u8::try_from(i).unwrap() * 7;
        }
        let id = <SimulatorNodeId as P2PNodeId>::from_bytes(&bytes).unwrap();
        assert_eq!(P2PNodeId::as_bytes(&id), &bytes);
    }

    #[test_log::test]
    fn test_parse_display_form() {
        let id = test_node_id("carol");
        let parsed: SimulatorNodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test_log::test]
    fn test_parse_rejects_short_hex() {
        let err = "abcd".parse::<SimulatorNodeId>().unwrap_err();
        assert!(matches!(err, P2PError::InvalidNodeId(_)));
    }

    #[test_log::test]
    fn test_ordering_is_bytewise() {
        let low = SimulatorNodeId::new([0u8; 32]);
        let mut high_bytes = [0u8; 32];
        high_bytes[0] = 1;
        let high = SimulatorNodeId::new(high_bytes);
        assert!(low < high);
    }

    #[test_log::test]
    fn test_generate_produces_distinct_ids() {
        assert_ne!(SimulatorNodeId::generate(), SimulatorNodeId::generate());
    }
}
