//! Serialized working-state snapshots.

use sha2::{Digest, Sha256};

/// An opaque, serialized snapshot of a [`PipelineContext`].
///
/// [`PipelineContext`]: super::PipelineContext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    bytes: Vec<u8>,
}

impl ContextSnapshot {
    /// Wraps serialized bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the serialized bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the snapshot, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the snapshot holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex-encoded sha256 of the bytes.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let a = ContextSnapshot::from_bytes(b"{\"a\":1}".to_vec());
        let b = ContextSnapshot::from_bytes(b"{\"a\":1}".to_vec());
        let c = ContextSnapshot::from_bytes(b"{\"a\":2}".to_vec());

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_len_and_empty() {
        let empty = ContextSnapshot::from_bytes(Vec::new());
        assert!(empty.is_empty());

        let snap = ContextSnapshot::from_bytes(vec![1, 2, 3]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.into_bytes(), vec![1, 2, 3]);
    }
}
