//! Block structure and signature validation.
//!
//! A header commits to its parent, height, timestamp and transaction merkle
//! root through a fixed canonical encoding; the block hash and every
//! signature are computed over that encoding, so any field change breaks
//! both.

use k256::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use hermes_mpc::ValidatorId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: [u8; 32],
    pub height: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub merkle_root: [u8; 32],
}

impl BlockHeader {
    /// Canonical byte encoding, fixed field order, big-endian integers.
    /// Signatures and the block hash are both computed over this.
    pub fn canonical_bytes(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[..32].copy_from_slice(&self.parent);
        out[32..40].copy_from_slice(&self.height.to_be_bytes());
        out[40..48].copy_from_slice(&self.timestamp.to_be_bytes());
        out[48..80].copy_from_slice(&self.merkle_root);
        out
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"hermes-block/v1");
        hasher.update(self.canonical_bytes());
        hasher.finalize().into()
    }

    /// Structural sanity independent of any signature. A non-genesis header
    /// must name a parent and carry a timestamp.
    pub fn is_well_formed(&self) -> bool {
        if self.height > 0 && self.parent == [0u8; 32] {
            return false;
        }
        self.timestamp > 0
    }
}

/// A block is final only once it carries a valid signature from the
/// expected signer for its height; until then `signer`/`signature` are
/// absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub signer: Option<ValidatorId>,
    pub signature: Option<Signature>,
}

impl Block {
    pub fn unsigned(header: BlockHeader) -> Self {
        Self {
            header,
            signer: None,
            signature: None,
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        self.header.hash()
    }
}

/// What validation concluded about a block. Invalidity is expected,
/// recoverable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Valid,
    InvalidSignature,
    WrongSigner,
    MalformedHeader,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            parent: [7u8; 32],
            height: 10,
            timestamp: 1_700_000_000_000,
            merkle_root: [9u8; 32],
        }
    }

    #[test]
    fn test_canonical_bytes_field_order() {
        let h = header();
        let bytes = h.canonical_bytes();
        assert_eq!(&bytes[..32], &[7u8; 32]);
        assert_eq!(&bytes[32..40], &10u64.to_be_bytes());
        assert_eq!(&bytes[48..], &[9u8; 32]);
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let h = header();
        let mut h2 = header();
        h2.timestamp += 1;
        assert_ne!(h.hash(), h2.hash());

        let mut h3 = header();
        h3.merkle_root[0] ^= 1;
        assert_ne!(h.hash(), h3.hash());
    }

    #[test]
    fn test_well_formedness() {
        assert!(header().is_well_formed());

        let mut orphan = header();
        orphan.parent = [0u8; 32];
        assert!(!orphan.is_well_formed());

        let genesis = BlockHeader {
            parent: [0u8; 32],
            height: 0,
            timestamp: 1,
            merkle_root: [0u8; 32],
        };
        assert!(genesis.is_well_formed());

        let mut no_time = header();
        no_time.timestamp = 0;
        assert!(!no_time.is_well_formed());
    }
}
