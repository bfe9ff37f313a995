//! Participants and immutable protocol state
//!
//! [`ValidatorSet`] is the ordered committee for one epoch: compressed public
//! keys mapped to contiguous indices starting at 0, each with an integer
//! voting weight. [`ProtocolSnapshot`] is the per-run protocol state as an
//! immutable value: every accepted transition produces a new snapshot, and a
//! snapshot's private parameters are bound (by set fingerprint) to the
//! validator set they were generated over.

use core::fmt;

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

use crate::bgw::ShareParams;
use crate::error::MpcError;

/// A validator identity: a 33-byte compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorId(pub [u8; 33]);

impl fmt::Debug for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Ordered validator committee, fixed for an epoch.
///
/// A validator's index is its position in the construction order, so indices
/// are unique and contiguous from 0 by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    keys: Vec<ValidatorId>,
    weights: Vec<u64>,
}

impl ValidatorSet {
    /// Equal-weight committee.
    pub fn new(keys: Vec<ValidatorId>) -> Result<Self, MpcError> {
        let weights = vec![1; keys.len()];
        Self::with_weights(keys, weights)
    }

    pub fn with_weights(keys: Vec<ValidatorId>, weights: Vec<u64>) -> Result<Self, MpcError> {
        if keys.is_empty() {
            return Err(MpcError::EmptyShareSet);
        }
        debug_assert_eq!(keys.len(), weights.len());
        let mut seen = keys.clone();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(MpcError::InconsistentState(
                "duplicate validator key in set".into(),
            ));
        }
        Ok(Self { keys, weights })
    }

    pub fn index_of(&self, key: &ValidatorId) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn key_at(&self, index: usize) -> Option<&ValidatorId> {
        self.keys.get(index)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn weight_of(&self, index: usize) -> u64 {
        self.weights.get(index).copied().unwrap_or(0)
    }

    pub fn total_weight(&self) -> u128 {
        self.weights.iter().map(|&w| w as u128).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ValidatorId)> {
        self.keys.iter().enumerate()
    }

    /// Committee restricted to the given indices (exclusion after a failed
    /// proof). Order, and therefore relative priority, is preserved.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, MpcError> {
        let mut keys = Vec::with_capacity(indices.len());
        let mut weights = Vec::with_capacity(indices.len());
        for &i in indices {
            let key = self
                .keys
                .get(i)
                .ok_or_else(|| MpcError::InconsistentState(format!("no validator at index {i}")))?;
            keys.push(*key);
            weights.push(self.weights[i]);
        }
        Self::with_weights(keys, weights)
    }

    /// Digest binding the exact membership, order, and weights of this set.
    /// Private share parameters carry it so a snapshot can refuse parameters
    /// generated over a different committee.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(b"hermes/validator-set/v1");
        h.update((self.keys.len() as u32).to_be_bytes());
        for (key, weight) in self.keys.iter().zip(&self.weights) {
            h.update(key.0);
            h.update(weight.to_be_bytes());
        }
        h.finalize().into()
    }
}

/// Immutable per-run protocol state.
///
/// Created empty at protocol start, advanced once per accepted round, and
/// discarded when the run completes or aborts. Never mutated in place.
#[derive(Debug, Clone)]
pub struct ProtocolSnapshot {
    validators: ValidatorSet,
    modulus: Option<BigUint>,
    private: Option<ShareParams>,
}

impl ProtocolSnapshot {
    /// Fresh snapshot with all protocol fields absent.
    pub fn init(validators: ValidatorSet) -> Self {
        Self {
            validators,
            modulus: None,
            private: None,
        }
    }

    /// Accept a candidate modulus together with the private parameters it
    /// was computed from. Pure: returns a new snapshot.
    ///
    /// Rejects parameters whose set fingerprint does not match this
    /// snapshot's validator set — private parameters must never be paired
    /// with a modulus from a different committee.
    pub fn advance(&self, candidate: BigUint, private: ShareParams) -> Result<Self, MpcError> {
        if private.set_fingerprint() != self.validators.fingerprint() {
            return Err(MpcError::InconsistentState(
                "share parameters were generated over a different validator set".into(),
            ));
        }
        Ok(Self {
            validators: self.validators.clone(),
            modulus: Some(candidate),
            private: Some(private),
        })
    }

    /// Start over with a rotated committee. Protocol fields are cleared:
    /// a candidate and its private parameters are only meaningful for the
    /// run, and the set, they were computed over.
    pub fn with_participants(&self, validators: ValidatorSet) -> Self {
        Self::init(validators)
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn modulus(&self) -> Option<&BigUint> {
        self.modulus.as_ref()
    }

    pub fn private(&self) -> Option<&ShareParams> {
        self.private.as_ref()
    }
}
