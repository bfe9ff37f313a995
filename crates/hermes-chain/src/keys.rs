//! Validator key pairs over secp256k1.
//!
//! The public key is always derived from the private scalar on demand, so
//! the two can never drift apart.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::CryptoRngCore;

use hermes_mpc::ValidatorId;

#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        Self {
            signing: SigningKey::random(rng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, k256::ecdsa::Error> {
        Ok(Self {
            signing: SigningKey::from_slice(bytes)?,
        })
    }

    pub fn public(&self) -> VerifyingKey {
        *self.signing.verifying_key()
    }

    /// Compressed SEC1 encoding of the public key, the identity validators
    /// are indexed by.
    pub fn validator_id(&self) -> ValidatorId {
        let sec1 = self.public().to_sec1_bytes();
        let mut id = [0u8; 33];
        id.copy_from_slice(&sec1);
        ValidatorId(id)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // private scalar stays out of logs
        write!(f, "KeyPair({})", self.validator_id())
    }
}

/// Check a signature against a validator identity. False for identities
/// that do not decode to a curve point.
pub fn verify_with_id(id: &ValidatorId, message: &[u8], signature: &Signature) -> bool {
    match VerifyingKey::from_sec1_bytes(&id.0) {
        Ok(key) => key.verify(message, signature).is_ok(),
        Err(_) => false,
    }
}
