//! Non-interactive zero-knowledge proofs over the shared modulus
//!
//! Two proof kinds, one per protocol step that must convince peers without
//! revealing secrets:
//!
//! - [`Proof::ModulusShare`]: Schnorr proof of knowledge of the exponent
//!   behind a party's biprimality contribution `Q_i = g^{w_i} mod N`.
//! - [`Proof::PartialSignature`]: Chaum-Pedersen equality of discrete logs,
//!   `log_u(u') = log_v(v')`, showing a partial signature was produced with
//!   the party's genuine share against its published verification value.
//!
//! Challenges are Fiat-Shamir: a domain tag, every public statement integer,
//! and every commitment are hashed in a fixed order. Changing that order
//! breaks soundness against replay, so it is documented per proof kind below.
//! The hash function is a deployment parameter, not hardcoded.
//!
//! Verification is a pure function of the proof and the expected public
//! statement. A proof whose embedded statement differs from the caller's is
//! rejected outright, which prevents cross-context reuse.

use num_bigint::BigUint;
use num_traits::One;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256, Sha512};

use crate::error::MpcError;

/// Slack bits added to the nonce range so responses statistically hide the
/// witness (the group order is unknown, so arithmetic is over the integers).
const NONCE_SLACK_BITS: u64 = 128;

/// Hash algorithm used to derive Fiat-Shamir challenges.
///
/// A protocol parameter: all validators of a deployment must agree on it,
/// and it can be rotated at a hardfork for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeHash {
    #[default]
    Sha256,
    Sha512,
}

impl ChallengeHash {
    fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            ChallengeHash::Sha256 => {
                let mut h = Sha256::new();
                for p in parts {
                    h.update(p);
                }
                h.finalize().to_vec()
            }
            ChallengeHash::Sha512 => {
                let mut h = Sha512::new();
                for p in parts {
                    h.update(p);
                }
                h.finalize().to_vec()
            }
        }
    }
}

/// The public statement a proof speaks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `value = base^w mod modulus` for some known `w`.
    ModulusShare {
        modulus: BigUint,
        base: BigUint,
        value: BigUint,
        participant: u32,
    },
    /// `value_u = base_u^w` and `value_v = base_v^w mod modulus` for the
    /// same known `w`.
    PartialSignature {
        modulus: BigUint,
        base_u: BigUint,
        value_u: BigUint,
        base_v: BigUint,
        value_v: BigUint,
        participant: u32,
    },
}

impl Statement {
    pub fn participant(&self) -> u32 {
        match self {
            Statement::ModulusShare { participant, .. } => *participant,
            Statement::PartialSignature { participant, .. } => *participant,
        }
    }

}

/// A tagged non-interactive proof carrying its own public statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    ModulusShare {
        statement: Statement,
        commitment: BigUint,
        challenge: BigUint,
        response: BigUint,
    },
    PartialSignature {
        statement: Statement,
        commitment_u: BigUint,
        commitment_v: BigUint,
        challenge: BigUint,
        response: BigUint,
    },
}

impl Proof {
    /// Prove knowledge of `witness` with `value = base^witness mod modulus`.
    pub fn prove_modulus_share<R: RngCore + CryptoRng>(
        witness: &BigUint,
        statement: Statement,
        hash: ChallengeHash,
        rng: &mut R,
    ) -> Result<Self, MpcError> {
        let (modulus, base) = match &statement {
            Statement::ModulusShare { modulus, base, .. } => (modulus.clone(), base.clone()),
            _ => return Err(MpcError::MalformedProof),
        };
        let r = sample_nonce(&modulus, witness, rng);
        let commitment = base.modpow(&r, &modulus);
        let challenge = challenge_for(hash, &statement, &[&commitment]);
        let response = r + &challenge * witness;
        Ok(Proof::ModulusShare {
            statement,
            commitment,
            challenge,
            response,
        })
    }

    /// Prove `log_{base_u}(value_u) = log_{base_v}(value_v) = witness`.
    pub fn prove_equality<R: RngCore + CryptoRng>(
        witness: &BigUint,
        statement: Statement,
        hash: ChallengeHash,
        rng: &mut R,
    ) -> Result<Self, MpcError> {
        let (modulus, base_u, base_v) = match &statement {
            Statement::PartialSignature {
                modulus,
                base_u,
                base_v,
                ..
            } => (modulus.clone(), base_u.clone(), base_v.clone()),
            _ => return Err(MpcError::MalformedProof),
        };
        let r = sample_nonce(&modulus, witness, rng);
        let commitment_u = base_u.modpow(&r, &modulus);
        let commitment_v = base_v.modpow(&r, &modulus);
        let challenge = challenge_for(hash, &statement, &[&commitment_u, &commitment_v]);
        let response = r + &challenge * witness;
        Ok(Proof::PartialSignature {
            statement,
            commitment_u,
            commitment_v,
            challenge,
            response,
        })
    }

    /// Verify this proof against the statement the caller expects.
    ///
    /// Pure: depends only on the proof and `expected`. A failed proof is a
    /// `false`, never an error — the caller decides whether that aborts the
    /// run or just excludes one participant.
    pub fn verify(&self, expected: &Statement, hash: ChallengeHash) -> bool {
        if self.statement() != expected {
            return false;
        }
        match self {
            Proof::ModulusShare {
                statement,
                commitment,
                challenge,
                response,
            } => {
                let Statement::ModulusShare {
                    modulus,
                    base,
                    value,
                    ..
                } = statement
                else {
                    return false;
                };
                if challenge != &challenge_for(hash, statement, &[commitment]) {
                    return false;
                }
                // g^z ≡ a · y^c (mod N)
                let lhs = base.modpow(response, modulus);
                let rhs = (commitment * value.modpow(challenge, modulus)) % modulus;
                lhs == rhs
            }
            Proof::PartialSignature {
                statement,
                commitment_u,
                commitment_v,
                challenge,
                response,
            } => {
                let Statement::PartialSignature {
                    modulus,
                    base_u,
                    value_u,
                    base_v,
                    value_v,
                    ..
                } = statement
                else {
                    return false;
                };
                if challenge != &challenge_for(hash, statement, &[commitment_u, commitment_v]) {
                    return false;
                }
                // u^z ≡ a · u'^c and v^z ≡ b · v'^c (mod N)
                let lhs_u = base_u.modpow(response, modulus);
                let rhs_u = (commitment_u * value_u.modpow(challenge, modulus)) % modulus;
                let lhs_v = base_v.modpow(response, modulus);
                let rhs_v = (commitment_v * value_v.modpow(challenge, modulus)) % modulus;
                lhs_u == rhs_u && lhs_v == rhs_v
            }
        }
    }

    pub fn statement(&self) -> &Statement {
        match self {
            Proof::ModulusShare { statement, .. } => statement,
            Proof::PartialSignature { statement, .. } => statement,
        }
    }

    /// Serialize for transmission: a kind byte followed by every integer of
    /// the statement and proof, each as a 4-byte big-endian length prefix and
    /// big-endian magnitude.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Proof::ModulusShare {
                statement,
                commitment,
                challenge,
                response,
            } => {
                let Statement::ModulusShare {
                    modulus,
                    base,
                    value,
                    participant,
                } = statement
                else {
                    unreachable!("variant pairing enforced at construction");
                };
                buf.push(0u8);
                buf.extend_from_slice(&participant.to_be_bytes());
                for n in [modulus, base, value, commitment, challenge, response] {
                    push_biguint(&mut buf, n);
                }
            }
            Proof::PartialSignature {
                statement,
                commitment_u,
                commitment_v,
                challenge,
                response,
            } => {
                let Statement::PartialSignature {
                    modulus,
                    base_u,
                    value_u,
                    base_v,
                    value_v,
                    participant,
                } = statement
                else {
                    unreachable!("variant pairing enforced at construction");
                };
                buf.push(1u8);
                buf.extend_from_slice(&participant.to_be_bytes());
                for n in [
                    modulus,
                    base_u,
                    value_u,
                    base_v,
                    value_v,
                    commitment_u,
                    commitment_v,
                    challenge,
                    response,
                ] {
                    push_biguint(&mut buf, n);
                }
            }
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MpcError> {
        let kind = *bytes.first().ok_or(MpcError::MalformedProof)?;
        if bytes.len() < 5 {
            return Err(MpcError::MalformedProof);
        }
        let participant = u32::from_be_bytes(
            bytes[1..5].try_into().map_err(|_| MpcError::MalformedProof)?,
        );
        let mut offset = 5usize;
        match kind {
            0 => {
                let [modulus, base, value, commitment, challenge, response] =
                    read_biguints::<6>(bytes, &mut offset)?;
                Ok(Proof::ModulusShare {
                    statement: Statement::ModulusShare {
                        modulus,
                        base,
                        value,
                        participant,
                    },
                    commitment,
                    challenge,
                    response,
                })
            }
            1 => {
                let [modulus, base_u, value_u, base_v, value_v, commitment_u, commitment_v, challenge, response] =
                    read_biguints::<9>(bytes, &mut offset)?;
                Ok(Proof::PartialSignature {
                    statement: Statement::PartialSignature {
                        modulus,
                        base_u,
                        value_u,
                        base_v,
                        value_v,
                        participant,
                    },
                    commitment_u,
                    commitment_v,
                    challenge,
                    response,
                })
            }
            _ => Err(MpcError::MalformedProof),
        }
    }
}

/// Challenge derivation. Order is fixed: domain tag, participant index,
/// statement integers in declaration order, then commitments in order.
fn challenge_for(hash: ChallengeHash, statement: &Statement, commitments: &[&BigUint]) -> BigUint {
    let mut parts: Vec<Vec<u8>> = Vec::new();
    match statement {
        Statement::ModulusShare {
            modulus,
            base,
            value,
            participant,
        } => {
            parts.push(b"hermes-zkp/modulus-share/v1".to_vec());
            parts.push(participant.to_be_bytes().to_vec());
            for n in [modulus, base, value] {
                parts.push(n.to_bytes_be());
            }
        }
        Statement::PartialSignature {
            modulus,
            base_u,
            value_u,
            base_v,
            value_v,
            participant,
        } => {
            parts.push(b"hermes-zkp/partial-signature/v1".to_vec());
            parts.push(participant.to_be_bytes().to_vec());
            for n in [modulus, base_u, value_u, base_v, value_v] {
                parts.push(n.to_bytes_be());
            }
        }
    }
    for c in commitments {
        parts.push(c.to_bytes_be());
    }
    let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
    BigUint::from_bytes_be(&hash.digest(&refs))
}

fn sample_nonce<R: RngCore + CryptoRng>(
    modulus: &BigUint,
    witness: &BigUint,
    rng: &mut R,
) -> BigUint {
    let bits = modulus.bits().max(witness.bits()) + NONCE_SLACK_BITS;
    crate::integers::pick_in_range(&BigUint::one(), &(BigUint::one() << bits), rng)
}

fn push_biguint(buf: &mut Vec<u8>, n: &BigUint) {
    let bytes = n.to_bytes_be();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(&bytes);
}

fn read_biguints<const K: usize>(bytes: &[u8], offset: &mut usize) -> Result<[BigUint; K], MpcError> {
    let mut out: Vec<BigUint> = Vec::with_capacity(K);
    for _ in 0..K {
        let len_end = offset.checked_add(4).ok_or(MpcError::MalformedProof)?;
        let len_bytes = bytes.get(*offset..len_end).ok_or(MpcError::MalformedProof)?;
        let len_array: [u8; 4] = len_bytes.try_into().map_err(|_| MpcError::MalformedProof)?;
        let len = u32::from_be_bytes(len_array) as usize;
        let end = len_end.checked_add(len).ok_or(MpcError::MalformedProof)?;
        let magnitude = bytes.get(len_end..end).ok_or(MpcError::MalformedProof)?;
        out.push(BigUint::from_bytes_be(magnitude));
        *offset = end;
    }
    out.try_into().map_err(|_| MpcError::MalformedProof)
}
