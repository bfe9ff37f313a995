//! Threshold key/signature engine
//!
//! Coordinates distributed generation of a shared RSA modulus and threshold
//! signing under the resulting key. The engine drives every party of a run;
//! the transport that would carry rounds between real nodes is an external
//! collaborator. Secrecy boundaries are the types: [`ThresholdKey`] carries
//! no share, and a [`SigningShare`] never leaves its party.
//!
//! Signing follows Shoup's RSA threshold scheme: the private exponent is
//! Shamir-shared, partials are `x^{2Δd_i}`, each with a Chaum-Pedersen proof
//! against the party's verification value, and Δ-scaled integer Lagrange
//! coefficients plus one Bezout step combine at least `t` proven partials
//! into an ordinary RSA signature.

use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::One;
use rand_core::{CryptoRng, RngCore};
use rayon::prelude::*;
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::bgw::{self, ShareParams};
use crate::biprime::{self, BiprimalityRun};
use crate::error::MpcError;
use crate::integers;
use crate::party::{ProtocolSnapshot, ValidatorSet};
use crate::zkp::{ChallengeHash, Proof, Statement};

/// Tunables for one key-generation session.
#[derive(Debug, Clone)]
pub struct KeygenParams {
    /// Bit width of each party's additive prime contribution.
    pub contribution_bits: u64,
    /// Biprimality rounds a candidate must survive.
    pub biprimality_rounds: u32,
    /// Candidates to try before giving up on the session.
    pub retry_budget: u32,
    /// Fiat-Shamir hash for all proofs of the session.
    pub challenge_hash: ChallengeHash,
    /// RSA public exponent.
    pub public_exponent: u32,
}

impl Default for KeygenParams {
    fn default() -> Self {
        Self {
            contribution_bits: 512,
            biprimality_rounds: biprime::DEFAULT_ROUNDS,
            retry_budget: 100_000,
            challenge_hash: ChallengeHash::Sha256,
            public_exponent: 65_537,
        }
    }
}

/// Public output of a completed key generation. Contains no party's share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdKey {
    pub modulus: BigUint,
    pub public_exponent: BigUint,
    /// Verification base `v`, a square mod N.
    pub verification_base: BigUint,
    /// `(party index, v^{d_i})` for every share holder.
    pub verification_values: Vec<(u32, BigUint)>,
    pub threshold: u32,
    /// Share-holder count at derivation time; fixes Δ = group_size!.
    pub group_size: u32,
}

impl ThresholdKey {
    pub fn verification_value(&self, index: u32) -> Option<&BigUint> {
        self.verification_values
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, v)| v)
    }
}

/// One party's share of the private exponent. The share bytes are wiped
/// when the value is dropped and never appear in debug output.
#[derive(Clone)]
pub struct SigningShare {
    index: u32,
    value: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for SigningShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningShare")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl SigningShare {
    pub fn new(index: u32, value: BigUint) -> Result<Self, MpcError> {
        if index == 0 {
            return Err(MpcError::InvalidIndex);
        }
        Ok(Self {
            index,
            value: Zeroizing::new(value.to_bytes_be()),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn exponent(&self) -> BigUint {
        BigUint::from_bytes_be(&self.value)
    }
}

/// Everything a completed run hands back to the caller.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub key: ThresholdKey,
    /// Shares in party order; each belongs to exactly one validator.
    pub shares: Vec<SigningShare>,
    /// Validator-set positions excluded for failed proofs.
    pub excluded: Vec<usize>,
}

/// A candidate modulus as reported by one party's reconstruction.
///
/// When retries put several candidates in flight, all validators must settle
/// on the same one; priority is `(round, origin index)` ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateModulus {
    pub round: u32,
    pub origin: u32,
    pub value: BigUint,
}

/// Deterministic tie-break over concurrent candidates.
pub fn select_candidate(candidates: &[CandidateModulus]) -> Result<&CandidateModulus, MpcError> {
    candidates.iter().min().ok_or(MpcError::EmptyShareSet)
}

/// Identifies the hash a signature commits to ("scheme" from the chain's
/// point of view; the key itself fixes the arithmetic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    RsaSha256,
    RsaSha512,
}

/// One party's partial signature with its correctness proof.
#[derive(Debug, Clone)]
pub struct PartialSignature {
    pub index: u32,
    pub value: BigUint,
    pub proof: Proof,
}

/// A combined threshold signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSignature {
    pub value: BigUint,
    pub scheme: SignatureScheme,
}

/// One key-generation run over a validator committee.
pub struct KeygenSession {
    snapshot: ProtocolSnapshot,
    threshold: u32,
    params: KeygenParams,
    /// Validator-set positions whose proofs are corrupted before
    /// verification, to exercise the exclusion path.
    #[cfg(test)]
    misbehaving: Vec<usize>,
}

impl KeygenSession {
    pub fn new(
        validators: ValidatorSet,
        threshold: u32,
        params: KeygenParams,
    ) -> Result<Self, MpcError> {
        if threshold == 0 || threshold as usize > validators.len() {
            return Err(MpcError::InsufficientParticipants {
                remaining: validators.len(),
                threshold,
            });
        }
        Ok(Self {
            snapshot: ProtocolSnapshot::init(validators),
            threshold,
            params,
            #[cfg(test)]
            misbehaving: Vec::new(),
        })
    }

    /// Mark validator-set positions as misbehaving for this run.
    #[cfg(test)]
    fn with_misbehaving(mut self, positions: Vec<usize>) -> Self {
        self.misbehaving = positions;
        self
    }

    /// Run the full protocol: sample, share, reconstruct, test, prove,
    /// derive. Repeated calls produce independent keys; no in-flight state
    /// survives across calls.
    pub fn generate<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<GeneratedKey, MpcError> {
        let full_set = self.snapshot.validators().clone();
        let mut live: Vec<usize> = (0..full_set.len()).collect();
        let mut excluded: Vec<usize> = Vec::new();
        let mut attempts = 0u32;

        'candidate: while attempts < self.params.retry_budget {
            attempts += 1;

            if (live.len() as u32) < self.threshold {
                return Err(MpcError::InsufficientParticipants {
                    remaining: live.len(),
                    threshold: self.threshold,
                });
            }
            let set = full_set.subset(&live)?;
            let k = set.len() as u32;

            // (a) every party samples fresh private material
            let params: Vec<ShareParams> = (1..=k)
                .map(|i| ShareParams::sample(i, &set, self.params.contribution_bits, rng))
                .collect::<Result<_, MpcError>>()?;

            // (b) BGW sharing over a public prime field
            let field = bgw::field_prime(set.len(), self.params.contribution_bits, rng);
            let degree = bgw::privacy_degree(set.len());
            let dealt: Vec<_> = params.iter().map(|p| p.deal(&field, degree, rng)).collect();

            // (c) each party reconstructs and reports a candidate; settle on
            // one by fixed priority
            let points: Vec<(u32, BigUint)> = (1..=k)
                .map(|j| {
                    let received: Vec<_> = dealt.iter().map(|d| d.share_for(j)).collect();
                    Ok((j, bgw::product_point(&received, &field)?))
                })
                .collect::<Result<_, MpcError>>()?;
            let candidates: Vec<CandidateModulus> = points
                .iter()
                .map(|(origin, _)| {
                    Ok(CandidateModulus {
                        round: attempts,
                        origin: *origin,
                        value: bgw::reconstruct_modulus(&points, &field)?,
                    })
                })
                .collect::<Result<_, MpcError>>()?;
            let n = select_candidate(&candidates)?.value.clone();

            // (d) distributed biprimality test
            let mut run = BiprimalityRun::start(n.clone(), self.params.biprimality_rounds);
            while !run.accepted() {
                let g = run.base();
                for p in &params {
                    let e = biprime::contribution_exponent(p, &n)?;
                    run = run.with_contribution(p.index(), biprime::contribution(&g, &e, &n));
                }
                if !run.verdict()? {
                    debug!(attempt = attempts, round = run.round(), "candidate failed biprimality");
                    continue 'candidate;
                }
                run = run.next_round();
            }

            // (e) every party proves its round-0 contribution well-formed;
            // failures exclude the party and restart with fresh samples
            let g0 = biprime::round_base(&n, 0);
            let proofs: Vec<(u32, Statement, Proof)> = params
                .iter()
                .map(|p| {
                    let witness = biprime::contribution_exponent(p, &n)?;
                    let statement = Statement::ModulusShare {
                        modulus: n.clone(),
                        base: g0.clone(),
                        value: biprime::contribution(&g0, &witness, &n),
                        participant: p.index(),
                    };
                    let proof = Proof::prove_modulus_share(
                        &witness,
                        statement.clone(),
                        self.params.challenge_hash,
                        rng,
                    )?;
                    #[cfg(test)]
                    let proof = if self.misbehaving.contains(&live[(p.index() - 1) as usize]) {
                        corrupt(proof)
                    } else {
                        proof
                    };
                    Ok((p.index(), statement, proof))
                })
                .collect::<Result<_, MpcError>>()?;

            let failed: Vec<u32> = proofs
                .par_iter()
                .filter(|(_, statement, proof)| !proof.verify(statement, self.params.challenge_hash))
                .map(|(i, _, _)| *i)
                .collect();
            if !failed.is_empty() {
                for i in &failed {
                    let position = live[(*i - 1) as usize];
                    warn!(position, "excluding participant after failed proof");
                    excluded.push(position);
                }
                live.retain(|pos| !excluded.contains(pos));
                continue 'candidate;
            }

            // every party's snapshot advances onto the accepted candidate;
            // the fingerprint check catches any cross-set mixup
            for p in &params {
                ProtocolSnapshot::init(set.clone()).advance(n.clone(), p.clone())?;
            }

            // (f) derive the shared exponent and per-party shares
            match self.derive(&n, &params, k, rng) {
                Ok((key, shares)) => {
                    info!(
                        attempts,
                        participants = k,
                        modulus_bits = n.bits(),
                        "threshold key generated"
                    );
                    return Ok(GeneratedKey {
                        key,
                        shares,
                        excluded,
                    });
                }
                Err(MpcError::BadPublicExponent) => continue 'candidate,
                Err(e) => return Err(e),
            }
        }

        Err(MpcError::RetriesExhausted { attempts })
    }

    /// Shoup key derivation: `d = e⁻¹ mod φ(N)` Shamir-shared at degree
    /// `t−1`, with verification values `v_i = v^{d_i}` published.
    fn derive<R: RngCore + CryptoRng>(
        &self,
        n: &BigUint,
        params: &[ShareParams],
        k: u32,
        rng: &mut R,
    ) -> Result<(ThresholdKey, Vec<SigningShare>), MpcError> {
        let p_sum: BigUint = params.iter().map(|p| p.p_contrib()).sum();
        let q_sum: BigUint = params.iter().map(|p| p.q_contrib()).sum();
        let phi = (&p_sum - 1u32) * (&q_sum - 1u32);

        let e = BigUint::from(self.params.public_exponent);
        let d = integers::mod_inverse(&e, &phi).ok_or(MpcError::BadPublicExponent)?;

        let poly = bgw::FieldPoly::share(&d, self.threshold - 1, &phi, rng);
        let shares: Vec<SigningShare> = (1..=k)
            .map(|i| SigningShare::new(i, poly.eval(i)))
            .collect::<Result<_, MpcError>>()?;

        // v: a random square with gcd(v, N) = 1
        let v = loop {
            let r = integers::pick_in_range(&BigUint::from(2u32), &(n - 2u32), rng);
            if r.gcd(n).is_one() {
                break (&r * &r) % n;
            }
        };
        let verification_values = shares
            .iter()
            .map(|s| (s.index, v.modpow(&s.exponent(), n)))
            .collect();

        Ok((
            ThresholdKey {
                modulus: n.clone(),
                public_exponent: e,
                verification_base: v,
                verification_values,
                threshold: self.threshold,
                group_size: k,
            },
            shares,
        ))
    }
}

/// Hash `data` to an invertible representative mod N.
///
/// The counter loop only matters for toy moduli; for real parameters a
/// non-invertible hash would factor N.
pub fn message_representative(scheme: SignatureScheme, data: &[u8], n: &BigUint) -> BigUint {
    let mut counter = 0u32;
    loop {
        let digest = match scheme {
            SignatureScheme::RsaSha256 => {
                let mut h = Sha256::new();
                h.update(b"hermes/threshold-sign/v1");
                h.update(counter.to_be_bytes());
                h.update(data);
                h.finalize().to_vec()
            }
            SignatureScheme::RsaSha512 => {
                let mut h = Sha512::new();
                h.update(b"hermes/threshold-sign/v1");
                h.update(counter.to_be_bytes());
                h.update(data);
                h.finalize().to_vec()
            }
        };
        let x = BigUint::from_bytes_be(&digest) % n;
        if x > BigUint::one() && x.gcd(n).is_one() {
            return x;
        }
        counter += 1;
    }
}

/// Produce one party's partial signature `x^{2Δd_i}` with its proof.
pub fn partial_sign<R: RngCore + CryptoRng>(
    key: &ThresholdKey,
    share: &SigningShare,
    scheme: SignatureScheme,
    data: &[u8],
    hash: ChallengeHash,
    rng: &mut R,
) -> Result<PartialSignature, MpcError> {
    let n = &key.modulus;
    let x = message_representative(scheme, data, n);
    let delta = integers::factorial(key.group_size);

    let d_i = share.exponent();
    let value = x.modpow(&(BigUint::from(2u32) * &delta * &d_i), n);
    let statement = partial_statement(key, share.index, &x, &value)?;
    let proof = Proof::prove_equality(&d_i, statement, hash, rng)?;

    Ok(PartialSignature {
        index: share.index,
        value,
        proof,
    })
}

/// The public statement a partial signature must prove:
/// `log_{x^{4Δ}}(x_i²) = log_v(v_i)` with the shared witness `d_i`.
fn partial_statement(
    key: &ThresholdKey,
    index: u32,
    x: &BigUint,
    partial: &BigUint,
) -> Result<Statement, MpcError> {
    let n = &key.modulus;
    let delta = integers::factorial(key.group_size);
    let v_i = key
        .verification_value(index)
        .ok_or(MpcError::InvalidIndex)?;
    Ok(Statement::PartialSignature {
        modulus: n.clone(),
        base_u: x.modpow(&(BigUint::from(4u32) * &delta), n),
        value_u: (partial * partial) % n,
        base_v: key.verification_base.clone(),
        value_v: v_i.clone(),
        participant: index,
    })
}

/// Verify partials (in parallel — they are independent pure checks over
/// already-received data), then combine at least `threshold` proven partials
/// into an RSA signature.
pub fn combine(
    key: &ThresholdKey,
    scheme: SignatureScheme,
    data: &[u8],
    partials: &[PartialSignature],
    hash: ChallengeHash,
) -> Result<ThresholdSignature, MpcError> {
    let n = &key.modulus;
    let x = message_representative(scheme, data, n);

    let mut valid: Vec<&PartialSignature> = partials
        .par_iter()
        .filter(|p| {
            partial_statement(key, p.index, &x, &p.value)
                .map(|expected| p.proof.verify(&expected, hash))
                .unwrap_or(false)
        })
        .collect();
    valid.sort_by_key(|p| p.index);
    valid.dedup_by_key(|p| p.index);

    if (valid.len() as u32) < key.threshold {
        return Err(MpcError::ThresholdNotMet {
            verified: valid.len(),
            threshold: key.threshold,
        });
    }
    let chosen = &valid[..key.threshold as usize];

    // w = Π x_i^{2λ'_i} = x^{4Δ²d}
    let indices: Vec<u32> = chosen.iter().map(|p| p.index).collect();
    let lambdas = integers::delta_lagrange_at_zero(&indices, key.group_size)?;
    let mut w = BigUint::one();
    for (partial, lambda) in chosen.iter().zip(&lambdas) {
        w = (w * integers::modpow_signed(&partial.value, &(lambda * 2), n)?) % n;
    }

    // Bezout: a·4Δ² + b·e = 1, then s = w^a · x^b
    let delta = BigInt::from(integers::factorial(key.group_size));
    let four_delta_sq = BigInt::from(4) * &delta * &delta;
    let e = BigInt::from(key.public_exponent.clone());
    let ext = four_delta_sq.extended_gcd(&e);
    if !ext.gcd.is_one() {
        return Err(MpcError::BadPublicExponent);
    }
    let s = (integers::modpow_signed(&w, &ext.x, n)? * integers::modpow_signed(&x, &ext.y, n)?) % n;

    let signature = ThresholdSignature { value: s, scheme };
    if !verify_signature(key, scheme, data, &signature) {
        // proven partials that fail to combine mean inconsistent key material
        return Err(MpcError::InconsistentState(
            "combined signature failed verification".into(),
        ));
    }
    Ok(signature)
}

/// Ordinary RSA verification of a combined signature.
pub fn verify_signature(
    key: &ThresholdKey,
    scheme: SignatureScheme,
    data: &[u8],
    signature: &ThresholdSignature,
) -> bool {
    if signature.scheme != scheme {
        return false;
    }
    let x = message_representative(scheme, data, &key.modulus);
    signature.value.modpow(&key.public_exponent, &key.modulus) == x
}

/// Drive one full signing round: every supplied share produces a proven
/// partial, and the proven partials are combined once the threshold is met.
pub fn sign_data<R: RngCore + CryptoRng>(
    key: &ThresholdKey,
    shares: &[SigningShare],
    scheme: SignatureScheme,
    data: &[u8],
    hash: ChallengeHash,
    rng: &mut R,
) -> Result<ThresholdSignature, MpcError> {
    let partials: Vec<PartialSignature> = shares
        .iter()
        .map(|s| partial_sign(key, s, scheme, data, hash, rng))
        .collect::<Result<_, MpcError>>()?;
    combine(key, scheme, data, &partials, hash)
}

#[cfg(test)]
fn corrupt(proof: Proof) -> Proof {
    match proof {
        Proof::ModulusShare {
            statement,
            commitment,
            challenge,
            response,
        } => Proof::ModulusShare {
            statement,
            commitment,
            challenge,
            response: response + 1u32,
        },
        Proof::PartialSignature {
            statement,
            commitment_u,
            commitment_v,
            challenge,
            response,
        } => Proof::PartialSignature {
            statement,
            commitment_u,
            commitment_v,
            challenge,
            response: response + 1u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::ValidatorId;
    use rand::rngs::OsRng;

    fn committee(n: u8) -> ValidatorSet {
        let keys = (0..n)
            .map(|i| {
                let mut k = [0u8; 33];
                k[0] = 0x02;
                k[32] = i + 1;
                ValidatorId(k)
            })
            .collect();
        ValidatorSet::new(keys).unwrap()
    }

    fn test_params() -> KeygenParams {
        KeygenParams {
            contribution_bits: 12,
            biprimality_rounds: 24,
            retry_budget: 100_000,
            ..KeygenParams::default()
        }
    }

    #[test]
    fn test_keygen_three_parties() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params()).unwrap();
        let generated = session.generate(&mut rng).unwrap();

        assert!(generated.excluded.is_empty());
        assert_eq!(generated.shares.len(), 3);
        assert_eq!(generated.key.threshold, 2);
        assert_eq!(generated.key.group_size, 3);
        // key exposes no share material, only verification values
        assert_eq!(generated.key.verification_values.len(), 3);
    }

    #[test]
    fn test_keygen_excludes_misbehaving_party_and_succeeds() {
        // 3 parties, threshold 2: one bad proof is excluded and the two
        // verified contributions still carry the run
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params())
            .unwrap()
            .with_misbehaving(vec![2]);
        let generated = session.generate(&mut rng).unwrap();

        assert_eq!(generated.excluded, vec![2]);
        assert_eq!(generated.shares.len(), 2);
        assert_eq!(generated.key.group_size, 2);

        // the surviving committee can sign
        let sig = sign_data(
            &generated.key,
            &generated.shares,
            SignatureScheme::RsaSha256,
            b"post-exclusion signing",
            ChallengeHash::Sha256,
            &mut rng,
        )
        .unwrap();
        assert!(verify_signature(
            &generated.key,
            SignatureScheme::RsaSha256,
            b"post-exclusion signing",
            &sig
        ));
    }

    #[test]
    fn test_share_index_must_be_positive() {
        assert_eq!(
            SigningShare::new(0, BigUint::from(7u32)).err(),
            Some(MpcError::InvalidIndex)
        );
    }

    #[test]
    fn test_share_debug_hides_exponent() {
        let share = SigningShare::new(3, BigUint::from(123_456_789u32)).unwrap();
        let rendered = format!("{share:?}");
        assert!(!rendered.contains("value"));
        assert!(!rendered.contains("123456789"));
        assert!(rendered.contains("index: 3"));
    }

    #[test]
    fn test_narrow_contribution_width_is_typed_error() {
        let mut rng = OsRng;
        let params = KeygenParams {
            contribution_bits: 2,
            ..test_params()
        };
        let session = KeygenSession::new(committee(3), 2, params).unwrap();
        assert_eq!(
            session.generate(&mut rng).err(),
            Some(MpcError::ContributionTooNarrow(2))
        );
    }

    #[test]
    fn test_keygen_aborts_below_threshold() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 3, test_params())
            .unwrap()
            .with_misbehaving(vec![0]);
        assert!(matches!(
            session.generate(&mut rng),
            Err(MpcError::InsufficientParticipants { remaining: 2, threshold: 3 })
        ));
    }

    #[test]
    fn test_repeated_generation_yields_independent_keys() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params()).unwrap();
        let a = session.generate(&mut rng).unwrap();
        let b = session.generate(&mut rng).unwrap();
        assert_ne!(a.key.modulus, b.key.modulus);
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params()).unwrap();
        let generated = session.generate(&mut rng).unwrap();

        let data = b"block 10 agreement";
        let sig = sign_data(
            &generated.key,
            &generated.shares,
            SignatureScheme::RsaSha256,
            data,
            ChallengeHash::Sha256,
            &mut rng,
        )
        .unwrap();
        assert!(verify_signature(
            &generated.key,
            SignatureScheme::RsaSha256,
            data,
            &sig
        ));
        // a different message must not verify
        assert!(!verify_signature(
            &generated.key,
            SignatureScheme::RsaSha256,
            b"block 11 agreement",
            &sig
        ));
    }

    #[test]
    fn test_signing_below_threshold_fails() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 3, test_params()).unwrap();
        let generated = session.generate(&mut rng).unwrap();

        let result = sign_data(
            &generated.key,
            &generated.shares[..2],
            SignatureScheme::RsaSha256,
            b"data",
            ChallengeHash::Sha256,
            &mut rng,
        );
        assert!(matches!(
            result,
            Err(MpcError::ThresholdNotMet { verified: 2, threshold: 3 })
        ));
    }

    #[test]
    fn test_combine_drops_unproven_partials() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params()).unwrap();
        let generated = session.generate(&mut rng).unwrap();

        let data = b"partial corruption";
        let mut partials: Vec<PartialSignature> = generated
            .shares
            .iter()
            .map(|s| {
                partial_sign(
                    &generated.key,
                    s,
                    SignatureScheme::RsaSha256,
                    data,
                    ChallengeHash::Sha256,
                    &mut rng,
                )
                .unwrap()
            })
            .collect();
        // tamper with one partial's value: its proof no longer matches
        partials[0].value += 1u32;

        let sig = combine(
            &generated.key,
            SignatureScheme::RsaSha256,
            data,
            &partials,
            ChallengeHash::Sha256,
        )
        .unwrap();
        assert!(verify_signature(
            &generated.key,
            SignatureScheme::RsaSha256,
            data,
            &sig
        ));

        // with two of three tampered, the threshold of proven partials is gone
        partials[1].value += 1u32;
        assert!(matches!(
            combine(
                &generated.key,
                SignatureScheme::RsaSha256,
                data,
                &partials,
                ChallengeHash::Sha256,
            ),
            Err(MpcError::ThresholdNotMet { verified: 1, threshold: 2 })
        ));
    }

    #[test]
    fn test_candidate_priority() {
        let candidates = vec![
            CandidateModulus {
                round: 2,
                origin: 1,
                value: BigUint::from(9u32),
            },
            CandidateModulus {
                round: 1,
                origin: 3,
                value: BigUint::from(7u32),
            },
            CandidateModulus {
                round: 1,
                origin: 2,
                value: BigUint::from(5u32),
            },
        ];
        let chosen = select_candidate(&candidates).unwrap();
        assert_eq!((chosen.round, chosen.origin), (1, 2));
    }

    #[test]
    fn test_scheme_mismatch_rejected() {
        let mut rng = OsRng;
        let session = KeygenSession::new(committee(3), 2, test_params()).unwrap();
        let generated = session.generate(&mut rng).unwrap();

        let sig = sign_data(
            &generated.key,
            &generated.shares,
            SignatureScheme::RsaSha256,
            b"data",
            ChallengeHash::Sha256,
            &mut rng,
        )
        .unwrap();
        assert!(!verify_signature(
            &generated.key,
            SignatureScheme::RsaSha512,
            b"data",
            &sig
        ));
    }
}
