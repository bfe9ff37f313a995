//! BGW-style secret sharing for distributed modulus generation
//!
//! Each party holds additive contributions `p_i`, `q_i` to the candidate
//! primes `p = Σ p_i`, `q = Σ q_i`. Contributions are Shamir-shared over a
//! public prime field, every party sums the shares it received and multiplies
//! its two sums locally, and the candidate modulus `N = p·q` is reconstructed
//! by interpolating the degree-2d product polynomial at zero. No party ever
//! sees another party's contribution.
//!
//! Residues are arranged so the candidate is a Blum integer when both sums
//! are prime: party 1 samples contributions ≡ 3 (mod 4), everyone else
//! ≡ 0 (mod 4), giving p ≡ q ≡ 3 (mod 4). The biprimality test depends on
//! this.

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::MpcError;
use crate::integers;
use crate::party::ValidatorSet;

/// One party's private share material for a key-generation run.
///
/// Bound to the validator set it was sampled over; [`crate::party::ProtocolSnapshot::advance`]
/// refuses parameters whose fingerprint does not match. The contribution
/// bytes are wiped when the value is dropped.
#[derive(Clone)]
pub struct ShareParams {
    /// 1-based protocol index of the owning party.
    index: u32,
    p_contrib: Zeroizing<Vec<u8>>,
    q_contrib: Zeroizing<Vec<u8>>,
    fingerprint: [u8; 32],
}

impl fmt::Debug for ShareParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareParams")
            .field("index", &self.index)
            .field("fingerprint", &hex::encode(self.fingerprint))
            .finish_non_exhaustive()
    }
}

impl ShareParams {
    /// Sample fresh contributions of `bits` bits for the party at 1-based
    /// `index` in `set`. Widths below 4 bits cannot carry the mod-4
    /// residue shaping.
    pub fn sample<R: RngCore + CryptoRng>(
        index: u32,
        set: &ValidatorSet,
        bits: u64,
        rng: &mut R,
    ) -> Result<Self, MpcError> {
        if index == 0 {
            return Err(MpcError::InvalidIndex);
        }
        if bits < 4 {
            return Err(MpcError::ContributionTooNarrow(bits));
        }
        // residue mod 4: party 1 contributes 3, the rest contribute 0
        let residue = if index == 1 { 3u8 } else { 0u8 };
        Ok(Self {
            index,
            p_contrib: Zeroizing::new(sample_with_residue(bits, residue, rng).to_bytes_be()),
            q_contrib: Zeroizing::new(sample_with_residue(bits, residue, rng).to_bytes_be()),
            fingerprint: set.fingerprint(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn set_fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    pub(crate) fn p_contrib(&self) -> BigUint {
        BigUint::from_bytes_be(&self.p_contrib)
    }

    pub(crate) fn q_contrib(&self) -> BigUint {
        BigUint::from_bytes_be(&self.q_contrib)
    }

    #[cfg(test)]
    pub(crate) fn override_contributions(&mut self, p: &BigUint, q: &BigUint) {
        self.p_contrib = Zeroizing::new(p.to_bytes_be());
        self.q_contrib = Zeroizing::new(q.to_bytes_be());
    }

    /// Deal Shamir shares of both contributions over the field `p` at the
    /// given polynomial degree.
    pub fn deal<R: RngCore + CryptoRng>(
        &self,
        field: &BigUint,
        degree: u32,
        rng: &mut R,
    ) -> DealtShares {
        DealtShares {
            from: self.index,
            p_poly: FieldPoly::share(&self.p_contrib(), degree, field, rng),
            q_poly: FieldPoly::share(&self.q_contrib(), degree, field, rng),
        }
    }
}

fn sample_with_residue<R: RngCore + CryptoRng>(bits: u64, residue: u8, rng: &mut R) -> BigUint {
    let mut v = integers::pick_in_range(
        &(BigUint::from(1u32) << (bits - 1)),
        &((BigUint::from(1u32) << bits) - 1u32),
        rng,
    );
    // clear the two low bits, then set the residue
    v.set_bit(0, false);
    v.set_bit(1, false);
    v += residue;
    v
}

/// A random polynomial over F_p with a fixed constant term.
#[derive(Debug, Clone)]
pub struct FieldPoly {
    coefficients: Vec<BigUint>,
    field: BigUint,
}

impl FieldPoly {
    /// `f(0) = secret`, remaining `degree` coefficients uniform in F_p.
    pub fn share<R: RngCore + CryptoRng>(
        secret: &BigUint,
        degree: u32,
        field: &BigUint,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = vec![secret % field];
        for _ in 0..degree {
            coefficients.push(integers::pick_in_range(
                &BigUint::zero(),
                &(field - 1u32),
                rng,
            ));
        }
        Self {
            coefficients,
            field: field.clone(),
        }
    }

    /// Horner evaluation at a 1-based participant index.
    pub fn eval(&self, x: u32) -> BigUint {
        let x = BigUint::from(x);
        self.coefficients
            .iter()
            .rev()
            .fold(BigUint::zero(), |acc, c| (acc * &x + c) % &self.field)
    }
}

/// The shares one party deals to the whole committee.
#[derive(Debug, Clone)]
pub struct DealtShares {
    from: u32,
    p_poly: FieldPoly,
    q_poly: FieldPoly,
}

impl DealtShares {
    pub fn from_index(&self) -> u32 {
        self.from
    }

    /// The share destined for the party at 1-based index `to`.
    pub fn share_for(&self, to: u32) -> PointShare {
        PointShare {
            from: self.from,
            to,
            p_value: self.p_poly.eval(to),
            q_value: self.q_poly.eval(to),
        }
    }
}

/// One dealt evaluation point, as sent from one party to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointShare {
    pub from: u32,
    pub to: u32,
    pub p_value: BigUint,
    pub q_value: BigUint,
}

/// A party's local product point: `(Σ_i p-shares)·(Σ_i q-shares) mod P`,
/// its evaluation of the degree-2d polynomial `f_p·f_q` at its own index.
pub fn product_point(received: &[PointShare], field: &BigUint) -> Result<BigUint, MpcError> {
    if received.is_empty() {
        return Err(MpcError::EmptyShareSet);
    }
    let to = received[0].to;
    if received.iter().any(|s| s.to != to) {
        return Err(MpcError::InconsistentState(
            "aggregating shares dealt to different parties".into(),
        ));
    }
    let p_sum = received
        .iter()
        .fold(BigUint::zero(), |acc, s| (acc + &s.p_value) % field);
    let q_sum = received
        .iter()
        .fold(BigUint::zero(), |acc, s| (acc + &s.q_value) % field);
    Ok((p_sum * q_sum) % field)
}

/// Reconstruct the candidate modulus from the parties' product points.
///
/// Exact as long as the field prime exceeds any possible `p·q`, which
/// [`field_prime`] guarantees.
pub fn reconstruct_modulus(
    points: &[(u32, BigUint)],
    field: &BigUint,
) -> Result<BigUint, MpcError> {
    integers::interpolate_at_zero(points, field)
}

/// BGW privacy degree for `k` live participants: the product polynomial has
/// degree 2d and must interpolate from k points, so d = ⌊(k−1)/2⌋.
pub fn privacy_degree(participants: usize) -> u32 {
    ((participants.saturating_sub(1)) / 2) as u32
}

/// Public field prime for a run: large enough that `p·q` (sums of
/// `participants` contributions of `contribution_bits` bits each) can never
/// wrap.
pub fn field_prime<R: RngCore + CryptoRng>(
    participants: usize,
    contribution_bits: u64,
    rng: &mut R,
) -> BigUint {
    let log_n = usize::BITS as u64 - (participants.leading_zeros() as u64);
    integers::pick_prime(2 * (contribution_bits + log_n) + 2, rng)
}
