//! Distributed biprimality test (Boneh–Franklin)
//!
//! Confirms a jointly generated candidate `N` is the product of exactly two
//! primes without revealing the primes. Per round, a base `g` with Jacobi
//! symbol (g/N) = 1 is fixed, party 1 publishes
//! `Q_1 = g^{(N+1−p_1−q_1)/4}`, every other party `Q_i = g^{(p_i+q_i)/4}`,
//! and the candidate survives the round iff `Q_1 ≡ ±Π_{i>1} Q_i (mod N)`.
//! A genuine Blum biprime passes every round; anything else survives a round
//! with probability at most 1/2, so the round count bounds the error.
//!
//! The base is derived by hashing `(N, round)` and rejection-sampling until
//! the Jacobi condition holds, so all validators agree on it without an
//! extra exchange.

use num_bigint::BigUint;
use num_traits::One;
use sha2::{Digest, Sha256};

use crate::bgw::ShareParams;
use crate::error::MpcError;

/// Default round count. Keeps the false-accept rate negligible even across
/// the thousands of rejected candidates a full key generation works through.
pub const DEFAULT_ROUNDS: u32 = 24;

/// Deterministic per-round base with (g/N) = 1.
pub fn round_base(n: &BigUint, round: u32) -> BigUint {
    let mut counter = 0u32;
    loop {
        let mut h = Sha256::new();
        h.update(b"hermes/biprime-base/v1");
        h.update(n.to_bytes_be());
        h.update(round.to_be_bytes());
        h.update(counter.to_be_bytes());
        let g = BigUint::from_bytes_be(&h.finalize()) % n;
        if g > BigUint::one() && crate::integers::jacobi(&g, n) == 1 {
            return g;
        }
        counter += 1;
    }
}

/// The exponent a party raises the round base to.
///
/// Requires the Blum residue arrangement from [`crate::bgw`]; returns an
/// error if the division by 4 is not exact, which means a contribution with
/// the wrong residue slipped in.
pub fn contribution_exponent(params: &ShareParams, n: &BigUint) -> Result<BigUint, MpcError> {
    let numerator = if params.index() == 1 {
        n + 1u32 - params.p_contrib() - params.q_contrib()
    } else {
        params.p_contrib() + params.q_contrib()
    };
    if (&numerator % 4u32) != BigUint::from(0u32) {
        return Err(MpcError::InconsistentState(
            "biprimality exponent not divisible by 4".into(),
        ));
    }
    Ok(numerator >> 2)
}

/// `Q_i = g^{e_i} mod N` for one party.
pub fn contribution(base: &BigUint, exponent: &BigUint, n: &BigUint) -> BigUint {
    base.modpow(exponent, n)
}

/// One round's verdict over all published contributions, keyed by 1-based
/// party index.
pub fn round_passes(n: &BigUint, contributions: &[(u32, BigUint)]) -> Result<bool, MpcError> {
    let q1 = contributions
        .iter()
        .find(|(i, _)| *i == 1)
        .map(|(_, q)| q.clone())
        .ok_or(MpcError::EmptyShareSet)?;
    let rest = contributions
        .iter()
        .filter(|(i, _)| *i != 1)
        .fold(BigUint::one(), |acc, (_, q)| (acc * q) % n);
    Ok(q1 == rest || (q1 + rest) % n == BigUint::from(0u32))
}

/// Round bookkeeping for one candidate, immutable-value style: each accepted
/// contribution or round change produces a new state.
#[derive(Debug, Clone)]
pub struct BiprimalityRun {
    candidate: BigUint,
    round: u32,
    rounds_required: u32,
    /// contributions for the current and previous round, keyed by parity
    contributions: [Vec<(u32, BigUint)>; 2],
}

impl BiprimalityRun {
    pub fn start(candidate: BigUint, rounds_required: u32) -> Self {
        Self {
            candidate,
            round: 0,
            rounds_required,
            contributions: [Vec::new(), Vec::new()],
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn candidate(&self) -> &BigUint {
        &self.candidate
    }

    pub fn base(&self) -> BigUint {
        round_base(&self.candidate, self.round)
    }

    /// Record a party's contribution for the current round. A duplicate from
    /// the same party leaves the state unchanged (re-delivery is harmless).
    pub fn with_contribution(&self, from: u32, value: BigUint) -> Self {
        let slot = (self.round % 2) as usize;
        if self.contributions[slot].iter().any(|(i, _)| *i == from) {
            return self.clone();
        }
        let mut next = self.clone();
        next.contributions[slot].push((from, value));
        next
    }

    /// Verdict for the current round once every live party contributed.
    pub fn verdict(&self) -> Result<bool, MpcError> {
        round_passes(&self.candidate, &self.contributions[(self.round % 2) as usize])
    }

    /// Advance to the next round, clearing that round's parity slot.
    pub fn next_round(&self) -> Self {
        let mut next = self.clone();
        next.round += 1;
        next.contributions[(next.round % 2) as usize].clear();
        next
    }

    /// All required rounds passed?
    pub fn accepted(&self) -> bool {
        self.round >= self.rounds_required
    }
}
