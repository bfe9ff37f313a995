//! Big-integer helpers for the distributed RSA protocol
//!
//! Uniform and prime sampling, the Jacobi symbol, modular inversion, and the
//! two flavors of Lagrange interpolation the protocol needs:
//!
//! - interpolation at zero over a public prime field (modulus reconstruction)
//! - Δ-scaled integer coefficients (signature combination, where no modular
//!   inverse of the denominators is available)

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use rand_core::{CryptoRng, RngCore};

use crate::error::MpcError;

/// Miller-Rabin witness count. 2^-80 error bound on adversarial inputs.
const MILLER_RABIN_ROUNDS: usize = 40;

/// Pick a uniform integer in `[min, max]`, boundaries included.
pub fn pick_in_range<R: RngCore + CryptoRng>(min: &BigUint, max: &BigUint, rng: &mut R) -> BigUint {
    debug_assert!(min <= max);
    rng.gen_biguint_range(min, &(max + 1u32))
}

/// Miller-Rabin probable-prime test with random witnesses.
pub fn is_probable_prime<R: RngCore + CryptoRng>(n: &BigUint, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);
    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // n - 1 = d * 2^s with d odd
    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Sample a probable prime of exactly `bits` bits.
pub fn pick_prime<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> BigUint {
    assert!(bits >= 2, "prime must have at least 2 bits");
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probable_prime(&candidate, rng) {
            return candidate;
        }
    }
}

/// n!
pub fn factorial(n: u32) -> BigUint {
    (1..=n).fold(BigUint::one(), |acc, i| acc * i)
}

/// Jacobi symbol (a/n) for odd positive n.
///
/// Returns 0 when gcd(a, n) != 1, otherwise ±1.
pub fn jacobi(a: &BigUint, n: &BigUint) -> i32 {
    debug_assert!(n.is_odd());
    let mut a = a % n;
    let mut n = n.clone();
    let mut result = 1i32;

    while !a.is_zero() {
        while a.is_even() {
            a >>= 1;
            // (2/n) = -1 iff n ≡ 3, 5 (mod 8)
            let r = (&n % 8u32).to_u32_digits().first().copied().unwrap_or(0);
            if r == 3 || r == 5 {
                result = -result;
            }
        }
        core::mem::swap(&mut a, &mut n);
        // quadratic reciprocity
        if (&a % 4u32) == BigUint::from(3u32) && (&n % 4u32) == BigUint::from(3u32) {
            result = -result;
        }
        a %= &n;
    }

    if n.is_one() {
        result
    } else {
        0
    }
}

/// Modular inverse of `a` mod `m` via extended Euclid, if it exists.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let a = BigInt::from_biguint(Sign::Plus, a % m);
    let m_signed = BigInt::from_biguint(Sign::Plus, m.clone());
    let ext = a.extended_gcd(&m_signed);
    if !ext.gcd.is_one() {
        return None;
    }
    let inv = ext.x.mod_floor(&m_signed);
    Some(inv.to_biguint().unwrap_or_default())
}

/// Interpolate `f(0)` over the prime field `p` from points `(index, f(index))`.
///
/// Indices are 1-based and must be distinct. Used to reconstruct the shared
/// modulus from the participants' evaluation points.
pub fn interpolate_at_zero(points: &[(u32, BigUint)], p: &BigUint) -> Result<BigUint, MpcError> {
    if points.is_empty() {
        return Err(MpcError::EmptyShareSet);
    }
    validate_indices(&points.iter().map(|(i, _)| *i).collect::<Vec<_>>())?;

    let mut sum = BigUint::zero();
    for (j, (xj, yj)) in points.iter().enumerate() {
        // λ_j = Π_{m≠j} x_m / (x_m - x_j) mod p
        let mut num = BigInt::one();
        let mut den = BigInt::one();
        for (m, (xm, _)) in points.iter().enumerate() {
            if m == j {
                continue;
            }
            num *= BigInt::from(*xm);
            den *= BigInt::from(*xm) - BigInt::from(*xj);
        }
        let num = num.mod_floor(&BigInt::from_biguint(Sign::Plus, p.clone()));
        let den = den.mod_floor(&BigInt::from_biguint(Sign::Plus, p.clone()));
        let den_inv = mod_inverse(&den.to_biguint().unwrap_or_default(), p)
            .ok_or(MpcError::NonInvertible)?;
        let lambda = (num.to_biguint().unwrap_or_default() * den_inv) % p;
        sum = (sum + yj * lambda) % p;
    }
    Ok(sum)
}

/// Δ-scaled integer Lagrange coefficients at zero: λ'_i = Δ · Π_{j≠i} j/(j−i).
///
/// Δ = `n_total`! clears every denominator, so the result is an exact signed
/// integer (Shoup's trick for combining in a group of unknown order).
pub fn delta_lagrange_at_zero(indices: &[u32], n_total: u32) -> Result<Vec<BigInt>, MpcError> {
    validate_indices(indices)?;
    let delta = BigInt::from_biguint(Sign::Plus, factorial(n_total));

    let mut coefficients = Vec::with_capacity(indices.len());
    for &i in indices {
        let mut num = delta.clone();
        let mut den = BigInt::one();
        for &j in indices {
            if j == i {
                continue;
            }
            num *= BigInt::from(j);
            den *= BigInt::from(j) - BigInt::from(i);
        }
        let (q, r) = num.div_rem(&den);
        if !r.is_zero() {
            // cannot happen for Δ = n! with indices ≤ n
            return Err(MpcError::NonInvertible);
        }
        coefficients.push(q);
    }
    Ok(coefficients)
}

/// Raise `base` to a signed exponent mod `n` (negative exponents invert).
pub fn modpow_signed(base: &BigUint, exp: &BigInt, n: &BigUint) -> Result<BigUint, MpcError> {
    if exp.is_negative() {
        let inv = mod_inverse(base, n).ok_or(MpcError::NonInvertible)?;
        Ok(inv.modpow(exp.magnitude(), n))
    } else {
        Ok(base.modpow(exp.magnitude(), n))
    }
}

fn validate_indices(indices: &[u32]) -> Result<(), MpcError> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    if sorted.first() == Some(&0) {
        return Err(MpcError::InvalidIndex);
    }
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            return Err(MpcError::DuplicateIndex(w[0]));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_miller_rabin_known_values() {
        let mut rng = OsRng;
        for p in [2u32, 3, 5, 7, 65537, 104729] {
            assert!(is_probable_prime(&BigUint::from(p), &mut rng), "{p} is prime");
        }
        for c in [1u32, 4, 15, 65535, 104730, 561 /* Carmichael */] {
            assert!(!is_probable_prime(&BigUint::from(c), &mut rng), "{c} is composite");
        }
    }

    #[test]
    fn test_pick_prime_has_requested_size() {
        let mut rng = OsRng;
        let p = pick_prime(48, &mut rng);
        assert_eq!(p.bits(), 48);
        assert!(is_probable_prime(&p, &mut rng));
    }

    #[test]
    fn test_jacobi_symbol() {
        // (a/7) for a = 1..6: 1, 1, -1, 1, -1, -1
        let n = BigUint::from(7u32);
        let expected = [1, 1, -1, 1, -1, -1];
        for (a, e) in (1u32..=6).zip(expected) {
            assert_eq!(jacobi(&BigUint::from(a), &n), e, "jacobi({a}/7)");
        }
        // shares a factor
        assert_eq!(jacobi(&BigUint::from(6u32), &BigUint::from(9u32)), 0);
        // (19/45) = 1
        assert_eq!(jacobi(&BigUint::from(19u32), &BigUint::from(45u32)), 1);
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0), BigUint::one());
        assert_eq!(factorial(5), BigUint::from(120u32));
        assert_eq!(factorial(10), BigUint::from(3_628_800u32));
    }

    #[test]
    fn test_mod_inverse() {
        let p = BigUint::from(104729u32);
        let a = BigUint::from(12345u32);
        let inv = mod_inverse(&a, &p).unwrap();
        assert_eq!((a * inv) % &p, BigUint::one());

        // non-invertible
        assert!(mod_inverse(&BigUint::from(6u32), &BigUint::from(9u32)).is_none());
    }

    #[test]
    fn test_interpolate_at_zero_recovers_constant_term() {
        // f(x) = 7 + 3x + 5x² over F_104729
        let p = BigUint::from(104729u32);
        let f = |x: u32| BigUint::from(7 + 3 * x + 5 * x * x);
        let points: Vec<(u32, BigUint)> = [1u32, 2, 4].iter().map(|&x| (x, f(x))).collect();
        assert_eq!(interpolate_at_zero(&points, &p).unwrap(), BigUint::from(7u32));
    }

    #[test]
    fn test_interpolate_rejects_duplicates() {
        let p = BigUint::from(104729u32);
        let points = vec![(1u32, BigUint::one()), (1u32, BigUint::from(2u32))];
        assert!(matches!(
            interpolate_at_zero(&points, &p),
            Err(MpcError::DuplicateIndex(1))
        ));
    }

    #[test]
    fn test_delta_lagrange_exactness() {
        // For Q = {1, 2} at zero: λ_1 = 2, λ_2 = -1; Δ = 3! = 6
        let coeffs = delta_lagrange_at_zero(&[1, 2], 3).unwrap();
        assert_eq!(coeffs[0], BigInt::from(12));
        assert_eq!(coeffs[1], BigInt::from(-6));
    }

    #[test]
    fn test_delta_lagrange_interpolates_scaled_secret() {
        // f(x) = 11 + 4x; Σ λ'_i f(i) must equal Δ·f(0)
        let n_total = 4u32;
        let delta = BigInt::from_biguint(Sign::Plus, factorial(n_total));
        let f = |x: u32| BigInt::from(11 + 4 * x);
        let indices = [2u32, 4];
        let coeffs = delta_lagrange_at_zero(&indices, n_total).unwrap();
        let sum: BigInt = indices
            .iter()
            .zip(&coeffs)
            .map(|(&i, c)| c * f(i))
            .sum();
        assert_eq!(sum, delta * 11);
    }

    #[test]
    fn test_modpow_signed_negative_exponent() {
        let n = BigUint::from(101u32);
        let base = BigUint::from(7u32);
        let forward = modpow_signed(&base, &BigInt::from(5), &n).unwrap();
        let backward = modpow_signed(&base, &BigInt::from(-5), &n).unwrap();
        assert_eq!((forward * backward) % &n, BigUint::one());
    }
}
