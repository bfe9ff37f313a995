//! Distributed RSA key generation and threshold signing for validator
//! committees.
//!
//! A committee of `n` validators jointly generates an RSA modulus nobody can
//! factor alone (BGW secret sharing plus a distributed Boneh-Franklin
//! biprimality test), then signs under the shared key with any `t` of them
//! (Shoup's threshold RSA). Every published value carries a non-interactive
//! zero-knowledge proof, so misbehavior is detected from public data alone.
//!
//! # Protocol shape
//!
//! - **Keygen**: sample additive prime contributions, share them over a
//!   public field, reconstruct the candidate `N = (Σpᵢ)(Σqᵢ)`, test it for
//!   biprimality, prove contributions well-formed, derive Shamir shares of
//!   the private exponent.
//! - **Signing**: each share holder publishes `x^{2Δdᵢ}` with an
//!   equality-of-discrete-logs proof; `t` proven partials combine into an
//!   ordinary RSA signature anyone can verify with the public key alone.
//!
//! The engine drives all parties of a run in-process; carrying rounds
//! between real nodes is the caller's transport problem.
//!
//! # Example
//!
//! ```ignore
//! use hermes_mpc::{KeygenParams, KeygenSession, SignatureScheme, sign_data, verify_signature};
//! use hermes_mpc::zkp::ChallengeHash;
//!
//! let session = KeygenSession::new(committee, 3, KeygenParams::default())?;
//! let generated = session.generate(&mut rng)?;
//!
//! let sig = sign_data(
//!     &generated.key,
//!     &generated.shares,
//!     SignatureScheme::RsaSha256,
//!     b"payload",
//!     ChallengeHash::Sha256,
//!     &mut rng,
//! )?;
//! assert!(verify_signature(&generated.key, SignatureScheme::RsaSha256, b"payload", &sig));
//! ```

pub mod bgw;
pub mod biprime;
mod error;
mod integers;
pub mod party;
pub mod zkp;

mod engine;

pub use engine::{
    combine, message_representative, partial_sign, select_candidate, sign_data, verify_signature,
    CandidateModulus, GeneratedKey, KeygenParams, KeygenSession, PartialSignature, SignatureScheme,
    SigningShare, ThresholdKey, ThresholdSignature,
};
pub use error::MpcError;
pub use party::{ProtocolSnapshot, ValidatorId, ValidatorSet};
pub use zkp::{ChallengeHash, Proof, Statement};
