//! error types for the multi-party protocol

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpcError {
    /// `advance` was handed private parameters generated against a different
    /// validator set than the snapshot being advanced.
    #[error("inconsistent protocol state: {0}")]
    InconsistentState(String),

    #[error("insufficient participants: {remaining} remain, threshold is {threshold}")]
    InsufficientParticipants { remaining: usize, threshold: u32 },

    #[error("threshold not met: {verified} verified partial signatures, need {threshold}")]
    ThresholdNotMet { verified: usize, threshold: u32 },

    #[error("biprimality retry budget exhausted after {attempts} candidates")]
    RetriesExhausted { attempts: u32 },

    #[error("no shares provided")]
    EmptyShareSet,

    #[error("duplicate participant index: {0}")]
    DuplicateIndex(u32),

    #[error("participant index must be greater than 0")]
    InvalidIndex,

    #[error("contribution width {0} bits is too narrow for residue shaping")]
    ContributionTooNarrow(u64),

    #[error("value has no modular inverse")]
    NonInvertible,

    #[error("proof encoding corrupted or incomplete")]
    MalformedProof,

    #[error("public exponent not invertible for this modulus")]
    BadPublicExponent,
}

pub type Result<T> = core::result::Result<T, MpcError>;
