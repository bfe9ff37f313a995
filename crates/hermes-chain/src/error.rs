//! error types for block handling and consensus

use hermes_mpc::MpcError;
use thiserror::Error;

use crate::block::ValidationOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A block failed validation; invalid blocks are expected input, the
    /// outcome says what was wrong with this one.
    #[error("invalid block: {0:?}")]
    InvalidBlock(ValidationOutcome),

    #[error("parent block {0} not found at the preceding height")]
    MissingParent(String),

    /// Storage already holds a block for this height; a second one would
    /// fork the local chain.
    #[error("a block at height {0} is already persisted")]
    DuplicateHeight(u64),

    /// The designated proposer published two conflicting proposals for the
    /// same height and round. Unrecoverable for this run.
    #[error("proposer equivocation at height {height} round {round}")]
    Equivocation { height: u64, round: u32 },

    #[error("message sender is not a member of the validator set")]
    UnknownSender,

    #[error(transparent)]
    Mpc(#[from] MpcError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("validator set is empty")]
    NoValidators,

    #[error("node key pair missing")]
    MissingKeyPair,

    #[error("node key is not a member of the validator set")]
    KeyNotInValidatorSet,

    #[error("signing threshold {threshold} invalid for {validators} validators")]
    BadThreshold { threshold: u32, validators: usize },

    #[error("round timeout must be non-zero")]
    ZeroTimeout,

    #[error("hardfork height not set")]
    HardforkHeightUnset,

    #[error("hardfork height set twice")]
    HardforkHeightAlreadySet,
}
