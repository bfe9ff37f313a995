//! Block agreement and threshold signing for a validator committee.
//!
//! The consensus manager drives one agreement run per height: the rotating
//! proposer publishes a signed header, validators vote on its hash, and a
//! strictly-greater-than-two-thirds weight quorum commits the block through
//! the block manager. Threshold-protocol messages ride the same transport
//! and are handed to the key/signature engine from [`hermes_mpc`] once the
//! configured hardfork height enables them.
//!
//! Transport, persistent storage and process wiring are collaborators
//! behind the [`consensus::Network`], [`block_manager::Storage`] and
//! notification interfaces; this crate only decides blocks and routes
//! protocol rounds.

pub mod block;
pub mod block_manager;
pub mod config;
pub mod consensus;
mod error;
pub mod keys;
pub mod message;

pub use block::{Block, BlockHeader, ValidationOutcome};
pub use block_manager::{Account, BlockManager, MemoryStorage, Storage};
pub use config::{ConsensusConfig, ConsensusConfigBuilder};
pub use consensus::{quorum_reached, ConsensusManager, ConsensusState, Network, ThresholdSink};
pub use error::{ChainError, ConfigError};
pub use keys::KeyPair;
pub use message::{ConsensusMessage, MessageKind, MessagePayload};
