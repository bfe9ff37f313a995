//! Node configuration, loaded once at startup and immutable afterwards.
//!
//! The hardfork height that enables threshold-protocol messages is a plain
//! config value validated exactly once at build time: unset or set twice is
//! a fatal startup error, not a runtime condition.

use std::time::Duration;

use hermes_mpc::{ChallengeHash, ValidatorSet};

use crate::error::ConfigError;
use crate::keys::KeyPair;

#[derive(Debug)]
pub struct ConsensusConfig {
    validators: ValidatorSet,
    keypair: KeyPair,
    threshold: u32,
    round_timeout: Duration,
    challenge_hash: ChallengeHash,
    hardfork_height: u64,
}

impl ConsensusConfig {
    pub fn builder() -> ConsensusConfigBuilder {
        ConsensusConfigBuilder::default()
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout
    }

    pub fn challenge_hash(&self) -> ChallengeHash {
        self.challenge_hash
    }

    /// Height from which threshold-protocol messages are accepted.
    pub fn hardfork_height(&self) -> u64 {
        self.hardfork_height
    }
}

#[derive(Default)]
pub struct ConsensusConfigBuilder {
    validators: Option<ValidatorSet>,
    keypair: Option<KeyPair>,
    threshold: Option<u32>,
    round_timeout: Option<Duration>,
    challenge_hash: Option<ChallengeHash>,
    hardfork_height: Option<u64>,
}

impl ConsensusConfigBuilder {
    pub fn validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = Some(validators);
        self
    }

    pub fn keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = Some(timeout);
        self
    }

    pub fn challenge_hash(mut self, hash: ChallengeHash) -> Self {
        self.challenge_hash = Some(hash);
        self
    }

    /// Set once; a second assignment is a configuration fault.
    pub fn hardfork_height(mut self, height: u64) -> Result<Self, ConfigError> {
        if self.hardfork_height.is_some() {
            return Err(ConfigError::HardforkHeightAlreadySet);
        }
        self.hardfork_height = Some(height);
        Ok(self)
    }

    pub fn build(self) -> Result<ConsensusConfig, ConfigError> {
        let validators = self.validators.ok_or(ConfigError::NoValidators)?;
        if validators.is_empty() {
            return Err(ConfigError::NoValidators);
        }
        let keypair = self.keypair.ok_or(ConfigError::MissingKeyPair)?;
        if validators.index_of(&keypair.validator_id()).is_none() {
            return Err(ConfigError::KeyNotInValidatorSet);
        }
        let threshold = self.threshold.unwrap_or(1);
        if threshold == 0 || threshold as usize > validators.len() {
            return Err(ConfigError::BadThreshold {
                threshold,
                validators: validators.len(),
            });
        }
        let round_timeout = self.round_timeout.unwrap_or(Duration::from_secs(10));
        if round_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(ConsensusConfig {
            validators,
            keypair,
            threshold,
            round_timeout,
            challenge_hash: self.challenge_hash.unwrap_or(ChallengeHash::Sha256),
            hardfork_height: self.hardfork_height.ok_or(ConfigError::HardforkHeightUnset)?,
        })
    }
}
