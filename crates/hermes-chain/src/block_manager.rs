//! Signs, validates and persists blocks.
//!
//! Two independent notification channels fire: "signed" at the moment a
//! locally created block receives its signature, "persisted" after a block
//! passes validation and is written through the storage collaborator. Each
//! has its own subscriber list; delivery is in registration order,
//! at-least-once, within the calling thread.

use std::collections::HashMap;

use tracing::{debug, warn};

use hermes_mpc::{ValidatorId, ValidatorSet};

use crate::block::{Block, BlockHeader, ValidationOutcome};
use crate::error::ChainError;
use crate::keys::{self, KeyPair};

/// Storage collaborator. Persistence itself is out of scope; this is the
/// narrow surface the block manager consumes.
pub trait Storage {
    fn get_block_by_hash(&self, hash: &[u8; 32]) -> Option<Block>;
    fn get_block_by_height(&self, height: u64) -> Option<Block>;
    fn put_block(&mut self, block: Block);
    fn get_account(&self, address: &[u8; 20]) -> Option<Account>;
    fn is_empty(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: [u8; 20],
    pub balance: u128,
    pub nonce: u64,
}

/// In-memory storage, for tests and light tooling.
#[derive(Default)]
pub struct MemoryStorage {
    blocks: HashMap<[u8; 32], Block>,
    by_height: HashMap<u64, [u8; 32]>,
    accounts: HashMap<[u8; 20], Account>,
}

impl MemoryStorage {
    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.address, account);
        self
    }
}

impl Storage for MemoryStorage {
    fn get_block_by_hash(&self, hash: &[u8; 32]) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn get_block_by_height(&self, height: u64) -> Option<Block> {
        self.by_height
            .get(&height)
            .and_then(|hash| self.blocks.get(hash).cloned())
    }

    fn put_block(&mut self, block: Block) {
        self.by_height.insert(block.header.height, block.hash());
        self.blocks.insert(block.hash(), block);
    }

    fn get_account(&self, address: &[u8; 20]) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub type BlockObserver = Box<dyn FnMut(&Block) + Send>;

pub struct BlockManager<S: Storage> {
    validators: ValidatorSet,
    storage: S,
    signed_observers: Vec<BlockObserver>,
    persisted_observers: Vec<BlockObserver>,
}

impl<S: Storage> BlockManager<S> {
    pub fn new(validators: ValidatorSet, storage: S) -> Self {
        Self {
            validators,
            storage,
            signed_observers: Vec::new(),
            persisted_observers: Vec::new(),
        }
    }

    pub fn on_signed(&mut self, observer: BlockObserver) {
        self.signed_observers.push(observer);
    }

    pub fn on_persisted(&mut self, observer: BlockObserver) {
        self.persisted_observers.push(observer);
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Attach a signature over the header's canonical encoding. The header
    /// itself is never modified.
    pub fn sign(&mut self, header: BlockHeader, keypair: &KeyPair) -> Block {
        let signature = keypair.sign(&header.canonical_bytes());
        let block = Block {
            header,
            signer: Some(keypair.validator_id()),
            signature: Some(signature),
        };
        debug!(height = block.header.height, hash = %hex::encode(block.hash()), "block signed");
        for observer in &mut self.signed_observers {
            observer(&block);
        }
        block
    }

    /// Re-derive the canonical encoding and check the signature against the
    /// validator set. Pure with respect to storage.
    pub fn verify(&self, block: &Block) -> ValidationOutcome {
        if !block.header.is_well_formed() {
            return ValidationOutcome::MalformedHeader;
        }
        let (signer, signature) = match (&block.signer, &block.signature) {
            (Some(s), Some(sig)) => (s, sig),
            _ => return ValidationOutcome::InvalidSignature,
        };
        if self.validators.index_of(signer).is_none() {
            return ValidationOutcome::WrongSigner;
        }
        if !keys::verify_with_id(signer, &block.header.canonical_bytes(), signature) {
            return ValidationOutcome::InvalidSignature;
        }
        ValidationOutcome::Valid
    }

    /// As [`verify`](Self::verify), additionally pinning the signer to the
    /// proposer the consensus round designated.
    pub fn verify_signed_by(&self, block: &Block, expected: &ValidatorId) -> ValidationOutcome {
        match self.verify(block) {
            ValidationOutcome::Valid if block.signer.as_ref() != Some(expected) => {
                ValidationOutcome::WrongSigner
            }
            outcome => outcome,
        }
    }

    /// Persist a block that validates. At most one block per height, and
    /// the parent must be the stored block at the preceding height, except
    /// for genesis and for the first block written into empty storage
    /// (bootstrap from a later height).
    pub fn persist(&mut self, block: Block) -> Result<(), ChainError> {
        match self.verify(&block) {
            ValidationOutcome::Valid => {}
            outcome => {
                warn!(height = block.header.height, ?outcome, "refusing to persist");
                return Err(ChainError::InvalidBlock(outcome));
            }
        }
        if self.storage.get_block_by_height(block.header.height).is_some() {
            warn!(height = block.header.height, "height already occupied");
            return Err(ChainError::DuplicateHeight(block.header.height));
        }
        if block.header.height > 0 && !self.storage.is_empty() {
            match self.storage.get_block_by_hash(&block.header.parent) {
                Some(parent) if parent.header.height + 1 == block.header.height => {}
                _ => {
                    return Err(ChainError::MissingParent(hex::encode(block.header.parent)));
                }
            }
        }
        self.storage.put_block(block.clone());
        debug!(height = block.header.height, "block persisted");
        for observer in &mut self.persisted_observers {
            observer(&block);
        }
        Ok(())
    }
}
