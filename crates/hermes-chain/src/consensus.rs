//! Consensus state machine.
//!
//! One manager drives agreement for one height at a time:
//! `Idle → AwaitingProposal → Voting → Deciding → Committed`, with
//! `Faulted` terminal on unrecoverable violations such as a proposer
//! equivocating. The proposer for `(height, round)` rotates as
//! `(height + round) mod n`; a proposal counts as the proposer's own vote.
//! A decision needs votes for the proposal hash of strictly more than two
//! thirds of the total voting weight.
//!
//! Every authenticated, not-yet-seen message is rebroadcast before local
//! processing, so a Byzantine first recipient cannot suppress propagation.
//! Messages for a future round or height are buffered, stale ones dropped,
//! duplicates ignored without rebroadcast. A session identifier fences
//! aborted runs: late messages from an aborted run never apply to its
//! successor.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use hermes_mpc::ValidatorId;

use crate::block::{Block, BlockHeader, ValidationOutcome};
use crate::block_manager::{BlockManager, Storage};
use crate::config::ConsensusConfig;
use crate::error::ChainError;
use crate::keys;
use crate::message::{ConsensusMessage, MessageKind, MessagePayload};

/// Network collaborator: fan a message out to peers, optionally skipping
/// the one it came from.
pub trait Network {
    fn broadcast(&mut self, message: &ConsensusMessage, exclude: Option<&ValidatorId>);
}

/// Receives threshold-protocol messages once the hardfork height enables
/// them; the key/signature engine consumes them from here.
pub trait ThresholdSink {
    fn deliver(&mut self, message: &ConsensusMessage);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusState {
    Idle,
    AwaitingProposal,
    Voting,
    Deciding,
    Committed,
    Faulted,
}

/// Quorum rule: weight `v` decides against total weight `w` iff
/// `v > 2w/3`, evaluated in integers to avoid rounding on the boundary.
pub fn quorum_reached(votes_weight: u128, total_weight: u128) -> bool {
    3 * votes_weight > 2 * total_weight
}

struct ProposalRecord {
    hash: [u8; 32],
    header: BlockHeader,
    header_signature: k256::ecdsa::Signature,
    proposer: usize,
}

pub struct ConsensusManager<N: Network, T: ThresholdSink, S: Storage> {
    config: ConsensusConfig,
    block_manager: BlockManager<S>,
    network: N,
    threshold_sink: T,
    state: ConsensusState,
    height: u64,
    round: u32,
    session: u64,
    proposal: Option<ProposalRecord>,
    /// First vote per validator position; later conflicting votes are
    /// ignored rather than re-counted.
    votes: BTreeMap<usize, [u8; 32]>,
    seen: HashSet<[u8; 32]>,
    buffered: Vec<ConsensusMessage>,
    last_committed: Option<Block>,
}

impl<N: Network, T: ThresholdSink, S: Storage> ConsensusManager<N, T, S> {
    pub fn new(
        config: ConsensusConfig,
        block_manager: BlockManager<S>,
        network: N,
        threshold_sink: T,
    ) -> Self {
        Self {
            config,
            block_manager,
            network,
            threshold_sink,
            state: ConsensusState::Idle,
            height: 0,
            round: 0,
            session: 0,
            proposal: None,
            votes: BTreeMap::new(),
            seen: HashSet::new(),
            buffered: Vec::new(),
            last_committed: None,
        }
    }

    pub fn state(&self) -> ConsensusState {
        self.state
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn last_committed(&self) -> Option<&Block> {
        self.last_committed.as_ref()
    }

    pub fn block_manager(&self) -> &BlockManager<S> {
        &self.block_manager
    }

    pub fn block_manager_mut(&mut self) -> &mut BlockManager<S> {
        &mut self.block_manager
    }

    pub fn proposer_position(&self) -> usize {
        ((self.height + self.round as u64) % self.config.validators().len() as u64) as usize
    }

    fn own_position(&self) -> usize {
        // membership was validated at config build time
        self.config
            .validators()
            .index_of(&self.config.keypair().validator_id())
            .unwrap_or(0)
    }

    /// Begin a run for `height` under an agreed `session` identifier.
    ///
    /// Session identifiers must be agreed across the committee (epoch
    /// number, or height-derived) and strictly increase from run to run;
    /// the fence in [`handle_message`](Self::handle_message) drops anything
    /// from an earlier session. Messages buffered for this session while a
    /// previous run was live are drained immediately.
    pub fn start(&mut self, height: u64, session: u64) -> Result<(), ChainError> {
        self.height = height;
        self.round = 0;
        self.session = session;
        self.state = ConsensusState::AwaitingProposal;
        self.proposal = None;
        self.votes.clear();
        self.seen.clear();
        self.buffered
            .retain(|m| m.session >= session && m.height >= height);
        info!(height, session, "consensus run started");
        self.drain_buffered()
    }

    /// Abort the current run (epoch change, shutdown). Buffered messages
    /// are released; the next run must start under a fresh session
    /// identifier so stragglers from this one die at the session fence.
    pub fn abort(&mut self) {
        self.state = ConsensusState::Idle;
        self.proposal = None;
        self.votes.clear();
        self.seen.clear();
        self.buffered.clear();
        info!(height = self.height, "consensus run aborted");
    }

    /// The proposal wait ran out: same height, next round, next proposer.
    pub fn on_timeout(&mut self) -> Result<(), ChainError> {
        if !matches!(
            self.state,
            ConsensusState::AwaitingProposal | ConsensusState::Voting
        ) {
            return Ok(());
        }
        self.round += 1;
        self.proposal = None;
        self.votes.clear();
        self.state = ConsensusState::AwaitingProposal;
        info!(
            height = self.height,
            round = self.round,
            proposer = self.proposer_position(),
            "round timed out, rotating proposer"
        );
        self.drain_buffered()
    }

    /// Propose a block for the current round. Only meaningful on the
    /// designated proposer; anywhere else the call is refused.
    pub fn propose(&mut self, header: BlockHeader) -> Result<(), ChainError> {
        if self.state != ConsensusState::AwaitingProposal
            || self.proposer_position() != self.own_position()
        {
            warn!(height = self.height, round = self.round, "not the designated proposer");
            return Ok(());
        }
        let keypair = self.config.keypair().clone();
        let hash = header.hash();
        let signed = self.block_manager.sign(header.clone(), &keypair);
        let header_signature = match signed.signature {
            Some(s) => s,
            None => return Err(ChainError::InvalidBlock(ValidationOutcome::InvalidSignature)),
        };
        let message = ConsensusMessage::signed(
            self.height,
            self.round,
            self.session,
            &keypair,
            MessagePayload::Proposal {
                block_hash: hash,
                header,
                header_signature,
            },
        );
        self.seen.insert(message.dedup_key());
        self.network.broadcast(&message, None);
        let position = self.own_position();
        self.apply(message, position)
    }

    /// Feed one inbound message through authentication, duplicate
    /// suppression, rebroadcast, the hardfork gate, and ordering, then
    /// apply it to the state machine.
    pub fn handle_message(&mut self, message: ConsensusMessage) -> Result<(), ChainError> {
        if matches!(self.state, ConsensusState::Idle | ConsensusState::Faulted) {
            debug!("no active run, dropping message");
            return Ok(());
        }
        if message.session < self.session {
            debug!(session = message.session, "stale session, dropping");
            return Ok(());
        }
        if !message.verify_auth() {
            debug!(sender = %message.sender, "bad message signature, dropping");
            return Ok(());
        }
        let sender_position = match self.config.validators().index_of(&message.sender) {
            Some(p) => p,
            None => return Err(ChainError::UnknownSender),
        };
        // duplicates are ignored entirely: no state change, no rebroadcast
        if !self.seen.insert(message.dedup_key()) {
            return Ok(());
        }
        // rebroadcast before local processing so propagation never depends
        // on this node handling the message correctly
        self.network.broadcast(&message, Some(&message.sender));

        // a later session means a peer is a run ahead; hold the message
        // until this node starts that session
        if message.session > self.session {
            debug!(session = message.session, "buffering future-session message");
            self.buffered.push(message);
            return Ok(());
        }

        match message.kind() {
            MessageKind::ThresholdRound | MessageKind::ThresholdResult => {
                if self.height >= self.config.hardfork_height() {
                    self.threshold_sink.deliver(&message);
                } else {
                    debug!(
                        height = self.height,
                        hardfork = self.config.hardfork_height(),
                        "threshold message before hardfork, dropping"
                    );
                }
                return Ok(());
            }
            MessageKind::Proposal | MessageKind::Vote => {}
        }

        if message.height > self.height
            || (message.height == self.height && message.round > self.round)
        {
            debug!(
                msg_height = message.height,
                msg_round = message.round,
                "buffering future message"
            );
            self.buffered.push(message);
            return Ok(());
        }
        if message.height < self.height || message.round < self.round {
            debug!(msg_height = message.height, msg_round = message.round, "stale, dropping");
            return Ok(());
        }
        self.apply(message, sender_position)
    }

    fn apply(&mut self, message: ConsensusMessage, sender_position: usize) -> Result<(), ChainError> {
        match message.payload.clone() {
            MessagePayload::Proposal {
                block_hash,
                header,
                header_signature,
            } => self.apply_proposal(message, sender_position, block_hash, header, header_signature),
            MessagePayload::Vote { block_hash } => {
                self.apply_vote(message, sender_position, block_hash)
            }
            MessagePayload::ThresholdRound { .. } | MessagePayload::ThresholdResult { .. } => {
                // routed to the threshold sink before ordering
                Ok(())
            }
        }
    }

    fn apply_proposal(
        &mut self,
        message: ConsensusMessage,
        sender_position: usize,
        block_hash: [u8; 32],
        header: BlockHeader,
        header_signature: k256::ecdsa::Signature,
    ) -> Result<(), ChainError> {
        if sender_position != self.proposer_position() {
            debug!(sender_position, "proposal from non-proposer, ignoring");
            return Ok(());
        }
        if let Some(existing) = &self.proposal {
            if existing.hash != block_hash {
                warn!(
                    height = self.height,
                    round = self.round,
                    "conflicting proposals from designated proposer"
                );
                self.state = ConsensusState::Faulted;
                return Err(ChainError::Equivocation {
                    height: self.height,
                    round: self.round,
                });
            }
            return Ok(());
        }
        if self.state != ConsensusState::AwaitingProposal {
            return Ok(());
        }
        if header.hash() != block_hash
            || header.height != self.height
            || !header.is_well_formed()
            || !keys::verify_with_id(&message.sender, &header.canonical_bytes(), &header_signature)
        {
            debug!("malformed proposal, ignoring");
            return Ok(());
        }
        info!(height = self.height, round = self.round, hash = %hex::encode(block_hash), "proposal accepted");
        self.proposal = Some(ProposalRecord {
            hash: block_hash,
            header,
            header_signature,
            proposer: sender_position,
        });
        // proposing is voting
        self.votes.insert(sender_position, block_hash);
        self.state = ConsensusState::Voting;
        self.try_decide()?;
        if self.state == ConsensusState::Voting {
            self.drain_buffered()?;
        }
        Ok(())
    }

    fn apply_vote(
        &mut self,
        message: ConsensusMessage,
        sender_position: usize,
        block_hash: [u8; 32],
    ) -> Result<(), ChainError> {
        match self.state {
            ConsensusState::Voting => {
                self.votes.entry(sender_position).or_insert(block_hash);
                self.try_decide()
            }
            ConsensusState::AwaitingProposal => {
                // vote outran its proposal
                self.buffered.push(message);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn try_decide(&mut self) -> Result<(), ChainError> {
        let record_hash = match &self.proposal {
            Some(record) => record.hash,
            None => return Ok(()),
        };
        let validators = self.config.validators();
        let votes_weight: u128 = self
            .votes
            .iter()
            .filter(|(_, hash)| **hash == record_hash)
            .map(|(position, _)| validators.weight_of(*position) as u128)
            .sum();
        if !quorum_reached(votes_weight, validators.total_weight()) {
            return Ok(());
        }
        self.state = ConsensusState::Deciding;
        info!(
            height = self.height,
            votes_weight,
            total = validators.total_weight(),
            "quorum reached"
        );
        self.commit()
    }

    fn commit(&mut self) -> Result<(), ChainError> {
        let record = match self.proposal.take() {
            Some(r) => r,
            None => return Ok(()),
        };
        let proposer_id = match self.config.validators().key_at(record.proposer) {
            Some(id) => *id,
            None => {
                self.state = ConsensusState::Faulted;
                return Err(ChainError::InvalidBlock(ValidationOutcome::WrongSigner));
            }
        };
        let block = Block {
            header: record.header,
            signer: Some(proposer_id),
            signature: Some(record.header_signature),
        };
        match self.block_manager.verify_signed_by(&block, &proposer_id) {
            ValidationOutcome::Valid => {}
            outcome => {
                self.state = ConsensusState::Faulted;
                return Err(ChainError::InvalidBlock(outcome));
            }
        }
        if let Err(e) = self.block_manager.persist(block.clone()) {
            self.state = ConsensusState::Faulted;
            return Err(e);
        }
        self.state = ConsensusState::Committed;
        info!(height = self.height, hash = %hex::encode(block.hash()), "block committed");
        self.last_committed = Some(block);

        // run is over; ready for the next height. Messages held for later
        // sessions survive into the next start
        self.height += 1;
        self.round = 0;
        self.votes.clear();
        self.seen.clear();
        self.state = ConsensusState::Idle;
        Ok(())
    }

    /// Single pass over buffered messages, applying those that now match
    /// the current session, height and round. Messages still ahead stay
    /// buffered; messages the run has moved past are dropped.
    fn drain_buffered(&mut self) -> Result<(), ChainError> {
        let pending = std::mem::take(&mut self.buffered);
        let mut result = Ok(());
        for message in pending {
            if matches!(
                message.kind(),
                MessageKind::ThresholdRound | MessageKind::ThresholdResult
            ) {
                if message.session > self.session {
                    self.buffered.push(message);
                } else if message.session == self.session
                    && self.height >= self.config.hardfork_height()
                {
                    self.threshold_sink.deliver(&message);
                }
                continue;
            }
            let current = message.session == self.session
                && message.height == self.height
                && message.round == self.round;
            let future = message.session > self.session
                || (message.session == self.session && message.height > self.height)
                || (message.session == self.session
                    && message.height == self.height
                    && message.round > self.round);
            if current {
                if result.is_ok() {
                    if let Some(position) = self.config.validators().index_of(&message.sender) {
                        result = self.apply(message, position);
                    }
                }
            } else if future {
                self.buffered.push(message);
            }
        }
        result
    }
}
