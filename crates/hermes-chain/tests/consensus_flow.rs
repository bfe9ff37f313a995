//! End-to-end consensus runs over recorded collaborators: a capturing
//! network, a capturing threshold sink and in-memory storage.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::OsRng;

use hermes_chain::{
    quorum_reached, Block, BlockHeader, BlockManager, ChainError, ConsensusConfig,
    ConsensusManager, ConsensusMessage, ConsensusState, KeyPair, MemoryStorage, MessageKind,
    MessagePayload, Network, Storage, ThresholdSink,
};
use hermes_mpc::{ValidatorId, ValidatorSet};

#[derive(Clone, Default)]
struct RecordingNetwork {
    sent: Rc<RefCell<Vec<ConsensusMessage>>>,
}

impl Network for RecordingNetwork {
    fn broadcast(&mut self, message: &ConsensusMessage, _exclude: Option<&ValidatorId>) {
        self.sent.borrow_mut().push(message.clone());
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    delivered: Rc<RefCell<Vec<MessageKind>>>,
}

impl ThresholdSink for RecordingSink {
    fn deliver(&mut self, message: &ConsensusMessage) {
        self.delivered.borrow_mut().push(message.kind());
    }
}

struct Harness {
    manager: ConsensusManager<RecordingNetwork, RecordingSink, MemoryStorage>,
    pairs: Vec<KeyPair>,
    sent: Rc<RefCell<Vec<ConsensusMessage>>>,
    delivered: Rc<RefCell<Vec<MessageKind>>>,
}

fn harness(n: usize, own: usize, hardfork: u64) -> Harness {
    let pairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut OsRng)).collect();
    let set = ValidatorSet::new(pairs.iter().map(|p| p.validator_id()).collect()).unwrap();
    let config = ConsensusConfig::builder()
        .validators(set.clone())
        .keypair(pairs[own].clone())
        .threshold(2)
        .round_timeout(Duration::from_secs(1))
        .hardfork_height(hardfork)
        .unwrap()
        .build()
        .unwrap();
    let network = RecordingNetwork::default();
    let sink = RecordingSink::default();
    let sent = network.sent.clone();
    let delivered = sink.delivered.clone();
    Harness {
        manager: ConsensusManager::new(
            config,
            BlockManager::new(set, MemoryStorage::default()),
            network,
            sink,
        ),
        pairs,
        sent,
        delivered,
    }
}

fn header(height: u64) -> BlockHeader {
    BlockHeader {
        parent: [0x11; 32],
        height,
        timestamp: 1_700_000_000_000 + height,
        merkle_root: [0x22; 32],
    }
}

fn proposal(h: &Harness, from: usize, round: u32, hdr: BlockHeader) -> ConsensusMessage {
    proposal_in_session(h, from, round, hdr, h.manager.session())
}

fn proposal_in_session(
    h: &Harness,
    from: usize,
    round: u32,
    hdr: BlockHeader,
    session: u64,
) -> ConsensusMessage {
    let pair = &h.pairs[from];
    let header_signature = pair.sign(&hdr.canonical_bytes());
    ConsensusMessage::signed(
        hdr.height,
        round,
        session,
        pair,
        MessagePayload::Proposal {
            block_hash: hdr.hash(),
            header: hdr,
            header_signature,
        },
    )
}

fn vote(h: &Harness, from: usize, height: u64, round: u32, block_hash: [u8; 32]) -> ConsensusMessage {
    ConsensusMessage::signed(
        height,
        round,
        h.manager.session(),
        &h.pairs[from],
        MessagePayload::Vote { block_hash },
    )
}

// 4 equal-weight validators: proposer + 2 votes is 75% > 2/3, commits.
#[test]
fn quorum_of_three_commits_and_advances_height() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();
    assert_eq!(h.manager.proposer_position(), 2);

    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.handle_message(proposal(&h, 2, 0, hdr)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Voting);

    h.manager.handle_message(vote(&h, 1, 10, 0, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Voting);

    h.manager.handle_message(vote(&h, 3, 10, 0, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Idle);
    assert_eq!(h.manager.height(), 11);

    let committed = h.manager.last_committed().unwrap();
    assert_eq!(committed.hash(), hash);
    assert!(h
        .manager
        .block_manager()
        .storage()
        .get_block_by_hash(&hash)
        .is_some());
}

// proposer + 1 vote is 50%: below quorum, the run waits, timeout rotates.
#[test]
fn half_weight_stays_voting_until_round_change() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.handle_message(proposal(&h, 2, 0, hdr)).unwrap();
    h.manager.handle_message(vote(&h, 1, 10, 0, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Voting);

    h.manager.on_timeout().unwrap();
    assert_eq!(h.manager.state(), ConsensusState::AwaitingProposal);
    assert_eq!(h.manager.round(), 1);
    assert_eq!(h.manager.proposer_position(), 3);
}

#[test]
fn redelivered_message_changes_nothing_and_is_not_rebroadcast() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.handle_message(proposal(&h, 2, 0, hdr)).unwrap();
    let v = vote(&h, 1, 10, 0, hash);
    h.manager.handle_message(v.clone()).unwrap();

    let broadcasts = h.sent.borrow().len();
    let state = h.manager.state();
    h.manager.handle_message(v).unwrap();
    assert_eq!(h.sent.borrow().len(), broadcasts);
    assert_eq!(h.manager.state(), state);
}

#[test]
fn conflicting_proposals_fault_the_run() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    h.manager.handle_message(proposal(&h, 2, 0, header(10))).unwrap();
    let mut other = header(10);
    other.merkle_root = [0x33; 32];
    let result = h.manager.handle_message(proposal(&h, 2, 0, other));
    assert_eq!(
        result,
        Err(ChainError::Equivocation {
            height: 10,
            round: 0
        })
    );
    assert_eq!(h.manager.state(), ConsensusState::Faulted);

    // a faulted run ignores everything
    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.handle_message(vote(&h, 1, 10, 0, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Faulted);
}

#[test]
fn threshold_messages_gated_by_hardfork_height() {
    let mut before = harness(4, 0, 100);
    before.manager.start(10, 1).unwrap();
    let msg = ConsensusMessage::signed(
        10,
        0,
        before.manager.session(),
        &before.pairs[1],
        MessagePayload::ThresholdRound { data: vec![1, 2, 3] },
    );
    before.manager.handle_message(msg).unwrap();
    assert!(before.delivered.borrow().is_empty());

    let mut after = harness(4, 0, 5);
    after.manager.start(10, 1).unwrap();
    let msg = ConsensusMessage::signed(
        10,
        0,
        after.manager.session(),
        &after.pairs[1],
        MessagePayload::ThresholdRound { data: vec![1, 2, 3] },
    );
    after.manager.handle_message(msg).unwrap();
    assert_eq!(&*after.delivered.borrow(), &[MessageKind::ThresholdRound]);
}

#[test]
fn aborted_session_messages_cannot_reach_the_next_run() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();
    let stale = vote(&h, 1, 10, 0, [0x44; 32]);

    h.manager.abort();
    h.manager.start(10, 2).unwrap();

    let broadcasts = h.sent.borrow().len();
    h.manager.handle_message(stale).unwrap();
    // fenced out before rebroadcast or state change
    assert_eq!(h.sent.borrow().len(), broadcasts);
    assert_eq!(h.manager.state(), ConsensusState::AwaitingProposal);
}

// a peer one commit ahead proposes the next height under the session the
// committee will share next; the proposal must survive until this node
// starts that run
#[test]
fn proposal_from_the_next_height_is_held_until_that_run_starts() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    let hdr = header(11);
    let hash = hdr.hash();
    // proposer position for height 11 round 0 is (11 + 0) % 4 = 3
    h.manager
        .handle_message(proposal_in_session(&h, 3, 0, hdr, 2))
        .unwrap();
    assert_eq!(h.manager.state(), ConsensusState::AwaitingProposal);
    assert_eq!(h.manager.height(), 10);

    h.manager.start(11, 2).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Voting);
    assert_eq!(h.manager.round(), 0);

    let v3 = vote(&h, 1, 11, 0, hash);
    let v4 = vote(&h, 2, 11, 0, hash);
    h.manager.handle_message(v3).unwrap();
    h.manager.handle_message(v4).unwrap();
    assert_eq!(h.manager.height(), 12);
}

#[test]
fn future_round_votes_are_buffered_then_counted() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    let hdr = header(10);
    let hash = hdr.hash();
    // votes for round 1 arrive while round 0 is still open
    h.manager.handle_message(vote(&h, 1, 10, 1, hash)).unwrap();
    h.manager.handle_message(vote(&h, 0, 10, 1, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::AwaitingProposal);

    h.manager.on_timeout().unwrap();
    assert_eq!(h.manager.round(), 1);
    assert_eq!(h.manager.proposer_position(), 3);

    // proposer of round 1 proposes; the buffered votes complete the quorum
    h.manager.handle_message(proposal(&h, 3, 1, hdr)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Idle);
    assert_eq!(h.manager.height(), 11);
}

#[test]
fn designated_proposer_proposes_and_fires_signed_event() {
    let mut h = harness(4, 2, 0);
    let signed = Arc::new(AtomicUsize::new(0));
    let counter = signed.clone();
    h.manager.block_manager_mut().on_signed(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    h.manager.start(10, 1).unwrap();
    assert_eq!(h.manager.proposer_position(), 2);
    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.propose(hdr).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Voting);
    assert_eq!(signed.load(Ordering::SeqCst), 1);
    assert_eq!(h.sent.borrow().len(), 1);

    h.manager.handle_message(vote(&h, 1, 10, 0, hash)).unwrap();
    h.manager.handle_message(vote(&h, 3, 10, 0, hash)).unwrap();
    assert_eq!(h.manager.state(), ConsensusState::Idle);
    let committed = h.manager.last_committed().unwrap();
    assert_eq!(committed.signer, Some(h.pairs[2].validator_id()));
}

#[test]
fn committed_block_is_signed_by_the_proposer() {
    let mut h = harness(4, 0, 0);
    h.manager.start(10, 1).unwrap();

    let hdr = header(10);
    let hash = hdr.hash();
    h.manager.handle_message(proposal(&h, 2, 0, hdr)).unwrap();
    h.manager.handle_message(vote(&h, 1, 10, 0, hash)).unwrap();
    h.manager.handle_message(vote(&h, 3, 10, 0, hash)).unwrap();

    let committed: &Block = h.manager.last_committed().unwrap();
    assert_eq!(committed.signer, Some(h.pairs[2].validator_id()));
    assert!(committed.signature.is_some());
}

proptest! {
    // exact boundary of the two-thirds rule: 2w/3 never decides,
    // 2w/3 + 1 always does
    #[test]
    fn quorum_boundary_is_exact(w in 1u128..1_000_000) {
        let boundary = 2 * w / 3;
        prop_assert!(!quorum_reached(boundary, w));
        prop_assert!(quorum_reached(boundary + 1, w));
    }

    #[test]
    fn quorum_is_monotone(v in 0u128..1_000_000, w in 1u128..1_000_000) {
        if quorum_reached(v, w) {
            prop_assert!(quorum_reached(v + 1, w));
        }
    }
}
