//! Authenticated consensus messages.
//!
//! Every message is signed by its originator over a domain-tagged encoding
//! of `(kind, height, round, session, payload)`. Per sender, rounds only
//! move forward; the state machine enforces ordering, this module supplies
//! the authentication and a stable dedup key.

use k256::ecdsa::Signature;
use sha2::{Digest, Sha256};

use hermes_mpc::ValidatorId;

use crate::block::BlockHeader;
use crate::keys::{self, KeyPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Proposal,
    Vote,
    ThresholdRound,
    ThresholdResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// A full header plus its hash; the hash is what votes reference. The
    /// proposer's signature over the header travels with the proposal so
    /// any node can assemble the final signed block on commit.
    Proposal {
        block_hash: [u8; 32],
        header: BlockHeader,
        header_signature: Signature,
    },
    Vote { block_hash: [u8; 32] },
    /// Opaque threshold-protocol round data, carried for the engine.
    ThresholdRound { data: Vec<u8> },
    /// A combined threshold signature produced by a completed run.
    ThresholdResult { signature: Vec<u8> },
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Proposal { .. } => MessageKind::Proposal,
            MessagePayload::Vote { .. } => MessageKind::Vote,
            MessagePayload::ThresholdRound { .. } => MessageKind::ThresholdRound,
            MessagePayload::ThresholdResult { .. } => MessageKind::ThresholdResult,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            MessagePayload::Proposal {
                block_hash,
                header,
                header_signature,
            } => {
                out.push(0);
                out.extend_from_slice(block_hash);
                out.extend_from_slice(&header.canonical_bytes());
                out.extend_from_slice(header_signature.to_bytes().as_slice());
            }
            MessagePayload::Vote { block_hash } => {
                out.push(1);
                out.extend_from_slice(block_hash);
            }
            MessagePayload::ThresholdRound { data } => {
                out.push(2);
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                out.extend_from_slice(data);
            }
            MessagePayload::ThresholdResult { signature } => {
                out.push(3);
                out.extend_from_slice(&(signature.len() as u32).to_be_bytes());
                out.extend_from_slice(signature);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub height: u64,
    pub round: u32,
    /// Identifies one run; messages from an aborted run never apply to its
    /// successor even at the same height.
    pub session: u64,
    pub sender: ValidatorId,
    pub payload: MessagePayload,
    signature: Signature,
}

impl ConsensusMessage {
    pub fn signed(
        height: u64,
        round: u32,
        session: u64,
        keypair: &KeyPair,
        payload: MessagePayload,
    ) -> Self {
        let sender = keypair.validator_id();
        let bytes = signing_bytes(height, round, session, &sender, &payload);
        let signature = keypair.sign(&bytes);
        Self {
            height,
            round,
            session,
            sender,
            payload,
            signature,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Check the originator's signature. Pure; membership in the validator
    /// set is the state machine's call.
    pub fn verify_auth(&self) -> bool {
        let bytes = signing_bytes(
            self.height,
            self.round,
            self.session,
            &self.sender,
            &self.payload,
        );
        keys::verify_with_id(&self.sender, &bytes, &self.signature)
    }

    /// Stable identity for duplicate suppression.
    pub fn dedup_key(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(signing_bytes(
            self.height,
            self.round,
            self.session,
            &self.sender,
            &self.payload,
        ));
        hasher.finalize().into()
    }
}

fn signing_bytes(
    height: u64,
    round: u32,
    session: u64,
    sender: &ValidatorId,
    payload: &MessagePayload,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(b"hermes-consensus/v1");
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&round.to_be_bytes());
    out.extend_from_slice(&session.to_be_bytes());
    out.extend_from_slice(&sender.0);
    payload.encode_into(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn vote(pair: &KeyPair) -> ConsensusMessage {
        ConsensusMessage::signed(
            10,
            0,
            1,
            pair,
            MessagePayload::Vote {
                block_hash: [3u8; 32],
            },
        )
    }

    #[test]
    fn test_auth_roundtrip() {
        let pair = KeyPair::generate(&mut OsRng);
        assert!(vote(&pair).verify_auth());
    }

    #[test]
    fn test_tampered_fields_fail_auth() {
        let pair = KeyPair::generate(&mut OsRng);

        let mut wrong_height = vote(&pair);
        wrong_height.height = 11;
        assert!(!wrong_height.verify_auth());

        let mut wrong_payload = vote(&pair);
        wrong_payload.payload = MessagePayload::Vote {
            block_hash: [4u8; 32],
        };
        assert!(!wrong_payload.verify_auth());

        let mut wrong_sender = vote(&pair);
        wrong_sender.sender = KeyPair::generate(&mut OsRng).validator_id();
        assert!(!wrong_sender.verify_auth());
    }

    #[test]
    fn test_dedup_key_distinguishes_session() {
        let pair = KeyPair::generate(&mut OsRng);
        let a = vote(&pair);
        let mut b = a.clone();
        b.session = 2;
        assert_ne!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), a.clone().dedup_key());
    }
}
