//! Downstream messages carried by a transaction's receipt.
//!
//! A leader's receipt may request follow-up work: calls into other managed
//! accounts (internal) or effects outside the engine (external). Each
//! message is tagged with the phase that releases it. Internal messages are
//! resubmitted by the engine as new transactions; external ones are handed
//! to a [`MessageDispatcher`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verdict_types::{Address, TxHash};

/// When a message is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessagePhase {
    /// As soon as the transaction is accepted.
    OnAcceptance,
    /// Only once the transaction is finalized.
    OnFinalization,
}

/// Where a message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Another managed account: becomes a new transaction.
    Internal,
    /// Outside the engine: handed to the dispatcher.
    External,
}

/// A follow-up action requested by a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamMessage {
    pub target: Address,
    pub payload: Vec<u8>,
    pub phase: MessagePhase,
    pub kind: MessageKind,
    /// Fees attached for the spawned transaction (internal messages).
    pub fee_deposit: u128,
}

impl DownstreamMessage {
    pub fn internal(target: Address, payload: Vec<u8>, phase: MessagePhase, fee_deposit: u128) -> Self {
        Self {
            target,
            payload,
            phase,
            kind: MessageKind::Internal,
            fee_deposit,
        }
    }

    pub fn external(target: Address, payload: Vec<u8>, phase: MessagePhase) -> Self {
        Self {
            target,
            payload,
            phase,
            kind: MessageKind::External,
            fee_deposit: 0,
        }
    }
}

/// Messages released in `phase`, in their original order.
pub fn for_phase(messages: &[DownstreamMessage], phase: MessagePhase) -> Vec<&DownstreamMessage> {
    messages.iter().filter(|m| m.phase == phase).collect()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher rejected message to {target}: {reason}")]
    Rejected { target: String, reason: String },

    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Delivers external messages.
pub trait MessageDispatcher: Send + Sync {
    /// Deliver one external message released by transaction `origin`.
    fn dispatch(&self, origin: &TxHash, message: &DownstreamMessage) -> Result<(), DispatchError>;
}

/// Dispatcher that drops every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardDispatcher;

impl MessageDispatcher for DiscardDispatcher {
    fn dispatch(&self, _origin: &TxHash, _message: &DownstreamMessage) -> Result<(), DispatchError> {
        Ok(())
    }
}
