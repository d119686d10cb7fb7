//! Structured event records emitted by every committed operation
use chrono::Utc;

use crate::error::Result;
use crate::roles::Capability;
use crate::types::{Amount, CorrelationId, Identity, PriceSample, TimeStamp};
use crate::utils;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum EventKind {
    #[n(0)]
    Paused,
    #[n(1)]
    Unpaused,
    #[n(2)]
    ValueRedirected {
        #[n(0)]
        sender: Identity,
        #[n(1)]
        destination: Identity,
        #[n(2)]
        amount: Amount,
        #[n(3)]
        cumulative: Amount,
    },
    #[n(3)]
    ThresholdUpdateRequested {
        #[n(0)]
        correlation_id: CorrelationId,
    },
    #[n(4)]
    ThresholdChanged {
        #[n(0)]
        previous: Amount,
        #[n(1)]
        current: Amount,
        #[n(2)]
        price: Option<PriceSample>, // None for administrative overrides
    },
    #[n(5)]
    DepositorTransferIntent {
        #[n(0)]
        destination: Identity,
        #[n(1)]
        amount: Amount,
    },
    #[n(6)]
    TransferRequested {
        #[n(0)]
        id: u64,
        #[n(1)]
        destination: Identity,
        #[n(2)]
        amount: Amount,
        #[n(3)]
        primary_approved: bool,
        #[n(4)]
        executor_approved: bool,
    },
    #[n(7)]
    TransferApproved {
        #[n(0)]
        id: u64,
        #[n(1)]
        capability: Capability,
        #[n(2)]
        primary_approved: bool,
        #[n(3)]
        executor_approved: bool,
    },
    #[n(8)]
    TransferExecuted {
        #[n(0)]
        id: u64,
        #[n(1)]
        destination: Identity,
        #[n(2)]
        amount: Amount,
    },
    #[n(9)]
    ExecutorRotated {
        #[n(0)]
        previous: Identity,
        #[n(1)]
        current: Identity,
    },
    #[n(10)]
    FundsWithdrawn {
        #[n(0)]
        destination: Identity,
        #[n(1)]
        value: Amount,
        #[n(2)]
        asset: Amount,
    },
    #[n(11)]
    EmergencySweepRequested {
        #[n(0)]
        depositor: Identity,
        #[n(1)]
        balance: Amount,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Paused => "paused",
            EventKind::Unpaused => "unpaused",
            EventKind::ValueRedirected { .. } => "value_redirected",
            EventKind::ThresholdUpdateRequested { .. } => "threshold_update_requested",
            EventKind::ThresholdChanged { .. } => "threshold_changed",
            EventKind::DepositorTransferIntent { .. } => "depositor_transfer_intent",
            EventKind::TransferRequested { .. } => "transfer_requested",
            EventKind::TransferApproved { .. } => "transfer_approved",
            EventKind::TransferExecuted { .. } => "transfer_executed",
            EventKind::ExecutorRotated { .. } => "executor_rotated",
            EventKind::FundsWithdrawn { .. } => "funds_withdrawn",
            EventKind::EmergencySweepRequested { .. } => "emergency_sweep_requested",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct EventRecord {
    #[n(0)]
    pub seq: u64,
    #[n(1)]
    pub operation: String,
    #[n(2)]
    pub actor: Identity,
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
    #[n(4)]
    pub kind: EventKind,
}

impl EventRecord {
    pub fn new(
        seq: u64,
        operation: impl Into<String>,
        actor: Identity,
        timestamp: TimeStamp<Utc>,
        kind: EventKind,
    ) -> Self {
        Self {
            seq,
            operation: operation.into(),
            actor,
            timestamp,
            kind,
        }
    }
    /// CBOR encoding of the record and its sha256 digest.
    pub fn build(&self) -> Result<(String, Vec<u8>)> {
        utils::encode_with_digest(self)
    }
}

/// An event read back from the log together with the sha256 digest it was
/// committed under. The digest is checked against the stored bytes on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEvent {
    pub digest: String,
    pub record: EventRecord,
}
