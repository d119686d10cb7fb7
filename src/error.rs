use crate::roles::Capability;
use crate::types::{Amount, CorrelationId, Identity, PriceSample};

pub type Result<T> = std::result::Result<T, CustodyError>;

/// Coarse classification used by callers to branch on the cause of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    State,
    Validation,
    Collaborator,
    Storage,
}

#[derive(thiserror::Error, Debug)]
pub enum CustodyError {
    // authorization
    #[error("{caller} lacks the {capability:?} capability")]
    NotAuthorized {
        caller: Identity,
        capability: Capability,
    },
    #[error("{caller} holds neither Admin nor Executor")]
    NotApprover { caller: Identity },
    #[error("No unsolicited deposits: {sender} is not the restricted depositor")]
    UnsolicitedDeposit { sender: Identity },
    #[error("Sender {sender} is contract controlled or proxied through {origin}")]
    ContractSender { sender: Identity, origin: Identity },
    #[error("The restricted depositor cannot originate transfers, intent was recorded")]
    DepositorCannotOriginate,
    #[error("{caller} is not the price oracle")]
    NotOracle { caller: Identity },

    // state
    #[error("System is paused")]
    Paused,
    #[error("System is not paused")]
    NotPaused,
    #[error("Reentrant call rejected")]
    Reentrant,
    #[error("Transfer request {0} does not exist")]
    RequestNotFound(u64),
    #[error("Transfer request {0} has already been executed")]
    AlreadyExecuted(u64),
    #[error("Transfer request {0} lacks one of its two approvals")]
    NotFullyApproved(u64),
    #[error("Transfer request {id} already carries the {capability:?} approval")]
    AlreadyApproved { id: u64, capability: Capability },
    #[error("No pending oracle request for correlation id {0}")]
    UnknownCorrelation(CorrelationId),

    // validation
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Identity must not be the zero identity")]
    ZeroIdentity,
    #[error("{0} is a reserved identity")]
    ReservedIdentity(Identity),
    #[error("{0} already holds a capability")]
    IdentityHasRole(Identity),
    #[error("Amount {amount} is below the redirection threshold {threshold}")]
    BelowThreshold { amount: Amount, threshold: Amount },
    #[error("Price sample {0} must be positive")]
    InvalidPrice(PriceSample),
    #[error("Threshold {0} is invalid")]
    InvalidThreshold(u128),
    #[error("Nothing to withdraw")]
    NothingToWithdraw,
    #[error("Depositor balance is zero")]
    EmptyDepositorBalance,
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // collaborators
    #[error("Collaborator call {leg} failed: {source}")]
    Collaborator {
        leg: &'static str,
        #[source]
        source: anyhow::Error,
    },

    // persistence
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Stored record {key} does not match its digest")]
    DigestMismatch { key: String },
}

impl CustodyError {
    pub fn collaborator(leg: &'static str, source: anyhow::Error) -> Self {
        CustodyError::Collaborator { leg, source }
    }

    pub fn kind(&self) -> ErrorKind {
        use CustodyError::*;
        match self {
            NotAuthorized { .. }
            | NotApprover { .. }
            | UnsolicitedDeposit { .. }
            | ContractSender { .. }
            | DepositorCannotOriginate
            | NotOracle { .. } => ErrorKind::Authorization,
            Paused
            | NotPaused
            | Reentrant
            | RequestNotFound(_)
            | AlreadyExecuted(_)
            | NotFullyApproved(_)
            | AlreadyApproved { .. }
            | UnknownCorrelation(_) => ErrorKind::State,
            ZeroAmount
            | ZeroIdentity
            | ReservedIdentity(_)
            | IdentityHasRole(_)
            | BelowThreshold { .. }
            | InvalidPrice(_)
            | InvalidThreshold(_)
            | NothingToWithdraw
            | EmptyDepositorBalance
            | Overflow(_)
            | InvalidConfig(_) => ErrorKind::Validation,
            Collaborator { .. } => ErrorKind::Collaborator,
            Storage(_) | Encoding(_) | DigestMismatch { .. } => ErrorKind::Storage,
        }
    }

    /// Stable machine readable reason code. These never change between releases.
    pub fn reason(&self) -> &'static str {
        use CustodyError::*;
        match self {
            NotAuthorized { .. } => "not_authorized",
            NotApprover { .. } => "not_approver",
            UnsolicitedDeposit { .. } => "unsolicited_deposit",
            ContractSender { .. } => "contract_sender",
            DepositorCannotOriginate => "depositor_cannot_originate",
            NotOracle { .. } => "not_oracle",
            Paused => "paused",
            NotPaused => "not_paused",
            Reentrant => "reentrant_call",
            RequestNotFound(_) => "request_not_found",
            AlreadyExecuted(_) => "already_executed",
            NotFullyApproved(_) => "not_fully_approved",
            AlreadyApproved { .. } => "already_approved",
            UnknownCorrelation(_) => "unknown_correlation",
            ZeroAmount => "zero_amount",
            ZeroIdentity => "zero_identity",
            ReservedIdentity(_) => "reserved_identity",
            IdentityHasRole(_) => "identity_has_role",
            BelowThreshold { .. } => "below_threshold",
            InvalidPrice(_) => "invalid_price",
            InvalidThreshold(_) => "invalid_threshold",
            NothingToWithdraw => "nothing_to_withdraw",
            EmptyDepositorBalance => "empty_depositor_balance",
            Overflow(_) => "overflow",
            InvalidConfig(_) => "invalid_config",
            Collaborator { .. } => "collaborator_failure",
            Storage(_) => "storage",
            Encoding(_) => "encoding",
            DigestMismatch { .. } => "digest_mismatch",
        }
    }
}
