//! Dual-control transfer requests
//!
//! A request is created already carrying its creator's approval and waits for the
//! other side. Both flags set means execution, which happens exactly once and is
//! terminal: there is no cancel and no expiry.
use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::{CustodyError, Result};
use crate::roles::Capability;
use crate::types::{Amount, Identity, TimeStamp};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TransferRequest {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub requester: Identity,
    #[n(2)]
    pub destination: Identity,
    #[n(3)]
    pub amount: Amount,
    #[n(4)]
    pub primary_approved: bool,
    #[n(5)]
    pub executor_approved: bool,
    #[n(6)]
    pub executed: bool,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub executed_at: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending { primary: bool, executor: bool },
    Executed,
}

impl TransferRequest {
    pub fn status(&self) -> RequestStatus {
        if self.executed {
            return RequestStatus::Executed;
        }
        RequestStatus::Pending {
            primary: self.primary_approved,
            executor: self.executor_approved,
        }
    }

    pub fn is_fully_approved(&self) -> bool {
        self.primary_approved && self.executor_approved
    }

    pub fn approved_by(&self, approver: Approver) -> bool {
        match approver {
            Approver::Primary => self.primary_approved,
            Approver::Executor => self.executor_approved,
        }
    }

    fn flag_mut(&mut self, approver: Approver) -> &mut bool {
        match approver {
            Approver::Primary => &mut self.primary_approved,
            Approver::Executor => &mut self.executor_approved,
        }
    }
}

/// The two approval categories. Each maps to one flag on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Approver {
    #[n(0)]
    Primary,
    #[n(1)]
    Executor,
}

impl Approver {
    pub fn capability(self) -> Capability {
        match self {
            Approver::Primary => Capability::Admin,
            Approver::Executor => Capability::Executor,
        }
    }
}

/// Exclusive owner of the request table.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalWorkflow {
    #[n(0)]
    next_id: u64,
    #[n(1)]
    requests: BTreeMap<u64, TransferRequest>,
}

impl Default for ApprovalWorkflow {
    fn default() -> Self {
        // id 0 means "does not exist"
        Self {
            next_id: 1,
            requests: BTreeMap::new(),
        }
    }
}

impl ApprovalWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request with the creator's flag already set. Returns the new id.
    pub fn create(
        &mut self,
        requester: Identity,
        approver: Approver,
        destination: Identity,
        amount: Amount,
        at: TimeStamp<Utc>,
    ) -> Result<u64> {
        validate_request(&destination, amount)?;

        let id = self.next_id;
        let mut request = TransferRequest {
            id,
            requester,
            destination,
            amount,
            primary_approved: false,
            executor_approved: false,
            executed: false,
            created_at: at,
            executed_at: None,
        };
        *request.flag_mut(approver) = true;

        self.next_id = id.checked_add(1).ok_or(CustodyError::Overflow("request id"))?;
        self.requests.insert(id, request);
        Ok(id)
    }

    /// Set the approver's flag. Returns true once the request is ready to execute.
    pub fn approve(&mut self, id: u64, approver: Approver) -> Result<bool> {
        let request = self.live_mut(id)?;
        if request.executed {
            return Err(CustodyError::AlreadyExecuted(id));
        }
        let flag = request.flag_mut(approver);
        if *flag {
            return Err(CustodyError::AlreadyApproved {
                id,
                capability: approver.capability(),
            });
        }
        *flag = true;

        Ok(request.is_fully_approved())
    }

    /// Flip `executed` ahead of the outbound transfer. Crate private so execution
    /// can only be reached through approval.
    pub(crate) fn mark_executed(&mut self, id: u64, at: TimeStamp<Utc>) -> Result<&TransferRequest> {
        let request = self.live_mut(id)?;
        if request.executed {
            return Err(CustodyError::AlreadyExecuted(id));
        }
        if !request.is_fully_approved() {
            return Err(CustodyError::NotFullyApproved(id));
        }
        request.executed = true;
        request.executed_at = Some(at);

        Ok(request)
    }

    pub fn get(&self, id: u64) -> Option<&TransferRequest> {
        // zero amount records are indistinguishable from missing ones
        self.requests.get(&id).filter(|r| r.amount > 0)
    }

    pub fn requests(&self) -> impl Iterator<Item = &TransferRequest> {
        self.requests.values().filter(|r| r.amount > 0)
    }

    pub fn pending(&self) -> impl Iterator<Item = &TransferRequest> {
        self.requests().filter(|r| !r.executed)
    }

    pub fn len(&self) -> usize {
        self.requests().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_mut(&mut self, id: u64) -> Result<&mut TransferRequest> {
        self.requests
            .get_mut(&id)
            .filter(|r| r.amount > 0)
            .ok_or(CustodyError::RequestNotFound(id))
    }
}

pub(crate) fn validate_request(destination: &Identity, amount: Amount) -> Result<()> {
    if amount == 0 {
        return Err(CustodyError::ZeroAmount);
    }
    if destination.is_zero() {
        return Err(CustodyError::ZeroIdentity);
    }
    Ok(())
}
