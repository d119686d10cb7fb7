//! The single owned aggregate every operation reads and stages
use crate::breaker::CircuitBreaker;
use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::events::EventKind;
use crate::redirect::{RedirectionGate, RedirectionState};
use crate::roles::{Capability, RoleRegistry};
use crate::threshold::ThresholdController;
use crate::types::Identity;
use crate::workflow::{ApprovalWorkflow, Approver};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CustodyState {
    #[n(0)]
    pub controller: Identity,
    #[n(1)]
    pub depositor: Identity,
    #[n(2)]
    pub service_account: Identity,
    #[n(3)]
    pub oracle: Identity,
    #[n(4)]
    pub roles: RoleRegistry,
    #[n(5)]
    pub breaker: CircuitBreaker,
    #[n(6)]
    pub threshold: ThresholdController,
    #[n(7)]
    pub redirection: RedirectionGate,
    #[n(8)]
    pub workflow: ApprovalWorkflow,
    #[n(9)]
    pub next_event_seq: u64,
}

impl CustodyState {
    /// Fresh state for a new deployment.
    pub fn genesis(config: &CustodyConfig) -> Result<Self> {
        config.validate()?;

        let mut roles = RoleRegistry::new();
        roles.grant(Capability::Admin, config.controller.clone());
        roles.grant(Capability::Pauser, config.controller.clone());
        roles.grant(Capability::Executor, config.executor.clone());

        Ok(Self {
            controller: config.controller.clone(),
            depositor: config.depositor.clone(),
            service_account: config.service_account.clone(),
            oracle: config.oracle.clone(),
            roles,
            breaker: CircuitBreaker::default(),
            threshold: ThresholdController::new(config.baseline_threshold)?,
            redirection: RedirectionGate::default(),
            workflow: ApprovalWorkflow::new(),
            next_event_seq: 1,
        })
    }

    pub fn require(&self, capability: Capability, caller: &Identity) -> Result<()> {
        if self.roles.has(capability, caller) {
            return Ok(());
        }
        Err(CustodyError::NotAuthorized {
            caller: caller.clone(),
            capability,
        })
    }

    /// Which approval flag the caller speaks for. Admin is considered first.
    pub fn approver_for(&self, caller: &Identity) -> Result<Approver> {
        if self.roles.has(Capability::Admin, caller) {
            return Ok(Approver::Primary);
        }
        if self.roles.has(Capability::Executor, caller) {
            return Ok(Approver::Executor);
        }
        Err(CustodyError::NotApprover {
            caller: caller.clone(),
        })
    }

    pub fn executor(&self) -> Option<Identity> {
        self.roles.holders(Capability::Executor).into_iter().next()
    }

    pub fn is_reserved(&self, identity: &Identity) -> bool {
        [&self.controller, &self.depositor, &self.service_account, &self.oracle].contains(&identity)
    }

    pub fn redirection_state(&self) -> RedirectionState {
        RedirectionState {
            threshold: self.threshold.current(),
            cumulative_redirected: self.redirection.cumulative_redirected(),
            last_event_timestamp: self.redirection.last_event_timestamp().cloned(),
        }
    }
}

/// A staged copy of the state plus the events it will publish. Nothing here is
/// visible until the service commits it.
#[derive(Debug)]
pub struct Transition {
    pub operation: &'static str,
    pub actor: Identity,
    pub state: CustodyState,
    pub events: Vec<EventKind>,
}

impl Transition {
    pub fn new(operation: &'static str, actor: Identity, state: CustodyState) -> Self {
        Self {
            operation,
            actor,
            state,
            events: vec![],
        }
    }

    pub fn emit(&mut self, kind: EventKind) {
        self.events.push(kind);
    }
}
