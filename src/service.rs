//! Service layer API for custody operations
//!
//! Every mutating operation runs the same way:
//! 1. check the breaker
//! 2. take the reentrancy guard, waiting for calls from other threads
//!    and rejecting nested calls from this one
//! 3. stage a copy of the state
//! 4. validate and mutate the copy, calling collaborators
//! 5. commit the copy and its events in one sled batch
//!
//! Any failure before the commit drops the staged copy, so callers never
//! observe a partial mutation.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::events::{CommittedEvent, EventKind, EventRecord};
use crate::guard::ReentrancyGuard;
use crate::ledger::{AssetLedger, PriceOracle, ValueLedger};
use crate::redirect::RedirectionState;
use crate::roles::Capability;
use crate::state::{CustodyState, Transition};
use crate::store::Store;
use crate::types::{Amount, CorrelationId, Identity, PriceSample, TimeStamp};
use crate::workflow::{Approver, TransferRequest};

/// The external parties the service moves value through.
#[derive(Clone)]
pub struct Collaborators {
    pub value: Arc<dyn ValueLedger>,
    pub asset: Arc<dyn AssetLedger>,
    pub oracle: Arc<dyn PriceOracle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Fails with `Paused` while the breaker is open
    Running,
    /// Only `unpause` and `pause` themselves bypass the running check
    Any,
}

pub struct CustodyService {
    store: Store,
    state: Mutex<CustodyState>,
    guard: ReentrancyGuard,
    collaborators: Collaborators,
    config: CustodyConfig,
}

impl CustodyService {
    /// Open the service on a sled instance. An empty database is initialised from
    /// `config`; an existing one keeps its persisted state.
    pub fn open(
        instance: Arc<sled::Db>,
        config: CustodyConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let store = Store::new(instance);

        let state = match store.load_state()? {
            Some(state) => {
                info!(
                    controller = %state.controller,
                    requests = state.workflow.len(),
                    "restored custody state"
                );
                state
            }
            None => {
                let state = CustodyState::genesis(&config)?;
                store.commit(&state, &[])?;
                info!(controller = %state.controller, depositor = %state.depositor, "initialised custody state");
                state
            }
        };

        Ok(Self {
            store,
            state: Mutex::new(state),
            guard: ReentrancyGuard::new(),
            collaborators,
            config,
        })
    }

    // the in-memory state is only ever replaced whole, poisoning cannot expose a partial write
    fn lock_state(&self) -> MutexGuard<'_, CustodyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&CustodyState) -> T) -> T {
        f(&self.lock_state())
    }

    fn run<T>(
        &self,
        operation: &'static str,
        caller: &Identity,
        gate: Gate,
        body: impl FnOnce(&mut Transition) -> Result<T>,
    ) -> Result<T> {
        let result = (|| -> Result<T> {
            if gate == Gate::Running {
                self.read(|s| s.breaker.ensure_running())?;
            }
            let _token = self.guard.enter()?;
            let mut tx = self.begin(operation, caller);
            // another thread may have paused while this call was queued
            if gate == Gate::Running {
                tx.state.breaker.ensure_running()?;
            }
            let value = body(&mut tx)?;
            self.commit(tx)?;
            Ok(value)
        })();

        if let Err(err) = &result {
            warn!(
                operation,
                caller = %caller,
                reason = err.reason(),
                error = %err,
                "operation rejected"
            );
        }
        result
    }

    fn begin(&self, operation: &'static str, caller: &Identity) -> Transition {
        Transition::new(operation, caller.clone(), self.lock_state().clone())
    }

    fn commit(&self, tx: Transition) -> Result<()> {
        let Transition {
            operation,
            actor,
            mut state,
            events,
        } = tx;

        let now = TimeStamp::new();
        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|kind| {
                let seq = state.next_event_seq;
                state.next_event_seq += 1;
                EventRecord::new(seq, operation, actor.clone(), now.clone(), kind)
            })
            .collect();

        self.store.commit(&state, &records)?;
        *self.lock_state() = state;

        for record in &records {
            info!(
                operation,
                seq = record.seq,
                actor = %record.actor,
                event = record.kind.name(),
                detail = ?record.kind,
                "committed"
            );
        }
        Ok(())
    }

    // CIRCUIT BREAKER

    pub fn pause(&self, caller: &Identity) -> Result<()> {
        self.run("pause", caller, Gate::Any, |tx| {
            tx.state.require(Capability::Pauser, caller)?;
            tx.state.breaker.pause()?;
            tx.emit(EventKind::Paused);
            Ok(())
        })
    }

    pub fn unpause(&self, caller: &Identity) -> Result<()> {
        self.run("unpause", caller, Gate::Any, |tx| {
            tx.state.require(Capability::Pauser, caller)?;
            tx.state.breaker.unpause()?;
            tx.emit(EventKind::Unpaused);
            Ok(())
        })
    }

    // REDIRECTION

    /// Value delivered by `sender`, with `origin` the account that signed the
    /// outer call. Admitted value is forwarded in full to the controller.
    /// Returns the new cumulative redirected total.
    pub fn on_inbound_value(
        &self,
        sender: &Identity,
        origin: &Identity,
        amount: Amount,
    ) -> Result<Amount> {
        self.run("on_inbound_value", sender, Gate::Running, |tx| {
            let threshold = tx.state.threshold.current();
            tx.state.redirection.admit(
                &tx.state.depositor,
                sender,
                origin,
                |who| self.collaborators.value.is_contract(who),
                amount,
                threshold,
            )?;

            let cumulative = tx.state.redirection.record(amount, TimeStamp::new())?;
            self.collaborators
                .value
                .transfer(&tx.state.service_account, &tx.state.controller, amount)
                .map_err(|e| CustodyError::collaborator("value.transfer", e))?;

            let destination = tx.state.controller.clone();
            tx.emit(EventKind::ValueRedirected {
                sender: sender.clone(),
                destination,
                amount,
                cumulative,
            });
            Ok(cumulative)
        })
    }

    // THRESHOLD

    pub fn request_threshold_update(&self, caller: &Identity) -> Result<CorrelationId> {
        self.run("request_threshold_update", caller, Gate::Running, |tx| {
            tx.state.approver_for(caller)?;

            let correlation_id = self
                .collaborators
                .oracle
                .request()
                .map_err(|e| CustodyError::collaborator("oracle.request", e))?;
            tx.state.threshold.track_request(correlation_id);

            tx.emit(EventKind::ThresholdUpdateRequested { correlation_id });
            Ok(correlation_id)
        })
    }

    /// Oracle callback. Returns the new threshold.
    pub fn fulfill_threshold_update(
        &self,
        caller: &Identity,
        correlation_id: CorrelationId,
        price: PriceSample,
    ) -> Result<Amount> {
        self.run("fulfill_threshold_update", caller, Gate::Running, |tx| {
            let admin_fallback =
                self.config.admin_may_fulfill && tx.state.roles.has(Capability::Admin, caller);
            if *caller != tx.state.oracle && !admin_fallback {
                return Err(CustodyError::NotOracle {
                    caller: caller.clone(),
                });
            }

            let (previous, current) = tx.state.threshold.fulfill(
                &correlation_id,
                price,
                self.config.target_fiat_value,
                self.config.native_decimals,
            )?;

            tx.emit(EventKind::ThresholdChanged {
                previous,
                current,
                price: Some(price),
            });
            Ok(current)
        })
    }

    pub fn set_threshold(&self, caller: &Identity, threshold: Amount) -> Result<()> {
        self.run("set_threshold", caller, Gate::Running, |tx| {
            tx.state.require(Capability::Admin, caller)?;
            let previous = tx.state.threshold.set(threshold)?;

            tx.emit(EventKind::ThresholdChanged {
                previous,
                current: threshold,
                price: None,
            });
            Ok(())
        })
    }

    // APPROVAL WORKFLOW

    /// Open a transfer of the managed asset out of restricted custody.
    ///
    /// Admin and Executor callers get a request with their own approval set.
    /// The restricted depositor can only signal intent: the intent is recorded
    /// and the call then fails with `DepositorCannotOriginate`.
    pub fn create_transfer_request(
        &self,
        caller: &Identity,
        amount: Amount,
        destination: &Identity,
    ) -> Result<u64> {
        self.run("create_transfer_request", caller, Gate::Running, |tx| {
            // the intent is recorded before any input check, whatever the depositor sent
            if *caller == tx.state.depositor {
                let mut audit = self.begin("create_transfer_request", caller);
                audit.emit(EventKind::DepositorTransferIntent {
                    destination: destination.clone(),
                    amount,
                });
                self.commit(audit)?;
                return Err(CustodyError::DepositorCannotOriginate);
            }

            crate::workflow::validate_request(destination, amount)?;
            let approver = tx.state.approver_for(caller)?;
            let id = tx.state.workflow.create(
                caller.clone(),
                approver,
                destination.clone(),
                amount,
                TimeStamp::new(),
            )?;

            let (primary_approved, executor_approved, ready) = {
                let request = tx
                    .state
                    .workflow
                    .get(id)
                    .ok_or(CustodyError::RequestNotFound(id))?;
                (
                    request.primary_approved,
                    request.executor_approved,
                    request.is_fully_approved(),
                )
            };
            tx.emit(EventKind::TransferRequested {
                id,
                destination: destination.clone(),
                amount,
                primary_approved,
                executor_approved,
            });

            if ready {
                self.execute(tx, id)?;
            }
            Ok(id)
        })
    }

    /// Add the caller's approval. When it completes the pair the transfer executes
    /// in the same call. Returns the request as it stands afterwards.
    pub fn approve_transfer(&self, caller: &Identity, id: u64) -> Result<TransferRequest> {
        self.run("approve_transfer", caller, Gate::Running, |tx| {
            let approver: Approver = tx.state.approver_for(caller)?;
            let ready = tx.state.workflow.approve(id, approver)?;

            let request = tx
                .state
                .workflow
                .get(id)
                .ok_or(CustodyError::RequestNotFound(id))?;
            let (primary_approved, executor_approved) =
                (request.primary_approved, request.executor_approved);
            tx.emit(EventKind::TransferApproved {
                id,
                capability: approver.capability(),
                primary_approved,
                executor_approved,
            });

            if ready {
                self.execute(tx, id)?;
            }
            tx.state
                .workflow
                .get(id)
                .cloned()
                .ok_or(CustodyError::RequestNotFound(id))
        })
    }

    // executed flips in the staged state before the outbound call
    fn execute(&self, tx: &mut Transition, id: u64) -> Result<()> {
        let request = tx.state.workflow.mark_executed(id, TimeStamp::new())?.clone();

        self.collaborators
            .asset
            .transfer_from(
                &tx.state.service_account,
                &tx.state.depositor,
                &request.destination,
                request.amount,
            )
            .map_err(|e| CustodyError::collaborator("asset.transfer_from", e))?;

        tx.emit(EventKind::TransferExecuted {
            id,
            destination: request.destination,
            amount: request.amount,
        });
        Ok(())
    }

    // ADMIN OPERATIONS

    pub fn rotate_executor(&self, caller: &Identity, new_executor: &Identity) -> Result<()> {
        self.run("rotate_executor", caller, Gate::Running, |tx| {
            tx.state.require(Capability::Admin, caller)?;

            if new_executor.is_zero() {
                return Err(CustodyError::ZeroIdentity);
            }
            if tx.state.is_reserved(new_executor) {
                return Err(CustodyError::ReservedIdentity(new_executor.clone()));
            }
            if tx.state.roles.holds_any(new_executor) {
                return Err(CustodyError::IdentityHasRole(new_executor.clone()));
            }

            let previous = tx.state.executor().unwrap_or_default();
            tx.state
                .roles
                .rotate(Capability::Executor, &previous, new_executor.clone());

            tx.emit(EventKind::ExecutorRotated {
                previous,
                current: new_executor.clone(),
            });
            Ok(())
        })
    }

    /// Sweep the service account's value and the withdrawable custody balance to
    /// the controller. Both legs succeed or the call fails with neither moved: a
    /// failed asset leg returns the value leg to the service account first.
    /// Returns `(value, asset)`.
    pub fn withdraw_all(&self, caller: &Identity) -> Result<(Amount, Amount)> {
        self.run("withdraw_all", caller, Gate::Running, |tx| {
            tx.state.require(Capability::Admin, caller)?;

            let value = &self.collaborators.value;
            let asset = &self.collaborators.asset;
            let service = &tx.state.service_account;
            let depositor = &tx.state.depositor;
            let controller = &tx.state.controller;

            // legs are sized from what is actually available, so neither can overdraw
            let value_leg = value.balance_of(service);
            let asset_leg = asset
                .balance_of(depositor)
                .min(asset.allowance(depositor, service));
            if value_leg == 0 && asset_leg == 0 {
                return Err(CustodyError::NothingToWithdraw);
            }

            if value_leg > 0 {
                value
                    .transfer(service, controller, value_leg)
                    .map_err(|e| CustodyError::collaborator("value.transfer", e))?;
            }
            if asset_leg > 0 {
                if let Err(e) = asset.transfer_from(service, depositor, controller, asset_leg) {
                    // the value leg already moved, send it back before failing the whole call
                    if value_leg > 0 {
                        value.transfer(controller, service, value_leg).map_err(|undo| {
                            error!(
                                error = %undo,
                                amount = value_leg,
                                "could not return the value leg of a failed withdrawal"
                            );
                            CustodyError::collaborator("value.compensate", undo)
                        })?;
                    }
                    return Err(CustodyError::collaborator("asset.transfer_from", e));
                }
            }

            let destination = controller.clone();
            tx.state.redirection.reset_cumulative();
            tx.emit(EventKind::FundsWithdrawn {
                destination,
                value: value_leg,
                asset: asset_leg,
            });
            Ok((value_leg, asset_leg))
        })
    }

    /// Signal the out-of-band process to move the depositor's balance. Nothing
    /// moves here. Returns the observed balance.
    pub fn emergency_sweep(&self, caller: &Identity) -> Result<Amount> {
        self.run("emergency_sweep", caller, Gate::Running, |tx| {
            tx.state.require(Capability::Admin, caller)?;

            let balance = self.collaborators.asset.balance_of(&tx.state.depositor);
            if balance == 0 {
                return Err(CustodyError::EmptyDepositorBalance);
            }

            let depositor = tx.state.depositor.clone();
            tx.emit(EventKind::EmergencySweepRequested { depositor, balance });
            Ok(balance)
        })
    }

    // READ ACCESSORS

    pub fn threshold(&self) -> Amount {
        self.read(|s| s.threshold.current())
    }

    pub fn cumulative_redirected(&self) -> Amount {
        self.read(|s| s.redirection.cumulative_redirected())
    }

    pub fn redirection_state(&self) -> RedirectionState {
        self.read(|s| s.redirection_state())
    }

    pub fn is_paused(&self) -> bool {
        self.read(|s| s.breaker.is_paused())
    }

    pub fn controller(&self) -> Identity {
        self.read(|s| s.controller.clone())
    }

    pub fn depositor(&self) -> Identity {
        self.read(|s| s.depositor.clone())
    }

    pub fn service_account(&self) -> Identity {
        self.read(|s| s.service_account.clone())
    }

    pub fn executor(&self) -> Option<Identity> {
        self.read(|s| s.executor())
    }

    pub fn has_capability(&self, capability: Capability, identity: &Identity) -> bool {
        self.read(|s| s.roles.has(capability, identity))
    }

    pub fn transfer_request(&self, id: u64) -> Option<TransferRequest> {
        self.read(|s| s.workflow.get(id).cloned())
    }

    pub fn transfer_requests(&self) -> Vec<TransferRequest> {
        self.read(|s| s.workflow.requests().cloned().collect())
    }

    pub fn pending_requests(&self) -> Vec<TransferRequest> {
        self.read(|s| s.workflow.pending().cloned().collect())
    }

    pub fn pending_oracle_requests(&self) -> Vec<CorrelationId> {
        self.read(|s| s.threshold.pending().copied().collect())
    }

    /// The persisted event log in sequence order, verified against the stored digests.
    pub fn events(&self) -> Result<Vec<EventRecord>> {
        Ok(self.event_log()?.into_iter().map(|event| event.record).collect())
    }

    /// Same as `events` with the sha256 digest each record was committed under.
    pub fn event_log(&self) -> Result<Vec<CommittedEvent>> {
        self.store.events()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}
