//! Admission and bookkeeping for value sent in by the restricted depositor
use chrono::Utc;

use crate::error::{CustodyError, Result};
use crate::types::{Amount, Identity, TimeStamp};

/// Read only view combining the gate's counters with the live threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionState {
    pub threshold: Amount,
    pub cumulative_redirected: Amount,
    pub last_event_timestamp: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RedirectionGate {
    #[n(0)]
    cumulative_redirected: Amount,
    #[n(1)]
    last_event_timestamp: Option<TimeStamp<Utc>>,
}

impl RedirectionGate {
    pub fn cumulative_redirected(&self) -> Amount {
        self.cumulative_redirected
    }

    pub fn last_event_timestamp(&self) -> Option<&TimeStamp<Utc>> {
        self.last_event_timestamp.as_ref()
    }

    /// Sender, origin and amount checks in their fixed order. The pause check
    /// happens before this is reached.
    pub fn admit(
        &self,
        depositor: &Identity,
        sender: &Identity,
        origin: &Identity,
        is_contract: impl FnOnce(&Identity) -> bool,
        amount: Amount,
        threshold: Amount,
    ) -> Result<()> {
        if sender != depositor {
            return Err(CustodyError::UnsolicitedDeposit {
                sender: sender.clone(),
            });
        }
        if origin != sender || is_contract(sender) {
            return Err(CustodyError::ContractSender {
                sender: sender.clone(),
                origin: origin.clone(),
            });
        }
        if amount == 0 {
            return Err(CustodyError::ZeroAmount);
        }
        if amount < threshold {
            return Err(CustodyError::BelowThreshold { amount, threshold });
        }
        Ok(())
    }

    /// Returns the new cumulative total.
    pub fn record(&mut self, amount: Amount, at: TimeStamp<Utc>) -> Result<Amount> {
        self.cumulative_redirected = self
            .cumulative_redirected
            .checked_add(amount)
            .ok_or(CustodyError::Overflow("cumulative redirected"))?;
        self.last_event_timestamp = Some(at);

        Ok(self.cumulative_redirected)
    }

    // only the administrative sweep resets the counter
    pub(crate) fn reset_cumulative(&mut self) {
        self.cumulative_redirected = 0;
    }
}
