//! Redirection threshold and its oracle driven recomputation
use std::collections::BTreeSet;

use crate::error::{CustodyError, Result};
use crate::types::{Amount, CorrelationId, PriceSample};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ThresholdController {
    #[n(0)]
    threshold: Amount,
    #[n(1)]
    pending: BTreeSet<CorrelationId>,
}

/// `threshold = target_fiat_value * 10^native_decimals / price`
///
/// Target and price share the same fixed point scale, so the scale cancels out.
pub fn compute_threshold(
    target_fiat_value: u64,
    native_decimals: u32,
    price: PriceSample,
) -> Result<Amount> {
    if price <= 0 {
        return Err(CustodyError::InvalidPrice(price));
    }
    let scale = 10u128
        .checked_pow(native_decimals)
        .ok_or(CustodyError::Overflow("threshold scale"))?;
    let numerator = (target_fiat_value as u128)
        .checked_mul(scale)
        .ok_or(CustodyError::Overflow("threshold numerator"))?;
    let threshold = numerator / price as u128;

    if threshold == 0 {
        return Err(CustodyError::InvalidThreshold(threshold));
    }
    Amount::try_from(threshold).map_err(|_| CustodyError::InvalidThreshold(threshold))
}

impl ThresholdController {
    pub fn new(baseline: Amount) -> Result<Self> {
        if baseline == 0 {
            return Err(CustodyError::InvalidThreshold(0));
        }
        Ok(Self {
            threshold: baseline,
            pending: BTreeSet::new(),
        })
    }

    pub fn current(&self) -> Amount {
        self.threshold
    }

    pub fn pending(&self) -> impl Iterator<Item = &CorrelationId> {
        self.pending.iter()
    }

    /// Administrative override. Returns the previous threshold.
    pub fn set(&mut self, threshold: Amount) -> Result<Amount> {
        if threshold == 0 {
            return Err(CustodyError::InvalidThreshold(0));
        }
        Ok(std::mem::replace(&mut self.threshold, threshold))
    }

    pub fn track_request(&mut self, id: CorrelationId) {
        self.pending.insert(id);
    }

    /// Consume a pending request and apply the price sample. Returns `(previous, current)`.
    pub fn fulfill(
        &mut self,
        id: &CorrelationId,
        price: PriceSample,
        target_fiat_value: u64,
        native_decimals: u32,
    ) -> Result<(Amount, Amount)> {
        if !self.pending.contains(id) {
            return Err(CustodyError::UnknownCorrelation(*id));
        }
        let next = compute_threshold(target_fiat_value, native_decimals, price)?;
        self.pending.remove(id);
        let previous = self.set(next)?;

        Ok((previous, next))
    }
}
