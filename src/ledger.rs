//! External collaborators: the host value ledger, the managed asset and the price oracle
//!
//! The engine only ever talks to these through the traits below. The `Memory*`
//! implementations are simulated stand-ins for tests and embedding.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{Amount, CorrelationId, Identity};

/// Address based value transfer provided by the host ledger.
pub trait ValueLedger: Send + Sync {
    fn transfer(&self, from: &Identity, to: &Identity, amount: Amount) -> anyhow::Result<()>;
    fn balance_of(&self, who: &Identity) -> Amount;
    /// True when the account is controlled by code rather than a key holder.
    fn is_contract(&self, who: &Identity) -> bool;
}

/// Narrow view over the managed fungible asset.
pub trait AssetLedger: Send + Sync {
    /// Move `amount` from `owner` to `to`, spending the allowance `owner` granted `spender`.
    fn transfer_from(
        &self,
        spender: &Identity,
        owner: &Identity,
        to: &Identity,
        amount: Amount,
    ) -> anyhow::Result<()>;
    fn balance_of(&self, who: &Identity) -> Amount;
    fn allowance(&self, owner: &Identity, spender: &Identity) -> Amount;
}

/// Price feed. The answer arrives later through `CustodyService::fulfill_threshold_update`.
pub trait PriceOracle: Send + Sync {
    fn request(&self) -> anyhow::Result<CorrelationId>;
}

// poisoning cannot leave a half written map behind, every mutation is a single insert
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryValueLedger {
    balances: Mutex<HashMap<Identity, Amount>>,
    contracts: Mutex<HashSet<Identity>>,
    failing: AtomicBool,
}

impl MemoryValueLedger {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn credit(&self, who: &Identity, amount: Amount) {
        *lock(&self.balances).entry(who.clone()).or_default() += amount;
    }
    pub fn mark_contract(&self, who: &Identity) {
        lock(&self.contracts).insert(who.clone());
    }
    /// Make every following transfer fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ValueLedger for MemoryValueLedger {
    fn transfer(&self, from: &Identity, to: &Identity, amount: Amount) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("value transfer to {to} refused");
        }
        let mut balances = lock(&self.balances);
        let available = balances.get(from).copied().unwrap_or_default();
        if available < amount {
            anyhow::bail!("{from} holds {available}, cannot send {amount}");
        }
        balances.insert(from.clone(), available - amount);
        *balances.entry(to.clone()).or_default() += amount;
        Ok(())
    }

    fn balance_of(&self, who: &Identity) -> Amount {
        lock(&self.balances).get(who).copied().unwrap_or_default()
    }

    fn is_contract(&self, who: &Identity) -> bool {
        lock(&self.contracts).contains(who)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAssetLedger {
    balances: Mutex<HashMap<Identity, Amount>>,
    allowances: Mutex<HashMap<(Identity, Identity), Amount>>,
    failing: AtomicBool,
}

impl MemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn mint(&self, who: &Identity, amount: Amount) {
        *lock(&self.balances).entry(who.clone()).or_default() += amount;
    }
    /// Same effect as the owner calling `approve(spender, amount)` on the asset.
    pub fn approve(&self, owner: &Identity, spender: &Identity, amount: Amount) {
        lock(&self.allowances).insert((owner.clone(), spender.clone()), amount);
    }
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AssetLedger for MemoryAssetLedger {
    fn transfer_from(
        &self,
        spender: &Identity,
        owner: &Identity,
        to: &Identity,
        amount: Amount,
    ) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("asset transfer to {to} refused");
        }
        let mut allowances = lock(&self.allowances);
        let key = (owner.clone(), spender.clone());
        let allowed = allowances.get(&key).copied().unwrap_or_default();
        if allowed < amount {
            anyhow::bail!("allowance {allowed} from {owner} to {spender} is below {amount}");
        }

        let mut balances = lock(&self.balances);
        let available = balances.get(owner).copied().unwrap_or_default();
        if available < amount {
            anyhow::bail!("{owner} holds {available}, cannot send {amount}");
        }

        allowances.insert(key, allowed - amount);
        balances.insert(owner.clone(), available - amount);
        *balances.entry(to.clone()).or_default() += amount;
        Ok(())
    }

    fn balance_of(&self, who: &Identity) -> Amount {
        lock(&self.balances).get(who).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: &Identity, spender: &Identity) -> Amount {
        lock(&self.allowances)
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }
}

/// Hands out correlation ids and remembers them, the test drives fulfillment.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    issued: Mutex<Vec<CorrelationId>>,
    failing: AtomicBool,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn last_request(&self) -> Option<CorrelationId> {
        lock(&self.issued).last().copied()
    }
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PriceOracle for MemoryOracle {
    fn request(&self) -> anyhow::Result<CorrelationId> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("oracle unavailable");
        }
        let id = CorrelationId::new();
        lock(&self.issued).push(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_transfer_moves_balance() {
        let ledger = MemoryValueLedger::new();
        let a = Identity::new("acct_a");
        let b = Identity::new("acct_b");
        ledger.credit(&a, 10);

        ledger.transfer(&a, &b, 4).unwrap();
        assert_eq!(ledger.balance_of(&a), 6);
        assert_eq!(ledger.balance_of(&b), 4);

        assert!(ledger.transfer(&a, &b, 7).is_err());
        assert_eq!(ledger.balance_of(&a), 6);
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let asset = MemoryAssetLedger::new();
        let owner = Identity::new("acct_owner");
        let spender = Identity::new("acct_spender");
        let to = Identity::new("acct_to");
        asset.mint(&owner, 100);
        asset.approve(&owner, &spender, 60);

        asset.transfer_from(&spender, &owner, &to, 50).unwrap();
        assert_eq!(asset.balance_of(&to), 50);
        assert_eq!(asset.allowance(&owner, &spender), 10);

        // allowance exhausted
        assert!(asset.transfer_from(&spender, &owner, &to, 20).is_err());
        assert_eq!(asset.balance_of(&owner), 50);
    }

    #[test]
    fn oracle_remembers_requests() {
        let oracle = MemoryOracle::new();
        assert!(oracle.last_request().is_none());

        let id = oracle.request().unwrap();
        assert_eq!(oracle.last_request(), Some(id));

        oracle.set_failing(true);
        assert!(oracle.request().is_err());
    }
}
