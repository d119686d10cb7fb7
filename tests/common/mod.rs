//! Shared fixture for the integration tests
//!
//! Every harness opens its own sled database under a temp dir. Sled locks the
//! database file, so tests never share one.
#![allow(dead_code)]

use std::sync::Arc;

use custody_approval::config::CustodyConfigBuilder;
use custody_approval::ledger::{MemoryAssetLedger, MemoryOracle, MemoryValueLedger, ValueLedger};
use custody_approval::{Amount, Collaborators, CustodyConfig, CustodyService, Identity};
use tempfile::{TempDir, tempdir};

pub const DEPOSITOR_FUNDS: Amount = 1_000_000;
pub const CUSTODY_FUNDS: Amount = 10_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn identities() -> anyhow::Result<(Identity, Identity, Identity)> {
    Ok((
        Identity::generate("ctrl_")?,
        Identity::generate("exec_")?,
        Identity::generate("depo_")?,
    ))
}

pub struct Harness {
    pub temp_dir: TempDir,
    pub service: CustodyService,
    pub value: Arc<MemoryValueLedger>,
    pub asset: Arc<MemoryAssetLedger>,
    pub oracle: Arc<MemoryOracle>,
    pub config: CustodyConfig,
}

impl Harness {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(|builder| builder)
    }

    pub fn with_config(
        customise: impl FnOnce(CustodyConfigBuilder) -> CustodyConfigBuilder,
    ) -> anyhow::Result<Self> {
        init_tracing();

        let (controller, executor, depositor) = identities()?;
        let config = customise(CustodyConfig::builder(controller, executor, depositor)).build()?;

        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("custody.db"))?);

        let value = Arc::new(MemoryValueLedger::new());
        let asset = Arc::new(MemoryAssetLedger::new());
        let oracle = Arc::new(MemoryOracle::new());

        // the depositor holds native value and keeps the managed asset in restricted custody
        value.credit(&config.depositor, DEPOSITOR_FUNDS);
        asset.mint(&config.depositor, CUSTODY_FUNDS);
        asset.approve(&config.depositor, &config.service_account, CUSTODY_FUNDS);

        let collaborators = Collaborators {
            value: value.clone(),
            asset: asset.clone(),
            oracle: oracle.clone(),
        };
        let service = CustodyService::open(db, config.clone(), collaborators)?;

        Ok(Self {
            temp_dir,
            service,
            value,
            asset,
            oracle,
            config,
        })
    }

    pub fn controller(&self) -> &Identity {
        &self.config.controller
    }

    pub fn executor(&self) -> &Identity {
        &self.config.executor
    }

    pub fn depositor(&self) -> &Identity {
        &self.config.depositor
    }

    pub fn service_account(&self) -> &Identity {
        &self.config.service_account
    }

    /// Host side of an inbound payment: the value lands on the service account,
    /// the gate runs, and a rejection reverts the delivery.
    pub fn deliver(&self, sender: &Identity, amount: Amount) -> custody_approval::Result<Amount> {
        self.deliver_via(sender, sender, amount)
    }

    pub fn deliver_via(
        &self,
        sender: &Identity,
        origin: &Identity,
        amount: Amount,
    ) -> custody_approval::Result<Amount> {
        let service_account = self.service_account();
        let delivered = self.value.transfer(sender, service_account, amount).is_ok();

        let result = self.service.on_inbound_value(sender, origin, amount);
        if result.is_err() && delivered {
            self.value
                .transfer(service_account, sender, amount)
                .expect("host revert of a delivered payment");
        }
        result
    }

    pub fn value_of(&self, who: &Identity) -> Amount {
        self.value.balance_of(who)
    }

    pub fn asset_of(&self, who: &Identity) -> Amount {
        custody_approval::ledger::AssetLedger::balance_of(self.asset.as_ref(), who)
    }
}
