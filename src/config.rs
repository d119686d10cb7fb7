//! Deployment parameters for a custody service

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Result};
use crate::types::{Amount, Identity, PRICE_DECIMALS};

/// Five fiat units in 8 decimal fixed point.
pub const DEFAULT_TARGET_FIAT_VALUE: u64 = 5 * 10u64.pow(PRICE_DECIMALS);
pub const DEFAULT_BASELINE_THRESHOLD: Amount = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Primary controller, holds Admin and Pauser
    pub controller: Identity,
    /// Initial co-controller
    pub executor: Identity,
    /// The restricted depositor
    pub depositor: Identity,
    /// Account the service itself holds value and allowances under
    pub service_account: Identity,
    /// Identity allowed to deliver price samples
    pub oracle: Identity,

    #[serde(default = "default_baseline_threshold")]
    pub baseline_threshold: Amount,
    /// Same fixed point scale as the price samples
    #[serde(default = "default_target_fiat_value")]
    pub target_fiat_value: u64,
    #[serde(default)]
    pub native_decimals: u32,
    /// Simplified deployments let an Admin deliver samples for determinism
    #[serde(default)]
    pub admin_may_fulfill: bool,
}

fn default_baseline_threshold() -> Amount {
    DEFAULT_BASELINE_THRESHOLD
}

fn default_target_fiat_value() -> u64 {
    DEFAULT_TARGET_FIAT_VALUE
}

impl CustodyConfig {
    pub fn builder(
        controller: Identity,
        executor: Identity,
        depositor: Identity,
    ) -> CustodyConfigBuilder {
        CustodyConfigBuilder::new(controller, executor, depositor)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CustodyConfig =
            toml::from_str(raw).map_err(|e| CustodyError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CustodyError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("controller", &self.controller),
            ("executor", &self.executor),
            ("depositor", &self.depositor),
            ("service_account", &self.service_account),
            ("oracle", &self.oracle),
        ];
        if let Some((name, _)) = named.iter().find(|(_, id)| id.is_zero()) {
            return Err(CustodyError::InvalidConfig(format!("{name} is the zero identity")));
        }

        // the three roles and the service account must be distinct principals
        for (i, (a_name, a)) in named[..4].iter().enumerate() {
            for (b_name, b) in &named[i + 1..4] {
                if a == b {
                    return Err(CustodyError::InvalidConfig(format!(
                        "{a_name} and {b_name} must differ"
                    )));
                }
            }
        }

        if self.baseline_threshold == 0 {
            return Err(CustodyError::InvalidConfig("baseline_threshold is zero".into()));
        }
        if self.target_fiat_value == 0 {
            return Err(CustodyError::InvalidConfig("target_fiat_value is zero".into()));
        }
        Ok(())
    }
}

pub struct CustodyConfigBuilder {
    config: CustodyConfig,
}

impl CustodyConfigBuilder {
    /// The service account and oracle identities are generated unless set explicitly.
    pub fn new(controller: Identity, executor: Identity, depositor: Identity) -> Self {
        Self {
            config: CustodyConfig {
                controller,
                executor,
                depositor,
                service_account: Identity::zero(),
                oracle: Identity::zero(),
                baseline_threshold: DEFAULT_BASELINE_THRESHOLD,
                target_fiat_value: DEFAULT_TARGET_FIAT_VALUE,
                native_decimals: 0,
                admin_may_fulfill: false,
            },
        }
    }

    pub fn service_account(mut self, service_account: Identity) -> Self {
        self.config.service_account = service_account;
        self
    }

    pub fn oracle(mut self, oracle: Identity) -> Self {
        self.config.oracle = oracle;
        self
    }

    pub fn baseline_threshold(mut self, threshold: Amount) -> Self {
        self.config.baseline_threshold = threshold;
        self
    }

    pub fn target_fiat_value(mut self, value: u64) -> Self {
        self.config.target_fiat_value = value;
        self
    }

    pub fn native_decimals(mut self, decimals: u32) -> Self {
        self.config.native_decimals = decimals;
        self
    }

    pub fn admin_may_fulfill(mut self, allowed: bool) -> Self {
        self.config.admin_may_fulfill = allowed;
        self
    }

    pub fn build(mut self) -> Result<CustodyConfig> {
        if self.config.service_account.is_zero() {
            self.config.service_account = generated("custody_")?;
        }
        if self.config.oracle.is_zero() {
            self.config.oracle = generated("oracle_")?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

fn generated(hrp: &str) -> Result<Identity> {
    Identity::generate(hrp).map_err(|e| CustodyError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Identity, Identity, Identity) {
        (
            Identity::new("acct_controller"),
            Identity::new("acct_executor"),
            Identity::new("acct_depositor"),
        )
    }

    #[test]
    fn builder_fills_generated_identities() {
        let (c, e, d) = ids();
        let config = CustodyConfig::builder(c, e, d).build().unwrap();

        assert!(config.service_account.as_str().starts_with("custody_1"));
        assert!(config.oracle.as_str().starts_with("oracle_1"));
        assert_eq!(config.baseline_threshold, 25);
        assert_eq!(config.target_fiat_value, 500_000_000);
    }

    #[test]
    fn rejects_overlapping_roles() {
        let (c, _, d) = ids();
        let err = CustodyConfig::builder(c.clone(), c, d).build().unwrap_err();
        assert_eq!(err.reason(), "invalid_config");
    }

    #[test]
    fn rejects_zero_baseline() {
        let (c, e, d) = ids();
        let err = CustodyConfig::builder(c, e, d)
            .baseline_threshold(0)
            .build()
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_config");
    }

    #[test]
    fn parses_toml_with_defaults() {
        let raw = r#"
            controller = "acct_controller"
            executor = "acct_executor"
            depositor = "acct_depositor"
            service_account = "custody_main"
            oracle = "oracle_feed"
            admin_may_fulfill = true
        "#;
        let config = CustodyConfig::from_toml_str(raw).unwrap();

        assert_eq!(config.controller, Identity::new("acct_controller"));
        assert_eq!(config.baseline_threshold, DEFAULT_BASELINE_THRESHOLD);
        assert_eq!(config.native_decimals, 0);
        assert!(config.admin_may_fulfill);
    }

    #[test]
    fn toml_missing_identity_fails() {
        let raw = r#"controller = "acct_controller""#;
        assert!(CustodyConfig::from_toml_str(raw).is_err());
    }
}
