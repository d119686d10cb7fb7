//! Dual-control custody engine.
//!
//! Inbound value from a restricted depositor is redirected to the controller once it
//! meets a price driven threshold. Outbound transfers of the managed asset need both
//! the controller and the executor to approve before they run.

pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod redirect;
pub mod roles;
pub mod service;
pub mod state;
pub mod store;
pub mod threshold;
pub mod types;
pub mod utils;
pub mod workflow;

pub use config::CustodyConfig;
pub use error::{CustodyError, ErrorKind, Result};
pub use roles::Capability;
pub use service::{Collaborators, CustodyService};
pub use types::{Amount, CorrelationId, Identity, PriceSample};
