//! # sign-project
//!
//! Bulk runner for the Sign Protocol attestation registry: logs in many
//! wallets concurrently, registers random schemas, and creates
//! attestations against schemas cached in a local SQLite store.
//!
//! ## Modules
//!
//! - [`config`] - TOML configuration surface
//! - [`constants`] - Supported networks and service endpoints
//! - [`database`] - Per-network schema cache on SQLite
//! - [`error`] - Typed error taxonomy
//! - [`runner`] - Lane pool, key feed and per-mode sequencing
//! - [`session`] - Per-key service session and on-chain actions
//! - [`utils`] - Credentials, retry governor, gas policy, logging

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod runner;
pub mod session;
pub mod utils;

pub use config::SignConfig;
pub use constants::Network;
pub use database::{SchemaRecord, SchemaStore};
pub use runner::{Coordinator, KeyFeed, LaneStats, Mode, SessionActions};
pub use session::SignSession;
pub use utils::{setup_logger, CredentialSource, FailedKeys, RetryGovernor, RetryPolicy};
