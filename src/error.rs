//! Typed error definitions for the runner.
//!
//! Classification matters more than exhaustiveness here: the retry layer
//! only needs to tell a definitive stop (no gas) apart from everything
//! else, so most call sites wrap these in `anyhow` with context.

use thiserror::Error;

/// Credential-file errors. All of these are fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Credential file not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },

    #[error("Credential file {path} contains no usable keys")]
    Empty { path: String },

    #[error("Invalid private key on line {line}: expected hex string")]
    InvalidKey { line: usize },
}

/// Schema store errors. Lookup misses are `Ok(None)`, not errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store query failed: {msg}")]
    QueryFailed { msg: String },
}

/// Per-action session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Login rejected with HTTP {status}: {body}")]
    LoginRejected { status: u16, body: String },

    #[error("Service error from {endpoint}: {reason}")]
    ServiceError { endpoint: String, reason: String },

    #[error("Insufficient funds for gas")]
    InsufficientFunds,

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    #[error("Unknown schema field type: {field_type}")]
    UnknownFieldType { field_type: String },
}
