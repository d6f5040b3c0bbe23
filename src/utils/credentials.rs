use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use rand::seq::SliceRandom;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::CredentialError;

/// Ordered private-key list read once at startup.
///
/// Addresses are derived eagerly so a malformed key aborts the run
/// before any lane starts working.
pub struct CredentialSource {
    keys: Vec<String>,
    addresses: Vec<Address>,
    raw_line_count: usize,
}

impl CredentialSource {
    pub fn load(path: &str) -> Result<Self> {
        let file = Path::new(path);
        if !file.exists() {
            return Err(CredentialError::FileNotFound {
                path: path.to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(file).map_err(|e| CredentialError::IoError {
            path: path.to_string(),
            msg: e.to_string(),
        })?;

        let raw_line_count = content.lines().count();
        let keys: Vec<String> = content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect();

        if keys.is_empty() {
            return Err(CredentialError::Empty {
                path: path.to_string(),
            }
            .into());
        }

        let mut addresses = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let wallet = key
                .parse::<LocalWallet>()
                .map_err(|_| CredentialError::InvalidKey { line: i + 1 })?;
            addresses.push(wallet.address());
        }

        info!(
            "Loaded {} keys from {} ({} lines)",
            keys.len(),
            path,
            raw_line_count
        );

        Ok(Self {
            keys,
            addresses,
            raw_line_count,
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Raw line count of the source file, blank lines included. Used
    /// only for "key N of TOTAL" display and may exceed `len()`.
    pub fn raw_line_count(&self) -> usize {
        self.raw_line_count
    }

    /// Uniformly random address from the list, excluding `own` when
    /// another account exists. Falls back to `own` for a single-key file.
    pub fn random_recipient(&self, own: Address) -> Address {
        let others: Vec<Address> = self
            .addresses
            .iter()
            .copied()
            .filter(|a| *a != own)
            .collect();

        let mut rng = rand::thread_rng();
        others.choose(&mut rng).copied().unwrap_or(own)
    }
}

/// Last characters of a key, for log attribution without leaking it.
pub fn key_suffix(key: &str) -> &str {
    let cut = key.len().saturating_sub(6);
    &key[cut..]
}

/// Append-only sink for keys whose retry budget is exhausted.
pub struct FailedKeys {
    path: PathBuf,
}

impl FailedKeys {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }

    pub fn append(&self, key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        writeln!(file, "{}", key).with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}
