use anyhow::Result;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::U256;

use crate::constants::Network;
use crate::error::SessionError;

/// BSC wants a pinned 1 gwei; everywhere else the node quotes.
pub async fn gas_price(provider: &Provider<Http>, network: Network) -> Result<U256> {
    if network == Network::Bsc {
        Ok(U256::from(1_000_000_000u64))
    } else {
        Ok(provider.get_gas_price().await?)
    }
}

/// Estimate plus a 5% safety margin, truncated to an integer.
pub fn with_margin(estimate: U256) -> U256 {
    estimate * U256::from(105u64) / U256::from(100u64)
}

/// Definitive no-gas condition, generalized beyond the exact error
/// shape any single RPC provider emits. Matches the typed variant
/// first, then the common provider wordings.
pub fn is_insufficient_funds(err: &anyhow::Error) -> bool {
    if matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::InsufficientFunds)
    ) {
        return true;
    }

    let msg = format!("{:#}", err).to_lowercase();
    msg.contains("insufficient funds")
        || msg.contains("insufficient balance")
        || msg.contains("gas required exceeds allowance")
        || (msg.contains("execution reverted") && msg.contains("no data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bsc_price_is_pinned_without_an_rpc_call() {
        // The BSC branch never queries the node, so a dead endpoint is fine.
        let provider = Provider::<Http>::try_from("http://127.0.0.1:1").unwrap();
        let price = gas_price(&provider, Network::Bsc).await.unwrap();
        assert_eq!(price, U256::from(1_000_000_000u64));
    }

    #[test]
    fn margin_truncates() {
        assert_eq!(with_margin(U256::from(100u64)), U256::from(105u64));
        assert_eq!(with_margin(U256::from(101u64)), U256::from(106u64));
        assert_eq!(with_margin(U256::from(21_000u64)), U256::from(22_050u64));
        // 1.05 * 1 truncates to 1
        assert_eq!(with_margin(U256::from(1u64)), U256::from(1u64));
    }

    #[test]
    fn insufficient_funds_wordings() {
        assert!(is_insufficient_funds(&anyhow::anyhow!(
            "insufficient funds for gas * price + value"
        )));
        assert!(is_insufficient_funds(&anyhow::anyhow!(
            "Insufficient balance to cover transfer"
        )));
        assert!(is_insufficient_funds(&anyhow::anyhow!(
            "gas required exceeds allowance (0)"
        )));
        assert!(is_insufficient_funds(&anyhow::anyhow!(
            "execution reverted: no data"
        )));
        assert!(is_insufficient_funds(&anyhow::Error::new(
            SessionError::InsufficientFunds
        )));
    }

    #[test]
    fn transient_errors_are_not_funds_errors() {
        assert!(!is_insufficient_funds(&anyhow::anyhow!("request timeout")));
        assert!(!is_insufficient_funds(&anyhow::anyhow!(
            "execution reverted: paused"
        )));
        assert!(!is_insufficient_funds(&anyhow::anyhow!("nonce too low")));
    }
}
