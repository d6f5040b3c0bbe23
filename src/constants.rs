use clap::ValueEnum;
use std::fmt;

pub const SIGNIN_URL: &str = "https://app.sign.global/api/signin";
pub const SCAN_BASE_URL: &str = "https://mainnet-rpc.sign.global/api";
pub const APP_ORIGIN: &str = "https://app.sign.global";

/// Networks the Sign Protocol registry contract is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Network {
    Bsc,
    OpBnb,
    Polygon,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Bsc, Network::OpBnb, Network::Polygon];

    /// Short tag used as the store partition key.
    pub fn tag(&self) -> &'static str {
        match self {
            Network::Bsc => "bsc",
            Network::OpBnb => "opbnb",
            Network::Polygon => "polygon",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Network::Bsc => "BSC",
            Network::OpBnb => "opBNB",
            Network::Polygon => "Polygon",
        }
    }

    pub fn contract_address(&self) -> &'static str {
        match self {
            Network::Bsc => "0xe2C15B97F628B7Ad279D6b002cEDd414390b6D63",
            Network::OpBnb => "0x03688D459F172B058d39241456Ae213FC4E26941",
            Network::Polygon => "0xe2C15B97F628B7Ad279D6b002cEDd414390b6D63",
        }
    }

    pub fn rpc_url(&self) -> &'static str {
        match self {
            Network::Bsc => "https://rpc.ankr.com/bsc",
            Network::OpBnb => "https://opbnb-rpc.publicnode.com",
            Network::Polygon => "https://1rpc.io/matic",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Bsc => 56,
            Network::OpBnb => 204,
            Network::Polygon => 137,
        }
    }

    pub fn explorer_tx(&self, tx_hash: &str) -> String {
        let base = match self {
            Network::Bsc => "https://bscscan.com/tx/",
            Network::OpBnb => "https://opbnb.bscscan.com/tx/",
            Network::Polygon => "https://polygonscan.com/tx/",
        };
        format!("{}{}", base, tx_hash)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_match_networks() {
        assert_eq!(Network::Bsc.chain_id(), 56);
        assert_eq!(Network::OpBnb.chain_id(), 204);
        assert_eq!(Network::Polygon.chain_id(), 137);
    }

    #[test]
    fn explorer_link_appends_hash() {
        let link = Network::OpBnb.explorer_tx("0xabc");
        assert_eq!(link, "https://opbnb.bscscan.com/tx/0xabc");
    }
}
