//! Per-key authenticated session against the Sign Protocol service and
//! its registry contract.
//!
//! One session owns one HTTP client, one chain account and one contract
//! binding; it lives for exactly one login → actions → logout sequence.

pub mod payload;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, TxHash};
use ethers::utils::to_checksum;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::constants::{Network, APP_ORIGIN, SCAN_BASE_URL, SIGNIN_URL};
use crate::database::{SchemaRecord, SchemaStore};
use crate::error::SessionError;
use crate::runner::SessionActions;
use crate::utils::credentials::CredentialSource;
use crate::utils::gas;
use payload::{attest_calldata, attestation_values, parse_schema_id, register_calldata, SchemaField};

const UA_CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const TX_ATTEMPTS: u32 = 5;
const SCHEMA_RETRY_PAUSE: Duration = Duration::from_secs(10);
const ATTEST_RETRY_PAUSE: Duration = Duration::from_secs(15);

pub struct SignSession {
    lane: usize,
    network: Network,
    wallet: LocalWallet,
    address: Address,
    contract: Address,
    provider: Provider<Http>,
    http: reqwest::Client,
    store: Arc<SchemaStore>,
    credentials: Arc<CredentialSource>,
}

#[derive(Debug, Deserialize)]
struct SigninResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScanData>,
}

#[derive(Debug, Deserialize)]
struct ScanData {
    #[serde(default)]
    rows: Vec<SchemaRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaRow {
    id: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    chain_type: String,
    #[serde(default)]
    chain_id: String,
    #[serde(default)]
    schema_id: String,
    #[serde(default)]
    transaction_hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data_location: String,
    #[serde(default)]
    revocable: bool,
    #[serde(default)]
    max_valid_for: String,
    #[serde(default)]
    resolver: String,
    #[serde(default)]
    register_timestamp: i64,
    #[serde(default)]
    registrant: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    original_data: String,
}

impl SchemaRow {
    fn into_record(self) -> SchemaRecord {
        SchemaRecord {
            id: self.id,
            mode: self.mode,
            chain_type: self.chain_type,
            chain_id: self.chain_id,
            schema_id: self.schema_id,
            transaction_hash: self.transaction_hash,
            name: self.name,
            description: self.description,
            data_location: self.data_location,
            revocable: self.revocable,
            max_valid_for: self.max_valid_for,
            resolver: self.resolver,
            register_timestamp: self.register_timestamp,
            registrant: self.registrant,
            data: self.data.to_string(),
            original_data: self.original_data,
        }
    }
}

impl SignSession {
    pub fn new(
        key: &str,
        lane: usize,
        network: Network,
        store: Arc<SchemaStore>,
        credentials: Arc<CredentialSource>,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let wallet = key
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(network.chain_id());
        let address = wallet.address();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, HeaderValue::from_static(APP_ORIGIN));
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://app.sign.global/profile"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(UA_CHROME));

        let mut client_builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true);
        if let Some(proxy_url) = proxy {
            client_builder = client_builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        let http = client_builder.build()?;

        let provider = Provider::new(Http::new_with_client(
            reqwest::Url::parse(network.rpc_url())?,
            http.clone(),
        ));

        let contract: Address = network
            .contract_address()
            .parse()
            .context("Invalid contract address")?;

        Ok(Self {
            lane,
            network,
            wallet,
            address,
            contract,
            provider,
            http,
            store,
            credentials,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs the SIWE-style message and posts it to the service.
    /// Success is HTTP 201 with a `success` flag in the body.
    pub async fn login(&self) -> Result<()> {
        let nonce = generate_nonce();
        let issued_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let checksummed = to_checksum(&self.address, None);

        let message = format!(
            "app.sign.global wants you to sign in with your Ethereum account:\n\
             {}\n\nSign Protocol\n\nURI: https://app.sign.global\nVersion: 1\n\
             Chain ID: 1\nNonce: {}\nIssued At: {}",
            checksummed, nonce, issued_at
        );
        let signature = self.wallet.sign_message(message.as_bytes()).await?;

        let body = serde_json::json!({
            "message": message,
            "signature": format!("0x{}", signature),
            "chainType": "evm",
            "client": "MetaMask",
            "key": checksummed,
        });

        let response = self.http.post(SIGNIN_URL).json(&body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let parsed: SigninResponse = serde_json::from_str(&text).unwrap_or(SigninResponse {
            success: false,
        });

        if status == 201 && parsed.success {
            info!("Lane {} | Logged in as {}", self.lane, checksummed);
            Ok(())
        } else {
            Err(SessionError::LoginRejected {
                status,
                body: text.chars().take(200).collect(),
            }
            .into())
        }
    }

    /// Pulls this account's schemas from the scan service, keeps those
    /// on the active network, and inserts the ones the store has not
    /// seen. Returns how many records were written.
    pub async fn fetch_user_schemas(&self) -> Result<usize> {
        let checksummed = to_checksum(&self.address, None);
        let url = format!(
            "{}/scan/addresses/{}/schemas?id={}&page=1&size=100",
            SCAN_BASE_URL, checksummed, checksummed
        );

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::ServiceError {
                endpoint: url,
                reason: format!("HTTP {}", status.as_u16()),
            }
            .into());
        }

        let parsed: ScanResponse = response.json().await?;
        if !parsed.success {
            return Err(SessionError::ServiceError {
                endpoint: url,
                reason: "success flag not set".to_string(),
            }
            .into());
        }

        let chain_id = self.network.chain_id().to_string();
        let rows = parsed.data.map(|d| d.rows).unwrap_or_default();
        let mut inserted = 0;
        for row in rows.into_iter().filter(|r| r.chain_id == chain_id) {
            if !self.store.exists(&row.id, self.network).await? {
                // UNIQUE(id, network) makes a concurrent duplicate a no-op
                if self.store.insert(&row.into_record(), self.network).await? {
                    inserted += 1;
                }
            }
        }

        info!(
            "Lane {} | Recorded {} schemas to the store",
            self.lane, inserted
        );
        Ok(inserted)
    }

    /// Registers one randomly generated schema on-chain. Up to 5
    /// attempts with a 10 s pause; an out-of-gas account is a clean
    /// stop, exhaustion is a plain failure.
    pub async fn create_schema(&self) -> bool {
        for attempt in 1..=TX_ATTEMPTS {
            let schema_json = {
                let mut rng = rand::thread_rng();
                let schema = payload::random_schema_payload(&mut rng);
                match serde_json::to_string(&schema) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Lane {} | Could not serialize schema payload: {}", self.lane, e);
                        return false;
                    }
                }
            };

            let calldata = register_calldata(self.address, &schema_json);
            match self.send_contract_tx(calldata).await {
                Ok(tx_hash) => {
                    info!(
                        "Lane {} | Schema created: {}",
                        self.lane,
                        self.network.explorer_tx(&format!("{:?}", tx_hash))
                    );
                    return true;
                }
                Err(e) if gas::is_insufficient_funds(&e) => {
                    warn!("Lane {} | No funds for gas", self.lane);
                    return false;
                }
                Err(e) => {
                    error!(
                        "Lane {} | Schema creation failed (attempt {}/{}): {:#}",
                        self.lane, attempt, TX_ATTEMPTS, e
                    );
                    if attempt < TX_ATTEMPTS {
                        sleep(SCHEMA_RETRY_PAUSE).await;
                    }
                }
            }
        }
        false
    }

    /// Attests against a previously recorded schema: loads its field
    /// layout from the store, synthesizes one value per field, and
    /// addresses the attestation to a random other account. Same
    /// retry/stop shape as `create_schema`, with a 15 s pause.
    pub async fn create_attestation(&self, schema_id: &str) -> bool {
        for attempt in 1..=TX_ATTEMPTS {
            match self.try_attest(schema_id).await {
                Ok((tx_hash, recipient)) => {
                    info!(
                        "Lane {} | Attestation created: {} | Recipient: {}",
                        self.lane,
                        self.network.explorer_tx(&format!("{:?}", tx_hash)),
                        to_checksum(&recipient, None)
                    );
                    return true;
                }
                Err(e) if gas::is_insufficient_funds(&e) => {
                    warn!("Lane {} | No funds for gas", self.lane);
                    return false;
                }
                Err(e) => {
                    error!(
                        "Lane {} | Attestation failed (attempt {}/{}): {:#}",
                        self.lane, attempt, TX_ATTEMPTS, e
                    );
                    if attempt < TX_ATTEMPTS {
                        sleep(ATTEST_RETRY_PAUSE).await;
                    }
                }
            }
        }
        false
    }

    async fn try_attest(&self, schema_id: &str) -> Result<(TxHash, Address)> {
        let fields_json = self
            .store
            .fields_of(schema_id, self.network)
            .await?
            .with_context(|| format!("No field layout stored for schema {}", schema_id))?;
        let fields: Vec<SchemaField> =
            serde_json::from_str(&fields_json).context("Stored field layout is not valid JSON")?;

        let sid = parse_schema_id(schema_id)?;
        let recipient = self.credentials.random_recipient(self.address);
        let values = {
            let mut rng = rand::thread_rng();
            attestation_values(&fields, &mut rng)?
        };

        let calldata = attest_calldata(sid, self.address, recipient, &values);
        let tx_hash = self.send_contract_tx(calldata).await?;
        Ok((tx_hash, recipient))
    }

    /// Builds, signs and submits one legacy transaction to the registry
    /// contract, then waits for its receipt.
    async fn send_contract_tx(&self, calldata: Vec<u8>) -> Result<TxHash> {
        let nonce = self
            .provider
            .get_transaction_count(self.address, None)
            .await?;
        let gas_price = gas::gas_price(&self.provider, self.network).await?;

        let request = TransactionRequest::new()
            .to(self.contract)
            .from(self.address)
            .data(calldata)
            .nonce(nonce)
            .gas_price(gas_price)
            .chain_id(self.network.chain_id());
        let mut tx: TypedTransaction = request.into();

        let estimate = self.provider.estimate_gas(&tx, None).await?;
        tx.set_gas(gas::with_margin(estimate));

        let signature = self.wallet.sign_transaction(&tx).await?;
        let raw = tx.rlp_signed(&signature);

        let pending = self.provider.send_raw_transaction(raw).await?;
        let receipt = pending
            .await?
            .context("Transaction dropped without a receipt")?;

        if receipt.status == Some(1u64.into()) {
            Ok(receipt.transaction_hash)
        } else {
            Err(SessionError::TransactionReverted {
                tx_hash: format!("{:?}", receipt.transaction_hash),
            }
            .into())
        }
    }

    /// Releases the HTTP session. Consuming `self` drops the client's
    /// connection pool on every exit path.
    pub async fn logout(self) {
        info!("Lane {} | Session closed", self.lane);
    }
}

#[async_trait]
impl SessionActions for SignSession {
    async fn create_schema(&self) -> bool {
        SignSession::create_schema(self).await
    }

    async fn create_attestation(&self, schema_id: &str) -> bool {
        SignSession::create_attestation(self, schema_id).await
    }

    async fn fetch_user_schemas(&self) -> Result<usize> {
        SignSession::fetch_user_schemas(self).await
    }

    async fn next_attestable_schema(&self) -> Result<Option<String>> {
        self.store.random_schema_id(self.network).await
    }
}

fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| rng.sample(Alphanumeric) as char)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_lowercase_alphanumeric() {
        for _ in 0..20 {
            let nonce = generate_nonce();
            assert_eq!(nonce.len(), 12);
            assert!(nonce
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn scan_rows_deserialize_with_missing_fields() {
        let json = r#"{
            "success": true,
            "data": { "rows": [
                { "id": "abc", "chainId": "204", "schemaId": "0x1f", "data": [{"name":"n","type":"string"}] }
            ]}
        }"#;
        let parsed: ScanResponse = serde_json::from_str(json).unwrap();
        let rows = parsed.data.unwrap().rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chain_id, "204");
        let record = rows[0].clone().into_record();
        assert!(record.data.contains("\"type\":\"string\""));
    }
}
