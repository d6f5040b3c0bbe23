//! Random payload generation and calldata encoding for the registry
//! contract.

use anyhow::{Context, Result};
use ethers::abi::{encode, Token};
use ethers::types::Address;
use ethers::utils::{id, to_checksum};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const FIELD_TYPES: [&str; 4] = ["string", "bool", "bytes", "uint256"];

const WORDS: &[&str] = &[
    "account", "action", "amount", "anchor", "badge", "balance", "beacon", "bridge", "carbon",
    "charge", "claim", "cluster", "credit", "degree", "detail", "domain", "effect", "engine",
    "factor", "filter", "garden", "grade", "handle", "harbor", "impact", "index", "ledger",
    "level", "margin", "marker", "member", "metric", "module", "notice", "object", "orbit",
    "output", "packet", "period", "permit", "phase", "pledge", "policy", "profile", "quorum",
    "rating", "record", "region", "report", "result", "sample", "scope", "sector", "signal",
    "source", "status", "stream", "summary", "ticket", "token", "trace", "value", "vector",
    "window",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPayload {
    pub name: String,
    pub description: String,
    pub data: Vec<SchemaField>,
}

pub fn random_word<R: Rng>(rng: &mut R) -> &'static str {
    WORDS.choose(rng).copied().unwrap_or("record")
}

/// Sentence-like description of 5 to 15 words.
pub fn random_sentence<R: Rng>(rng: &mut R) -> String {
    let count = rng.gen_range(5..=15);
    let words: Vec<&str> = (0..count).map(|_| random_word(rng)).collect();
    let mut sentence = words.join(" ");
    if let Some(first) = sentence.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    sentence.push('.');
    sentence
}

/// Name, description and 1 to 5 typed fields, all pseudo-random.
pub fn random_schema_payload<R: Rng>(rng: &mut R) -> SchemaPayload {
    let field_count = rng.gen_range(1..=5);
    let data = (0..field_count)
        .map(|_| SchemaField {
            name: random_word(rng).to_string(),
            field_type: FIELD_TYPES
                .choose(rng)
                .copied()
                .unwrap_or("string")
                .to_string(),
        })
        .collect();

    SchemaPayload {
        name: random_word(rng).to_string(),
        description: random_sentence(rng),
        data,
    }
}

/// One synthetic value per declared field: string gets a random word,
/// bool a coin flip, bytes stays empty, uint256 is zero.
pub fn attestation_values<R: Rng>(fields: &[SchemaField], rng: &mut R) -> Result<Vec<Token>> {
    fields
        .iter()
        .map(|field| match field.field_type.to_lowercase().as_str() {
            "string" => Ok(Token::String(random_word(rng).to_string())),
            "bool" => Ok(Token::Bool(rng.gen_bool(0.5))),
            "bytes" => Ok(Token::Bytes(Vec::new())),
            "uint256" => Ok(Token::Uint(0u64.into())),
            other => Err(SessionError::UnknownFieldType {
                field_type: other.to_string(),
            }
            .into()),
        })
        .collect()
}

/// Stored schema ids are hexadecimal, with or without a 0x prefix.
pub fn parse_schema_id(schema_id: &str) -> Result<u64> {
    let digits = schema_id.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .with_context(|| format!("Schema id {} is not hexadecimal", schema_id))
}

/// `register(Schema schema, bytes delegateSignature)` calldata.
///
/// Zero revocation duration, default resolver, no delegate signature.
pub fn register_calldata(registrant: Address, schema_json: &str) -> Vec<u8> {
    let selector = id("register((address,bool,uint8,uint64,address,uint64,string),bytes)");

    let schema = Token::Tuple(vec![
        Token::Address(registrant),
        Token::Bool(true),                 // revocable
        Token::Uint(0u64.into()),          // dataLocation: on-chain
        Token::Uint(0u64.into()),          // maxValidFor
        Token::Address(Address::zero()),   // hook
        Token::Uint(0u64.into()),          // timestamp
        Token::String(schema_json.to_string()),
    ]);

    let mut calldata = selector.to_vec();
    calldata.extend(encode(&[schema, Token::Bytes(Vec::new())]));
    calldata
}

/// `attest(Attestation attestation, string indexingKey, bytes
/// delegateSignature, bytes extraData)` calldata.
///
/// Self-attested, non-revoked, immediately valid, not linked to a prior
/// attestation. Recipients are ABI-encoded checksummed address strings,
/// matching what the registry indexer expects.
pub fn attest_calldata(
    schema_id: u64,
    attester: Address,
    recipient: Address,
    values: &[Token],
) -> Vec<u8> {
    let selector = id(
        "attest((uint64,uint64,uint64,uint64,address,uint64,uint8,bool,bytes[],bytes),string,bytes,bytes)",
    );

    let recipient_blob = encode(&[Token::String(to_checksum(&recipient, None))]);
    let data_blob = encode(values);

    let attestation = Token::Tuple(vec![
        Token::Uint(schema_id.into()),
        Token::Uint(0u64.into()),        // linkedAttestationId
        Token::Uint(0u64.into()),        // attestTimestamp
        Token::Uint(0u64.into()),        // revokeTimestamp
        Token::Address(attester),
        Token::Uint(0u64.into()),        // validUntil
        Token::Uint(0u64.into()),        // dataLocation
        Token::Bool(false),              // revoked
        Token::Array(vec![Token::Bytes(recipient_blob)]),
        Token::Bytes(data_blob),
    ]);

    let mut calldata = selector.to_vec();
    calldata.extend(encode(&[
        attestation,
        Token::String(to_checksum(&attester, None)),
        Token::Bytes(Vec::new()),
        Token::Bytes(Vec::new()),
    ]));
    calldata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_payload_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let payload = random_schema_payload(&mut rng);
            assert!(!payload.name.is_empty());
            assert!((1..=5).contains(&payload.data.len()));
            for field in &payload.data {
                assert!(FIELD_TYPES.contains(&field.field_type.as_str()));
            }
            let words = payload.description.split_whitespace().count();
            assert!((5..=15).contains(&words));
            assert!(payload.description.ends_with('.'));
        }
    }

    #[test]
    fn payload_round_trips_as_json() {
        let mut rng = rand::thread_rng();
        let payload = random_schema_payload(&mut rng);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\""));
        let back: SchemaPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data.len(), payload.data.len());
    }

    #[test]
    fn values_follow_field_types() {
        let mut rng = rand::thread_rng();
        let fields = vec![
            SchemaField {
                name: "a".into(),
                field_type: "string".into(),
            },
            SchemaField {
                name: "b".into(),
                field_type: "bool".into(),
            },
            SchemaField {
                name: "c".into(),
                field_type: "bytes".into(),
            },
            SchemaField {
                name: "d".into(),
                field_type: "uint256".into(),
            },
        ];
        let values = attestation_values(&fields, &mut rng).unwrap();
        assert!(matches!(values[0], Token::String(_)));
        assert!(matches!(values[1], Token::Bool(_)));
        assert!(matches!(&values[2], Token::Bytes(b) if b.is_empty()));
        assert!(matches!(&values[3], Token::Uint(u) if u.is_zero()));
    }

    #[test]
    fn unknown_field_type_is_an_error() {
        let mut rng = rand::thread_rng();
        let fields = vec![SchemaField {
            name: "x".into(),
            field_type: "float64".into(),
        }];
        assert!(attestation_values(&fields, &mut rng).is_err());
    }

    #[test]
    fn schema_id_parses_as_hex() {
        assert_eq!(parse_schema_id("0x1a").unwrap(), 26);
        assert_eq!(parse_schema_id("ff").unwrap(), 255);
        assert!(parse_schema_id("zz").is_err());
    }

    #[test]
    fn register_calldata_starts_with_selector() {
        let calldata = register_calldata(Address::zero(), "{}");
        let selector = id("register((address,bool,uint8,uint64,address,uint64,string),bytes)");
        assert_eq!(&calldata[..4], selector.as_slice());
        // selector + at least head words for both arguments
        assert!(calldata.len() > 4 + 64);
    }

    #[test]
    fn attest_calldata_starts_with_selector() {
        let calldata = attest_calldata(1, Address::zero(), Address::zero(), &[]);
        let selector = id(
            "attest((uint64,uint64,uint64,uint64,address,uint64,uint8,bool,bytes[],bytes),string,bytes,bytes)",
        );
        assert_eq!(&calldata[..4], selector.as_slice());
    }
}
