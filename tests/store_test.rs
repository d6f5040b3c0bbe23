use sign_project::constants::Network;
use sign_project::database::{SchemaRecord, SchemaStore};

fn record(id: &str, schema_id: &str) -> SchemaRecord {
    SchemaRecord {
        id: id.to_string(),
        mode: "onchain".to_string(),
        chain_type: "evm".to_string(),
        chain_id: "204".to_string(),
        schema_id: schema_id.to_string(),
        transaction_hash: "0xfeed".to_string(),
        name: "badge".to_string(),
        description: "A sample schema.".to_string(),
        data_location: "0".to_string(),
        revocable: true,
        max_valid_for: "0".to_string(),
        resolver: "0x0000000000000000000000000000000000000000".to_string(),
        register_timestamp: 1_700_000_000,
        registrant: "0x1111111111111111111111111111111111111111".to_string(),
        data: r#"[{"name":"score","type":"uint256"}]"#.to_string(),
        original_data: "{}".to_string(),
    }
}

async fn temp_store() -> (SchemaStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schemas.db");
    let store = SchemaStore::new(path.to_str().unwrap()).await.unwrap();
    (store, dir)
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let (store, _dir) = temp_store().await;
    store.insert(&record("a", "0x01"), Network::OpBnb).await.unwrap();

    // Re-running setup never drops data
    store.initialize().await.unwrap();
    store.initialize().await.unwrap();
    assert!(store.exists("a", Network::OpBnb).await.unwrap());
}

#[tokio::test]
async fn insert_then_exists() {
    let (store, _dir) = temp_store().await;
    assert!(!store.exists("a", Network::Bsc).await.unwrap());
    assert!(store.insert(&record("a", "0x01"), Network::Bsc).await.unwrap());
    assert!(store.exists("a", Network::Bsc).await.unwrap());
}

#[tokio::test]
async fn duplicate_insert_is_a_no_op() {
    let (store, _dir) = temp_store().await;
    assert!(store.insert(&record("a", "0x01"), Network::Bsc).await.unwrap());
    // Same id, same network: silently ignored
    assert!(!store.insert(&record("a", "0x02"), Network::Bsc).await.unwrap());

    let fields = store.fields_of("0x01", Network::Bsc).await.unwrap();
    assert!(fields.is_some());
    // The conflicting row did not overwrite the original
    assert!(store.fields_of("0x02", Network::Bsc).await.unwrap().is_none());
}

#[tokio::test]
async fn partitions_are_isolated_per_network() {
    let (store, _dir) = temp_store().await;
    store.insert(&record("a", "0x01"), Network::Bsc).await.unwrap();

    assert!(store.exists("a", Network::Bsc).await.unwrap());
    assert!(!store.exists("a", Network::Polygon).await.unwrap());
    assert!(store
        .random_schema_id(Network::Polygon)
        .await
        .unwrap()
        .is_none());

    // Same id may exist independently in another partition
    assert!(store.insert(&record("a", "0x09"), Network::Polygon).await.unwrap());
    assert_eq!(
        store.fields_of("0x09", Network::Polygon).await.unwrap(),
        Some(r#"[{"name":"score","type":"uint256"}]"#.to_string())
    );
}

#[tokio::test]
async fn random_schema_id_on_empty_partition_is_none() {
    let (store, _dir) = temp_store().await;
    assert!(store.random_schema_id(Network::OpBnb).await.unwrap().is_none());
}

#[tokio::test]
async fn random_schema_id_draws_from_the_partition() {
    let (store, _dir) = temp_store().await;
    for i in 0..5 {
        let id = format!("row-{}", i);
        let schema_id = format!("0x{:02x}", i + 1);
        store.insert(&record(&id, &schema_id), Network::OpBnb).await.unwrap();
    }

    for _ in 0..20 {
        let picked = store
            .random_schema_id(Network::OpBnb)
            .await
            .unwrap()
            .unwrap();
        assert!(picked.starts_with("0x"));
        let n = u64::from_str_radix(picked.trim_start_matches("0x"), 16).unwrap();
        assert!((1..=5).contains(&n));
    }
}

#[tokio::test]
async fn fields_round_trip_serialized_layout() {
    let (store, _dir) = temp_store().await;
    let mut rec = record("a", "0x2a");
    rec.data = r#"[{"name":"tag","type":"string"},{"name":"ok","type":"bool"}]"#.to_string();
    store.insert(&rec, Network::Bsc).await.unwrap();

    let fields = store.fields_of("0x2a", Network::Bsc).await.unwrap().unwrap();
    assert_eq!(fields, rec.data);
    assert!(store.fields_of("0xff", Network::Bsc).await.unwrap().is_none());
}
