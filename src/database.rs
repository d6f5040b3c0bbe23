use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::Network;
use crate::error::StoreError;

/// One fetched schema row, immutable once inserted.
///
/// `data` holds the serialized field list (JSON array of
/// `{name, type}` objects) exactly as the scan service returned it.
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub id: String,
    pub mode: String,
    pub chain_type: String,
    pub chain_id: String,
    pub schema_id: String,
    pub transaction_hash: String,
    pub name: String,
    pub description: String,
    pub data_location: String,
    pub revocable: bool,
    pub max_valid_for: String,
    pub resolver: String,
    pub register_timestamp: i64,
    pub registrant: String,
    pub data: String,
    pub original_data: String,
}

/// Persistent per-network schema cache.
///
/// A single `schemas` table carries a network tag column with a
/// `UNIQUE(id, network)` constraint, so a concurrent duplicate insert
/// collapses to a no-op instead of depending on caller discipline.
/// Each operation acquires its own pooled connection; callers need no
/// external locking.
pub struct SchemaStore {
    pool: SqlitePool,
}

impl SchemaStore {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

    pub async fn new(db_path: &str) -> Result<Self> {
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)
                .with_context(|| format!("Failed to create database file {}", db_path))?;
            info!("Created new database file: {}", db_path);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(Self::DEFAULT_TIMEOUT_MS))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous=NORMAL;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite://{}", db_path))
            .await
            .map_err(|e| StoreError::QueryFailed { msg: e.to_string() })?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Idempotent schema setup. Safe to call repeatedly, never drops data.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schemas (
                id TEXT NOT NULL,
                network TEXT NOT NULL,
                mode TEXT,
                chain_type TEXT,
                chain_id TEXT,
                schema_id TEXT,
                transaction_hash TEXT,
                name TEXT,
                description TEXT,
                data_location TEXT,
                revocable INTEGER,
                max_valid_for TEXT,
                resolver TEXT,
                register_timestamp INTEGER,
                registrant TEXT,
                data TEXT,
                original_data TEXT,
                UNIQUE(id, network)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed { msg: e.to_string() })?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_schemas_network ON schemas(network);",
            "CREATE INDEX IF NOT EXISTS idx_schemas_schema_id ON schemas(network, schema_id);",
        ];
        for idx_sql in indexes {
            if let Err(e) = sqlx::query(idx_sql).execute(&self.pool).await {
                debug!("Index creation skipped (may exist): {}", e);
            }
        }

        Ok(())
    }

    pub async fn exists(&self, schema_id: &str, network: Network) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM schemas WHERE id = ? AND network = ?")
                .bind(schema_id)
                .bind(network.tag())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to check schema existence")?;
        Ok(row.is_some())
    }

    /// Inserts a record into the network partition. A record with the
    /// same id is left untouched; returns whether a row was written.
    pub async fn insert(&self, record: &SchemaRecord, network: Network) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO schemas (
                id, network, mode, chain_type, chain_id, schema_id, transaction_hash,
                name, description, data_location, revocable, max_valid_for, resolver,
                register_timestamp, registrant, data, original_data
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id, network) DO NOTHING",
        )
        .bind(&record.id)
        .bind(network.tag())
        .bind(&record.mode)
        .bind(&record.chain_type)
        .bind(&record.chain_id)
        .bind(&record.schema_id)
        .bind(&record.transaction_hash)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.data_location)
        .bind(record.revocable)
        .bind(&record.max_valid_for)
        .bind(&record.resolver)
        .bind(record.register_timestamp)
        .bind(&record.registrant)
        .bind(&record.data)
        .bind(&record.original_data)
        .execute(&self.pool)
        .await
        .context("Failed to insert schema record")?;

        Ok(result.rows_affected() > 0)
    }

    /// On-chain schema id of one record chosen uniformly at random from
    /// the partition, or `None` when the partition is empty.
    pub async fn random_schema_id(&self, network: Network) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT schema_id FROM schemas WHERE network = ? ORDER BY RANDOM() LIMIT 1",
        )
        .bind(network.tag())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to pick random schema")?;
        Ok(row.map(|r| r.0))
    }

    /// Raw serialized field list for an on-chain schema id.
    pub async fn fields_of(&self, schema_id: &str, network: Network) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM schemas WHERE schema_id = ? AND network = ?")
                .bind(schema_id)
                .bind(network.tag())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load schema fields")?;
        Ok(row.map(|r| r.0))
    }
}
