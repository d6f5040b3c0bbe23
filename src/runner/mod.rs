//! Work coordinator: a bounded pool of lanes drains the shared key
//! feed and drives each key through the selected mode's sequence.

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::SignConfig;
use crate::constants::Network;
use crate::database::SchemaStore;
use crate::session::SignSession;
use crate::utils::credentials::{key_suffix, CredentialSource};
use crate::utils::retry::RetryGovernor;
use ethers::utils::to_checksum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Schemas,
    Attestations,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Schemas => f.write_str("schemas"),
            Mode::Attestations => f.write_str("attestations"),
        }
    }
}

/// Shared key iterator plus the global key index.
///
/// Claiming a key and taking its index happen in one place, so indices
/// form a gapless 1..=K sequence no matter how lanes interleave.
pub struct KeyFeed {
    keys: Mutex<std::vec::IntoIter<String>>,
    counter: AtomicU64,
    display_total: usize,
}

impl KeyFeed {
    /// `display_total` is the raw line count of the source file, used
    /// only for "key N of TOTAL" progress lines.
    pub fn new(keys: Vec<String>, display_total: usize) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter()),
            counter: AtomicU64::new(0),
            display_total,
        }
    }

    /// Next unclaimed key with its 1-based global index, or `None` when
    /// the feed is drained (normal lane termination).
    pub async fn next(&self) -> Option<(u64, String)> {
        let key = self.keys.lock().await.next()?;
        let index = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Some((index, key))
    }

    pub fn display_total(&self) -> usize {
        self.display_total
    }
}

/// Per-key actions a lane drives once its session is logged in.
///
/// Implemented by `SignSession`; the mode loops only see this surface,
/// so tests can substitute a scripted double.
#[async_trait]
pub trait SessionActions {
    async fn create_schema(&self) -> bool;
    async fn create_attestation(&self, schema_id: &str) -> bool;
    async fn fetch_user_schemas(&self) -> Result<usize>;
    /// Random attestable schema id on the active network, or `None`
    /// when nothing has been recorded yet.
    async fn next_attestable_schema(&self) -> Result<Option<String>>;
}

#[derive(Debug, Default, Clone)]
pub struct LaneStats {
    pub keys_processed: u64,
    pub keys_failed: u64,
    pub schemas_created: u64,
    pub attestations_created: u64,
}

pub struct Coordinator {
    config: Arc<SignConfig>,
    mode: Mode,
    network: Network,
    store: Arc<SchemaStore>,
    credentials: Arc<CredentialSource>,
    governor: Arc<RetryGovernor>,
}

impl Coordinator {
    pub fn new(
        config: SignConfig,
        mode: Mode,
        network: Network,
        store: Arc<SchemaStore>,
        credentials: Arc<CredentialSource>,
        governor: Arc<RetryGovernor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            mode,
            network,
            store,
            credentials,
            governor,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let feed = Arc::new(KeyFeed::new(
            self.credentials.keys().to_vec(),
            self.credentials.raw_line_count(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.threads));
        let mut set = JoinSet::new();

        let start_time = std::time::Instant::now();
        info!(
            "Starting {} lanes | mode: {} | network: {}",
            self.config.threads,
            self.mode,
            self.network.label()
        );

        for lane in 1..=self.config.threads {
            let span = info_span!("lane", lane_id = format!("{:02}", lane));
            let ctx = LaneContext {
                lane,
                mode: self.mode,
                network: self.network,
                config: Arc::clone(&self.config),
                feed: Arc::clone(&feed),
                semaphore: Arc::clone(&semaphore),
                store: Arc::clone(&self.store),
                credentials: Arc::clone(&self.credentials),
                governor: Arc::clone(&self.governor),
            };
            set.spawn(lane_loop(ctx).instrument(span));
        }

        let mut totals = LaneStats::default();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(stats) => {
                    totals.keys_processed += stats.keys_processed;
                    totals.keys_failed += stats.keys_failed;
                    totals.schemas_created += stats.schemas_created;
                    totals.attestations_created += stats.attestations_created;
                }
                Err(e) => {
                    error!("A lane panicked or failed to join: {:?}", e);
                }
            }
        }

        info!(
            "Run complete in {:.1}s | keys: {} ({} failed) | schemas: {} | attestations: {}",
            start_time.elapsed().as_secs_f64(),
            totals.keys_processed,
            totals.keys_failed,
            totals.schemas_created,
            totals.attestations_created
        );

        Ok(())
    }
}

struct LaneContext {
    lane: usize,
    mode: Mode,
    network: Network,
    config: Arc<SignConfig>,
    feed: Arc<KeyFeed>,
    semaphore: Arc<Semaphore>,
    store: Arc<SchemaStore>,
    credentials: Arc<CredentialSource>,
    governor: Arc<RetryGovernor>,
}

async fn lane_loop(ctx: LaneContext) -> LaneStats {
    let mut stats = LaneStats::default();

    let _permit = match ctx.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return stats,
    };
    info!("Lane {} | Started", ctx.lane);

    while let Some((index, key)) = ctx.feed.next().await {
        let session = match SignSession::new(
            &key,
            ctx.lane,
            ctx.network,
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.credentials),
            ctx.config.proxy_url(),
        ) {
            Ok(session) => session,
            Err(e) => {
                error!(
                    "Lane {} | Could not build session for key ...{}: {:#}",
                    ctx.lane,
                    key_suffix(&key),
                    e
                );
                stats.keys_failed += 1;
                continue;
            }
        };

        info!(
            "Lane {} | key ...{} | {} | {} of {}",
            ctx.lane,
            key_suffix(&key),
            to_checksum(&session.address(), None),
            index,
            ctx.feed.display_total()
        );

        let logged_in = ctx
            .governor
            .run(ctx.lane, &key, "login", || session.login())
            .await
            .is_some();

        if logged_in {
            match ctx.mode {
                Mode::Schemas => {
                    run_schema_mode(
                        ctx.lane,
                        &ctx.config,
                        &ctx.governor,
                        &key,
                        &session,
                        &mut stats,
                    )
                    .await
                }
                Mode::Attestations => {
                    run_attestation_mode(ctx.lane, &ctx.config, &session, &mut stats).await
                }
            }
        } else {
            stats.keys_failed += 1;
        }

        session.logout().await;
        stats.keys_processed += 1;
    }

    info!("Lane {} | Finished", ctx.lane);
    stats
}

pub async fn run_schema_mode<A: SessionActions + Sync>(
    lane: usize,
    config: &SignConfig,
    governor: &RetryGovernor,
    key: &str,
    actions: &A,
    stats: &mut LaneStats,
) {
    let target = pick_count(config.schemas_to_create);
    let mut created = 0u64;

    for _ in 0..target {
        if actions.create_schema().await {
            created += 1;
            stats.schemas_created += 1;
            pause_between_creations(config).await;
        }
    }

    if created > 0 {
        info!(
            "Lane {} | Created {} new schemas, syncing them to the store",
            lane, created
        );
        governor
            .run(lane, key, "fetch_user_schemas", || {
                actions.fetch_user_schemas()
            })
            .await;
    }
}

pub async fn run_attestation_mode<A: SessionActions + Sync>(
    lane: usize,
    config: &SignConfig,
    actions: &A,
    stats: &mut LaneStats,
) {
    let target = pick_count(config.attestations_to_create);
    let mut created = 0u64;

    for _ in 0..target {
        let schema_id = match actions.next_attestable_schema().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!("Lane {} | No schemas recorded yet, nothing to attest", lane);
                break;
            }
            Err(e) => {
                error!("Lane {} | Schema store unavailable: {:#}", lane, e);
                break;
            }
        };

        if actions.create_attestation(&schema_id).await {
            created += 1;
            stats.attestations_created += 1;
            pause_between_creations(config).await;
        }
    }

    info!("Lane {} | Created {} attestations", lane, created);
}

fn pick_count(range: [u32; 2]) -> u32 {
    let mut rng = rand::thread_rng();
    rng.gen_range(range[0]..=range[1].max(range[0]))
}

async fn pause_between_creations(config: &SignConfig) {
    let secs = {
        let [lo, hi] = config.pause_between_creations;
        let mut rng = rand::thread_rng();
        rng.gen_range(lo..=hi.max(lo))
    };
    sleep(Duration::from_secs(secs)).await;
}
