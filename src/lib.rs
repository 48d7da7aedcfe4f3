//! Junction - AI API gateway
//!
//! This library provides the core functionality for the Junction gateway.
//! Inbound calls on `/{provider}/{path...}` are rewritten with per-provider
//! authentication, forwarded upstream, and every outcome is folded into
//! per-day usage statistics and an append-only audit log.

pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod routes;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

pub use crate::audit::{AuditLog, InMemoryAuditLog, RedisAuditLog};
pub use crate::config::Config;
pub use crate::proxy::Forwarder;
pub use crate::registry::{InMemoryRegistry, ProviderRegistry, RedisRegistry};
pub use crate::usage::{InMemoryLedger, RedisLedger, UsageLedger, UsageRecorder};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
    pub registry: Arc<dyn ProviderRegistry>,
    pub ledger: Arc<dyn UsageLedger>,
    pub audit: Arc<dyn AuditLog>,
    pub recorder: Arc<UsageRecorder>,
    pub forwarder: Forwarder,
}

impl AppState {
    /// Create application state with backends chosen from the configuration:
    /// Redis when `REDIS_URL` is set, in-memory otherwise.
    pub async fn new(config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let (registry, ledger, audit): (
            Arc<dyn ProviderRegistry>,
            Arc<dyn UsageLedger>,
            Arc<dyn AuditLog>,
        ) = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let conn = redis::aio::ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")?;
                info!("Using Redis storage backends");
                (
                    Arc::new(RedisRegistry::new(conn.clone())),
                    Arc::new(RedisLedger::new(conn.clone())),
                    Arc::new(RedisAuditLog::new(conn)),
                )
            }
            None => {
                warn!("REDIS_URL is not set; providers, usage and audit data will not survive a restart");
                (
                    Arc::new(InMemoryRegistry::new()),
                    Arc::new(InMemoryLedger::new()),
                    Arc::new(InMemoryAuditLog::new()),
                )
            }
        };

        seed_registry(&config, registry.as_ref()).await?;

        Ok(Self::with_stores(config, http_client, registry, ledger, audit))
    }

    /// Assemble state from explicit backends. Tests use this with in-memory
    /// stores; `new` uses it after choosing backends.
    pub fn with_stores(
        config: Config,
        http_client: reqwest::Client,
        registry: Arc<dyn ProviderRegistry>,
        ledger: Arc<dyn UsageLedger>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let recorder = Arc::new(UsageRecorder::new(ledger.clone(), audit.clone()));
        let forwarder = Forwarder::new(http_client.clone(), config.default_timeout_seconds);

        Self {
            config,
            http_client,
            start_time: Instant::now(),
            registry,
            ledger,
            audit,
            recorder,
            forwarder,
        }
    }
}

/// Load seed providers into an empty registry
async fn seed_registry(config: &Config, registry: &dyn ProviderRegistry) -> Result<()> {
    let Some(path) = &config.providers_file else {
        return Ok(());
    };

    if !registry.list().await?.is_empty() {
        info!("Provider registry already populated, skipping seed file");
        return Ok(());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read provider seed file {path}"))?;
    let records = config::parse_seed_providers(&raw)?;
    let count = records.len();

    for mut record in records {
        record.created_at = Some(Utc::now());
        registry.insert(record).await?;
    }

    info!(count, file = %path, "Seeded provider registry");
    Ok(())
}
