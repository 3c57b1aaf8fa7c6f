//! Configuration, source registry, and the upsert orchestration behind every sync batch.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ohub_adapters::{
    adapter_for_kind, AdapterOptions, AdapterStatus, FetchFilters, ProviderConfig, ProviderKind,
    SourceAdapter,
};
use ohub_core::{Opportunity, StoredOpportunity};
use ohub_storage::{
    HttpClientConfig, HttpFetcher, InMemoryOpportunityStore, JsonTransport, OpportunityStore,
    PgOpportunityStore, StoreError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "ohub-sync";

pub const DEFAULT_SOURCES_PATH: &str = "sources.yaml";
pub const DEFAULT_USER_AGENT: &str = "ohub-bot/0.1";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_WEB_PORT: u16 = 8000;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub kind: ProviderKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub base_url_env: String,
    #[serde(default)]
    pub credential_env: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    fn builtin(kind: ProviderKind, base_url_env: &str, credential_env: Option<&str>) -> Self {
        Self {
            source_id: kind.default_source_id().to_string(),
            kind,
            enabled: true,
            base_url_env: base_url_env.to_string(),
            credential_env: credential_env.map(ToString::to_string),
        }
    }
}

impl SourceRegistry {
    /// Registry used when no YAML file is available: the three known providers.
    pub fn builtin() -> Self {
        Self {
            sources: vec![
                SourceConfig::builtin(
                    ProviderKind::Franchise,
                    "FRANCHISE_API_URL",
                    Some("FRANCHISE_API_KEY"),
                ),
                SourceConfig::builtin(
                    ProviderKind::RealEstate,
                    "REAL_ESTATE_API_URL",
                    Some("REAL_ESTATE_API_KEY"),
                ),
                SourceConfig::builtin(ProviderKind::Public, "PUBLIC_LISTINGS_URL", None),
            ],
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing source registry")?;
        let mut seen = HashSet::new();
        for source in &registry.sources {
            if !seen.insert(source.source_id.as_str()) {
                bail!("duplicate source_id in registry: {}", source.source_id);
            }
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Enabled entries in registry order, with their env-provided endpoint and credential.
    pub fn resolve(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<ResolvedSource> {
        self.sources
            .iter()
            .filter(|source| source.enabled)
            .map(|source| ResolvedSource {
                kind: source.kind,
                provider: ProviderConfig {
                    source_id: source.source_id.clone(),
                    base_url: lookup(&source.base_url_env),
                    api_key: source.credential_env.as_deref().and_then(|name| lookup(name)),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub kind: ProviderKind,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub sources_path: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub web_port: u16,
    pub sources: Vec<ResolvedSource>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let sources_path = match var("OHUB_SOURCES_PATH") {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let default = PathBuf::from(DEFAULT_SOURCES_PATH);
                default.exists().then_some(default)
            }
        };
        let registry = match &sources_path {
            Some(path) => SourceRegistry::load(path)?,
            None => SourceRegistry::builtin(),
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            user_agent: var("OHUB_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: var("OHUB_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            probe_timeout_secs: var("OHUB_PROBE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            web_port: var("OHUB_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WEB_PORT),
            sources: registry.resolve(&var),
            sources_path,
        })
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            probe_timeout: Some(Duration::from_secs(self.probe_timeout_secs)),
        }
    }
}

/// One adapter per enabled registry entry, all sharing `transport`.
pub fn build_adapters(
    config: &SyncConfig,
    transport: Arc<dyn JsonTransport>,
) -> Vec<Box<dyn SourceAdapter>> {
    let options = config.adapter_options();
    config
        .sources
        .iter()
        .map(|source| {
            adapter_for_kind(
                source.kind,
                source.provider.clone(),
                Arc::clone(&transport),
                options.clone(),
            )
        })
        .collect()
}

/// Postgres when `DATABASE_URL` is set (migrated on open), otherwise process memory.
pub async fn open_store(config: &SyncConfig) -> Result<Arc<dyn OpportunityStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgOpportunityStore::connect(url).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; opportunities are kept in memory only");
            Ok(Arc::new(InMemoryOpportunityStore::new()))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: BTreeMap<String, usize>,
    pub report: SyncReport,
}

enum Upserted {
    Added,
    Updated,
}

pub struct SyncPipeline {
    adapters: Vec<Box<dyn SourceAdapter>>,
    store: Arc<dyn OpportunityStore>,
    batch_lock: Mutex<()>,
}

impl SyncPipeline {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, store: Arc<dyn OpportunityStore>) -> Self {
        Self {
            adapters,
            store,
            batch_lock: Mutex::new(()),
        }
    }

    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        let transport: Arc<dyn JsonTransport> =
            Arc::new(HttpFetcher::new(config.http_client_config())?);
        let store = open_store(config).await?;
        Ok(Self::new(build_adapters(config, transport), store))
    }

    pub fn adapters(&self) -> &[Box<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn store(&self) -> &Arc<dyn OpportunityStore> {
        &self.store
    }

    /// Upsert `records` one at a time by `(title, source)`.
    ///
    /// A persistence failure skips only the record it hit. Calls on the same
    /// pipeline never interleave.
    pub async fn sync(&self, records: &[Opportunity]) -> SyncReport {
        let _guard = self.batch_lock.lock().await;
        let span = info_span!("sync_batch", total = records.len());
        self.sync_locked(records).instrument(span).await
    }

    async fn sync_locked(&self, records: &[Opportunity]) -> SyncReport {
        let mut report = SyncReport {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            match self.upsert(record).await {
                Ok(Upserted::Added) => report.added += 1,
                Ok(Upserted::Updated) => report.updated += 1,
                Err(err) => {
                    let (title, source) = record.identity_key();
                    warn!(%source, %title, error = %err, "skipping opportunity after store failure");
                    report.skipped += 1;
                }
            }
        }

        info!(
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            total = report.total,
            "sync batch finished"
        );
        report
    }

    async fn upsert(&self, record: &Opportunity) -> Result<Upserted, StoreError> {
        let (title, source) = record.identity_key();
        match self.store.find_by_key(title, source).await? {
            Some(existing) => {
                self.store.update(existing.id, record).await?;
                Ok(Upserted::Updated)
            }
            None => {
                self.store.insert(record).await?;
                Ok(Upserted::Added)
            }
        }
    }

    /// Fetch every adapter in registry order, then sync the concatenated output.
    pub async fn ingest(&self, filters: &FetchFilters) -> IngestSummary {
        let started_at = Utc::now();
        let mut fetched = BTreeMap::new();
        let mut records = Vec::new();

        for adapter in &self.adapters {
            let batch = adapter.fetch(filters).await;
            fetched.insert(adapter.source_id().to_string(), batch.len());
            records.extend(batch);
        }

        let report = self.sync(&records).await;
        IngestSummary {
            started_at,
            finished_at: Utc::now(),
            fetched,
            report,
        }
    }

    pub fn statuses(&self) -> Vec<AdapterStatus> {
        self.adapters.iter().map(|adapter| adapter.status()).collect()
    }

    pub async fn test_connections(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for adapter in &self.adapters {
            let reachable = adapter.test_connection().await;
            results.insert(adapter.source_id().to_string(), reachable);
        }
        results
    }

    pub async fn list_active(&self, limit: usize) -> Result<Vec<StoredOpportunity>, StoreError> {
        self.store.list_active(limit).await
    }
}

pub async fn run_sync_once_from_env() -> Result<IngestSummary> {
    let config = SyncConfig::from_env()?;
    let pipeline = SyncPipeline::from_config(&config).await?;
    Ok(pipeline.ingest(&FetchFilters::default()).await)
}
