use miette::{IntoDiagnostic, Result, miette};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tsundoku_cache::{
    BackendHandle, BackendKind, CacheOptions, CacheStore, Database, KeyValueBackend, ResponseCacheBackend, SqliteBackend,
};
use tsundoku_catalog::{InitSource, PageManager, PageOptions, SyncOptions, Syncer};
use tsundoku_config::Config;
use tsundoku_model::{ClockHandle, SystemClock};
use tsundoku_remote::{
    BatchOptions, BatchScheduler, CatalogResolver, FetchOptions, ProxyFallbackFetcher, ReqwestTransport, ResolverOptions,
};
use tsundoku_storage::backend::DirectoryStore;

/// Turn a library error tree into a diagnostic, keeping the whole tree.
pub fn report<E: Debug>(error: E) -> miette::Report {
    miette!("{error:?}")
}

/// Everything a command needs, wired from the configuration.
pub struct Engine {
    pub config: Config,
    pub cache: Arc<CacheStore>,
    scheduler: BatchScheduler,
    clock: ClockHandle,
}

async fn build_tier(kind: BackendKind, config: &Config, dir: &Path) -> Result<BackendHandle> {
    Ok(match kind {
        BackendKind::Sqlite => {
            let db = Database::connect(dir.join("cache.sqlite")).await.map_err(report)?;
            Arc::new(SqliteBackend::from(&db))
        },
        BackendKind::KeyValue => {
            let store = DirectoryStore::new("keyvalue", dir.join("kv")).map_err(report)?;
            let backend = KeyValueBackend::new(Arc::new(store), config.cache.prefix.clone());
            match config.cache.quota_bytes {
                Some(quota) => Arc::new(backend.with_quota(quota)),
                None => Arc::new(backend),
            }
        },
        BackendKind::Response => {
            let store = DirectoryStore::new("responses", dir.join("responses")).map_err(report)?;
            Arc::new(ResponseCacheBackend::new(Arc::new(store), format!("tsundoku-v{}", config.cache.schema_version)))
        },
    })
}

impl Engine {
    pub async fn open(config: Config) -> Result<Self> {
        let clock = SystemClock::handle();
        let dir = std::path::absolute(&config.cache.dir).into_diagnostic()?;
        std::fs::create_dir_all(&dir).into_diagnostic()?;

        let mut tiers = Vec::with_capacity(config.cache.tiers.len());
        for &kind in &config.cache.tiers {
            match build_tier(kind, &config, &dir).await {
                Ok(tier) => tiers.push(tier),
                Err(error) => tracing::warn!(backend = %kind, %error, "Cache tier unavailable"),
            }
        }
        let options = CacheOptions {
            max_age_ms: config.cache.max_age_ms(),
            compression: config.cache.compression,
            schema_version: config.cache.schema_version,
            context: config.cache.context,
        };
        let cache = CacheStore::open(tiers, options, Arc::clone(&clock)).await.map_err(report)?;

        let transport = ReqwestTransport::new().map_err(report)?;
        let fetcher = ProxyFallbackFetcher::new(Arc::new(transport), config.network.proxies.clone());
        let resolver = CatalogResolver::new(
            fetcher,
            ResolverOptions {
                raw_host: config.catalog.raw_host.clone(),
                image_proxy: config.catalog.image_proxy.clone(),
                placeholder_image: config.catalog.placeholder_image.clone(),
                fetch: Self::fetch_options(&config),
            },
            Arc::clone(&clock),
        );
        let scheduler = BatchScheduler::new(
            Arc::new(resolver),
            BatchOptions { size: config.batch.size, delay: config.batch.delay() },
        );
        tracing::debug!(backend = %cache.backend(), dir = %dir.display(), "Engine ready");
        Ok(Self { config, cache: Arc::new(cache), scheduler, clock })
    }

    fn fetch_options(config: &Config) -> FetchOptions {
        FetchOptions { timeout: config.network.timeout(), retries: config.network.retries }
    }

    fn index_url(&self) -> Result<&str> {
        match self.config.catalog.index_url.as_str() {
            "" => Err(miette!(help = "set catalog.index_url or TSUNDOKU_CATALOG__INDEX_URL", "no catalog index configured")),
            url => Ok(url),
        }
    }

    pub fn syncer(&self) -> Syncer {
        let options = SyncOptions {
            index_url: self.config.catalog.index_url.clone(),
            fetch: Self::fetch_options(&self.config),
            cooldown: self.config.sync.cooldown(),
        };
        Syncer::new(Arc::clone(&self.cache), self.scheduler.clone(), options, Arc::clone(&self.clock))
    }

    pub fn require_index(&self) -> Result<()> {
        self.index_url().map(|_| ())
    }

    /// A page manager started from the cached light index, falling back to
    /// the remote index.
    pub async fn pages(&self) -> Result<PageManager> {
        let manager = PageManager::new(PageOptions {
            page_size: self.config.pages.page_size,
            window_radius: self.config.pages.window_radius,
            placeholder_image: self.config.catalog.placeholder_image.clone(),
        });
        let cached = self.syncer().cached_light_index().await.map_err(report)?;
        let fetch = Self::fetch_options(&self.config);
        let source = match cached {
            Some(light) => InitSource::Prebuilt(light),
            None => {
                tracing::info!("No cached light index, fetching the remote index");
                InitSource::Remote { fetcher: self.scheduler.resolver().fetcher(), url: self.index_url()?, options: &fetch }
            },
        };
        manager.initialize(source).await.map_err(report)?;
        Ok(manager)
    }
}
