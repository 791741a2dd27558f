//! Layered configuration: serialized defaults, then a config file, then
//! `TSUNDOKU_`-prefixed environment variables (`__` separates sections, so
//! `TSUNDOKU_BATCH__SIZE=20` sets `batch.size`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tsundoku_cache::{BackendKind, ExecutionContext};
use tsundoku_codec::Compression;

pub const ENV_PREFIX: &str = "TSUNDOKU_";
const CONFIG_FILES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];
const MAX_BATCH_SIZE: usize = 1000;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tsundoku")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Location of the remote catalog index. Required for syncing.
    pub index_url: String,
    /// Prefix applied to document cover urls.
    pub image_proxy: Option<String>,
    pub placeholder_image: String,
    /// Host decoded repository paths are fetched from.
    pub raw_host: String,
}
impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            index_url: String::new(),
            image_proxy: None,
            placeholder_image: "https://placehold.co/300x450?text=No+Cover".to_string(),
            raw_host: "https://raw.githubusercontent.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Tried in order after the direct request fails.
    pub proxies: Vec<String>,
    pub timeout_ms: u64,
    /// Extra rotations over the direct route and every proxy.
    pub retries: u32,
}
impl Default for NetworkConfig {
    fn default() -> Self {
        Self { proxies: Vec::new(), timeout_ms: 10_000, retries: 1 }
    }
}
impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub delay_ms: u64,
}
impl Default for BatchConfig {
    fn default() -> Self {
        Self { size: 150, delay_ms: 1_000 }
    }
}
impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Namespace of every entry in the key-value tier.
    pub prefix: String,
    pub max_age_secs: u64,
    pub compression: Compression,
    pub schema_version: u32,
    /// Tiers in rank order; the first usable one serves reads.
    pub tiers: Vec<BackendKind>,
    pub context: ExecutionContext,
    /// Byte quota of the key-value tier.
    pub quota_bytes: Option<u64>,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: project_dirs().map_or_else(|| PathBuf::from(".tsundoku"), |dirs| dirs.cache_dir().to_path_buf()),
            prefix: "tsundoku:".to_string(),
            max_age_secs: 24 * 60 * 60,
            compression: Compression::Gzip,
            schema_version: 1,
            tiers: BackendKind::DEFAULT_RANKING.to_vec(),
            context: ExecutionContext::Standard,
            quota_bytes: None,
        }
    }
}
impl CacheConfig {
    pub fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age_secs).unwrap_or(i64::MAX / 1000).saturating_mul(1000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagesConfig {
    pub page_size: usize,
    pub window_radius: u32,
}
impl Default for PagesConfig {
    fn default() -> Self {
        Self { page_size: 50, window_radius: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync suppression after the network was found unavailable.
    pub cooldown_secs: u64,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self { cooldown_secs: 300 }
    }
}
impl SyncConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub network: NetworkConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub pages: PagesConfig,
    pub sync: SyncConfig,
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Invalid("config file extension")),
    })
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load the configuration.
    ///
    /// With `path`, that file is required. Without, any `config.{toml,yaml,json}`
    /// in the user's config directory is used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                tracing::debug!(path = %path.display(), "Loading config file");
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(dirs) = project_dirs() {
                    for name in CONFIG_FILES {
                        figment = merge_file(figment, &dirs.config_dir().join(name))?;
                    }
                }
            },
        }
        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.catalog.index_url.is_empty() && !is_http(&self.catalog.index_url) {
            exn::bail!(ErrorKind::Invalid("catalog.index_url"));
        }
        if !is_http(&self.catalog.raw_host) {
            exn::bail!(ErrorKind::Invalid("catalog.raw_host"));
        }
        if self.network.proxies.iter().any(|proxy| !is_http(proxy)) {
            exn::bail!(ErrorKind::Invalid("network.proxies"));
        }
        if self.network.timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("network.timeout_ms"));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch.size) {
            exn::bail!(ErrorKind::Invalid("batch.size"));
        }
        if self.cache.tiers.is_empty() {
            exn::bail!(ErrorKind::Invalid("cache.tiers"));
        }
        if self.cache.prefix.is_empty() {
            exn::bail!(ErrorKind::Invalid("cache.prefix"));
        }
        if self.pages.page_size == 0 {
            exn::bail!(ErrorKind::Invalid("pages.page_size"));
        }
        Ok(())
    }
}
