use std::path::{Path, PathBuf};
use std::{env, fmt, fs, str::FromStr};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIB: usize = 1024 * 1024;

/// Default capacity of the channel feeding a spawned session task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Provider presets
// ============================================================================

/// Target storage provider. Selects the default limits and size estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    MongoDb,
    CosmosDb,
}

impl Provider {
    pub fn defaults(self) -> BufferConfig {
        match self {
            Provider::MongoDb => BufferConfig::MONGODB,
            Provider::CosmosDb => BufferConfig::COSMOSDB,
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Provider::MongoDb),
            "cosmosdb" | "cosmos" => Ok(Provider::CosmosDb),
            other => anyhow::bail!("unknown provider {other:?} (expected mongodb or cosmosdb)"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::MongoDb => f.write_str("mongodb"),
            Provider::CosmosDb => f.write_str("cosmosdb"),
        }
    }
}

// ============================================================================
// Buffer limits
// ============================================================================

/// Admission limits for a single destination buffer.
///
/// `max_single_item_size_bytes` is expected to be at most `max_total_size_bytes`;
/// this is checked by [`BufferConfig::validate`] but only reported, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub max_item_count: usize,
    pub max_total_size_bytes: usize,
    pub max_single_item_size_bytes: usize,
}

impl BufferConfig {
    /// MongoDB: 16 MiB document ceiling, large batches.
    pub const MONGODB: Self = Self {
        max_item_count: 1000,
        max_total_size_bytes: 32 * MIB,
        max_single_item_size_bytes: 16 * MIB,
    };

    /// Cosmos DB: 2 MiB item quota, small batches.
    pub const COSMOSDB: Self = Self {
        max_item_count: 100,
        max_total_size_bytes: 2 * MIB,
        max_single_item_size_bytes: 2 * MIB,
    };

    pub fn with_overrides(provider: Provider, overrides: BufferOverrides) -> Self {
        overrides.apply(provider.defaults())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_item_count == 0 {
            anyhow::bail!("max_item_count must be > 0");
        }
        if self.max_total_size_bytes == 0 {
            anyhow::bail!("max_total_size_bytes must be > 0");
        }
        if self.max_single_item_size_bytes > self.max_total_size_bytes {
            warn!(
                "max_single_item_size_bytes={} exceeds max_total_size_bytes={}; such documents can never be buffered",
                self.max_single_item_size_bytes, self.max_total_size_bytes
            );
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::MONGODB
    }
}

/// Partial limits. Unset fields fall back to the provider preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BufferOverrides {
    pub max_item_count: Option<usize>,
    pub max_total_size_bytes: Option<usize>,
    pub max_single_item_size_bytes: Option<usize>,
}

impl BufferOverrides {
    pub fn apply(&self, base: BufferConfig) -> BufferConfig {
        BufferConfig {
            max_item_count: self.max_item_count.unwrap_or(base.max_item_count),
            max_total_size_bytes: self
                .max_total_size_bytes
                .unwrap_or(base.max_total_size_bytes),
            max_single_item_size_bytes: self
                .max_single_item_size_bytes
                .unwrap_or(base.max_single_item_size_bytes),
        }
    }
}

// ============================================================================
// Settings loading
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: Provider,
    pub buffer: BufferConfig,
    pub channel_capacity: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    provider: Option<Provider>,
    max_item_count: Option<usize>,
    max_total_size_bytes: Option<usize>,
    max_single_item_size_bytes: Option<usize>,
    channel_capacity: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

impl Settings {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            buffer: provider.defaults(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Load settings from `path`, else the default config file if present, else
    /// presets. Environment variables override file values.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let raw = match path {
            Some(path) => read_raw(&path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    read_raw(&default_path)?
                } else {
                    RawSettings::default()
                }
            }
        };
        Self::resolve(raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw = toml::from_str::<RawSettings>(raw).context("parsing settings")?;
        Self::resolve(raw)
    }

    fn resolve(mut raw: RawSettings) -> Result<Self> {
        if let Ok(v) = env::var("BUFFER_PROVIDER") {
            raw.provider = Some(v.parse::<Provider>().context("BUFFER_PROVIDER")?);
        }
        maybe_env_usize(&mut raw.max_item_count, "BUFFER_MAX_ITEM_COUNT");
        maybe_env_usize(&mut raw.max_total_size_bytes, "BUFFER_MAX_TOTAL_SIZE_BYTES");
        maybe_env_usize(
            &mut raw.max_single_item_size_bytes,
            "BUFFER_MAX_SINGLE_ITEM_SIZE_BYTES",
        );
        maybe_env_usize(&mut raw.channel_capacity, "BUFFER_CHANNEL_CAPACITY");

        let provider = raw.provider.unwrap_or_default();
        let overrides = BufferOverrides {
            max_item_count: raw.max_item_count,
            max_total_size_bytes: raw.max_total_size_bytes,
            max_single_item_size_bytes: raw.max_single_item_size_bytes,
        };
        let settings = Self {
            provider,
            buffer: BufferConfig::with_overrides(provider, overrides),
            channel_capacity: raw.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.buffer.validate()?;
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be > 0");
        }
        Ok(())
    }
}

fn read_raw(path: &Path) -> Result<RawSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    toml::from_str::<RawSettings>(&raw)
        .with_context(|| format!("parsing settings file {}", path.display()))
}

/// `config.toml` in the platform config directory, used when no path is given.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "docbuffer", "docbuffer")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".docbuffer/config.toml"))
}

fn maybe_env_usize(val: &mut Option<usize>, key: &str) {
    if let Ok(v) = env::var(key) {
        match v.parse::<usize>() {
            Ok(n) => *val = Some(n),
            Err(_) => warn!("ignoring {key}={v:?}: not a non-negative integer"),
        }
    }
}
