//! Tests for buffer limits, provider presets and settings loading.

use docbuffer::config::{
    default_config_path, BufferConfig, BufferOverrides, Provider, Settings,
    DEFAULT_CHANNEL_CAPACITY, MIB,
};
use std::env;
use std::fs;
use std::sync::{Mutex, MutexGuard};
use tempfile::tempdir;

const BUFFER_ENV_KEYS: [&str; 5] = [
    "BUFFER_PROVIDER",
    "BUFFER_MAX_ITEM_COUNT",
    "BUFFER_MAX_TOTAL_SIZE_BYTES",
    "BUFFER_MAX_SINGLE_ITEM_SIZE_BYTES",
    "BUFFER_CHANNEL_CAPACITY",
];

/// Every test that resolves settings reads the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the env lock, clears the buffer overrides, and restores every touched
/// variable on drop.
struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn new() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut guard = Self {
            saved: Vec::new(),
            _lock: lock,
        };
        for key in BUFFER_ENV_KEYS {
            guard.remove(key);
        }
        guard
    }

    fn set(&mut self, key: &str, value: &str) {
        self.save(key);
        env::set_var(key, value);
    }

    fn remove(&mut self, key: &str) {
        self.save(key);
        env::remove_var(key);
    }

    fn save(&mut self, key: &str) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), env::var(key).ok()));
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..) {
            match value {
                Some(v) => env::set_var(&key, v),
                None => env::remove_var(&key),
            }
        }
    }
}

// ============================================================================
// Presets
// ============================================================================

#[test]
fn test_presets_single_item_fits_total() {
    for cfg in [BufferConfig::MONGODB, BufferConfig::COSMOSDB] {
        assert!(cfg.max_single_item_size_bytes <= cfg.max_total_size_bytes);
        assert!(cfg.max_item_count > 0);
    }
}

#[test]
fn test_mongo_preset_allows_larger_documents() {
    let mongo = Provider::MongoDb.defaults();
    let cosmos = Provider::CosmosDb.defaults();
    assert_eq!(mongo.max_single_item_size_bytes, 16 * MIB);
    assert!(mongo.max_single_item_size_bytes > cosmos.max_single_item_size_bytes);
    assert!(mongo.max_item_count > cosmos.max_item_count);
}

#[test]
fn test_default_is_mongo() {
    assert_eq!(BufferConfig::default(), BufferConfig::MONGODB);
    assert_eq!(Provider::default(), Provider::MongoDb);
}

#[test]
fn test_overrides_apply_subset() {
    let cfg = BufferConfig::with_overrides(
        Provider::MongoDb,
        BufferOverrides {
            max_total_size_bytes: Some(1000),
            max_single_item_size_bytes: Some(500),
            ..Default::default()
        },
    );
    assert_eq!(cfg.max_item_count, BufferConfig::MONGODB.max_item_count);
    assert_eq!(cfg.max_total_size_bytes, 1000);
    assert_eq!(cfg.max_single_item_size_bytes, 500);
}

#[test]
fn test_empty_overrides_is_preset() {
    let cfg = BufferOverrides::default().apply(BufferConfig::COSMOSDB);
    assert_eq!(cfg, BufferConfig::COSMOSDB);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validate_rejects_zero_limits() {
    let mut cfg = BufferConfig::COSMOSDB;
    cfg.max_item_count = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = BufferConfig::COSMOSDB;
    cfg.max_total_size_bytes = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_validate_allows_single_above_total() {
    let cfg = BufferConfig {
        max_item_count: 10,
        max_total_size_bytes: 100,
        max_single_item_size_bytes: 200,
    };
    assert!(cfg.validate().is_ok());
}

// ============================================================================
// Provider parsing
// ============================================================================

#[test]
fn test_provider_from_str() {
    assert_eq!("mongodb".parse::<Provider>().unwrap(), Provider::MongoDb);
    assert_eq!("Mongo".parse::<Provider>().unwrap(), Provider::MongoDb);
    assert_eq!(" cosmosdb ".parse::<Provider>().unwrap(), Provider::CosmosDb);
    assert_eq!("COSMOS".parse::<Provider>().unwrap(), Provider::CosmosDb);
    assert!("postgres".parse::<Provider>().is_err());
}

#[test]
fn test_provider_display_round_trips() {
    for p in [Provider::MongoDb, Provider::CosmosDb] {
        assert_eq!(p.to_string().parse::<Provider>().unwrap(), p);
    }
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn test_settings_from_toml() {
    let _env = EnvGuard::new();
    let settings = Settings::from_toml_str(
        r#"
provider = "cosmosdb"
max_item_count = 50
channel_capacity = 16
"#,
    )
    .unwrap();
    assert_eq!(settings.provider, Provider::CosmosDb);
    assert_eq!(settings.buffer.max_item_count, 50);
    assert_eq!(
        settings.buffer.max_total_size_bytes,
        BufferConfig::COSMOSDB.max_total_size_bytes
    );
    assert_eq!(settings.channel_capacity, 16);
}

#[test]
fn test_settings_empty_toml_uses_defaults() {
    let _env = EnvGuard::new();
    let settings = Settings::from_toml_str("").unwrap();
    assert_eq!(settings.provider, Provider::MongoDb);
    assert_eq!(settings.buffer, BufferConfig::MONGODB);
    assert_eq!(settings.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
}

#[test]
fn test_settings_rejects_unknown_provider() {
    let _env = EnvGuard::new();
    assert!(Settings::from_toml_str(r#"provider = "redis""#).is_err());
}

#[test]
fn test_settings_rejects_zero_channel_capacity() {
    let _env = EnvGuard::new();
    assert!(Settings::from_toml_str("channel_capacity = 0").is_err());
}

#[test]
fn test_settings_rejects_zero_item_count() {
    let _env = EnvGuard::new();
    assert!(Settings::from_toml_str("max_item_count = 0").is_err());
}

#[test]
fn test_load_from_file() {
    let _env = EnvGuard::new();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
provider = "mongodb"
max_item_count = 200
max_total_size_bytes = 4096
max_single_item_size_bytes = 1024
"#,
    )
    .unwrap();

    let settings = Settings::load(Some(path)).unwrap();
    assert_eq!(settings.provider, Provider::MongoDb);
    assert_eq!(
        settings.buffer,
        BufferConfig {
            max_item_count: 200,
            max_total_size_bytes: 4096,
            max_single_item_size_bytes: 1024,
        }
    );
}

#[test]
fn test_load_missing_file_errors() {
    let _env = EnvGuard::new();
    let dir = tempdir().unwrap();
    let err = Settings::load(Some(dir.path().join("missing.toml"))).unwrap_err();
    assert!(format!("{err:#}").contains("reading settings file"));
}

#[test]
fn test_load_malformed_file_errors() {
    let _env = EnvGuard::new();
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "max_item_count = \"lots\"").unwrap();
    assert!(Settings::load(Some(path)).is_err());
}

#[test]
fn test_for_provider_settings() {
    let settings = Settings::for_provider(Provider::CosmosDb);
    assert_eq!(settings.buffer, BufferConfig::COSMOSDB);
    assert_eq!(Settings::default().provider, Provider::MongoDb);
}

// ============================================================================
// Environment overrides
// ============================================================================

const COSMOS_TOML: &str = r#"
provider = "cosmosdb"
max_item_count = 50
max_total_size_bytes = 4096
max_single_item_size_bytes = 1024
channel_capacity = 16
"#;

#[test]
fn test_env_max_item_count_beats_file() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_MAX_ITEM_COUNT", "7");
    let settings = Settings::from_toml_str(COSMOS_TOML).unwrap();
    assert_eq!(settings.buffer.max_item_count, 7);
    assert_eq!(settings.buffer.max_total_size_bytes, 4096);
}

#[test]
fn test_env_max_total_size_beats_file() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_MAX_TOTAL_SIZE_BYTES", "8192");
    let settings = Settings::from_toml_str(COSMOS_TOML).unwrap();
    assert_eq!(settings.buffer.max_total_size_bytes, 8192);
    assert_eq!(settings.buffer.max_item_count, 50);
}

#[test]
fn test_env_max_single_item_size_beats_file() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_MAX_SINGLE_ITEM_SIZE_BYTES", "2048");
    let settings = Settings::from_toml_str(COSMOS_TOML).unwrap();
    assert_eq!(settings.buffer.max_single_item_size_bytes, 2048);
}

#[test]
fn test_env_channel_capacity_beats_file() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_CHANNEL_CAPACITY", "3");
    let settings = Settings::from_toml_str(COSMOS_TOML).unwrap();
    assert_eq!(settings.channel_capacity, 3);
}

#[test]
fn test_env_provider_beats_file_and_keeps_explicit_limits() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_PROVIDER", "mongo");
    let settings = Settings::from_toml_str(
        r#"
provider = "cosmosdb"
max_item_count = 50
"#,
    )
    .unwrap();
    assert_eq!(settings.provider, Provider::MongoDb);
    assert_eq!(settings.buffer.max_item_count, 50);
    assert_eq!(
        settings.buffer.max_total_size_bytes,
        BufferConfig::MONGODB.max_total_size_bytes
    );
}

#[test]
fn test_env_bad_provider_is_rejected() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_PROVIDER", "nope");
    let err = Settings::from_toml_str(COSMOS_TOML).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("BUFFER_PROVIDER"));
    assert!(msg.contains("unknown provider"));
}

#[test]
fn test_env_unparseable_number_is_ignored() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_MAX_ITEM_COUNT", "seven");
    let settings = Settings::from_toml_str(COSMOS_TOML).unwrap();
    assert_eq!(settings.buffer.max_item_count, 50);

    let settings = Settings::from_toml_str(r#"provider = "cosmosdb""#).unwrap();
    assert_eq!(
        settings.buffer.max_item_count,
        BufferConfig::COSMOSDB.max_item_count
    );
}

#[test]
fn test_env_zero_override_fails_validation() {
    let mut env = EnvGuard::new();
    env.set("BUFFER_MAX_ITEM_COUNT", "0");
    assert!(Settings::from_toml_str(COSMOS_TOML).is_err());
}

#[test]
fn test_env_overrides_apply_to_loaded_file() {
    let mut env = EnvGuard::new();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, COSMOS_TOML).unwrap();
    env.set("BUFFER_MAX_ITEM_COUNT", "9");

    let settings = Settings::load(Some(path)).unwrap();
    assert_eq!(settings.provider, Provider::CosmosDb);
    assert_eq!(settings.buffer.max_item_count, 9);
}

// ============================================================================
// Default config path
// ============================================================================

#[cfg(unix)]
#[test]
fn test_load_none_reads_default_config_file() {
    let mut env = EnvGuard::new();
    let home = tempdir().unwrap();
    let home_str = home.path().to_str().unwrap();
    env.set("HOME", home_str);
    env.set("XDG_CONFIG_HOME", &format!("{home_str}/.config"));

    let path = default_config_path();
    assert!(path.starts_with(home.path()));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, COSMOS_TOML).unwrap();

    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.provider, Provider::CosmosDb);
    assert_eq!(settings.buffer.max_item_count, 50);
    assert_eq!(settings.channel_capacity, 16);
}

#[cfg(unix)]
#[test]
fn test_load_none_without_default_file_uses_presets() {
    let mut env = EnvGuard::new();
    let home = tempdir().unwrap();
    let home_str = home.path().to_str().unwrap();
    env.set("HOME", home_str);
    env.set("XDG_CONFIG_HOME", &format!("{home_str}/.config"));

    assert!(!default_config_path().exists());
    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.provider, Provider::MongoDb);
    assert_eq!(settings.buffer, BufferConfig::MONGODB);
    assert_eq!(settings.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
}
