use cairn_core::{CairnError, Result, StoreConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Background eviction of expired records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sweeper_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on records evicted per tick.
    #[serde(default = "default_sweeper_max_per_tick")]
    pub max_per_tick: usize,
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweeper_interval_secs() -> u64 {
    60
}

fn default_sweeper_max_per_tick() -> usize {
    1024
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweeper_interval_secs(),
            max_per_tick: default_sweeper_max_per_tick(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Defaults overridden only by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Layer an optional config file under `CAIRN_`-prefixed environment
    /// variables, e.g. `CAIRN_STORE__PATH=/var/lib/cairn/records.db`.
    fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("CAIRN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CairnError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| CairnError::Config(e.to_string()))?;

        if config.store.scan_batch_size == 0 {
            return Err(CairnError::Config(
                "store.scan_batch_size must be at least 1".to_string(),
            ));
        }
        if config.sweeper.enabled && config.sweeper.interval_secs == 0 {
            return Err(CairnError::Config(
                "sweeper.interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}
