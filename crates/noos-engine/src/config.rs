//! Engine-level configuration, layered with `figment` the way the teacher's
//! binary crate layers `DynAppConfig` (defaults + env overrides), but scoped
//! to what the engine itself needs (pools, ingestion limits, storage DSN)
//! rather than CLI/serve concerns, which live in `noos-server::config`.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<EngineConfig> = LazyLock::new(get_config);

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_depth_multiplier: usize,
    pub timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.workers * self.queue_depth_multiplier
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolsConfig {
    pub upload: PoolConfig,
    pub download: PoolConfig,
    pub compute: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            upload: PoolConfig {
                workers: 4,
                queue_depth_multiplier: 2,
                timeout_secs: 600,
            },
            download: PoolConfig {
                workers: 4,
                queue_depth_multiplier: 2,
                timeout_secs: 600,
            },
            compute: PoolConfig {
                workers: 2,
                queue_depth_multiplier: 2,
                timeout_secs: 1800,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IngestionConfig {
    pub max_rows_per_file: usize,
    pub batch_chunk_size: usize,
    /// Root directory for staged uploads, error artifacts, and generated
    /// downloads (§6 "Error artifacts"), one subdirectory per task id.
    pub artifact_dir: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_rows_per_file: 500_000,
            batch_chunk_size: 1_000,
            artifact_dir: "./data/artifacts".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProgressConfig {
    pub min_percent_delta: u8,
    pub min_interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_percent_delta: 5,
            min_interval_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    /// `postgres://...` DSN. Empty means use the in-memory backend (only
    /// valid when the crate is built with `storage-in-memory`).
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    pub pools: PoolsConfig,
    pub ingestion: IngestionConfig,
    pub progress: ProgressConfig,
    pub storage: StorageConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_depth_multiplier: 2,
            timeout_secs: 600,
        }
    }
}

fn get_config() -> EngineConfig {
    let defaults = figment::providers::Serialized::defaults(EngineConfig::default());

    #[cfg(not(test))]
    let prefix = "NOOS__";
    #[cfg(test)]
    let prefix = "NOOS_TEST__";

    let config = figment::Figment::from(defaults)
        .merge(figment::providers::Env::prefixed(prefix).split("__"));

    match config.extract::<EngineConfig>() {
        Ok(c) => c,
        Err(e) => panic!("Failed to extract noos-engine config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.pools.upload.workers, 4);
        assert_eq!(config.pools.download.workers, 4);
        assert_eq!(config.pools.compute.workers, 2);
        assert_eq!(config.pools.upload.queue_depth(), 8);
        assert_eq!(config.ingestion.max_rows_per_file, 500_000);
        assert_eq!(config.ingestion.batch_chunk_size, 1_000);
    }

    #[test]
    fn env_overrides_pool_workers() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("NOOS_TEST__POOLS__COMPUTE__WORKERS", "7");
            let config = get_config();
            assert_eq!(config.pools.compute.workers, 7);
            assert_eq!(config.pools.upload.workers, 4);
            Ok(())
        });
    }
}
