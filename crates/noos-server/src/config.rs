//! Binary-level configuration: bind address, startup-sequencing flags, and
//! which `Storage` backend to wire up. Layered with `figment` the same way
//! the engine layers its own config, but scoped to what only the process
//! entrypoint needs (the engine's own pools/ingestion/storage settings stay
//! in `noos_engine::EngineConfig`).

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub(crate) static CONFIG_BIN: LazyLock<ServerConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug)]
pub(crate) struct ServerConfig {
    pub(crate) bind_ip: IpAddr,
    pub(crate) listen_port: u16,
    /// Use the in-memory storage backend instead of Postgres. Only valid
    /// when the binary is built with `storage-in-memory` (§4.5.1 "dev
    /// mode").
    pub(crate) memory: bool,
    pub(crate) debug: DebugConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            listen_port: 8181,
            memory: false,
            debug: DebugConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DebugConfig {
    /// Run `migrate` before serving requests. Not recommended when more
    /// than one instance is running against the same database.
    pub(crate) migrate_before_serve: bool,
    /// Run the `serve` command unless another subcommand is specified.
    pub(crate) auto_serve: bool,
}

fn get_config() -> ServerConfig {
    let defaults = figment::providers::Serialized::defaults(ServerConfig::default());

    #[cfg(not(test))]
    let prefix = "NOOS_SERVER__";
    #[cfg(test)]
    let prefix = "NOOS_SERVER_TEST__";

    let config = figment::Figment::from(defaults)
        .merge(figment::providers::Env::prefixed(prefix).split("__"));

    match config.extract::<ServerConfig>() {
        Ok(c) => c,
        Err(e) => panic!("Failed to extract noos-server binary config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_all_interfaces_on_8181() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert_eq!(config.listen_port, 8181);
            assert!(!config.memory);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_memory_flag() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("NOOS_SERVER_TEST__MEMORY", "true");
            let config = get_config();
            assert!(config.memory);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_auto_serve() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("NOOS_SERVER_TEST__DEBUG__AUTO_SERVE", "true");
            let config = get_config();
            assert!(config.debug.auto_serve);
            Ok(())
        });
    }
}
