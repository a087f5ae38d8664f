use std::net::SocketAddr;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};
use crate::network::MultiplexerConfig;

pub static GLOBAL_CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// Process-wide configuration, set once by the binary at startup.
///
/// # Panics
///
/// Panics if called before `GLOBAL_CONFIG` has been set.
pub fn global_config() -> &'static AppConfig {
    GLOBAL_CONFIG
        .get()
        .expect("global config read before it was set")
}

const ENV_PREFIX: &str = "LINEMUX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    /// Pause between two multiplexer cycles.
    pub cycle_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            port: 27010,
            cycle_interval_ms: 10,
        }
    }
}

impl NetworkConfig {
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .parse::<SocketAddr>()
            .map_err(|err| {
                AppError::InvalidValue(format!("listen address {}:{}: {}", self.ip, self.port, err))
            })
    }
}

/// Where the rolling log file goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_name: "linemux.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub multiplexer: MultiplexerConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads `path` when given, then `LINEMUX_`-prefixed environment
    /// variables (`LINEMUX_NETWORK__PORT=9000`), on top of the defaults.
    pub fn set_up_config<P: AsRef<Path>>(path: Option<P>) -> AppResult<AppConfig> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            let path_str = path.as_ref().to_str().ok_or_else(|| {
                AppError::InvalidValue(format!(
                    "config file path: {}",
                    path.as_ref().to_string_lossy()
                ))
            })?;
            builder = builder.add_source(config::File::with_name(path_str));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.network.socket_addr()?;
        let multiplexer = &self.multiplexer;
        if multiplexer.token_capacity == 0 {
            return Err(AppError::InvalidValue(
                "multiplexer.token_capacity must be positive".to_string(),
            ));
        }
        if multiplexer.read_chunk_size == 0 {
            return Err(AppError::InvalidValue(
                "multiplexer.read_chunk_size must be positive".to_string(),
            ));
        }
        if multiplexer.scan_step_limit == 0 {
            return Err(AppError::InvalidValue(
                "multiplexer.scan_step_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
