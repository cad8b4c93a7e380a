use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "server_ticker.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Exchange ticker snapshot server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "TICKER_HOSTNAME", help = "Host name or address to bind the HTTP server to.")]
    pub hostname: Option<String>,

    #[clap(long, env = "TICKER_PORT", help = "Port to listen on for HTTP clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "TICKER_SYMBOLS", value_delimiter = ',', help = "Comma separated list of symbols to track, e.g. BTCUSD,ETHBTC.")]
    pub symbols: Option<Vec<String>>,

    #[clap(long, env = "TICKER_WS_URL", help = "Upstream exchange WebSocket URL.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "TICKER_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "TICKER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "TICKER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TICKER_LOG_PREFIX", help = "File name prefix for log files in the log directory.")]
    pub log_prefix: Option<String>,

    #[clap(long, env = "TICKER_STALE_AFTER_SECONDS", help = "Seconds without an applied update before the feed is reported stale.")]
    pub stale_after_seconds: Option<u64>,

    #[clap(long, env = "TICKER_SHUTDOWN_GRACE_SECONDS", help = "Seconds to let in-flight HTTP requests finish on shutdown.")]
    pub shutdown_grace_seconds: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            hostname: other.hostname.or(self.hostname),
            port: other.port.or(self.port),
            symbols: other.symbols.or(self.symbols),
            ws_url: other.ws_url.or(self.ws_url),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_prefix: other.log_prefix.or(self.log_prefix),
            stale_after_seconds: other.stale_after_seconds.or(self.stale_after_seconds),
            shutdown_grace_seconds: other.shutdown_grace_seconds.or(self.shutdown_grace_seconds),
        }
    }

    fn defaults() -> Config {
        Config {
            hostname: Some("localhost".to_string()),
            port: Some(8080),
            symbols: Some(vec!["BTCUSD".to_string(), "ETHBTC".to_string()]),
            ws_url: Some("wss://api.hitbtc.com/api/2/ws".to_string()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_prefix: Some("server_ticker".to_string()),
            stale_after_seconds: Some(60),
            shutdown_grace_seconds: Some(5),
            config_path: None,
        }
    }
}

/// Fully resolved settings; every field has a value.
#[derive(Debug, Clone)]
pub struct Settings {
    pub hostname: String,
    pub port: u16,
    /// In configuration order. Validated by the symbol registry, not here.
    pub symbols: Vec<String>,
    pub ws_url: String,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub log_prefix: String,
    pub stale_after: Duration,
    pub shutdown_grace: Duration,
    /// The config file that was merged in, if one existed.
    pub config_file: Option<PathBuf>,
}

/// Resolves settings from defaults, the optional config file and `cli`
/// (which already carries environment variables, see `clap`'s `env`).
///
/// Precedence: defaults < config file < environment / command line.
pub fn load_config(cli: Config) -> Result<Settings, ConfigError> {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file if present.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config_file = None;
    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path).map_err(|source| ConfigError::Read {
            path: config_file_path.clone(),
            source,
        })?;
        let file_config = serde_json::from_str::<Config>(&config_str).map_err(|source| ConfigError::Parse {
            path: config_file_path.clone(),
            source,
        })?;
        current_config = current_config.merge(file_config);
        config_file = Some(config_file_path);
    }

    // 3. Override with environment variables and CLI arguments
    current_config = current_config.merge(cli);

    Ok(into_settings(current_config, config_file))
}

fn into_settings(config: Config, config_file: Option<PathBuf>) -> Settings {
    let defaults = Config::defaults();
    let symbols = config
        .symbols
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect();

    Settings {
        hostname: config.hostname.or(defaults.hostname).unwrap_or_default(),
        port: config.port.or(defaults.port).unwrap_or_default(),
        symbols,
        ws_url: config.ws_url.or(defaults.ws_url).unwrap_or_default(),
        log_dir: config.log_dir.or(defaults.log_dir).unwrap_or_default(),
        log_level: config.log_level.or(defaults.log_level).unwrap_or_default(),
        log_prefix: config.log_prefix.or(defaults.log_prefix).unwrap_or_default(),
        stale_after: Duration::from_secs(config.stale_after_seconds.or(defaults.stale_after_seconds).unwrap_or(60)),
        shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds.or(defaults.shutdown_grace_seconds).unwrap_or(5)),
        config_file,
    }
}
