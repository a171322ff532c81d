//! TOML-driven runtime configuration.
//!
//! Precedence: built-in defaults, then the file, then `LMQ_*` environment
//! variables.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "lmq.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub debug: bool,
    pub bind_addresses: Vec<String>,
    /// Client IPs allowed to talk to the service. Empty allows everyone.
    pub ip_whitelist: Vec<String>,
}

impl ServerConfig {
    /// Parsed whitelist. IPv4-mapped IPv6 entries are stored as IPv4.
    pub fn whitelist(&self) -> Result<HashSet<IpAddr>, ConfigError> {
        self.ip_whitelist
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<IpAddr>()
                    .map(|ip| ip.to_canonical())
                    .map_err(|e| ConfigError::Parse(format!("ip_whitelist entry {raw:?}: {e}")))
            })
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            bind_addresses: vec!["127.0.0.1:8080".to_string()],
            ip_whitelist: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueConfig {
    /// Initial capacity of a new queue and the growth increment.
    pub init_size: usize,
    /// Hard ceiling on a queue's capacity; unbounded when absent.
    pub max_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            init_size: 1000,
            max_size: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecoveryConfig {
    pub dir: PathBuf,
    /// Records per journal segment before rotation.
    pub file_size: usize,
    /// Pending-record slots in front of the journal writer.
    pub channel_capacity: usize,
    /// fsync every N records. Segment rotation and flushes fsync regardless.
    pub fsync_every_n: Option<usize>,
    /// Await journal space while re-journaling recovered messages instead
    /// of dropping them on backpressure.
    pub blocking_rejournal: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./recovery"),
            file_size: 10_000,
            channel_capacity: 1000,
            fsync_every_n: None,
            blocking_rejournal: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PayloadConfig {
    pub file_base_path: PathBuf,
    pub mysql_url: Option<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            file_base_path: PathBuf::from("./files"),
            mysql_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub queues: QueueConfig,
    pub recovery: RecoveryConfig,
    pub payload: PayloadConfig,
}

impl Config {
    /// Parses a TOML document without consulting the environment.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        Ok(config)
    }

    /// Loads configuration from an optional file path (falling back to
    /// `LMQ_CONFIG`), applies environment overrides and validates.
    ///
    /// A missing file at the default path is not an error; an explicitly
    /// requested one is.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var("LMQ_CONFIG").ok();
        let explicit = path.map(str::to_string).or(env_path);

        let mut config = match explicit {
            Some(p) => load_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_file(DEFAULT_CONFIG_PATH)?,
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("LMQ_DEBUG") {
            self.server.debug = parse_flag(&v);
        }

        if let Ok(v) = env::var("LMQ_BIND_ADDRESSES") {
            self.server.bind_addresses = split_list(&v);
        }

        if let Ok(v) = env::var("LMQ_IP_WHITELIST") {
            self.server.ip_whitelist = split_list(&v);
        }

        if let Ok(v) = env::var("LMQ_QUEUE_INIT_SIZE") {
            self.queues.init_size = parse_number("LMQ_QUEUE_INIT_SIZE", &v)?;
        }

        if let Ok(v) = env::var("LMQ_QUEUE_MAX_SIZE") {
            self.queues.max_size = Some(parse_number("LMQ_QUEUE_MAX_SIZE", &v)?);
        }

        if let Ok(v) = env::var("LMQ_RECOVERY_DIR") {
            self.recovery.dir = PathBuf::from(v);
        }

        if let Ok(v) = env::var("LMQ_RECOVERY_FILE_SIZE") {
            self.recovery.file_size = parse_number("LMQ_RECOVERY_FILE_SIZE", &v)?;
        }

        if let Ok(v) = env::var("LMQ_RECOVERY_CHANNEL_CAPACITY") {
            self.recovery.channel_capacity = parse_number("LMQ_RECOVERY_CHANNEL_CAPACITY", &v)?;
        }

        if let Ok(v) = env::var("LMQ_FILE_BASE_PATH") {
            self.payload.file_base_path = PathBuf::from(v);
        }

        if let Ok(v) = env::var("LMQ_MYSQL_URL") {
            self.payload.mysql_url = Some(v).filter(|s| !s.is_empty());
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "server.bind_addresses must not be empty".to_string(),
            ));
        }
        self.server.whitelist()?;
        if self.queues.init_size == 0 {
            return Err(ConfigError::Invalid(
                "queues.init_size must be greater than 0".to_string(),
            ));
        }
        if let Some(max) = self.queues.max_size {
            if max < self.queues.init_size {
                return Err(ConfigError::Invalid(
                    "queues.max_size must not be below queues.init_size".to_string(),
                ));
            }
        }
        if self.recovery.file_size == 0 {
            return Err(ConfigError::Invalid(
                "recovery.file_size must be greater than 0".to_string(),
            ));
        }
        if self.recovery.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "recovery.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.recovery.fsync_every_n == Some(0) {
            return Err(ConfigError::Invalid(
                "recovery.fsync_every_n must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn load_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw: String = fs::read_to_string(path)?;
    Config::from_toml(&raw)
}

/// Loads and validates `path`, ignoring the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config = load_file(path)?;
    config.validate()?;
    Ok(config)
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number(key: &str, v: &str) -> Result<usize, ConfigError> {
    v.trim()
        .parse()
        .map_err(|e| ConfigError::Parse(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.queues.init_size, 1000);
        assert_eq!(cfg.recovery.channel_capacity, 1000);
        assert!(cfg.recovery.blocking_rejournal);
        assert!(cfg.payload.mysql_url.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = Config::from_toml(
            r#"
            [queues]
            init_size = 16

            [recovery]
            dir = "/tmp/lmq"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.queues.init_size, 16);
        assert_eq!(cfg.recovery.dir, PathBuf::from("/tmp/lmq"));
        assert_eq!(cfg.recovery.file_size, 10_000);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut cfg = Config::default();
        cfg.queues.init_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.recovery.file_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.queues.max_size = Some(10);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn whitelist_entries_must_be_addresses() {
        let mut cfg = Config::default();
        cfg.server.ip_whitelist = vec!["127.0.0.1".into(), "::ffff:10.0.0.1".into()];
        let ips = cfg.server.whitelist().unwrap();
        assert!(ips.contains(&"10.0.0.1".parse::<IpAddr>().unwrap()));

        cfg.server.ip_whitelist.push("localhost".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn list_values_are_trimmed() {
        assert_eq!(
            split_list(" 127.0.0.1 , ,10.0.0.1"),
            vec!["127.0.0.1".to_string(), "10.0.0.1".to_string()]
        );
    }
}
