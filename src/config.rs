//! Process-level configuration for a DHT peer: compiled-in defaults, an
//! optional TOML file on disk, and `KADMESH_`-prefixed environment
//! overrides, in increasing precedence — the layered `Config::load()`
//! pattern this codebase uses elsewhere.

use crate::constants::{ALPHA, DEFAULT_RPC_TIMEOUT_SEC, EXPIRATION_TIME_SEC, K, SPLIT_THRESHOLD, T_REFRESH_SEC, T_REPLICATE_SEC, T_REPUBLISH_SEC};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtConfig {
    pub bind_port: u16,
    pub data_dir: PathBuf,
    pub bootstrap_peers: Vec<String>,
    pub k: usize,
    pub alpha: usize,
    pub bucket_split_threshold: usize,
    pub value_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub replicate_interval_secs: u64,
    pub republish_interval_secs: u64,
    pub rpc_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            bind_port: 8511,
            data_dir: default_data_dir(),
            bootstrap_peers: Vec::new(),
            k: K,
            alpha: ALPHA,
            bucket_split_threshold: SPLIT_THRESHOLD,
            value_ttl_secs: EXPIRATION_TIME_SEC,
            refresh_interval_secs: T_REFRESH_SEC,
            replicate_interval_secs: T_REPLICATE_SEC,
            republish_interval_secs: T_REPUBLISH_SEC,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SEC,
            log_filter: "info".to_string(),
        }
    }
}

impl DhtConfig {
    /// Defaults, optionally overlaid by a TOML file, then by `KADMESH_*`
    /// environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => Self::default(),
        };
        config.override_from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: DhtConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn override_from_env(&mut self) -> Result<()> {
        if let Ok(val) = env::var("KADMESH_BIND_PORT") {
            self.bind_port = val
                .parse()
                .map_err(|_| Error::Config("invalid KADMESH_BIND_PORT".to_string()))?;
        }
        if let Ok(val) = env::var("KADMESH_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("KADMESH_BOOTSTRAP_PEERS") {
            self.bootstrap_peers = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = env::var("KADMESH_K") {
            self.k = val
                .parse()
                .map_err(|_| Error::Config("invalid KADMESH_K".to_string()))?;
        }
        if let Ok(val) = env::var("KADMESH_ALPHA") {
            self.alpha = val
                .parse()
                .map_err(|_| Error::Config("invalid KADMESH_ALPHA".to_string()))?;
        }
        if let Ok(val) = env::var("KADMESH_RPC_TIMEOUT_SECS") {
            self.rpc_timeout_secs = val
                .parse()
                .map_err(|_| Error::Config("invalid KADMESH_RPC_TIMEOUT_SECS".to_string()))?;
        }
        if let Ok(val) = env::var("KADMESH_LOG_FILTER") {
            self.log_filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::Config("k must be > 0".to_string()));
        }
        if self.alpha == 0 {
            return Err(Error::Config("alpha must be > 0".to_string()));
        }
        if self.bucket_split_threshold == 0 {
            return Err(Error::Config(
                "bucket_split_threshold must be > 0 (zero would never permit splitting)".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kadmesh")
}
