use thiserror::Error;

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while reading node configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime settings for a node, read from the environment
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Hex encoded ed25519 secret key; a fresh wallet is generated when unset
    pub secret_key: Option<String>,
    pub peer_timeout: Duration,
    pub pow_max_iterations: Option<u64>,
}

impl NodeConfig {
    /// Reads `NODE_*` variables, after loading a `.env` file if present
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("NODE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse(&lookup, "NODE_PORT")?.unwrap_or(5000);
        let data_dir = lookup("NODE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("data/node-{}", port)));
        let secret_key = lookup("NODE_SECRET_KEY").filter(|key| !key.trim().is_empty());
        let peer_timeout = Duration::from_millis(parse(&lookup, "NODE_PEER_TIMEOUT_MS")?.unwrap_or(5000));
        let pow_max_iterations = parse(&lookup, "NODE_POW_MAX_ITERATIONS")?;

        Ok(NodeConfig {
            host,
            port,
            data_dir,
            secret_key,
            peer_timeout,
            pow_max_iterations,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.data_dir, PathBuf::from("data/node-5000"));
        assert!(config.secret_key.is_none());
        assert_eq!(config.peer_timeout, Duration::from_millis(5000));
        assert!(config.pow_max_iterations.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("NODE_PORT", "5001"),
            ("NODE_SECRET_KEY", "00ff"),
            ("NODE_POW_MAX_ITERATIONS", "1000"),
        ])
        .unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.data_dir, PathBuf::from("data/node-5001"));
        assert_eq!(config.secret_key.as_deref(), Some("00ff"));
        assert_eq!(config.pow_max_iterations, Some(1000));
    }

    #[test]
    fn test_malformed_value() {
        let result = config_from(&[("NODE_PORT", "eighty")]);

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "NODE_PORT", .. })
        ));
    }
}
