use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{types::Mode, Error, InternalResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Coercion mode for contexts created by the dispatcher.
    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_eval_cache_capacity")]
    pub eval_cache_capacity: usize,

    #[serde(default = "default_log_bus_capacity")]
    pub log_bus_capacity: usize,

    #[serde(default = "default_shutdown_timeout", with = "duration_ms")]
    pub shutdown_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            worker_pool_size: default_worker_pool_size(),
            eval_cache_capacity: default_eval_cache_capacity(),
            log_bus_capacity: default_log_bus_capacity(),
            shutdown_timeout: default_shutdown_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> InternalResult<Self> {
        let config: Self = from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> InternalResult<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::Internal(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.eval_cache_capacity == 0 {
            return Err(Error::Internal(
                "eval_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.log_bus_capacity == 0 {
            return Err(Error::Internal(
                "log_bus_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

// デフォルト値の定義
fn default_worker_pool_size() -> usize {
    2
}

fn default_eval_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

fn default_log_bus_capacity() -> usize {
    8192
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_millis(2000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_engine_config_serde() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        tracing::debug!("{}", json);
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
        assert!(json.contains("\"shutdown_timeout\":2000"));
        assert!(json.contains("\"mode\":\"strict\""));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_str(r#"{"mode": "loose", "poll_interval": 10}"#).unwrap();
        assert_eq!(config.mode, Mode::Loose);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.eval_cache_capacity, 1024);
        assert_eq!(config.log_bus_capacity, 8192);
    }

    #[test]
    fn test_invalid_config() {
        assert!(EngineConfig::from_str(r#"{"worker_pool_size": 0}"#).is_err());
        assert!(EngineConfig::from_str(r#"{"mode": "lenient"}"#).is_err());
        assert!(EngineConfig::from_str("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("engine-config-{}.json", uuid::Uuid::new_v4()));
        {
            let mut file = File::create(&path).unwrap();
            write!(file, r#"{{"worker_pool_size": 4}}"#).unwrap();
        }
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.worker_pool_size, 4);
        std::fs::remove_file(&path).unwrap();

        assert!(EngineConfig::from_file(&path).is_err());
    }
}
