use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{TransportError, TransportResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    pub max_message_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            port: 9653,
            max_connection: 1024,
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

/// Deadline knobs for the connection engine.
///
/// `initial_ms` bounds connecting and a responder's first receive, `min_ms`
/// is the floor under the size-scaled write deadline, and `per_byte_us`
/// scales that deadline with the payload size.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    pub initial_ms: u64,
    pub min_ms: u64,
    pub per_byte_us: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            initial_ms: 10_000,
            min_ms: 500,
            per_byte_us: 50,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    pub network: NetworkConfig,
    pub timeout: TimeoutConfig,
}

impl TransportConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> TransportResult<TransportConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(TransportError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let transport_config: TransportConfig = config.try_deserialize()?;

        Ok(transport_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let config = TransportConfig::default();
        assert_eq!(config.network.max_message_size, 64 * 1024 * 1024);
        assert_eq!(config.timeout.initial_ms, 10_000);
        assert_eq!(config.timeout.min_ms, 500);
    }

    #[test]
    fn set_up_config_reads_toml_and_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        std::fs::write(
            &path,
            "[network]\nport = 7001\nmax_message_size = 1024\n\n[timeout]\ninitial_ms = 250\n",
        )
        .unwrap();

        let config = TransportConfig::set_up_config(&path).unwrap();
        assert_eq!(config.network.port, 7001);
        assert_eq!(config.network.max_message_size, 1024);
        assert_eq!(config.timeout.initial_ms, 250);
        // untouched keys keep their defaults
        assert_eq!(config.network.ip, "0.0.0.0");
        assert_eq!(config.timeout.min_ms, 500);
    }
}
