use evostore_core::{ConnectionString, DEFAULT_BUFFER_SIZE, EvoError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node_id: u32,
    /// Listen address as a connection string, e.g. `ofi+tcp://0.0.0.0:1234`.
    pub connection: String,
    /// Address clients should use when it differs from the listen address.
    #[serde(default)]
    pub advertise_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_buffer_pool_bytes")]
    pub buffer_pool_bytes: u64,
    /// When set, records and layer bytes survive restarts.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_pool_bytes: default_buffer_pool_bytes(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Tokio worker threads; defaults to one per core.
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_buffer_pool_bytes() -> u64 {
    DEFAULT_BUFFER_SIZE
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("EVOSTORE").separator("__"))
            .build()
            .map_err(|e| EvoError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| EvoError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Config for the flag-driven launcher, which takes no file.
    pub fn for_launcher(
        connection: String,
        provider: u32,
        threads: Option<usize>,
        buffer_size: u64,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let config = Self {
            node: NodeConfig {
                node_id: provider,
                connection,
                advertise_addr: None,
            },
            storage: StorageConfig {
                buffer_pool_bytes: buffer_size,
                data_dir,
            },
            runtime: RuntimeConfig { threads },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.listen()?;

        if self.storage.buffer_pool_bytes == 0 {
            return Err(EvoError::Config(
                "storage.buffer_pool_bytes must be greater than zero".to_string(),
            ));
        }

        if self.runtime.threads == Some(0) {
            return Err(EvoError::Config(
                "runtime.threads must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn listen(&self) -> Result<ConnectionString> {
        ConnectionString::parse(&self.node.connection)
            .map_err(|error| EvoError::Config(format!("node.connection: {}", error)))
    }

    pub fn advertise_addr(&self) -> Result<String> {
        match &self.node.advertise_addr {
            Some(address) if !address.trim().is_empty() => Ok(address.trim().to_string()),
            _ => Ok(self.listen()?.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yaml");
        std::fs::write(
            &path,
            "node:\n  node_id: 3\n  connection: ofi+tcp://127.0.0.1:1234\nstorage:\n  data_dir: /var/lib/evostore\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.node.node_id, 3);
        assert_eq!(config.storage.buffer_pool_bytes, DEFAULT_BUFFER_SIZE);
        assert_eq!(
            config.storage.data_dir,
            Some(PathBuf::from("/var/lib/evostore"))
        );
        assert_eq!(config.runtime.threads, None);
        assert_eq!(config.advertise_addr().unwrap(), "127.0.0.1:1234");
    }

    #[test]
    fn test_launcher_validation() {
        let config =
            Config::for_launcher("tcp://0.0.0.0:9000".to_string(), 1, Some(4), 1024, None)
                .unwrap();
        assert_eq!(config.listen().unwrap().address, "0.0.0.0:9000");

        assert!(Config::for_launcher("0.0.0.0:9000".to_string(), 1, None, 1024, None).is_err());
        assert!(
            Config::for_launcher("tcp://0.0.0.0:9000".to_string(), 1, None, 0, None).is_err()
        );
        assert!(
            Config::for_launcher("tcp://0.0.0.0:9000".to_string(), 1, Some(0), 1, None).is_err()
        );
    }
}
