use crate::constants::CHUNK_LENGTH;
use crate::endpoint::EndpointMap;
use crate::error::{LedError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

// Default timeouts for transport operations
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2_000;

/// Engine settings, loadable from a JSON file. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum transport chunk size in bytes
    pub chunk_length: usize,
    /// How long a paginated read may wait for its final chunk
    pub read_timeout_ms: u64,
    /// How long a single characteristic write may take
    pub write_timeout_ms: u64,
    pub endpoints: EndpointMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_length: CHUNK_LENGTH,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            endpoints: EndpointMap::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(?path, "Loaded engine configuration");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_length < 2 {
            return Err(LedError::Config(format!(
                "chunk_length must be at least 2, got {}",
                self.chunk_length
            )));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(LedError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
