//! Configuration parsing and validation.
//!
//! The core has few tunables; they are grouped here and loadable from TOML
//! so embedding processes can share one config file with their outer
//! layers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum number of elements delivered per stream batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Default number of entries carried per backfill chunk.
pub const DEFAULT_BACKFILL_CHUNK_ENTRIES: usize = 256;

/// Tunables of the protocol core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Maximum elements returned per `next_batch` call on a stream.
    /// Exposed so tests can exercise batch boundaries with small values.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Entries carried per backfill chunk. Bounds the work between two
    /// interruptor checks on the backfiller.
    #[serde(default = "default_backfill_chunk_entries")]
    pub backfill_chunk_entries: usize,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_backfill_chunk_entries() -> usize {
    DEFAULT_BACKFILL_CHUNK_ENTRIES
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            backfill_chunk_entries: DEFAULT_BACKFILL_CHUNK_ENTRIES,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CoreConfig =
            toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            anyhow::bail!("max_batch_size must be > 0");
        }
        if self.backfill_chunk_entries == 0 {
            anyhow::bail!("backfill_chunk_entries must be > 0");
        }
        Ok(())
    }
}
