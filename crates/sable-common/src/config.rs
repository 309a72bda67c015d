//! Configuration structures for Sable.

use crate::error::{Result, SableError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `SABLE_BUFFER_POOL_FRAMES=256`.
pub const ENV_PREFIX: &str = "SABLE";

/// Storage configuration for a Sable instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for data files.
    pub data_dir: PathBuf,
    /// Buffer pool size in number of frames.
    pub buffer_pool_frames: usize,
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_frames: 1024, // 16 MB with 16 KB pages
            fsync_enabled: true,
        }
    }
}

impl StorageConfig {
    /// Loads configuration from defaults, an optional file, then `SABLE_*`
    /// environment variables, in increasing order of precedence.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("buffer_pool_frames", defaults.buffer_pool_frames as u64)?
            .set_default("fsync_enabled", defaults.fsync_enabled)?;
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let cfg: StorageConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that the configuration describes a usable instance.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_pool_frames == 0 {
            return Err(SableError::InvalidParameter {
                name: "buffer_pool_frames".to_string(),
                value: self.buffer_pool_frames.to_string(),
            });
        }
        Ok(())
    }
}
