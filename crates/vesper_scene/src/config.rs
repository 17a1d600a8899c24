//! # Pipeline Configuration
//!
//! Loaded once at startup from TOML. Every section is optional; missing
//! values fall back to the defaults below.
//!
//! ```toml
//! frame_interval_ms = 16
//!
//! [message_queue]
//! page_size = 32768
//! max_capacity = 73728
//!
//! [render_queue]
//! page_size = 32768
//! max_capacity = 32768
//!
//! [node_pool]
//! initial_capacity = 32
//! max_block_capacity = 1024
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vesper_core::{BufferConfig, PoolConfig};

use crate::error::{PipelineError, PipelineResult};

/// Sizing and pacing for the whole pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Event→update command buffers.
    pub message_queue: BufferConfig,
    /// Update→render command buffers.
    pub render_queue: BufferConfig,
    /// Node arena growth.
    pub node_pool: PoolConfig,
    /// Renderer arena growth.
    pub renderer_pool: PoolConfig,
    /// Update thread tick period in milliseconds.
    pub frame_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            message_queue: BufferConfig::MESSAGE_QUEUE,
            render_queue: BufferConfig::RENDER_QUEUE,
            node_pool: PoolConfig::default(),
            renderer_pool: PoolConfig::default(),
            frame_interval_ms: 16,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails
    /// [`Self::validate`].
    pub fn from_toml_str(source: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are
    /// invalid.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    /// Checks that every size and period is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> PipelineResult<()> {
        check_buffer("message_queue", self.message_queue)?;
        check_buffer("render_queue", self.render_queue)?;
        check_pool("node_pool", self.node_pool)?;
        check_pool("renderer_pool", self.renderer_pool)?;
        if self.frame_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "frame_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The update tick period.
    #[must_use]
    pub const fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn check_buffer(section: &str, buffer: BufferConfig) -> PipelineResult<()> {
    if buffer.page_size == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "{section}.page_size must be greater than zero"
        )));
    }
    if buffer.max_capacity < buffer.page_size {
        return Err(PipelineError::InvalidConfig(format!(
            "{section}.max_capacity ({}) is below page_size ({})",
            buffer.max_capacity, buffer.page_size
        )));
    }
    Ok(())
}

fn check_pool(section: &str, pool: PoolConfig) -> PipelineResult<()> {
    if pool.initial_capacity == 0 || pool.max_block_capacity == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "{section} capacities must be greater than zero"
        )));
    }
    Ok(())
}
