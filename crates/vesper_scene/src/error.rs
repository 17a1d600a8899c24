//! # Pipeline Error Types
//!
//! Errors from the outer surface: configuration loading and thread
//! management. The frame pipeline itself never returns errors; misuse is
//! asserted and stale references are skipped.

use thiserror::Error;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        /// Thread name.
        name: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked before it could be joined.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Result type for pipeline setup and teardown.
pub type PipelineResult<T> = Result<T, PipelineError>;
