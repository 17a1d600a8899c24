//! # Memory Management
//!
//! Pools and arenas that keep scene-graph traffic off the general-purpose heap.
//!
//! ## Design Philosophy
//!
//! - Scene objects live in fixed-size pools and never move once placed
//! - Commands are constructed in place inside paged byte arenas
//! - Capacity grows by whole pages and is trimmed back at reset

mod command_buffer;
mod pool;

use serde::{Deserialize, Serialize};

pub use command_buffer::{Command, CommandBuffer, Drain, PendingCommand};
pub use pool::{FixedSizePool, Handle};

/// Page sizing for a [`CommandBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Baseline page size in bytes; also the minimum size of any new page.
    pub page_size: usize,
    /// Capacity ceiling in bytes. A reset buffer above it is shrunk back to
    /// a single baseline page.
    pub max_capacity: usize,
}

impl BufferConfig {
    /// Event→Update defaults: 32 KiB pages, 72 KiB ceiling.
    pub const MESSAGE_QUEUE: Self = Self {
        page_size: 32 * 1024,
        max_capacity: 72 * 1024,
    };

    /// Update→Render defaults: 32 KiB pages, no growth kept past one page.
    pub const RENDER_QUEUE: Self = Self {
        page_size: 32 * 1024,
        max_capacity: 32 * 1024,
    };
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::MESSAGE_QUEUE
    }
}

/// Growth policy for a [`FixedSizePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Slots in the first page.
    pub initial_capacity: usize,
    /// Upper bound on the slots in any single page. Pages double until they
    /// reach it.
    pub max_block_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 32,
            max_block_capacity: 1024,
        }
    }
}
