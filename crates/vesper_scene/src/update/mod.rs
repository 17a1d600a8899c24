//! # Update Cycle
//!
//! [`UpdateManager`] runs one frame per call on the update thread. The
//! passes themselves live in `passes` as methods on the scene graph.

mod manager;
mod passes;

use std::fmt;
use std::ops::BitOr;

use vesper_core::BufferIndex;

pub use manager::UpdateManager;

/// Reasons the update thread should keep running frames with no new input.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeepUpdating(u32);

impl KeepUpdating {
    /// Nothing needs another frame.
    pub const NOT_REQUESTED: Self = Self(0);
    /// A keep-rendering duration has not elapsed yet.
    pub const STAGE_KEEP_RENDERING: Self = Self(1);
    /// An animation is playing or finished this frame.
    pub const ANIMATIONS_RUNNING: Self = Self(1 << 1);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any reason is set.
    #[must_use]
    pub const fn is_requested(self) -> bool {
        self.0 != 0
    }
}

impl BitOr for KeepUpdating {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for KeepUpdating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::STAGE_KEEP_RENDERING) {
            set.entry(&"STAGE_KEEP_RENDERING");
        }
        if self.contains(Self::ANIMATIONS_RUNNING) {
            set.entry(&"ANIMATIONS_RUNNING");
        }
        set.finish()
    }
}

/// What one call to [`UpdateManager::update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Slot written this frame.
    pub buffer_index: BufferIndex,
    /// Event commands executed.
    pub messages_processed: usize,
    /// The reset-to-emit passes ran.
    pub scene_updated: bool,
    /// Render commands queued, end-of-frame marker excluded.
    pub render_commands: usize,
    /// The render queue was handed to the render thread.
    pub render_flipped: bool,
    /// Why further frames are needed.
    pub keep_updating: KeepUpdating,
}
