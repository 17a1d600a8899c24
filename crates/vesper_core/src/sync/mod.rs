//! # Inter-Thread Synchronization
//!
//! Two one-way command queues connect the three pipeline threads:
//!
//! ```text
//!   Event thread ──enqueue──▶ MessageSender ─flush─▶ MessageReceiver ──▶ Update thread
//!                             (parity handoff, no locks)
//!
//!   Update thread ──enqueue──▶ RenderQueue ─flip─▶ process_pending ──▶ Render thread
//!                              (swap-out under a short-held mutex)
//! ```
//!
//! ## The Parity Rule
//!
//! Every queue owns two buffers addressed by a [`BufferIndex`]. The writer
//! fills one while the reader drains the other; exactly one thread flips the
//! index. A reader always uses the index it was handed, never one sampled
//! later.

mod message_queue;
mod render_queue;

use std::fmt;

pub use message_queue::{message_queue, MessageReceiver, MessageSender, ProcessOutcome};
pub use render_queue::RenderQueue;

/// A 0/1 buffer parity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferIndex(u8);

impl BufferIndex {
    /// Parity 0.
    pub const ZERO: Self = Self(0);
    /// Parity 1.
    pub const ONE: Self = Self(1);

    /// Builds a parity from the low bit of `value`.
    #[inline]
    #[must_use]
    pub const fn from_bit(value: usize) -> Self {
        Self((value & 1) as u8)
    }

    /// Returns the opposite parity.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        Self(self.0 ^ 1)
    }

    /// Returns the parity as an array index (0 or 1).
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BufferIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The update thread's scene-graph parity.
///
/// The update thread writes properties at [`Self::update_index`] during a
/// frame and swaps once at the end of it, so the slot it just committed
/// becomes the one other threads may snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneGraphBuffers {
    update_index: BufferIndex,
}

impl SceneGraphBuffers {
    /// Creates buffers writing parity 0 first.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            update_index: BufferIndex::ZERO,
        }
    }

    /// The slot the update thread writes this frame.
    #[inline]
    #[must_use]
    pub const fn update_index(&self) -> BufferIndex {
        self.update_index
    }

    /// The slot committed by the previous frame.
    #[inline]
    #[must_use]
    pub const fn committed_index(&self) -> BufferIndex {
        self.update_index.other()
    }

    /// Flips the update parity. Called once, at the end of a frame.
    #[inline]
    pub fn swap(&mut self) {
        self.update_index = self.update_index.other();
    }
}
