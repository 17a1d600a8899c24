//! # Event→Update Message Queue
//!
//! The event thread's only channel to objects owned by the update thread.
//!
//! ## Safety Note
//!
//! The two buffers live in `UnsafeCell`s shared through an `Arc`. Exclusive
//! access is guaranteed by the handoff protocol below, not by a lock. All
//! unsafe blocks are confined to this module.
//!
//! ## Handoff Protocol
//!
//! ```text
//!   MessageSender                 pending             MessageReceiver
//!   ─────────────                 ───────             ───────────────
//!   writes buffers[w]              NONE
//!   flush(): pending == NONE? ──▶   w    (Release)
//!            w = !w                        ──(Acquire)──▶ drains buffers[pending]
//!   writes buffers[!w]             NONE  ◀──(Release)── done
//! ```
//!
//! - The sender only touches `buffers[w]`, which is never the pending buffer.
//! - The receiver only touches `buffers[pending]`, and only while it is set.
//! - A flush is refused while a previous buffer is still pending, so the
//!   sender never flips onto a buffer the receiver might be draining.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::BufferIndex;
use crate::memory::{BufferConfig, Command, CommandBuffer};

/// `pending` value meaning no buffer is waiting for the receiver.
const NONE_PENDING: u8 = 2;

/// One side of the double buffer.
struct MessageBuffer<C> {
    commands: CommandBuffer<C>,
    /// Set when any command in the buffer touches the scene graph.
    scene_update: bool,
}

/// State shared by a sender/receiver pair.
struct Shared<C> {
    buffers: [UnsafeCell<MessageBuffer<C>>; 2],
    /// Slot of the flushed buffer, or [`NONE_PENDING`].
    pending: AtomicU8,
}

// SAFETY: each buffer is accessed by at most one thread at a time, as
// arbitrated by `pending` (see the module docs). Commands are `Send`.
unsafe impl<C> Sync for Shared<C> {}

impl<C> Shared<C> {
    /// # Safety
    ///
    /// The caller must hold the right to `index` under the handoff
    /// protocol, and nobody may be writing it.
    #[inline]
    unsafe fn buffer(&self, index: BufferIndex) -> &MessageBuffer<C> {
        &*self.buffers[index.slot()].get()
    }

    /// # Safety
    ///
    /// The caller must hold the exclusive right to `index` under the
    /// handoff protocol, and no other reference to it may be live.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    unsafe fn buffer_mut(&self, index: BufferIndex) -> &mut MessageBuffer<C> {
        &mut *self.buffers[index.slot()].get()
    }

    #[inline]
    fn pending(&self) -> Option<BufferIndex> {
        match self.pending.load(Ordering::Acquire) {
            NONE_PENDING => None,
            slot => Some(BufferIndex::from_bit(slot as usize)),
        }
    }
}

/// Creates a connected sender/receiver pair.
///
/// Both buffers start with one page of `config.page_size` bytes.
#[must_use]
pub fn message_queue<C>(config: BufferConfig) -> (MessageSender<C>, MessageReceiver<C>) {
    let shared = Arc::new(Shared {
        buffers: [
            UnsafeCell::new(MessageBuffer {
                commands: CommandBuffer::new(config),
                scene_update: false,
            }),
            UnsafeCell::new(MessageBuffer {
                commands: CommandBuffer::new(config),
                scene_update: false,
            }),
        ],
        pending: AtomicU8::new(NONE_PENDING),
    });

    (
        MessageSender {
            shared: Arc::clone(&shared),
            write_index: BufferIndex::ZERO,
            flushes: 0,
        },
        MessageReceiver { shared },
    )
}

/// Event-thread half of the queue.
///
/// Move it to the event thread; it cannot be cloned.
pub struct MessageSender<C> {
    shared: Arc<Shared<C>>,
    write_index: BufferIndex,
    flushes: u64,
}

impl<C> MessageSender<C> {
    /// Appends a closure command to the current write buffer.
    ///
    /// Never blocks and never waits for the update thread.
    /// `updates_scene_graph` marks the buffer as requiring a scene update.
    #[inline]
    pub fn enqueue<F>(&mut self, command: F, updates_scene_graph: bool)
    where
        F: FnOnce(&mut C, BufferIndex) + Send + 'static,
    {
        self.enqueue_command(command, updates_scene_graph);
    }

    /// Appends a typed command to the current write buffer.
    pub fn enqueue_command<T>(&mut self, command: T, updates_scene_graph: bool)
    where
        T: Command<C> + 'static,
    {
        // SAFETY: the sender owns `write_index`; it is never the pending slot.
        let buffer = unsafe { self.shared.buffer_mut(self.write_index) };
        buffer.commands.push_command(command);
        buffer.scene_update |= updates_scene_graph;
    }

    /// The current write parity.
    #[inline]
    #[must_use]
    pub const fn buffer_index(&self) -> BufferIndex {
        self.write_index
    }

    /// Number of commands waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        // SAFETY: the sender owns `write_index`, and writes need `&mut self`.
        unsafe { self.shared.buffer(self.write_index) }.commands.len()
    }

    /// Number of successful flushes so far.
    #[inline]
    #[must_use]
    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Returns true once the receiver has drained the last flushed buffer.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.shared.pending().is_none()
    }

    /// Hands the current buffer to the update thread and flips parity.
    ///
    /// Returns `false` without flipping when there is nothing to send or the
    /// previously flushed buffer has not been drained yet. Queued commands
    /// then stay put, in order, and go out with the next successful flush.
    pub fn flush(&mut self) -> bool {
        if self.pending_len() == 0 || !self.is_drained() {
            return false;
        }

        self.shared
            .pending
            .store(self.write_index.slot() as u8, Ordering::Release);
        self.write_index = self.write_index.other();
        self.flushes += 1;
        true
    }
}

/// Update-thread half of the queue.
///
/// Move it to the update thread; it cannot be cloned.
pub struct MessageReceiver<C> {
    shared: Arc<Shared<C>>,
}

/// Result of one [`MessageReceiver::process_messages`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Commands executed.
    pub executed: usize,
    /// Whether the drained buffer carried scene-graph commands.
    pub scene_update: bool,
}

/// Releases the pending buffer back to the sender, even on unwind.
struct ReleaseOnDrop<'a>(&'a AtomicU8);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(NONE_PENDING, Ordering::Release);
    }
}

impl<C> MessageReceiver<C> {
    /// Whether the flushed buffer carries scene-graph commands.
    #[must_use]
    pub fn is_scene_update_required(&self) -> bool {
        match self.shared.pending() {
            // SAFETY: the pending buffer belongs to the receiver until it is
            // released; the sender never touches it.
            Some(index) => unsafe { self.shared.buffer(index) }.scene_update,
            None => false,
        }
    }

    /// Returns true if a flushed buffer is waiting.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.pending().is_some()
    }

    /// Executes every flushed command in insertion order, passing
    /// `buffer_index` (the update parity) to each, then resets the buffer
    /// and releases it to the sender.
    pub fn process_messages(&mut self, context: &mut C, buffer_index: BufferIndex) -> ProcessOutcome {
        let Some(index) = self.shared.pending() else {
            return ProcessOutcome::default();
        };

        let _release = ReleaseOnDrop(&self.shared.pending);
        // SAFETY: `index` was published by the sender with Release ordering
        // and observed here with Acquire; it stays ours until `_release`.
        let buffer = unsafe { self.shared.buffer_mut(index) };
        let scene_update = std::mem::take(&mut buffer.scene_update);
        let executed = buffer.commands.process(context, buffer_index);

        tracing::trace!(
            "Processed {} messages from event buffer {} (scene update: {})",
            executed,
            index,
            scene_update
        );

        ProcessOutcome {
            executed,
            scene_update,
        }
    }
}
