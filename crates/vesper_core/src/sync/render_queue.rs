//! # Update→Render Queue
//!
//! Carries render-ready commands from the update thread to the render thread.
//!
//! Unlike the event→update queue, the render thread consumes at its own
//! cadence and may fall a frame behind, so the handoff is guarded by a
//! short-held mutex. The render thread never executes commands under a lock:
//! it swaps the pending container out for a spare buffer and runs the
//! commands afterwards.
//!
//! ## Lock Order
//!
//! `state` before any container, container before `spare`. Never the
//! reverse.

use std::mem;

use parking_lot::Mutex;

use super::BufferIndex;
use crate::memory::{BufferConfig, Command, CommandBuffer};

/// Which container the update thread writes and which one waits for render.
#[derive(Debug)]
struct HandoffState {
    write_index: BufferIndex,
    pending: Option<BufferIndex>,
}

/// Double-buffered, mutex-guarded command queue from update to render.
///
/// Share it between the two threads with an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// // Update thread
/// let index = queue.write_index();
/// queue.enqueue(index, move |ctx: &mut RenderContext, _| ctx.upsert(instance));
/// queue.flip();
///
/// // Render thread
/// queue.process_pending(&mut render_context);
/// ```
pub struct RenderQueue<C> {
    containers: [Mutex<CommandBuffer<C>>; 2],
    state: Mutex<HandoffState>,
    /// Drained buffer kept for the next swap-out.
    spare: Mutex<Option<CommandBuffer<C>>>,
    config: BufferConfig,
}

impl<C> RenderQueue<C> {
    /// Creates a queue whose three buffers start at `config.page_size`.
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        Self {
            containers: [
                Mutex::new(CommandBuffer::new(config)),
                Mutex::new(CommandBuffer::new(config)),
            ],
            state: Mutex::new(HandoffState {
                write_index: BufferIndex::ZERO,
                pending: None,
            }),
            spare: Mutex::new(Some(CommandBuffer::new(config))),
            config,
        }
    }

    /// Returns the page sizing used for every buffer.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> BufferConfig {
        self.config
    }

    /// The container the update thread should write this frame.
    #[must_use]
    pub fn write_index(&self) -> BufferIndex {
        self.state.lock().write_index
    }

    /// The container waiting for the render thread, if any.
    #[must_use]
    pub fn pending_index(&self) -> Option<BufferIndex> {
        self.state.lock().pending
    }

    /// Appends a closure command to container `index`.
    #[inline]
    pub fn enqueue<F>(&self, index: BufferIndex, command: F)
    where
        F: FnOnce(&mut C, BufferIndex) + Send + 'static,
    {
        self.push_command(index, command);
    }

    /// Appends a typed command to container `index`.
    pub fn push_command<T>(&self, index: BufferIndex, command: T)
    where
        T: Command<C> + 'static,
    {
        self.containers[index.slot()].lock().push_command(command);
    }

    /// Number of commands queued in container `index`.
    #[must_use]
    pub fn len(&self, index: BufferIndex) -> usize {
        self.containers[index.slot()].lock().len()
    }

    /// Total bytes allocated by the two containers and the spare buffer.
    #[must_use]
    pub fn total_capacity(&self) -> usize {
        let containers: usize = self
            .containers
            .iter()
            .map(|container| container.lock().capacity())
            .sum();
        let spare = self.spare.lock().as_ref().map_or(0, CommandBuffer::capacity);
        containers + spare
    }

    /// Hands the written container to the render thread and flips the write
    /// index.
    ///
    /// Returns `false` when nothing was written, or when the render thread has
    /// not taken the previous container yet. The update thread then keeps
    /// appending to the same container and tries again next frame.
    pub fn flip(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_some() {
            return false;
        }
        if self.containers[state.write_index.slot()].lock().is_empty() {
            return false;
        }

        state.pending = Some(state.write_index);
        state.write_index = state.write_index.other();
        true
    }

    /// Executes the container handed over by the last successful flip.
    ///
    /// Returns the container's index and the number of commands executed, or
    /// `None` if nothing was pending.
    pub fn process_pending(&self, context: &mut C) -> Option<(BufferIndex, usize)> {
        let (index, buffer) = {
            let mut state = self.state.lock();
            let index = state.pending.take()?;
            (index, self.swap_out(index))
        };
        Some((index, self.run(index, buffer, context)))
    }

    /// Executes whatever container `index` holds, regardless of the handoff
    /// state, with the same swap-out discipline as [`Self::process_pending`].
    pub fn process_messages(&self, index: BufferIndex, context: &mut C) -> usize {
        let buffer = {
            let mut state = self.state.lock();
            if state.pending == Some(index) {
                state.pending = None;
            }
            self.swap_out(index)
        };
        self.run(index, buffer, context)
    }

    /// Replaces container `index` with the spare buffer. Caller holds `state`.
    fn swap_out(&self, index: BufferIndex) -> CommandBuffer<C> {
        let mut container = self.containers[index.slot()].lock();
        let replacement = self
            .spare
            .lock()
            .take()
            .unwrap_or_else(|| CommandBuffer::new(self.config));
        mem::replace(&mut *container, replacement)
    }

    /// Runs a swapped-out buffer with no lock held, then keeps it as the spare.
    fn run(&self, index: BufferIndex, mut buffer: CommandBuffer<C>, context: &mut C) -> usize {
        let executed = buffer.process(context, index);
        tracing::trace!("Render queue executed {} commands from container {}", executed, index);
        *self.spare.lock() = Some(buffer);
        executed
    }
}
