//! # Vesper Core
//!
//! The inter-thread synchronization substrate of the Vesper scene graph:
//! - Event thread → Update thread command queue (lock-free parity handoff)
//! - Double-buffered property storage indexed by frame parity
//! - Update thread → Render thread command queue (short-held mutex)
//!
//! ## Architecture Rules
//!
//! 1. **The event thread never blocks** - it only appends to its own buffer
//! 2. **Commands run at most once** - executed by the drain or destroyed unexecuted
//! 3. **Readers use the index they were handed** - never a value sampled later
//!
//! ## Example
//!
//! ```rust,ignore
//! use vesper_core::{message_queue, BufferConfig, BufferIndex};
//!
//! let (mut sender, mut receiver) = message_queue::<Vec<u32>>(BufferConfig::default());
//! sender.enqueue(|log: &mut Vec<u32>, _| log.push(1), true);
//! sender.flush();
//!
//! let mut log = Vec::new();
//! receiver.process_messages(&mut log, BufferIndex::ZERO);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;
pub mod property;
pub mod sync;

pub use memory::{
    BufferConfig, Command, CommandBuffer, Drain, FixedSizePool, Handle, PendingCommand,
    PoolConfig,
};
pub use property::{
    AnimatableProperty, DoubleBufferedProperty, InheritedProperty, Interpolate, PropertyValue,
    Vec3, Vec4,
};
pub use sync::{
    message_queue, BufferIndex, MessageReceiver, MessageSender, ProcessOutcome, RenderQueue,
    SceneGraphBuffers,
};
