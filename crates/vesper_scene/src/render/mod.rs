//! # Render Side
//!
//! The render thread's command context. The update thread never shares
//! scene objects with it; it sends [`RenderInstance`] snapshots through the
//! render queue, followed by an end-of-frame marker. A frame is handed to the
//! [`RenderBackend`] only when its marker arrives, so a partially delivered
//! frame is never presented.

mod backend;

use std::collections::HashMap;

use vesper_core::{Vec3, Vec4};

use crate::ids::{NodeId, RendererId};

pub use backend::{NullBackend, PresentedFrame, RecordingBackend, RenderBackend};

/// Render-ready snapshot of one renderer, copied out of committed slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderInstance {
    /// Source renderer.
    pub renderer: RendererId,
    /// Node the renderer is attached to.
    pub node: NodeId,
    /// Draw order; lower draws first.
    pub depth_index: i32,
    /// World position.
    pub position: Vec3,
    /// World scale.
    pub scale: Vec3,
    /// World color with the renderer's opacity folded into alpha.
    pub color: Vec4,
    /// Update frame that produced the snapshot.
    pub frame: u64,
}

/// The instances the render thread currently knows about.
#[derive(Debug, Default)]
pub struct RenderStore {
    instances: HashMap<RendererId, RenderInstance>,
    /// Draw list rebuilt at every end of frame.
    draw_list: Vec<RenderInstance>,
}

impl RenderStore {
    /// Inserts or replaces an instance.
    pub fn upsert(&mut self, instance: RenderInstance) {
        self.instances.insert(instance.renderer, instance);
    }

    /// Removes an instance. Unknown ids are ignored.
    pub fn remove(&mut self, renderer: RendererId) -> Option<RenderInstance> {
        self.instances.remove(&renderer)
    }

    /// Looks up an instance.
    #[must_use]
    pub fn get(&self, renderer: RendererId) -> Option<&RenderInstance> {
        self.instances.get(&renderer)
    }

    /// Number of instances held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if no instances are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Rebuilds the draw list in draw order (depth, then renderer id).
    fn sorted(&mut self) -> &[RenderInstance] {
        self.draw_list.clear();
        self.draw_list.extend(self.instances.values().copied());
        self.draw_list
            .sort_unstable_by_key(|instance| (instance.depth_index, instance.renderer));
        &self.draw_list
    }
}

/// Everything render commands can touch.
pub struct RenderContext {
    backend: Box<dyn RenderBackend>,
    store: RenderStore,
    frames_presented: u64,
    last_frame: Option<u64>,
}

impl RenderContext {
    /// Creates a context presenting through `backend`.
    #[must_use]
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            store: RenderStore::default(),
            frames_presented: 0,
            last_frame: None,
        }
    }

    /// Current instances.
    #[must_use]
    pub const fn store(&self) -> &RenderStore {
        &self.store
    }

    /// Frames handed to the backend so far.
    #[must_use]
    pub const fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// The update frame most recently presented.
    #[must_use]
    pub const fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Applies a snapshot.
    pub fn upsert(&mut self, instance: RenderInstance) {
        self.store.upsert(instance);
    }

    /// Drops a renderer's instance.
    pub fn remove(&mut self, renderer: RendererId) {
        self.store.remove(renderer);
    }

    /// Presents the completed frame.
    pub fn end_frame(&mut self, frame: u64) {
        let instances = self.store.sorted();
        self.backend.present(frame, instances);
        self.frames_presented += 1;
        self.last_frame = Some(frame);
        tracing::trace!("Presented frame {} with {} instances", frame, instances.len());
    }
}
