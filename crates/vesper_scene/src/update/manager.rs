//! The update-thread frame driver.

use std::sync::Arc;

use vesper_core::{MessageReceiver, RenderQueue, SceneGraphBuffers};

use super::{KeepUpdating, UpdateStatus};
use crate::render::RenderContext;
use crate::scene::SceneGraph;

/// Owns the scene graph and runs frames.
pub struct UpdateManager {
    scene: SceneGraph,
    receiver: MessageReceiver<SceneGraph>,
    render_queue: Arc<RenderQueue<RenderContext>>,
    buffers: SceneGraphBuffers,
    frame: u64,
    /// The passes ran last frame; this frame must run them too so both
    /// slots settle.
    previous_update_scene: bool,
    /// Some node's world values changed last frame.
    nodes_dirty: bool,
    messages_processed: u64,
}

impl UpdateManager {
    /// Creates a manager draining `receiver` and emitting into `render_queue`.
    #[must_use]
    pub fn new(
        scene: SceneGraph,
        receiver: MessageReceiver<SceneGraph>,
        render_queue: Arc<RenderQueue<RenderContext>>,
    ) -> Self {
        Self {
            scene,
            receiver,
            render_queue,
            buffers: SceneGraphBuffers::new(),
            frame: 0,
            previous_update_scene: false,
            nodes_dirty: false,
            messages_processed: 0,
        }
    }

    /// The scene graph, as of the last completed frame.
    #[must_use]
    pub const fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// Scene-graph parity.
    #[must_use]
    pub const fn buffers(&self) -> SceneGraphBuffers {
        self.buffers
    }

    /// Frames run so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Event commands executed so far.
    #[must_use]
    pub const fn messages_processed(&self) -> u64 {
        self.messages_processed
    }

    /// Runs one frame, `elapsed` seconds after the previous one.
    pub fn update(&mut self, elapsed: f32) -> UpdateStatus {
        let index = self.buffers.update_index();
        self.frame += 1;

        let update_scene = self.nodes_dirty
            || self.scene.animations_active()
            || self.receiver.is_scene_update_required();

        let mut run = update_scene || self.previous_update_scene;
        if run {
            self.scene.reset_properties(index);
        }

        let outcome = self.receiver.process_messages(&mut self.scene, index);
        self.messages_processed += outcome.executed as u64;
        // A flush can land between the check above and the drain. Both slots
        // are settled whenever the reset was skipped, so run without it.
        run |= outcome.scene_update;

        let mut render_commands = 0;
        let mut animator_writes = 0;
        let mut animations_finished = false;
        if run {
            let animated = self.scene.animate(index, elapsed);
            animator_writes = animated.applied;
            animations_finished = animated.finished > 0;
            self.scene.apply_constraints(index);
            let changed = self.scene.derive_world(index);
            render_commands = self.scene.emit_render(index, self.frame, &self.render_queue);
            self.nodes_dirty = changed > 0;
        } else {
            self.nodes_dirty = false;
        }

        // Retried every frame so a refused flip goes out as soon as the
        // render thread catches up.
        let render_flipped = self.render_queue.flip();

        self.previous_update_scene = update_scene || outcome.scene_update;
        let keep_updating = self.keep_updating_check(elapsed, animations_finished);
        self.buffers.swap();

        tracing::trace!(
            "Frame {} on buffer {}: {} messages, {} animator writes, {} render commands",
            self.frame,
            index,
            outcome.executed,
            animator_writes,
            render_commands
        );

        UpdateStatus {
            frame: self.frame,
            buffer_index: index,
            messages_processed: outcome.executed,
            scene_updated: run,
            render_commands,
            render_flipped,
            keep_updating,
        }
    }

    fn keep_updating_check(&mut self, elapsed: f32, animations_finished: bool) -> KeepUpdating {
        if self.scene.keep_rendering_seconds > 0.0 {
            self.scene.keep_rendering_seconds -= elapsed;
        }

        let mut request = KeepUpdating::NOT_REQUESTED;
        if self.scene.keep_rendering_seconds > 0.0 {
            request = request | KeepUpdating::STAGE_KEEP_RENDERING;
        }
        if self.scene.animations_active() || animations_finished {
            request = request | KeepUpdating::ANIMATIONS_RUNNING;
        }
        request
    }
}

impl std::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("frame", &self.frame)
            .field("buffers", &self.buffers)
            .field("scene", &self.scene)
            .finish_non_exhaustive()
    }
}
