//! # Event-Side Facade
//!
//! [`EventContext`] is the only way the event thread touches the scene. Each
//! call mints ids where needed and queues a command for the update thread;
//! nothing reaches the scene graph until [`EventContext::flush`] succeeds.

use vesper_core::{BufferIndex, MessageSender, PropertyValue};

use crate::animation::{AnimationDesc, AnimatorDesc};
use crate::constraint::ConstraintDesc;
use crate::ids::{AnimationId, ConstraintId, IdAllocator, NodeId, RendererId};
use crate::node::NodeProperty;
use crate::scene::SceneGraph;

/// Event-thread handle to the scene.
///
/// Owned by exactly one thread; move it, do not share it.
pub struct EventContext {
    sender: MessageSender<SceneGraph>,
    node_ids: IdAllocator,
    renderer_ids: IdAllocator,
    constraint_ids: IdAllocator,
    animation_ids: IdAllocator,
}

impl EventContext {
    /// Wraps the event half of a message queue.
    #[must_use]
    pub fn new(sender: MessageSender<SceneGraph>) -> Self {
        Self {
            sender,
            // Id 0 is the root.
            node_ids: IdAllocator::starting_at(NodeId::ROOT.raw() + 1),
            renderer_ids: IdAllocator::starting_at(1),
            constraint_ids: IdAllocator::starting_at(1),
            animation_ids: IdAllocator::starting_at(1),
        }
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Creates a detached node.
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId(self.node_ids.next());
        self.scene_command(move |scene, _| scene.create_node(id));
        id
    }

    /// Makes `child` a child of `parent`.
    pub fn connect_node(&mut self, parent: NodeId, child: NodeId) {
        self.scene_command(move |scene, _| scene.connect_node(parent, child));
    }

    /// Detaches `child` from its parent.
    pub fn disconnect_node(&mut self, child: NodeId) {
        self.scene_command(move |scene, _| scene.disconnect_node(child));
    }

    /// Destroys a node. Its children are detached, not destroyed.
    pub fn destroy_node(&mut self, node: NodeId) {
        self.scene_command(move |scene, _| scene.destroy_node(node));
    }

    /// Sets a node property persistently.
    pub fn set_property(&mut self, node: NodeId, property: NodeProperty, value: impl Into<PropertyValue>) {
        let value = value.into();
        self.scene_command(move |scene, index| scene.bake_property(node, property, value, index));
    }

    /// Adds `delta` to a node property persistently.
    pub fn set_property_relative(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        delta: impl Into<PropertyValue>,
    ) {
        let delta = delta.into();
        self.scene_command(move |scene, index| {
            scene.bake_property_relative(node, property, delta, index);
        });
    }

    // =========================================================================
    // Renderers
    // =========================================================================

    /// Attaches a renderer to `node`.
    pub fn create_renderer(&mut self, node: NodeId) -> RendererId {
        let id = RendererId(self.renderer_ids.next());
        self.scene_command(move |scene, _| scene.create_renderer(id, node));
        id
    }

    /// Changes a renderer's draw order.
    pub fn set_depth_index(&mut self, renderer: RendererId, depth_index: i32) {
        self.scene_command(move |scene, _| scene.set_depth_index(renderer, depth_index));
    }

    /// Sets a renderer's opacity persistently.
    pub fn set_opacity(&mut self, renderer: RendererId, opacity: f32) {
        self.scene_command(move |scene, index| scene.bake_opacity(renderer, opacity, index));
    }

    /// Destroys a renderer.
    pub fn destroy_renderer(&mut self, renderer: RendererId) {
        self.scene_command(move |scene, _| scene.destroy_renderer(renderer));
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Registers a constraint.
    pub fn apply_constraint(&mut self, desc: ConstraintDesc) -> ConstraintId {
        let id = ConstraintId(self.constraint_ids.next());
        self.scene_command(move |scene, _| scene.add_constraint(id, desc));
        id
    }

    /// Removes a constraint.
    pub fn remove_constraint(&mut self, constraint: ConstraintId) {
        self.scene_command(move |scene, _| scene.remove_constraint(constraint));
    }

    // =========================================================================
    // Animations
    // =========================================================================

    /// Registers a stopped animation.
    pub fn create_animation(&mut self, desc: AnimationDesc) -> AnimationId {
        let id = AnimationId(self.animation_ids.next());
        self.scene_command(move |scene, _| scene.create_animation(id, desc));
        id
    }

    /// Adds an animated property.
    pub fn add_animator(&mut self, animation: AnimationId, animator: AnimatorDesc) {
        self.scene_command(move |scene, _| scene.add_animator(animation, animator));
    }

    /// Starts or resumes an animation.
    pub fn play_animation(&mut self, animation: AnimationId) {
        self.scene_command(move |scene, _| scene.play_animation(animation));
    }

    /// Pauses an animation.
    pub fn pause_animation(&mut self, animation: AnimationId) {
        self.scene_command(move |scene, _| scene.pause_animation(animation));
    }

    /// Stops an animation, applying its end action.
    pub fn stop_animation(&mut self, animation: AnimationId) {
        self.scene_command(move |scene, _| scene.stop_animation(animation));
    }

    /// Destroys an animation.
    pub fn destroy_animation(&mut self, animation: AnimationId) {
        self.scene_command(move |scene, _| scene.destroy_animation(animation));
    }

    // =========================================================================
    // Stage
    // =========================================================================

    /// Keeps the update thread running frames for at least `seconds`.
    pub fn keep_rendering(&mut self, seconds: f32) {
        self.sender
            .enqueue(move |scene: &mut SceneGraph, _| scene.keep_rendering(seconds), false);
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// The parity currently being written.
    #[must_use]
    pub const fn buffer_index(&self) -> BufferIndex {
        self.sender.buffer_index()
    }

    /// Commands waiting for the next flush.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.sender.pending_len()
    }

    /// Hands queued commands to the update thread.
    ///
    /// Returns false if there was nothing to send or the update thread has
    /// not drained the previous flush; the commands stay queued either way.
    pub fn flush(&mut self) -> bool {
        self.sender.flush()
    }

    /// Returns true once the update thread has drained the last flush.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.sender.is_drained()
    }

    fn scene_command<F>(&mut self, command: F)
    where
        F: FnOnce(&mut SceneGraph, BufferIndex) + Send + 'static,
    {
        self.sender.enqueue(command, true);
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("buffer_index", &self.buffer_index())
            .field("pending_commands", &self.pending_commands())
            .finish_non_exhaustive()
    }
}
