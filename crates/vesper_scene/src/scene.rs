//! # Scene Graph
//!
//! The update thread's world: node and renderer arenas, the constraint and
//! animation lists, and the destruction observers that keep them consistent.
//!
//! Every public method here is a command target. Commands name objects by
//! id; an id that no longer resolves means the object was destroyed after the
//! command was queued, and the command is skipped.

use std::collections::HashMap;

use vesper_core::{BufferIndex, FixedSizePool, Handle, PoolConfig, PropertyValue};

use crate::animation::{Animation, AnimationDesc, AnimationState, Animator, AnimatorDesc};
use crate::constraint::{Constraint, ConstraintDesc, ResolvedInput};
use crate::ids::{AnimationId, ConstraintId, NodeId, RendererId};
use crate::node::{Node, NodeProperty, WriteMode};
use crate::observer::{ObserverKey, ObserverRegistry};
use crate::renderer::Renderer;

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    /// Commands skipped because their target no longer exists.
    pub stale_commands: u64,
    /// Writes rejected because the value had the wrong type.
    pub type_mismatches: u64,
    /// Connections refused (already parented, or would form a cycle).
    pub rejected_connections: u64,
    /// Nodes created, root excluded.
    pub nodes_created: u64,
    /// Nodes destroyed.
    pub nodes_destroyed: u64,
    /// Renderers destroyed, directly or with their node.
    pub renderers_destroyed: u64,
}

/// The update-side scene graph.
pub struct SceneGraph {
    pub(crate) nodes: FixedSizePool<Node>,
    pub(crate) node_ids: HashMap<NodeId, Handle<Node>>,
    pub(crate) root: Handle<Node>,
    pub(crate) renderers: FixedSizePool<Renderer>,
    pub(crate) renderer_ids: HashMap<RendererId, Handle<Renderer>>,
    /// Registration order is application order.
    pub(crate) constraints: Vec<Constraint>,
    /// Registration order is application order.
    pub(crate) animations: Vec<Animation>,
    pub(crate) observers: ObserverRegistry,
    /// Renderers destroyed while the render thread still holds an instance.
    pub(crate) removed_renderers: Vec<RendererId>,
    pub(crate) keep_rendering_seconds: f32,
    pub(crate) stats: SceneStats,
    /// Scratch space reused across frames.
    pub(crate) constraint_inputs: Vec<PropertyValue>,
    pub(crate) traversal: Vec<(Handle<Node>, bool)>,
}

impl SceneGraph {
    /// Creates a scene containing only the root node.
    #[must_use]
    pub fn new(node_pool: PoolConfig, renderer_pool: PoolConfig) -> Self {
        let mut nodes = FixedSizePool::new(node_pool);
        let mut root_node = Node::new(NodeId::ROOT);
        root_node.on_stage = true;
        let root = nodes.allocate(root_node);

        let mut node_ids = HashMap::new();
        node_ids.insert(NodeId::ROOT, root);

        Self {
            nodes,
            node_ids,
            root,
            renderers: FixedSizePool::new(renderer_pool),
            renderer_ids: HashMap::new(),
            constraints: Vec::new(),
            animations: Vec::new(),
            observers: ObserverRegistry::new(),
            removed_renderers: Vec::new(),
            keep_rendering_seconds: 0.0,
            stats: SceneStats::default(),
            constraint_inputs: Vec::new(),
            traversal: Vec::new(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_ids.get(&id).and_then(|handle| self.nodes.get(*handle))
    }

    /// Looks up a renderer.
    #[must_use]
    pub fn renderer(&self, id: RendererId) -> Option<&Renderer> {
        self.renderer_ids
            .get(&id)
            .and_then(|handle| self.renderers.get(*handle))
    }

    /// Looks up a constraint.
    #[must_use]
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.iter().find(|constraint| constraint.id() == id)
    }

    /// Looks up an animation.
    #[must_use]
    pub fn animation(&self, id: AnimationId) -> Option<&Animation> {
        self.animations.iter().find(|animation| animation.id() == id)
    }

    /// Live nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.allocated_count()
    }

    /// Live renderers.
    #[must_use]
    pub fn renderer_count(&self) -> usize {
        self.renderers.allocated_count()
    }

    /// Registered constraints.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Registered animations.
    #[must_use]
    pub fn animation_count(&self) -> usize {
        self.animations.len()
    }

    /// Diagnostic counters.
    #[must_use]
    pub const fn stats(&self) -> SceneStats {
        self.stats
    }

    /// The destruction observer registry.
    #[must_use]
    pub const fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Returns true if any animation must be applied this frame.
    #[must_use]
    pub fn animations_active(&self) -> bool {
        self.animations.iter().any(Animation::is_active)
    }

    /// Remaining keep-rendering time, in seconds.
    #[must_use]
    pub const fn keep_rendering_seconds(&self) -> f32 {
        self.keep_rendering_seconds
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Creates a detached node.
    pub fn create_node(&mut self, id: NodeId) {
        debug_assert!(!self.node_ids.contains_key(&id), "{id} created twice");
        if self.node_ids.contains_key(&id) {
            return;
        }
        let handle = self.nodes.allocate(Node::new(id));
        self.node_ids.insert(id, handle);
        self.stats.nodes_created += 1;
    }

    /// Makes `child` a child of `parent`.
    ///
    /// A child that already has a parent is a programmer error. Connections
    /// that would form a cycle are refused.
    pub fn connect_node(&mut self, parent: NodeId, child: NodeId) {
        let (Some(parent_handle), Some(child_handle)) = (
            self.resolve_node(parent, "connect_node"),
            self.resolve_node(child, "connect_node"),
        ) else {
            return;
        };

        let already_parented = self.nodes.get(child_handle).is_some_and(Node::has_parent);
        debug_assert!(!already_parented, "{child} is already connected to a parent");
        if already_parented || self.is_ancestor(child_handle, parent_handle) {
            tracing::warn!("Refusing to connect {} under {}", child, parent);
            self.stats.rejected_connections += 1;
            return;
        }

        let on_stage = match self.nodes.get_mut(parent_handle) {
            Some(node) => {
                node.children.push(child_handle);
                node.on_stage
            }
            None => return,
        };
        if let Some(node) = self.nodes.get_mut(child_handle) {
            node.parent = Some(parent_handle);
        }
        self.set_subtree_on_stage(child_handle, on_stage);
    }

    /// Detaches `child` from its parent, taking its subtree off stage.
    pub fn disconnect_node(&mut self, child: NodeId) {
        let Some(child_handle) = self.resolve_node(child, "disconnect_node") else {
            return;
        };
        let Some(parent_handle) = self.nodes.get_mut(child_handle).and_then(|node| node.parent.take())
        else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent_handle) {
            parent.children.retain(|handle| *handle != child_handle);
        }
        self.set_subtree_on_stage(child_handle, false);
    }

    /// Destroys a node.
    ///
    /// Its children are detached, not destroyed. Constraints reading or
    /// writing it are removed, animators targeting it are disconnected and
    /// its renderers are destroyed.
    pub fn destroy_node(&mut self, id: NodeId) {
        debug_assert!(id != NodeId::ROOT, "The root node cannot be destroyed");
        if id == NodeId::ROOT {
            return;
        }
        let Some(handle) = self.resolve_node(id, "destroy_node") else {
            return;
        };

        self.disconnect_node(id);
        let children = self
            .nodes
            .get_mut(handle)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for child in children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
            self.set_subtree_on_stage(child, false);
        }

        for key in self.observers.notify_destroyed(id) {
            match key {
                ObserverKey::Constraint(constraint) => self.remove_constraint(constraint),
                ObserverKey::Animation(animation) => {
                    if let Some(animation) = self.animation_mut(animation) {
                        animation.disconnect_node(id);
                    }
                }
                ObserverKey::Renderer(renderer) => self.destroy_renderer(renderer),
            }
        }

        self.node_ids.remove(&id);
        self.nodes.free(handle);
        self.stats.nodes_destroyed += 1;
        tracing::debug!("Destroyed {}", id);
    }

    /// Sets a persistent property value.
    pub fn bake_property(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        value: PropertyValue,
        index: BufferIndex,
    ) {
        self.write_property(node, property, value, WriteMode::Bake, index);
    }

    /// Adds to a persistent property value. Booleans combine with OR.
    pub fn bake_property_relative(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        delta: PropertyValue,
        index: BufferIndex,
    ) {
        self.write_property(node, property, delta, WriteMode::BakeRelative, index);
    }

    /// Sets a property for the current frame only.
    pub fn set_property(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        value: PropertyValue,
        index: BufferIndex,
    ) {
        self.write_property(node, property, value, WriteMode::Set, index);
    }

    /// Adds to a property for the current frame only.
    pub fn set_property_relative(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        delta: PropertyValue,
        index: BufferIndex,
    ) {
        self.write_property(node, property, delta, WriteMode::SetRelative, index);
    }

    fn write_property(
        &mut self,
        node: NodeId,
        property: NodeProperty,
        value: PropertyValue,
        mode: WriteMode,
        index: BufferIndex,
    ) {
        let Some(handle) = self.resolve_node(node, "write_property") else {
            return;
        };
        let written = self
            .nodes
            .get_mut(handle)
            .is_some_and(|target| target.write(property, value, mode, index));
        if !written {
            self.stats.type_mismatches += 1;
            tracing::debug!(
                "Rejected {} value for {:?} of {}",
                value.type_name(),
                property,
                node
            );
        }
    }

    // =========================================================================
    // Renderers
    // =========================================================================

    /// Attaches a new renderer to `node`.
    pub fn create_renderer(&mut self, id: RendererId, node: NodeId) {
        debug_assert!(!self.renderer_ids.contains_key(&id), "{id} created twice");
        let Some(node_handle) = self.resolve_node(node, "create_renderer") else {
            return;
        };
        if self.renderer_ids.contains_key(&id) {
            return;
        }

        let subscription = self.observers.subscribe(node, ObserverKey::Renderer(id));
        let handle = self
            .renderers
            .allocate(Renderer::new(id, node, node_handle, subscription));
        self.renderer_ids.insert(id, handle);
        if let Some(node) = self.nodes.get_mut(node_handle) {
            node.renderers.push(id);
        }
    }

    /// Changes a renderer's draw order.
    pub fn set_depth_index(&mut self, id: RendererId, depth_index: i32) {
        if let Some(renderer) = self.renderer_mut(id, "set_depth_index") {
            if renderer.depth_index != depth_index {
                renderer.depth_index = depth_index;
                renderer.needs_emit = true;
            }
        }
    }

    /// Sets a renderer's persistent opacity.
    pub fn bake_opacity(&mut self, id: RendererId, opacity: f32, index: BufferIndex) {
        if let Some(renderer) = self.renderer_mut(id, "bake_opacity") {
            renderer.opacity.bake(index, opacity);
        }
    }

    /// Destroys a renderer, scheduling removal of its render instance.
    pub fn destroy_renderer(&mut self, id: RendererId) {
        let Some(handle) = self.renderer_ids.remove(&id) else {
            self.note_stale("destroy_renderer", &id);
            return;
        };
        let Some(renderer) = self.renderers.free(handle) else {
            return;
        };
        if renderer.emitted {
            self.removed_renderers.push(id);
        }
        if let Some(node) = self.nodes.get_mut(renderer.node_handle) {
            node.renderers.retain(|renderer| *renderer != id);
        }
        self.stats.renderers_destroyed += 1;
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Registers a constraint, applied after animations every frame.
    pub fn add_constraint(&mut self, id: ConstraintId, desc: ConstraintDesc) {
        let Some(target_handle) = self.resolve_node(desc.target.node, "add_constraint") else {
            return;
        };
        let mut inputs = Vec::with_capacity(desc.inputs.len());
        for input in &desc.inputs {
            let Some(handle) = self.resolve_node(input.node, "add_constraint") else {
                return;
            };
            inputs.push(ResolvedInput {
                handle,
                property: input.property,
            });
        }

        let key = ObserverKey::Constraint(id);
        let subscriptions = std::iter::once(desc.target.node)
            .chain(desc.inputs.iter().map(|input| input.node))
            .map(|node| self.observers.subscribe(node, key))
            .collect();

        self.constraints.push(Constraint::new(
            id,
            desc.target,
            target_handle,
            inputs,
            desc.function,
            subscriptions,
        ));
    }

    /// Removes a constraint. Its target decays back to the base value.
    pub fn remove_constraint(&mut self, id: ConstraintId) {
        let before = self.constraints.len();
        self.constraints.retain(|constraint| constraint.id() != id);
        if self.constraints.len() == before {
            self.note_stale("remove_constraint", &id);
        }
    }

    // =========================================================================
    // Animations
    // =========================================================================

    /// Registers a stopped animation with no animators.
    pub fn create_animation(&mut self, id: AnimationId, desc: AnimationDesc) {
        debug_assert!(self.animation(id).is_none(), "{id} created twice");
        self.animations.push(Animation::new(id, desc));
    }

    /// Adds an animated property to an animation.
    pub fn add_animator(&mut self, id: AnimationId, desc: AnimatorDesc) {
        let Some(handle) = self.resolve_node(desc.node, "add_animator") else {
            return;
        };
        if !desc.property.accepts(&desc.to) || desc.from.is_some_and(|from| !from.same_type(&desc.to)) {
            self.stats.type_mismatches += 1;
            tracing::debug!("Rejected {} animator for {:?}", desc.to.type_name(), desc.property);
            return;
        }
        let subscription = self.observers.subscribe(desc.node, ObserverKey::Animation(id));
        let Some(animation) = self.animation_mut(id) else {
            self.note_stale("add_animator", &id);
            return;
        };
        animation.animators.push(Animator {
            node: desc.node,
            handle,
            property: desc.property,
            from: desc.from,
            to: desc.to,
            alpha: desc.alpha,
            start: None,
            _subscription: subscription,
        });
    }

    /// Starts or resumes an animation.
    pub fn play_animation(&mut self, id: AnimationId) {
        if let Some(animation) = self.animation_mut_or_stale(id, "play_animation") {
            animation.play();
        }
    }

    /// Pauses a playing animation.
    pub fn pause_animation(&mut self, id: AnimationId) {
        if let Some(animation) = self.animation_mut_or_stale(id, "pause_animation") {
            animation.pause();
        }
    }

    /// Stops an animation, applying its end action at the current progress.
    pub fn stop_animation(&mut self, id: AnimationId) {
        if let Some(animation) = self.animation_mut_or_stale(id, "stop_animation") {
            animation.stop();
        }
    }

    /// Removes an animation. Values it set decay back to their base values.
    pub fn destroy_animation(&mut self, id: AnimationId) {
        let before = self.animations.len();
        self.animations.retain(|animation| animation.id() != id);
        if self.animations.len() == before {
            self.note_stale("destroy_animation", &id);
        }
    }

    /// Returns the playback state of an animation.
    #[must_use]
    pub fn animation_state(&self, id: AnimationId) -> Option<AnimationState> {
        self.animation(id).map(Animation::state)
    }

    // =========================================================================
    // Stage
    // =========================================================================

    /// Requests updates for at least `seconds`, even with nothing changing.
    pub fn keep_rendering(&mut self, seconds: f32) {
        self.keep_rendering_seconds = self.keep_rendering_seconds.max(seconds);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn resolve_node(&mut self, id: NodeId, operation: &'static str) -> Option<Handle<Node>> {
        let handle = self.node_ids.get(&id).copied();
        if handle.is_none() {
            self.note_stale(operation, &id);
        }
        handle
    }

    fn renderer_mut(&mut self, id: RendererId, operation: &'static str) -> Option<&mut Renderer> {
        match self.renderer_ids.get(&id).copied() {
            Some(handle) => self.renderers.get_mut(handle),
            None => {
                self.note_stale(operation, &id);
                None
            }
        }
    }

    fn animation_mut(&mut self, id: AnimationId) -> Option<&mut Animation> {
        self.animations.iter_mut().find(|animation| animation.id() == id)
    }

    fn animation_mut_or_stale(
        &mut self,
        id: AnimationId,
        operation: &'static str,
    ) -> Option<&mut Animation> {
        if self.animation(id).is_none() {
            self.note_stale(operation, &id);
            return None;
        }
        self.animation_mut(id)
    }

    fn note_stale(&mut self, operation: &str, target: &dyn std::fmt::Display) {
        self.stats.stale_commands += 1;
        tracing::debug!("Skipping {} on destroyed {}", operation, target);
    }

    /// Returns true if `ancestor` is `node` or one of its ancestors.
    fn is_ancestor(&self, ancestor: Handle<Node>, node: Handle<Node>) -> bool {
        let mut cursor = Some(node);
        while let Some(handle) = cursor {
            if handle == ancestor {
                return true;
            }
            cursor = self.nodes.get(handle).and_then(|node| node.parent);
        }
        false
    }

    fn set_subtree_on_stage(&mut self, top: Handle<Node>, on_stage: bool) {
        let mut stack = vec![top];
        while let Some(handle) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(handle) {
                node.on_stage = on_stage;
                node.hierarchy_changed = true;
                node.mark_as_dirty();
                stack.extend(node.children.iter().copied());
            }
        }
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.node_count())
            .field("renderers", &self.renderer_count())
            .field("constraints", &self.constraints.len())
            .field("animations", &self.animations.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AlphaFunction;
    use crate::constraint::PropertyTarget;
    use vesper_core::Vec3;

    const A: BufferIndex = BufferIndex::ZERO;

    fn scene() -> SceneGraph {
        SceneGraph::new(PoolConfig::default(), PoolConfig::default())
    }

    #[test]
    fn test_connect_puts_subtree_on_stage() {
        let mut scene = scene();
        scene.create_node(NodeId(1));
        scene.create_node(NodeId(2));
        scene.connect_node(NodeId(1), NodeId(2));
        assert!(!scene.node(NodeId(2)).unwrap().is_on_stage());

        scene.connect_node(NodeId::ROOT, NodeId(1));
        assert!(scene.node(NodeId(1)).unwrap().is_on_stage());
        assert!(scene.node(NodeId(2)).unwrap().is_on_stage());

        scene.disconnect_node(NodeId(1));
        assert!(!scene.node(NodeId(2)).unwrap().is_on_stage());
        assert_eq!(scene.node(NodeId::ROOT).unwrap().child_count(), 0);
    }

    #[test]
    fn test_cycle_is_refused() {
        let mut scene = scene();
        scene.create_node(NodeId(1));
        scene.create_node(NodeId(2));
        scene.connect_node(NodeId(1), NodeId(2));
        scene.connect_node(NodeId(2), NodeId(1));
        assert_eq!(scene.stats().rejected_connections, 1);
        assert!(!scene.node(NodeId(1)).unwrap().has_parent());
    }

    #[test]
    fn test_commands_on_destroyed_node_are_skipped() {
        let mut scene = scene();
        scene.create_node(NodeId(1));
        scene.destroy_node(NodeId(1));

        scene.bake_property(
            NodeId(1),
            NodeProperty::Position,
            Vec3::ONE.into(),
            A,
        );
        scene.connect_node(NodeId::ROOT, NodeId(1));
        assert_eq!(scene.stats().stale_commands, 2);
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn test_destroying_node_prunes_dependents() {
        let mut scene = scene();
        scene.create_node(NodeId(1));
        scene.create_node(NodeId(2));
        scene.create_renderer(RendererId(1), NodeId(1));
        scene.add_constraint(
            ConstraintId(1),
            ConstraintDesc::new(
                PropertyTarget::new(NodeId(2), NodeProperty::Position),
                vec![PropertyTarget::new(NodeId(1), NodeProperty::Position)],
                |_, inputs: &[PropertyValue]| inputs[0],
            ),
        );
        scene.create_animation(AnimationId(1), AnimationDesc::new(1.0));
        scene.add_animator(
            AnimationId(1),
            AnimatorDesc {
                node: NodeId(1),
                property: NodeProperty::Scale,
                from: None,
                to: Vec3::new(2.0, 2.0, 2.0).into(),
                alpha: AlphaFunction::Linear,
            },
        );
        assert_eq!(scene.observers().observer_count(NodeId(1)), 3);

        scene.destroy_node(NodeId(1));

        assert_eq!(scene.renderer_count(), 0);
        assert_eq!(scene.constraint_count(), 0);
        assert_eq!(scene.animation(AnimationId(1)).unwrap().animator_count(), 0);
        // The constraint's subscription on its target went with it.
        assert_eq!(scene.observers().observer_count(NodeId(2)), 0);
    }

    #[test]
    fn test_destroying_parent_detaches_children() {
        let mut scene = scene();
        for id in 1..=3 {
            scene.create_node(NodeId(id));
        }
        scene.connect_node(NodeId::ROOT, NodeId(1));
        scene.connect_node(NodeId(1), NodeId(2));
        scene.connect_node(NodeId(2), NodeId(3));

        scene.destroy_node(NodeId(1));
        let child = scene.node(NodeId(2)).unwrap();
        assert!(!child.has_parent());
        assert!(!child.is_on_stage());
        assert!(!scene.node(NodeId(3)).unwrap().is_on_stage());
    }

    #[test]
    fn test_type_mismatch_is_counted() {
        let mut scene = scene();
        scene.create_node(NodeId(1));
        scene.bake_property(NodeId(1), NodeProperty::Visible, PropertyValue::Float(1.0), A);
        assert_eq!(scene.stats().type_mismatches, 1);
    }
}
