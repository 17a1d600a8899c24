//! The per-frame passes over the scene graph, run in this order:
//! reset, animate, constrain, derive world, emit.

use vesper_core::{BufferIndex, RenderQueue, Vec3, Vec4};

use crate::node::WriteMode;
use crate::render::{RenderContext, RenderInstance};
use crate::scene::SceneGraph;

/// Opacity changes smaller than this are not re-sent.
const OPACITY_EPSILON: f32 = 1e-6;

/// What the animate pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct AnimateOutcome {
    /// Property writes applied.
    pub(crate) applied: usize,
    /// Animations that finished or stopped this frame.
    pub(crate) finished: usize,
}

impl SceneGraph {
    /// Restores every animatable value in slot `index` to its base value.
    pub(crate) fn reset_properties(&mut self, index: BufferIndex) {
        for (_, node) in self.nodes.iter_mut() {
            node.reset_to_base_values(index);
        }
        for (_, renderer) in self.renderers.iter_mut() {
            renderer.reset_to_base_values(index);
        }
    }

    /// Advances every animation by `elapsed` seconds and writes its values.
    pub(crate) fn animate(&mut self, index: BufferIndex, elapsed: f32) -> AnimateOutcome {
        let mut outcome = AnimateOutcome::default();

        for animation in &mut self.animations {
            let Some(step) = animation.advance(elapsed) else {
                continue;
            };
            if step.finished {
                outcome.finished += 1;
            }
            if !step.write {
                continue;
            }
            let mode = if step.bake { WriteMode::Bake } else { WriteMode::Set };

            for animator in &mut animation.animators {
                let Some(node) = self.nodes.get_mut(animator.handle) else {
                    continue;
                };
                if animator.from.is_none() && animator.start.is_none() {
                    animator.start = Some(node.base_value(animator.property));
                }
                let written = animator
                    .value_at(step.progress)
                    .is_some_and(|value| node.write(animator.property, value, mode, index));
                if written {
                    outcome.applied += 1;
                } else {
                    self.stats.type_mismatches += 1;
                }
            }
        }

        outcome
    }

    /// Runs every constraint in registration order.
    pub(crate) fn apply_constraints(&mut self, index: BufferIndex) {
        for constraint in &mut self.constraints {
            self.constraint_inputs.clear();
            let mut inputs_clean = true;
            let mut resolved = true;
            for input in &constraint.inputs {
                match self.nodes.get(input.handle) {
                    Some(node) => {
                        inputs_clean &= node.property_is_clean(input.property);
                        self.constraint_inputs
                            .push(node.property(input.property, index));
                    }
                    None => resolved = false,
                }
            }
            if !resolved {
                continue;
            }

            let property = constraint.target().property;
            let Some(target) = self.nodes.get_mut(constraint.target_handle) else {
                continue;
            };
            let base = target.base_value(property);
            let current = target.property(property, index);
            let value =
                constraint.evaluate(&base, &current, &self.constraint_inputs, inputs_clean);
            if !target.write(property, value, WriteMode::Set, index) {
                self.stats.type_mismatches += 1;
                tracing::debug!(
                    "{} produced {} for {:?}",
                    constraint.id(),
                    value.type_name(),
                    property
                );
            }
        }
    }

    /// Derives world values for every node reachable from the root.
    ///
    /// A node is recomputed only if its parent's world values changed, one of
    /// its local values is dirty, or it was reparented; otherwise it copies
    /// last frame's world values forward. Returns the number of nodes whose
    /// world values changed.
    pub(crate) fn derive_world(&mut self, index: BufferIndex) -> usize {
        let mut changed = 0;
        self.traversal.clear();
        self.traversal.push((self.root, false));

        while let Some((handle, parent_changed)) = self.traversal.pop() {
            let parent_world = self
                .nodes
                .get(handle)
                .and_then(|node| node.parent)
                .and_then(|parent| self.nodes.get(parent))
                .map(|parent| {
                    (
                        parent.world_position(index),
                        parent.world_scale(index),
                        parent.world_color(index),
                        parent.world_visible(index),
                    )
                });
            let Some(node) = self.nodes.get_mut(handle) else {
                continue;
            };

            if parent_changed || node.hierarchy_changed || !node.local_is_clean() {
                let (position, scale, color, visible) =
                    parent_world.unwrap_or((Vec3::ZERO, Vec3::ONE, Vec4::ONE, true));

                let mut world_changed = false;
                world_changed |= node
                    .world_position
                    .set(index, position + scale.mul_elements(node.position.get(index)));
                world_changed |= node
                    .world_scale
                    .set(index, scale.mul_elements(node.scale.get(index)));
                world_changed |= node
                    .world_color
                    .set(index, color.mul_elements(node.color.get(index)));
                world_changed |= node
                    .world_visible
                    .set(index, visible && node.visible.get(index));
                node.hierarchy_changed = false;
                if world_changed {
                    changed += 1;
                }
            } else {
                node.world_position.copy_previous(index);
                node.world_scale.copy_previous(index);
                node.world_color.copy_previous(index);
                node.world_visible.copy_previous(index);
            }

            let children_changed = !node.world_is_clean();
            // Reversed so children pop in insertion order.
            for &child in node.children.iter().rev() {
                self.traversal.push((child, children_changed));
            }
        }

        changed
    }

    /// Queues render commands for every renderer whose output changed,
    /// followed by an end-of-frame marker. Returns the number of instance
    /// commands queued.
    pub(crate) fn emit_render(
        &mut self,
        index: BufferIndex,
        frame: u64,
        queue: &RenderQueue<RenderContext>,
    ) -> usize {
        let write = queue.write_index();
        let mut emitted = 0;

        for renderer in self.removed_renderers.drain(..) {
            queue.enqueue(write, move |context: &mut RenderContext, _| {
                context.remove(renderer);
            });
            emitted += 1;
        }

        for (_, renderer) in self.renderers.iter_mut() {
            let Some(node) = self.nodes.get(renderer.node_handle) else {
                continue;
            };

            if !(node.is_on_stage() && node.world_visible(index)) {
                if renderer.emitted {
                    let id = renderer.id();
                    queue.enqueue(write, move |context: &mut RenderContext, _| {
                        context.remove(id);
                    });
                    renderer.emitted = false;
                    emitted += 1;
                }
                continue;
            }

            let color = node.world_color(index);
            let opacity = renderer.opacity.get(index) * color.w;
            if (renderer.final_opacity.get(index) - opacity).abs() > OPACITY_EPSILON {
                renderer.final_opacity.set(index, opacity);
            }

            let stale = renderer.needs_emit
                || !renderer.emitted
                || !node.world_is_clean()
                || renderer.final_opacity.input_changed();
            if !stale {
                continue;
            }

            let instance = RenderInstance {
                renderer: renderer.id(),
                node: renderer.node(),
                depth_index: renderer.depth_index,
                position: node.world_position(index),
                scale: node.world_scale(index),
                color: Vec4::new(color.x, color.y, color.z, renderer.final_opacity.get(index)),
                frame,
            };
            queue.enqueue(write, move |context: &mut RenderContext, _| {
                context.upsert(instance);
            });
            renderer.emitted = true;
            renderer.needs_emit = false;
            emitted += 1;
        }

        if emitted > 0 {
            queue.enqueue(write, move |context: &mut RenderContext, _| {
                context.end_frame(frame);
            });
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{NodeId, RendererId};
    use crate::node::NodeProperty;
    use crate::render::NullBackend;
    use vesper_core::{BufferConfig, PoolConfig};

    const A: BufferIndex = BufferIndex::ZERO;
    const B: BufferIndex = BufferIndex::ONE;

    /// One frame in update order: reset, drained commands, passes.
    fn frame(
        scene: &mut SceneGraph,
        index: BufferIndex,
        commands: impl FnOnce(&mut SceneGraph),
    ) -> usize {
        scene.reset_properties(index);
        commands(scene);
        scene.animate(index, 0.0);
        scene.apply_constraints(index);
        scene.derive_world(index)
    }

    fn scene() -> SceneGraph {
        SceneGraph::new(PoolConfig::default(), PoolConfig::default())
    }

    #[test]
    fn test_world_values_compose_down_the_tree() {
        let mut scene = scene();
        let changed = frame(&mut scene, A, |scene| {
            scene.create_node(NodeId(1));
            scene.create_node(NodeId(2));
            scene.connect_node(NodeId::ROOT, NodeId(1));
            scene.connect_node(NodeId(1), NodeId(2));
            scene.bake_property(NodeId(1), NodeProperty::Position, Vec3::new(10.0, 0.0, 0.0).into(), A);
            scene.bake_property(NodeId(1), NodeProperty::Scale, Vec3::new(2.0, 2.0, 2.0).into(), A);
            scene.bake_property(NodeId(2), NodeProperty::Position, Vec3::new(1.0, 1.0, 0.0).into(), A);
            scene.bake_property(NodeId(2), NodeProperty::Color, Vec4::new(1.0, 1.0, 1.0, 0.5).into(), A);
        });
        assert_eq!(changed, 2);

        let child = scene.node(NodeId(2)).unwrap();
        assert_eq!(child.world_position(A), Vec3::new(12.0, 2.0, 0.0));
        assert_eq!(child.world_scale(A), Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(child.world_color(A).w, 0.5);
    }

    #[test]
    fn test_baked_value_propagates_without_reparenting() {
        let mut scene = scene();
        frame(&mut scene, A, |scene| {
            scene.create_node(NodeId(1));
            scene.connect_node(NodeId::ROOT, NodeId(1));
        });
        frame(&mut scene, B, |_| {});

        let changed = frame(&mut scene, A, |scene| {
            scene.bake_property(NodeId(1), NodeProperty::Position, Vec3::new(3.0, 0.0, 0.0).into(), A);
        });
        assert_eq!(changed, 1);
        assert_eq!(scene.node(NodeId(1)).unwrap().world_position(A), Vec3::new(3.0, 0.0, 0.0));

        // The other slot catches up on the next frame, then nothing moves.
        assert_eq!(frame(&mut scene, B, |_| {}), 0);
        assert_eq!(scene.node(NodeId(1)).unwrap().world_position(B), Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(frame(&mut scene, A, |_| {}), 0);
    }

    #[test]
    fn test_hidden_renderer_is_removed() {
        let mut scene = scene();
        let queue = RenderQueue::new(BufferConfig::RENDER_QUEUE);
        let mut context = RenderContext::new(Box::new(NullBackend));

        frame(&mut scene, A, |scene| {
            scene.create_node(NodeId(1));
            scene.connect_node(NodeId::ROOT, NodeId(1));
            scene.create_renderer(RendererId(1), NodeId(1));
        });
        assert_eq!(scene.emit_render(A, 1, &queue), 1);
        assert!(queue.flip());
        queue.process_pending(&mut context);
        assert_eq!(context.store().len(), 1);

        frame(&mut scene, B, |scene| {
            scene.bake_property(NodeId(1), NodeProperty::Visible, false.into(), B);
        });
        assert_eq!(scene.emit_render(B, 2, &queue), 1);
        assert!(queue.flip());
        queue.process_pending(&mut context);
        assert!(context.store().is_empty());
        assert_eq!(context.frames_presented(), 2);

        // Nothing changed: nothing to send.
        frame(&mut scene, A, |_| {});
        assert_eq!(scene.emit_render(A, 3, &queue), 0);
        assert!(!queue.flip());
    }
}
