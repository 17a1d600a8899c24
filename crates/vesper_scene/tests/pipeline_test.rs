//! # Pipeline Integration Tests
//!
//! Drives the event → update → render path end to end. Most tests run the
//! three stages by hand on one thread so every frame is deterministic; the
//! runtime tests at the bottom use the real threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vesper_scene::{
    AlphaFunction, AnimationDesc, AnimationState, AnimatorDesc, ConstraintDesc, EndAction,
    KeepUpdating, NodeId, NodeProperty, Pipeline, PipelineConfig, PipelineParts, PropertyTarget,
    PropertyValue, RecordingBackend, RenderContext, UpdateStatus, Vec3, Vec4,
};

const FRAME: f32 = 1.0 / 60.0;

struct Harness {
    parts: PipelineParts,
    render: RenderContext,
    backend: RecordingBackend,
}

impl Harness {
    fn new() -> Self {
        let backend = RecordingBackend::new();
        Self {
            parts: Pipeline::build(&PipelineConfig::default()).unwrap(),
            render: RenderContext::new(Box::new(backend.clone())),
            backend,
        }
    }

    /// Flush, update, render.
    fn frame_with(&mut self, elapsed: f32) -> UpdateStatus {
        self.parts.events.flush();
        let status = self.parts.update.update(elapsed);
        self.parts.render_queue.process_pending(&mut self.render);
        status
    }

    fn frame(&mut self) -> UpdateStatus {
        self.frame_with(FRAME)
    }

    fn frames(&mut self, count: usize) {
        for _ in 0..count {
            self.frame();
        }
    }

    fn world_position(&self, node: NodeId) -> Vec3 {
        let committed = self.parts.update.buffers().committed_index();
        self.parts
            .update
            .scene()
            .node(node)
            .unwrap()
            .world_position(committed)
    }
}

fn approx(a: Vec3, b: Vec3) -> bool {
    (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4 && (a.z - b.z).abs() < 1e-4
}

// =============================================================================
// Event → render
// =============================================================================

#[test]
fn test_scene_reaches_render_thread() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;

    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    events.set_property(node, NodeProperty::Position, Vec3::new(1.0, 2.0, 0.0));
    let renderer = events.create_renderer(node);

    let status = h.frame();
    assert!(status.scene_updated);
    assert!(status.render_flipped);
    assert_eq!(status.messages_processed, 4);

    let frame = h.backend.last_frame().unwrap();
    assert_eq!(frame.frame, status.frame);
    assert_eq!(frame.instances.len(), 1);
    let instance = frame.instances[0];
    assert_eq!(instance.renderer, renderer);
    assert_eq!(instance.node, node);
    assert_eq!(instance.position, Vec3::new(1.0, 2.0, 0.0));
    assert_eq!(instance.color, Vec4::ONE);
}

#[test]
fn test_nothing_renders_before_flush() {
    let mut h = Harness::new();
    let node = h.parts.events.create_node();
    h.parts.events.connect_node(NodeId::ROOT, node);
    h.parts.events.create_renderer(node);

    // Update without flushing: the commands stay on the event side.
    let status = h.parts.update.update(FRAME);
    assert_eq!(status.messages_processed, 0);
    assert_eq!(h.parts.update.scene().node_count(), 1);
    assert_eq!(h.parts.events.pending_commands(), 3);

    h.frame();
    assert_eq!(h.render.store().len(), 1);
}

#[test]
fn test_world_values_follow_hierarchy() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;

    let parent = events.create_node();
    let child = events.create_node();
    events.connect_node(NodeId::ROOT, parent);
    events.connect_node(parent, child);
    events.set_property(parent, NodeProperty::Position, Vec3::new(10.0, 0.0, 0.0));
    events.set_property(parent, NodeProperty::Scale, Vec3::new(2.0, 2.0, 1.0));
    events.set_property(child, NodeProperty::Position, Vec3::new(1.0, 3.0, 0.0));
    h.frame();
    assert_eq!(h.world_position(child), Vec3::new(12.0, 6.0, 0.0));

    // Moving the parent moves the child.
    h.parts.events.set_property_relative(parent, NodeProperty::Position, Vec3::new(0.0, 5.0, 0.0));
    h.frame();
    assert_eq!(h.world_position(child), Vec3::new(12.0, 11.0, 0.0));
}

#[test]
fn test_draw_order_and_opacity() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;

    let parent = events.create_node();
    events.connect_node(NodeId::ROOT, parent);
    events.set_property(parent, NodeProperty::Color, Vec4::new(1.0, 1.0, 1.0, 0.5));

    let mut renderers = Vec::new();
    for depth in [3, -1, 2] {
        let node = events.create_node();
        events.connect_node(parent, node);
        let renderer = events.create_renderer(node);
        events.set_depth_index(renderer, depth);
        events.set_opacity(renderer, 0.5);
        renderers.push(renderer);
    }
    h.frame();

    let frame = h.backend.last_frame().unwrap();
    let order: Vec<_> = frame.instances.iter().map(|i| i.renderer).collect();
    assert_eq!(order, [renderers[1], renderers[2], renderers[0]]);
    for instance in &frame.instances {
        assert!((instance.color.w - 0.25).abs() < 1e-6);
    }

    h.parts.events.set_depth_index(renderers[0], -5);
    h.frame();
    let frame = h.backend.last_frame().unwrap();
    assert_eq!(frame.instances[0].renderer, renderers[0]);
}

#[test]
fn test_hidden_parent_hides_subtree() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;

    let parent = events.create_node();
    let child = events.create_node();
    events.connect_node(NodeId::ROOT, parent);
    events.connect_node(parent, child);
    events.create_renderer(child);
    h.frame();
    assert_eq!(h.render.store().len(), 1);

    h.parts.events.set_property(parent, NodeProperty::Visible, false);
    h.frame();
    assert!(h.render.store().is_empty());
    assert!(h.backend.last_frame().unwrap().instances.is_empty());

    h.parts.events.set_property(parent, NodeProperty::Visible, true);
    h.frame();
    assert_eq!(h.render.store().len(), 1);
}

// =============================================================================
// Destruction
// =============================================================================

#[test]
fn test_command_for_destroyed_node_is_skipped() {
    let mut h = Harness::new();
    let doomed = h.parts.events.create_node();
    h.frame();

    // All in one batch: the set arrives after its target is gone, and the
    // new node takes over the freed slot.
    let events = &mut h.parts.events;
    events.destroy_node(doomed);
    let successor = events.create_node();
    events.set_property(doomed, NodeProperty::Position, Vec3::new(9.0, 9.0, 9.0));
    h.frame();

    let scene = h.parts.update.scene();
    assert!(scene.node(doomed).is_none());
    assert_eq!(scene.stats().stale_commands, 1);
    assert_eq!(
        scene.node(successor).unwrap().base_value(NodeProperty::Position),
        PropertyValue::Vector3(Vec3::ZERO)
    );
}

#[test]
fn test_destroying_node_removes_everything_attached() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;

    let parent = events.create_node();
    let child = events.create_node();
    let other = events.create_node();
    events.connect_node(NodeId::ROOT, parent);
    events.connect_node(parent, child);
    events.connect_node(NodeId::ROOT, other);
    events.create_renderer(parent);
    events.create_renderer(child);
    events.apply_constraint(ConstraintDesc::new(
        PropertyTarget::new(other, NodeProperty::Position),
        vec![PropertyTarget::new(parent, NodeProperty::Position)],
        |_, inputs: &[PropertyValue]| inputs[0],
    ));
    h.frame();
    assert_eq!(h.render.store().len(), 2);
    assert_eq!(h.parts.update.scene().constraint_count(), 1);

    h.parts.events.destroy_node(parent);
    h.frame();

    let scene = h.parts.update.scene();
    assert_eq!(scene.renderer_count(), 1);
    assert_eq!(scene.constraint_count(), 0);
    assert!(!scene.node(child).unwrap().is_on_stage());
    assert_eq!(scene.observers().observer_count(other), 0);
    // The parent's instance was destroyed; the child's went off stage.
    assert!(h.render.store().is_empty());
}

// =============================================================================
// Constraints
// =============================================================================

#[test]
fn test_constraint_reuses_output_while_inputs_clean() {
    let mut h = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let events = &mut h.parts.events;
    let leader = events.create_node();
    let follower = events.create_node();
    events.connect_node(NodeId::ROOT, leader);
    events.connect_node(NodeId::ROOT, follower);
    let constraint = events.apply_constraint(ConstraintDesc::new(
        PropertyTarget::new(follower, NodeProperty::Position),
        vec![PropertyTarget::new(leader, NodeProperty::Position)],
        move |_, inputs: &[PropertyValue]| {
            counter.fetch_add(1, Ordering::Relaxed);
            let leader = inputs[0].as_vec3().unwrap_or(Vec3::ZERO);
            PropertyValue::Vector3(leader + Vec3::new(5.0, 0.0, 0.0))
        },
    ));

    h.frames(5);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(h.world_position(follower), Vec3::new(5.0, 0.0, 0.0));

    h.parts.events.set_property(leader, NodeProperty::Position, Vec3::new(1.0, 1.0, 0.0));
    h.frames(3);
    assert_eq!(calls.load(Ordering::Relaxed), 2);
    assert_eq!(h.world_position(follower), Vec3::new(6.0, 1.0, 0.0));
    assert_eq!(
        h.parts.update.scene().constraint(constraint).unwrap().evaluations(),
        2
    );
}

#[test]
fn test_constraint_follows_rebaked_target() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;
    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    let constraint = events.apply_constraint(ConstraintDesc::new(
        PropertyTarget::new(node, NodeProperty::Position),
        Vec::new(),
        |current: &PropertyValue, _: &[PropertyValue]| {
            let current = current.as_vec3().unwrap_or(Vec3::ZERO);
            PropertyValue::Vector3(current + Vec3::new(1.0, 0.0, 0.0))
        },
    ));

    h.frames(3);
    assert_eq!(h.world_position(node), Vec3::new(1.0, 0.0, 0.0));

    h.parts.events.set_property(node, NodeProperty::Position, Vec3::new(10.0, 0.0, 0.0));
    h.frames(4);
    assert_eq!(h.world_position(node), Vec3::new(11.0, 0.0, 0.0));
    assert_eq!(
        h.parts.update.scene().constraint(constraint).unwrap().evaluations(),
        2
    );
}

#[test]
fn test_removed_constraint_decays_to_base_value() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;
    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    let constraint = events.apply_constraint(ConstraintDesc::new(
        PropertyTarget::new(node, NodeProperty::Scale),
        Vec::new(),
        |_, _: &[PropertyValue]| PropertyValue::Vector3(Vec3::new(3.0, 3.0, 3.0)),
    ));
    h.frames(2);
    let committed = h.parts.update.buffers().committed_index();
    let scene = h.parts.update.scene();
    assert_eq!(
        scene.node(node).unwrap().world_scale(committed),
        Vec3::new(3.0, 3.0, 3.0)
    );

    h.parts.events.remove_constraint(constraint);
    h.frames(2);
    let scene = h.parts.update.scene();
    for index in [committed, committed.other()] {
        assert_eq!(
            scene.node(node).unwrap().property(NodeProperty::Scale, index),
            PropertyValue::Vector3(Vec3::ONE)
        );
    }
}

// =============================================================================
// Animations
// =============================================================================

fn slide(h: &mut Harness, end_action: EndAction) -> (NodeId, vesper_scene::AnimationId) {
    let events = &mut h.parts.events;
    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    let animation = events.create_animation(AnimationDesc {
        duration: 0.1,
        looping: false,
        end_action,
    });
    events.add_animator(
        animation,
        AnimatorDesc {
            node,
            property: NodeProperty::Position,
            from: None,
            to: Vec3::new(10.0, 0.0, 0.0).into(),
            alpha: AlphaFunction::Linear,
        },
    );
    events.play_animation(animation);
    (node, animation)
}

#[test]
fn test_animation_bakes_final_value() {
    let mut h = Harness::new();
    let (node, animation) = slide(&mut h, EndAction::Bake);

    let status = h.frame_with(0.05);
    assert!(status.keep_updating.contains(KeepUpdating::ANIMATIONS_RUNNING));
    assert!(approx(h.world_position(node), Vec3::new(5.0, 0.0, 0.0)));

    let status = h.frame_with(0.05);
    // Finished this frame: one more update is still requested.
    assert!(status.keep_updating.contains(KeepUpdating::ANIMATIONS_RUNNING));
    assert_eq!(
        h.parts.update.scene().animation_state(animation),
        Some(AnimationState::Stopped)
    );

    h.frames(3);
    let scene = h.parts.update.scene();
    assert_eq!(
        scene.node(node).unwrap().base_value(NodeProperty::Position),
        PropertyValue::Vector3(Vec3::new(10.0, 0.0, 0.0))
    );
    assert!(approx(h.world_position(node), Vec3::new(10.0, 0.0, 0.0)));
    assert!(!h.frame().keep_updating.is_requested());
}

#[test]
fn test_discarded_animation_returns_to_base() {
    let mut h = Harness::new();
    let (node, _) = slide(&mut h, EndAction::Discard);

    h.frame_with(0.05);
    h.frame_with(0.05);
    assert!(approx(h.world_position(node), Vec3::new(10.0, 0.0, 0.0)));

    h.frames(2);
    assert_eq!(h.world_position(node), Vec3::ZERO);
    assert_eq!(
        h.parts.update.scene().node(node).unwrap().base_value(NodeProperty::Position),
        PropertyValue::Vector3(Vec3::ZERO)
    );
}

#[test]
fn test_stopping_discarded_animation_restores_base_at_once() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;
    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    let animation = events.create_animation(AnimationDesc {
        duration: 1.0,
        looping: false,
        end_action: EndAction::Discard,
    });
    events.add_animator(
        animation,
        AnimatorDesc {
            node,
            property: NodeProperty::Position,
            from: Some(Vec3::ZERO.into()),
            to: Vec3::new(10.0, 0.0, 0.0).into(),
            alpha: AlphaFunction::Linear,
        },
    );
    events.play_animation(animation);
    h.frame_with(0.5);
    assert!(approx(h.world_position(node), Vec3::new(5.0, 0.0, 0.0)));

    h.parts.events.stop_animation(animation);
    h.frame();
    assert_eq!(h.world_position(node), Vec3::ZERO);
    assert_eq!(
        h.parts.update.scene().animation_state(animation),
        Some(AnimationState::Stopped)
    );
}

#[test]
fn test_stopping_animation_bakes_current_progress() {
    let mut h = Harness::new();
    let events = &mut h.parts.events;
    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    let animation = events.create_animation(AnimationDesc::new(1.0));
    events.add_animator(
        animation,
        AnimatorDesc {
            node,
            property: NodeProperty::Scale,
            from: Some(Vec3::ONE.into()),
            to: Vec3::new(3.0, 3.0, 3.0).into(),
            alpha: AlphaFunction::Linear,
        },
    );
    events.play_animation(animation);
    h.frame_with(0.5);

    h.parts.events.stop_animation(animation);
    h.frames(3);
    let base = h.parts.update.scene().node(node).unwrap().base_value(NodeProperty::Scale);
    let scale = base.as_vec3().unwrap();
    assert!(approx(scale, Vec3::new(2.0, 2.0, 2.0)));
}

// =============================================================================
// Frame skipping
// =============================================================================

#[test]
fn test_quiet_frames_skip_scene_passes() {
    let mut h = Harness::new();
    let node = h.parts.events.create_node();
    h.parts.events.connect_node(NodeId::ROOT, node);
    h.parts.events.create_renderer(node);
    let first = h.frame();
    assert!(first.scene_updated);

    h.frames(3);
    let quiet = h.frame();
    assert!(!quiet.scene_updated);
    assert_eq!(quiet.render_commands, 0);
    assert!(!quiet.render_flipped);
    assert!(!quiet.keep_updating.is_requested());

    // Keep-rendering requests more frames without touching the scene.
    h.parts.events.keep_rendering(0.05);
    let status = h.frame_with(0.02);
    assert!(!status.scene_updated);
    assert!(status.keep_updating.contains(KeepUpdating::STAGE_KEEP_RENDERING));
    h.frame_with(0.02);
    let status = h.frame_with(0.02);
    assert!(!status.keep_updating.is_requested());

    // A scene command wakes the passes up again.
    h.parts.events.set_property(node, NodeProperty::Position, Vec3::new(1.0, 0.0, 0.0));
    assert!(h.frame().scene_updated);
    assert!(h.frame().scene_updated);
}

// =============================================================================
// Threaded runtime
// =============================================================================

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        frame_interval_ms: 2,
        ..PipelineConfig::default()
    }
}

#[test]
fn test_runtime_presents_frames() {
    let backend = RecordingBackend::new();
    let (mut events, handle) = Pipeline::start(fast_config(), Box::new(backend.clone())).unwrap();

    let node = events.create_node();
    events.connect_node(NodeId::ROOT, node);
    events.set_property(node, NodeProperty::Position, Vec3::new(4.0, 0.0, 0.0));
    events.create_renderer(node);
    assert!(events.flush());

    assert!(wait_for(Duration::from_secs(5), || backend.frame_count() > 0));
    let frame = backend.last_frame().unwrap();
    assert_eq!(frame.instances[0].position, Vec3::new(4.0, 0.0, 0.0));

    let report = handle.shutdown().unwrap();
    assert!(report.frames > 0);
    assert_eq!(report.messages_processed, 4);
    assert!(report.frames_presented >= 1);
    assert_eq!(report.scene.stale_commands, 0);
}

#[test]
fn test_runtime_delivers_every_command() {
    const BATCHES: usize = 200;
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let (mut events, handle) =
        Pipeline::start(fast_config(), Box::new(RecordingBackend::new())).unwrap();

    let mut enqueued = 0u64;
    for _ in 0..BATCHES {
        let node = events.create_node();
        events.connect_node(NodeId::ROOT, node);
        let position = Vec3::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0), 0.0);
        events.set_property(node, NodeProperty::Position, position);
        enqueued += 3;

        // Refused flushes keep the commands for the next attempt.
        events.flush();
        if rng.gen_bool(0.3) {
            thread::sleep(Duration::from_micros(rng.gen_range(0..500)));
        }
    }

    assert!(wait_for(Duration::from_secs(10), || {
        events.flush();
        events.pending_commands() == 0 && events.is_drained()
    }));

    let report = handle.shutdown().unwrap();
    assert_eq!(report.messages_processed, enqueued);
    assert_eq!(report.scene.nodes_created, BATCHES as u64);
    assert_eq!(report.scene.stale_commands, 0);
}
