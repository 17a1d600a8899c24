//! # Pipeline Demo
//!
//! Starts the three-thread pipeline, builds a small scene, animates it for
//! half a second and prints what the render side saw.
//!
//! ```bash
//! # Default configuration
//! cargo run --bin pipeline_demo
//!
//! # Configuration from a file
//! cargo run --bin pipeline_demo -- vesper.toml
//! ```

use std::thread;
use std::time::{Duration, Instant};

use vesper_scene::{
    AnimationDesc, AnimatorDesc, AlphaFunction, ConstraintDesc, EndAction, NodeId, NodeProperty,
    Pipeline, PipelineConfig, PipelineResult, PropertyTarget, PropertyValue, RecordingBackend,
    Vec3, Vec4,
};

const RUN_TIME: Duration = Duration::from_millis(500);

fn main() -> PipelineResult<()> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let backend = RecordingBackend::new();
    let (mut events, handle) = Pipeline::start(config, Box::new(backend.clone()))?;

    // A parent sliding right, with a row of children and a follower that
    // trails the parent through a constraint.
    let parent = events.create_node();
    events.connect_node(NodeId::ROOT, parent);
    events.create_renderer(parent);

    for i in 0..3u8 {
        let child = events.create_node();
        events.connect_node(parent, child);
        events.set_property(child, NodeProperty::Position, Vec3::new(f32::from(i) * 10.0, 5.0, 0.0));
        events.set_property(child, NodeProperty::Color, Vec4::new(1.0, 0.5, 0.25, 1.0));
        let renderer = events.create_renderer(child);
        events.set_depth_index(renderer, i32::from(i));
    }

    let follower = events.create_node();
    events.connect_node(NodeId::ROOT, follower);
    let follower_renderer = events.create_renderer(follower);
    events.set_opacity(follower_renderer, 0.5);
    events.apply_constraint(ConstraintDesc::new(
        PropertyTarget::new(follower, NodeProperty::Position),
        vec![PropertyTarget::new(parent, NodeProperty::Position)],
        |_, inputs: &[PropertyValue]| {
            let target = inputs[0].as_vec3().unwrap_or(Vec3::ZERO);
            PropertyValue::Vector3(target + Vec3::new(0.0, -20.0, 0.0))
        },
    ));

    let slide = events.create_animation(AnimationDesc {
        duration: 0.4,
        looping: false,
        end_action: EndAction::Bake,
    });
    events.add_animator(
        slide,
        AnimatorDesc {
            node: parent,
            property: NodeProperty::Position,
            from: None,
            to: Vec3::new(100.0, 0.0, 0.0).into(),
            alpha: AlphaFunction::Custom(|t| t * t * (3.0 - 2.0 * t)),
        },
    );
    events.play_animation(slide);

    let started = Instant::now();
    while started.elapsed() < RUN_TIME {
        // A refused flush keeps the commands queued for the next attempt.
        events.flush();
        thread::sleep(Duration::from_millis(4));
    }
    events.flush();

    let report = handle.shutdown()?;
    tracing::info!(
        "{} update frames, {} messages, {} frames presented",
        report.frames,
        report.messages_processed,
        report.frames_presented
    );

    if let Some(frame) = backend.last_frame() {
        for instance in &frame.instances {
            tracing::info!(
                "{} on {} depth {} at ({:.1}, {:.1}) alpha {:.2}",
                instance.renderer,
                instance.node,
                instance.depth_index,
                instance.position.x,
                instance.position.y,
                instance.color.w
            );
        }
    }

    Ok(())
}
