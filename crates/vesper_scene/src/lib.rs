//! # Vesper Scene
//!
//! A retained scene graph split across three threads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  flush   ┌──────────────────┐  flip   ┌──────────────────┐
//! │   EVENT THREAD   │─────────>│  UPDATE THREAD   │────────>│  RENDER THREAD   │
//! │                  │          │                  │         │                  │
//! │  • EventContext  │          │  • SceneGraph    │         │  • RenderContext │
//! │  • id allocation │          │  • UpdateManager │         │  • RenderBackend │
//! └──────────────────┘          └──────────────────┘         └──────────────────┘
//! ```
//!
//! The event thread only queues commands. The update thread owns every scene
//! object and runs the frame passes (reset, animate, constrain, derive world,
//! emit). The render thread only sees copied [`RenderInstance`]s.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vesper_scene::{NodeId, NodeProperty, Pipeline, PipelineConfig, RecordingBackend, Vec3};
//!
//! let backend = RecordingBackend::new();
//! let (mut events, handle) = Pipeline::start(PipelineConfig::default(), Box::new(backend.clone()))?;
//!
//! let node = events.create_node();
//! events.connect_node(NodeId::ROOT, node);
//! events.set_property(node, NodeProperty::Position, Vec3::new(1.0, 2.0, 0.0));
//! events.create_renderer(node);
//! events.flush();
//!
//! let report = handle.shutdown()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod config;
pub mod constraint;
pub mod error;
pub mod event;
mod ids;
pub mod node;
pub mod observer;
pub mod render;
pub mod renderer;
pub mod runtime;
pub mod scene;
pub mod update;

pub use animation::{
    AlphaFunction, Animation, AnimationDesc, AnimationState, AnimatorDesc, EndAction,
};
pub use config::PipelineConfig;
pub use constraint::{Constraint, ConstraintDesc, ConstraintFn, PropertyTarget};
pub use error::{PipelineError, PipelineResult};
pub use event::EventContext;
pub use ids::{AnimationId, ConstraintId, NodeId, RendererId};
pub use node::{Node, NodeProperty};
pub use observer::{ObserverKey, ObserverRegistry, Subscription};
pub use render::{
    NullBackend, PresentedFrame, RecordingBackend, RenderBackend, RenderContext, RenderInstance,
    RenderStore,
};
pub use renderer::Renderer;
pub use runtime::{Pipeline, PipelineHandle, PipelineParts, RuntimeReport};
pub use scene::{SceneGraph, SceneStats};
pub use update::{KeepUpdating, UpdateManager, UpdateStatus};

pub use vesper_core::{BufferIndex, PropertyValue, Vec3, Vec4};
