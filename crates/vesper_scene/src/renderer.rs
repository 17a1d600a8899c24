//! Renderers: the drawable attachments of nodes.

use vesper_core::{AnimatableProperty, BufferIndex, DoubleBufferedProperty, Handle};

use crate::ids::{NodeId, RendererId};
use crate::node::Node;
use crate::observer::Subscription;

/// A drawable attached to one node.
///
/// `opacity` is animatable; `final_opacity` is recomputed by the emit pass
/// every frame (opacity times the node's world alpha) and is what the
/// render thread receives.
#[derive(Debug)]
pub struct Renderer {
    id: RendererId,
    node: NodeId,
    pub(crate) node_handle: Handle<Node>,
    pub(crate) depth_index: i32,
    pub(crate) opacity: AnimatableProperty<f32>,
    pub(crate) final_opacity: DoubleBufferedProperty<f32>,
    /// The render thread currently holds an instance for this renderer.
    pub(crate) emitted: bool,
    /// Depth changed since the last emission.
    pub(crate) needs_emit: bool,
    pub(crate) _subscription: Subscription,
}

impl Renderer {
    pub(crate) fn new(
        id: RendererId,
        node: NodeId,
        node_handle: Handle<Node>,
        subscription: Subscription,
    ) -> Self {
        Self {
            id,
            node,
            node_handle,
            depth_index: 0,
            opacity: AnimatableProperty::new(1.0),
            final_opacity: DoubleBufferedProperty::new(1.0),
            emitted: false,
            needs_emit: true,
            _subscription: subscription,
        }
    }

    /// The renderer's id.
    #[must_use]
    pub const fn id(&self) -> RendererId {
        self.id
    }

    /// The node it is attached to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Draw order; lower draws first.
    #[must_use]
    pub const fn depth_index(&self) -> i32 {
        self.depth_index
    }

    /// Opacity in slot `index`.
    #[must_use]
    pub fn opacity(&self, index: BufferIndex) -> f32 {
        self.opacity.get(index)
    }

    /// Opacity sent to the render thread for slot `index`.
    #[must_use]
    pub fn final_opacity(&self, index: BufferIndex) -> f32 {
        self.final_opacity.get(index)
    }

    /// Returns true if the render thread holds an instance for it.
    #[must_use]
    pub const fn is_emitted(&self) -> bool {
        self.emitted
    }

    pub(crate) fn reset_to_base_values(&mut self, index: BufferIndex) {
        self.opacity.reset_to_base_value(index);
        self.final_opacity.reset_to_base_value(index);
    }
}
