//! # Scene Nodes
//!
//! A node carries local animatable properties (what commands, animations and
//! constraints write) and inherited world properties (what the world pass
//! derives from the parent chain).

use vesper_core::{
    AnimatableProperty, BufferIndex, Handle, InheritedProperty, PropertyValue, Vec3, Vec4,
};

use crate::ids::{NodeId, RendererId};

/// The animatable properties of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeProperty {
    /// Local position (`Vec3`).
    Position,
    /// Local scale (`Vec3`).
    Scale,
    /// Local color (`Vec4`).
    Color,
    /// Local visibility (`bool`).
    Visible,
}

impl NodeProperty {
    /// Every property, in declaration order.
    pub const ALL: [Self; 4] = [Self::Position, Self::Scale, Self::Color, Self::Visible];

    /// The value a new node starts with.
    #[must_use]
    pub const fn default_value(self) -> PropertyValue {
        match self {
            Self::Position => PropertyValue::Vector3(Vec3::ZERO),
            Self::Scale => PropertyValue::Vector3(Vec3::ONE),
            Self::Color => PropertyValue::Vector4(Vec4::ONE),
            Self::Visible => PropertyValue::Bool(true),
        }
    }

    /// Returns true if `value` has the type this property stores.
    #[must_use]
    pub fn accepts(self, value: &PropertyValue) -> bool {
        self.default_value().same_type(value)
    }
}

/// How a write reaches a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// This frame only.
    Set,
    /// This frame only, added to the current value.
    SetRelative,
    /// Persistent.
    Bake,
    /// Persistent, added to the current value.
    BakeRelative,
}

/// A scene-graph node, owned by the update thread.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    pub(crate) position: AnimatableProperty<Vec3>,
    pub(crate) scale: AnimatableProperty<Vec3>,
    pub(crate) color: AnimatableProperty<Vec4>,
    pub(crate) visible: AnimatableProperty<bool>,
    pub(crate) world_position: InheritedProperty<Vec3>,
    pub(crate) world_scale: InheritedProperty<Vec3>,
    pub(crate) world_color: InheritedProperty<Vec4>,
    pub(crate) world_visible: InheritedProperty<bool>,
    pub(crate) parent: Option<Handle<Node>>,
    pub(crate) children: Vec<Handle<Node>>,
    pub(crate) renderers: Vec<RendererId>,
    pub(crate) on_stage: bool,
    /// Forces the world pass to recompute this node (reparenting).
    pub(crate) hierarchy_changed: bool,
}

impl Node {
    /// Creates a detached node with default property values.
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            position: AnimatableProperty::new(Vec3::ZERO),
            scale: AnimatableProperty::new(Vec3::ONE),
            color: AnimatableProperty::new(Vec4::ONE),
            visible: AnimatableProperty::new(true),
            world_position: InheritedProperty::new(Vec3::ZERO),
            world_scale: InheritedProperty::new(Vec3::ONE),
            world_color: InheritedProperty::new(Vec4::ONE),
            world_visible: InheritedProperty::new(true),
            parent: None,
            children: Vec::new(),
            renderers: Vec::new(),
            on_stage: false,
            hierarchy_changed: true,
        }
    }

    /// The node's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns true if the node is connected to the root.
    #[inline]
    #[must_use]
    pub const fn is_on_stage(&self) -> bool {
        self.on_stage
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Returns true if the node has a parent.
    #[must_use]
    pub const fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Renderers attached to this node.
    #[must_use]
    pub fn renderers(&self) -> &[RendererId] {
        &self.renderers
    }

    /// Reads a local property from slot `index`.
    #[must_use]
    pub fn property(&self, property: NodeProperty, index: BufferIndex) -> PropertyValue {
        match property {
            NodeProperty::Position => self.position.get(index).into(),
            NodeProperty::Scale => self.scale.get(index).into(),
            NodeProperty::Color => self.color.get(index).into(),
            NodeProperty::Visible => self.visible.get(index).into(),
        }
    }

    /// Reads a local property's base value.
    #[must_use]
    pub fn base_value(&self, property: NodeProperty) -> PropertyValue {
        match property {
            NodeProperty::Position => self.position.base_value().into(),
            NodeProperty::Scale => self.scale.base_value().into(),
            NodeProperty::Color => self.color.base_value().into(),
            NodeProperty::Visible => self.visible.base_value().into(),
        }
    }

    /// Returns true if the local property did not change this or last frame.
    #[must_use]
    pub fn property_is_clean(&self, property: NodeProperty) -> bool {
        match property {
            NodeProperty::Position => self.position.is_clean(),
            NodeProperty::Scale => self.scale.is_clean(),
            NodeProperty::Color => self.color.is_clean(),
            NodeProperty::Visible => self.visible.is_clean(),
        }
    }

    /// World position committed to slot `index`.
    #[must_use]
    pub fn world_position(&self, index: BufferIndex) -> Vec3 {
        self.world_position.get(index)
    }

    /// World scale committed to slot `index`.
    #[must_use]
    pub fn world_scale(&self, index: BufferIndex) -> Vec3 {
        self.world_scale.get(index)
    }

    /// World color committed to slot `index`.
    #[must_use]
    pub fn world_color(&self, index: BufferIndex) -> Vec4 {
        self.world_color.get(index)
    }

    /// World visibility committed to slot `index`.
    #[must_use]
    pub fn world_visible(&self, index: BufferIndex) -> bool {
        self.world_visible.get(index)
    }

    /// Writes a local property.
    ///
    /// Returns false, leaving the node untouched, if `value` has the wrong
    /// type for `property`.
    pub(crate) fn write(
        &mut self,
        property: NodeProperty,
        value: PropertyValue,
        mode: WriteMode,
        index: BufferIndex,
    ) -> bool {
        match (property, value) {
            (NodeProperty::Position, PropertyValue::Vector3(v)) => {
                write_additive(&mut self.position, v, mode, index);
            }
            (NodeProperty::Scale, PropertyValue::Vector3(v)) => {
                write_additive(&mut self.scale, v, mode, index);
            }
            (NodeProperty::Color, PropertyValue::Vector4(v)) => {
                write_additive(&mut self.color, v, mode, index);
            }
            (NodeProperty::Visible, PropertyValue::Bool(v)) => {
                // Relative booleans combine with OR.
                let current = self.visible.get(index);
                match mode {
                    WriteMode::Set => self.visible.set(index, v),
                    WriteMode::SetRelative => self.visible.set(index, current || v),
                    WriteMode::Bake => self.visible.bake(index, v),
                    WriteMode::BakeRelative => self.visible.bake(index, current || v),
                }
            }
            _ => return false,
        }
        true
    }

    /// Restores every local property to its base value for slot `index`.
    pub(crate) fn reset_to_base_values(&mut self, index: BufferIndex) {
        self.position.reset_to_base_value(index);
        self.scale.reset_to_base_value(index);
        self.color.reset_to_base_value(index);
        self.visible.reset_to_base_value(index);
    }

    /// Returns true if no local property changed this or last frame.
    pub(crate) fn local_is_clean(&self) -> bool {
        self.position.is_clean()
            && self.scale.is_clean()
            && self.color.is_clean()
            && self.visible.is_clean()
    }

    /// Returns true if every world value equals last frame's.
    pub(crate) fn world_is_clean(&self) -> bool {
        self.world_position.is_clean()
            && self.world_scale.is_clean()
            && self.world_color.is_clean()
            && self.world_visible.is_clean()
    }

    /// Forces the next two resets to restore base values.
    pub(crate) fn mark_as_dirty(&mut self) {
        self.position.mark_as_dirty();
        self.scale.mark_as_dirty();
        self.color.mark_as_dirty();
        self.visible.mark_as_dirty();
    }
}

fn write_additive<T>(property: &mut AnimatableProperty<T>, value: T, mode: WriteMode, index: BufferIndex)
where
    T: Copy + PartialEq + std::ops::Add<Output = T>,
{
    match mode {
        WriteMode::Set => property.set(index, value),
        WriteMode::SetRelative => property.set_relative(index, value),
        WriteMode::Bake => property.bake(index, value),
        WriteMode::BakeRelative => property.bake_relative(index, value),
    }
}
