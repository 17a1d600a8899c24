//! # Scene-Graph Properties
//!
//! Every property keeps two slots addressed by a [`BufferIndex`]: the update
//! thread writes the slot for the current update index while the other slot
//! still holds the previous frame's committed value.
//!
//! | Type | Written by | Reset behavior |
//! |------|-----------|----------------|
//! | [`DoubleBufferedProperty`] | commands | copy other slot, clear flag |
//! | [`AnimatableProperty`] | commands, animations, constraints | restore base value while dirty |
//! | [`InheritedProperty`] | world-transform pass | copy previous once when clean |
//!
//! Properties never interpolate or clamp; animators do that before writing.
//!
//! [`BufferIndex`]: crate::sync::BufferIndex

mod animatable;
mod double_buffered;
mod inherited;
mod value;

pub use animatable::AnimatableProperty;
pub use double_buffered::DoubleBufferedProperty;
pub use inherited::InheritedProperty;
pub use value::{Interpolate, PropertyValue, Vec3, Vec4};
