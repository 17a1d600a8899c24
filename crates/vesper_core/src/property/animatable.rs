//! Animatable property: a base value plus two-frame dirty tracking.

use std::ops::Add;

use crate::sync::BufferIndex;

/// Value did not change in this or the previous frame.
const CLEAN: u8 = 0x00;
/// Value was baked during the previous frame.
const BAKED: u8 = 0x01;
/// Value was set during the previous frame.
const SET: u8 = 0x02;

/// A double-buffered property with a persistent base value.
///
/// `set` writes only the working slot and lasts one frame: the next reset
/// restores the base value. `bake` changes the base value itself.
///
/// The dirty flags span two frames. A set value differs from the base, so
/// the reset that undoes it must also be seen by the *other* slot one frame
/// later; the flags shift right once per reset (`SET -> BAKED -> CLEAN`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatableProperty<T> {
    values: [T; 2],
    base: T,
    dirty: u8,
}

impl<T: Copy + PartialEq> AnimatableProperty<T> {
    /// Creates a property whose slots and base are `initial`.
    ///
    /// A new property counts as baked, so it is reset once before going
    /// clean.
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            values: [initial; 2],
            base: initial,
            dirty: BAKED,
        }
    }

    /// Reads slot `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: BufferIndex) -> T {
        self.values[index.slot()]
    }

    /// Returns the base value.
    #[inline]
    #[must_use]
    pub const fn base_value(&self) -> T {
        self.base
    }

    /// Writes slot `index` for this frame only.
    ///
    /// Writing the value the slot already holds does not dirty the property.
    pub fn set(&mut self, index: BufferIndex, value: T) {
        if self.values[index.slot()] != value {
            self.values[index.slot()] = value;
            self.dirty = SET;
        }
    }

    /// Writes both slots and the base value.
    ///
    /// Baking the current base value is a no-op.
    pub fn bake(&mut self, index: BufferIndex, value: T) {
        if self.base != value {
            self.values[index.slot()] = value;
            self.values[index.other().slot()] = value;
            self.base = value;
            self.dirty |= BAKED;
        }
    }

    /// Sets both slots and the base value, bypassing dirty tracking.
    ///
    /// Only valid before the owner is connected to the scene.
    pub fn set_initial(&mut self, value: T) {
        self.values = [value; 2];
        self.base = value;
    }

    /// Copies the base value into slot `index` if the property is dirty,
    /// shifting the dirty flags.
    pub fn reset_to_base_value(&mut self, index: BufferIndex) {
        if self.dirty != CLEAN {
            self.values[index.slot()] = self.base;
            self.dirty >>= 1;
        }
    }

    /// Forces the next two resets to restore the base value.
    pub fn mark_as_dirty(&mut self) {
        self.dirty = SET;
    }

    /// Returns true if the value did not change in this or the previous frame.
    #[inline]
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.dirty == CLEAN
    }

    /// Returns true if the value changed in this or the previous frame.
    #[inline]
    #[must_use]
    pub const fn input_changed(&self) -> bool {
        !self.is_clean()
    }
}

impl<T: Copy + PartialEq + Add<Output = T>> AnimatableProperty<T> {
    /// Adds `delta` to slot `index` for this frame only.
    pub fn set_relative(&mut self, index: BufferIndex, delta: T) {
        let value = self.values[index.slot()] + delta;
        self.set(index, value);
    }

    /// Adds `delta` to slot `index` and makes the result the base value.
    pub fn bake_relative(&mut self, index: BufferIndex, delta: T) {
        let value = self.values[index.slot()] + delta;
        self.values[index.slot()] = value;
        self.base = value;
        self.dirty |= BAKED;
    }
}

impl<T: Copy + PartialEq + Default> Default for AnimatableProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
