//! Double-buffered property with a single changed flag.

use crate::sync::BufferIndex;

/// Two value slots addressed by parity, plus a changed flag.
///
/// The update thread writes the slot for the current update index; the
/// other slot holds the value committed by the previous frame. At the start
/// of every frame [`Self::reset_to_base_value`] copies the committed slot
/// into the working one so that a frame with no writes reproduces the
/// previous frame exactly.
///
/// # Example
///
/// ```rust,ignore
/// let mut opacity = DoubleBufferedProperty::new(5.0);
/// opacity.set(BufferIndex::ZERO, 10.0);
/// opacity.reset_to_base_value(BufferIndex::ONE);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DoubleBufferedProperty<T> {
    values: [T; 2],
    changed: bool,
}

impl<T: Copy> DoubleBufferedProperty<T> {
    /// Creates a property with both slots set to `initial`.
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            values: [initial; 2],
            changed: false,
        }
    }

    /// Reads slot `index`. No side effects.
    #[inline]
    #[must_use]
    pub fn get(&self, index: BufferIndex) -> T {
        self.values[index.slot()]
    }

    /// Writes slot `index` and marks the property changed.
    #[inline]
    pub fn set(&mut self, index: BufferIndex, value: T) {
        self.values[index.slot()] = value;
        self.changed = true;
    }

    /// Copies the other slot into slot `index` and clears the changed flag.
    ///
    /// Idempotent: calling it twice with the same index leaves the same
    /// state as calling it once.
    #[inline]
    pub fn reset_to_base_value(&mut self, index: BufferIndex) {
        self.values[index.slot()] = self.values[index.other().slot()];
        self.changed = false;
    }

    /// Returns true if nothing was written since the last reset.
    #[inline]
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !self.changed
    }

    /// Returns true if the value was written since the last reset.
    #[inline]
    #[must_use]
    pub const fn input_changed(&self) -> bool {
        self.changed
    }
}

impl<T: Copy + Default> Default for DoubleBufferedProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_restores_committed_value() {
        let mut property = DoubleBufferedProperty::new(5);

        property.set(BufferIndex::ZERO, 10);
        assert_eq!(property.get(BufferIndex::ZERO), 10);
        assert_eq!(property.get(BufferIndex::ONE), 5);
        assert!(property.input_changed());

        property.reset_to_base_value(BufferIndex::ZERO);
        assert_eq!(property.get(BufferIndex::ZERO), 5);
        assert_eq!(property.get(BufferIndex::ONE), 5);
        assert!(property.is_clean());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut property = DoubleBufferedProperty::new(1.0f32);
        property.set(BufferIndex::ONE, 3.0);

        property.reset_to_base_value(BufferIndex::ZERO);
        let once = property;
        property.reset_to_base_value(BufferIndex::ZERO);
        assert_eq!(property, once);
        assert_eq!(property.get(BufferIndex::ZERO), 3.0);
    }

    #[test]
    fn test_get_has_no_side_effects() {
        let property = DoubleBufferedProperty::new(true);
        let _ = property.get(BufferIndex::ZERO);
        let _ = property.get(BufferIndex::ONE);
        assert!(property.is_clean());
    }
}
