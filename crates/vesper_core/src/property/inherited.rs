//! Inherited (world-space) property.

use crate::sync::BufferIndex;

/// A double-buffered value computed from a parent rather than set directly.
///
/// The update thread either recomputes it ([`Self::set`]) or, when neither
/// the owner nor its parent changed, carries the previous frame's value over
/// ([`Self::copy_previous`]).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InheritedProperty<T> {
    values: [T; 2],
    /// Set once the value has been computed at least once.
    inherited: bool,
    /// Set when the two slots may differ.
    reinherited: bool,
}

impl<T: Copy + PartialEq> InheritedProperty<T> {
    /// Creates a property holding `initial` in both slots.
    ///
    /// It starts dirty so the first frame always computes it.
    #[must_use]
    pub const fn new(initial: T) -> Self {
        Self {
            values: [initial; 2],
            inherited: false,
            reinherited: true,
        }
    }

    /// Reads slot `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: BufferIndex) -> T {
        self.values[index.slot()]
    }

    /// The value a constraint sees while `index` is being updated: the
    /// previous frame's, since world values are derived after constraints.
    #[inline]
    #[must_use]
    pub fn constraint_input(&self, index: BufferIndex) -> T {
        self.values[index.other().slot()]
    }

    /// Stores a freshly computed value in slot `index`.
    ///
    /// Returns true if it differs from the previous frame's value.
    pub fn set(&mut self, index: BufferIndex, value: T) -> bool {
        self.values[index.slot()] = value;
        self.inherited = true;
        self.reinherited = self.values[index.other().slot()] != value;
        self.reinherited
    }

    /// Carries the previous frame's value into slot `index`, once.
    pub fn copy_previous(&mut self, index: BufferIndex) {
        if self.reinherited {
            self.values[index.slot()] = self.values[index.other().slot()];
            self.reinherited = false;
        }
    }

    /// Returns true if both slots hold the same value.
    #[inline]
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !self.reinherited
    }

    /// Returns true once the value has been computed at least once.
    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.inherited
    }
}

impl<T: Copy + PartialEq + Default> Default for InheritedProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
