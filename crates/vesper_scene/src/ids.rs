//! Stable object ids.
//!
//! Ids are minted on the event thread and carried inside commands. The update
//! thread maps them to generation-checked pool handles, so a command naming
//! a destroyed object resolves to nothing instead of to a reused slot.

use std::fmt;

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw id.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

object_id!(
    /// Identifies a node.
    NodeId,
    "node"
);
object_id!(
    /// Identifies a renderer.
    RendererId,
    "renderer"
);
object_id!(
    /// Identifies a constraint.
    ConstraintId,
    "constraint"
);
object_id!(
    /// Identifies an animation.
    AnimationId,
    "animation"
);

impl NodeId {
    /// The root node, present from construction and never destroyed.
    pub const ROOT: Self = Self(0);
}

/// Mints sequential ids on the event thread.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub(crate) const fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    pub(crate) fn next(&mut self) -> u32 {
        assert!(self.next < u32::MAX, "Object id space exhausted");
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(NodeId(3).to_string(), "node#3");
        assert_eq!(RendererId(9).to_string(), "renderer#9");
    }

    #[test]
    fn test_allocator_is_sequential() {
        let mut ids = IdAllocator::starting_at(1);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }
}
