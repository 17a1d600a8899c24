//! # Constraints
//!
//! A constraint computes one local property of a target node from local
//! properties of input nodes, every frame, after animations have run.
//!
//! The result is written with frame-only `set` semantics, so removing the
//! constraint lets the property decay back to its base value.

use std::fmt;

use vesper_core::{Handle, PropertyValue};

use crate::ids::{ConstraintId, NodeId};
use crate::node::{Node, NodeProperty};
use crate::observer::Subscription;

/// The constraint function: `(current target value, input values) -> new value`.
pub type ConstraintFn = Box<dyn FnMut(&PropertyValue, &[PropertyValue]) -> PropertyValue + Send>;

/// A node property a constraint reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyTarget {
    /// The node.
    pub node: NodeId,
    /// Which of its properties.
    pub property: NodeProperty,
}

impl PropertyTarget {
    /// Creates a target.
    #[must_use]
    pub const fn new(node: NodeId, property: NodeProperty) -> Self {
        Self { node, property }
    }
}

/// Everything needed to register a constraint, built on the event thread.
pub struct ConstraintDesc {
    /// The property written.
    pub target: PropertyTarget,
    /// The properties read, in the order the function receives them.
    pub inputs: Vec<PropertyTarget>,
    /// The function.
    pub function: ConstraintFn,
}

impl ConstraintDesc {
    /// Creates a description.
    pub fn new<F>(target: PropertyTarget, inputs: Vec<PropertyTarget>, function: F) -> Self
    where
        F: FnMut(&PropertyValue, &[PropertyValue]) -> PropertyValue + Send + 'static,
    {
        Self {
            target,
            inputs,
            function: Box::new(function),
        }
    }
}

impl fmt::Debug for ConstraintDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintDesc")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// An input resolved to a pool handle.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResolvedInput {
    pub(crate) handle: Handle<Node>,
    pub(crate) property: NodeProperty,
}

/// What the function saw and produced the last time it ran.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CachedOutput {
    /// Target base value at the time.
    base: PropertyValue,
    /// Target value passed to the function.
    current: PropertyValue,
    output: PropertyValue,
}

impl CachedOutput {
    /// The output still holds if the target's base value is unchanged and
    /// the target currently holds either the value the function saw or its
    /// own last output (a frame that ran without a reset).
    fn matches(&self, base: &PropertyValue, current: &PropertyValue) -> bool {
        self.base == *base && (self.current == *current || self.output == *current)
    }
}

/// A registered constraint, owned by the scene graph.
pub struct Constraint {
    id: ConstraintId,
    target: PropertyTarget,
    pub(crate) target_handle: Handle<Node>,
    pub(crate) inputs: Vec<ResolvedInput>,
    function: ConstraintFn,
    /// Last evaluation, re-applied while it still describes the frame.
    cached: Option<CachedOutput>,
    /// Times the function actually ran.
    evaluations: u64,
    pub(crate) _subscriptions: Vec<Subscription>,
}

impl Constraint {
    pub(crate) fn new(
        id: ConstraintId,
        target: PropertyTarget,
        target_handle: Handle<Node>,
        inputs: Vec<ResolvedInput>,
        function: ConstraintFn,
        subscriptions: Vec<Subscription>,
    ) -> Self {
        Self {
            id,
            target,
            target_handle,
            inputs,
            function,
            cached: None,
            evaluations: 0,
            _subscriptions: subscriptions,
        }
    }

    /// The constraint's id.
    #[must_use]
    pub const fn id(&self) -> ConstraintId {
        self.id
    }

    /// The property it writes.
    #[must_use]
    pub const fn target(&self) -> PropertyTarget {
        self.target
    }

    /// How many times the function has run.
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Produces this frame's output.
    ///
    /// `inputs_clean` says whether every input is unchanged since last frame.
    /// In that case, and while the target's `base` value and `current` value
    /// match the last evaluation, the cached output is reused without calling
    /// the function.
    pub(crate) fn evaluate(
        &mut self,
        base: &PropertyValue,
        current: &PropertyValue,
        inputs: &[PropertyValue],
        inputs_clean: bool,
    ) -> PropertyValue {
        if inputs_clean {
            if let Some(cached) = self.cached.filter(|cached| cached.matches(base, current)) {
                return cached.output;
            }
        }
        let output = (self.function)(current, inputs);
        self.evaluations += 1;
        self.cached = Some(CachedOutput {
            base: *base,
            current: *current,
            output,
        });
        output
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("inputs", &self.inputs.len())
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}
