//! # Animations
//!
//! An animation drives one or more node properties from a start value to a
//! target value over a fixed duration. It advances on the update thread,
//! before constraints, and writes with frame-only `set` semantics until it
//! finishes, when its [`EndAction`] decides whether the final value is baked.

use std::fmt;

use vesper_core::{Handle, PropertyValue};

use crate::ids::{AnimationId, NodeId};
use crate::node::{Node, NodeProperty};
use crate::observer::Subscription;

/// What happens to animated values when the animation finishes or stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndAction {
    /// Keep the final value as the new base value.
    #[default]
    Bake,
    /// Let the properties return to their base values.
    Discard,
}

/// Playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnimationState {
    /// Not applied.
    #[default]
    Stopped,
    /// Advancing every frame.
    Playing,
    /// Applied at its current progress but not advancing.
    Paused,
}

/// Maps linear progress to animation progress.
#[derive(Clone, Copy, Default)]
pub enum AlphaFunction {
    /// Identity.
    #[default]
    Linear,
    /// A caller-supplied easing curve.
    Custom(fn(f32) -> f32),
}

impl AlphaFunction {
    /// Applies the curve to `progress` in `[0, 1]`.
    #[must_use]
    pub fn apply(self, progress: f32) -> f32 {
        match self {
            Self::Linear => progress,
            Self::Custom(curve) => curve(progress),
        }
    }
}

impl fmt::Debug for AlphaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("Linear"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Settings for a new animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationDesc {
    /// Length of one pass, in seconds.
    pub duration: f32,
    /// Restart from the beginning instead of finishing.
    pub looping: bool,
    /// Bake or discard at the end.
    pub end_action: EndAction,
}

impl AnimationDesc {
    /// A one-shot animation that bakes its result.
    #[must_use]
    pub const fn new(duration: f32) -> Self {
        Self {
            duration,
            looping: false,
            end_action: EndAction::Bake,
        }
    }
}

/// One animated property, as described on the event thread.
#[derive(Clone, Copy, Debug)]
pub struct AnimatorDesc {
    /// The node.
    pub node: NodeId,
    /// The property.
    pub property: NodeProperty,
    /// Start value; `None` starts from the property's base value at play time.
    pub from: Option<PropertyValue>,
    /// End value.
    pub to: PropertyValue,
    /// Easing.
    pub alpha: AlphaFunction,
}

/// An animator resolved against the scene graph.
#[derive(Debug)]
pub(crate) struct Animator {
    pub(crate) node: NodeId,
    pub(crate) handle: Handle<Node>,
    pub(crate) property: NodeProperty,
    pub(crate) from: Option<PropertyValue>,
    pub(crate) to: PropertyValue,
    pub(crate) alpha: AlphaFunction,
    /// Start value captured when playback began, for animators without `from`.
    pub(crate) start: Option<PropertyValue>,
    pub(crate) _subscription: Subscription,
}

impl Animator {
    /// The value at `progress`, or `None` if the endpoints do not match.
    pub(crate) fn value_at(&self, progress: f32) -> Option<PropertyValue> {
        let from = self.from.or(self.start)?;
        from.lerp(self.to, self.alpha.apply(progress))
    }
}

/// Result of advancing an animation by one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct AnimationStep {
    /// Progress in `[0, 1]` to apply.
    pub(crate) progress: f32,
    /// The animation reached its end this frame.
    pub(crate) finished: bool,
    /// Apply with bake semantics.
    pub(crate) bake: bool,
    /// Write the animated values at all. False for a discarded stop, which
    /// leaves the properties at their base values.
    pub(crate) write: bool,
}

/// A registered animation, owned by the scene graph.
#[derive(Debug)]
pub struct Animation {
    id: AnimationId,
    desc: AnimationDesc,
    state: AnimationState,
    elapsed: f32,
    loops_completed: u32,
    /// Stop was requested; apply the end action on the next update.
    stopping: bool,
    pub(crate) animators: Vec<Animator>,
}

impl Animation {
    pub(crate) fn new(id: AnimationId, desc: AnimationDesc) -> Self {
        Self {
            id,
            desc,
            state: AnimationState::Stopped,
            elapsed: 0.0,
            loops_completed: 0,
            stopping: false,
            animators: Vec::new(),
        }
    }

    /// The animation's id.
    #[must_use]
    pub const fn id(&self) -> AnimationId {
        self.id
    }

    /// Current playback state.
    #[must_use]
    pub const fn state(&self) -> AnimationState {
        self.state
    }

    /// Seconds into the current pass.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Completed passes of a looping animation.
    #[must_use]
    pub const fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    /// Number of connected animators.
    #[must_use]
    pub fn animator_count(&self) -> usize {
        self.animators.len()
    }

    /// Returns true while the animation must be applied every frame.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state != AnimationState::Stopped || self.stopping
    }

    pub(crate) fn play(&mut self) {
        if self.state == AnimationState::Stopped {
            self.elapsed = 0.0;
            for animator in &mut self.animators {
                animator.start = None;
            }
        }
        self.state = AnimationState::Playing;
        self.stopping = false;
    }

    pub(crate) fn pause(&mut self) {
        if self.state == AnimationState::Playing {
            self.state = AnimationState::Paused;
        }
    }

    pub(crate) fn stop(&mut self) {
        if self.state != AnimationState::Stopped {
            self.stopping = true;
        }
    }

    /// Removes every animator targeting `node`.
    pub(crate) fn disconnect_node(&mut self, node: NodeId) -> usize {
        let before = self.animators.len();
        self.animators.retain(|animator| animator.node != node);
        before - self.animators.len()
    }

    /// Advances the clock by `delta` seconds and reports what to apply.
    ///
    /// Returns `None` when the animation is not applied this frame.
    pub(crate) fn advance(&mut self, delta: f32) -> Option<AnimationStep> {
        if self.stopping {
            self.stopping = false;
            self.state = AnimationState::Stopped;
            let progress = self.progress();
            self.elapsed = 0.0;
            let bake = self.desc.end_action == EndAction::Bake;
            return Some(AnimationStep {
                progress,
                finished: true,
                bake,
                write: bake,
            });
        }

        match self.state {
            AnimationState::Stopped => return None,
            AnimationState::Paused => {
                return Some(AnimationStep {
                    progress: self.progress(),
                    finished: false,
                    bake: false,
                    write: true,
                })
            }
            AnimationState::Playing => self.elapsed += delta,
        }

        let duration = self.desc.duration;
        if duration <= 0.0 {
            return Some(self.finish(1.0));
        }

        if self.elapsed >= duration {
            if self.desc.looping {
                self.loops_completed += (self.elapsed / duration) as u32;
                self.elapsed %= duration;
            } else {
                return Some(self.finish(1.0));
            }
        }

        Some(AnimationStep {
            progress: self.progress(),
            finished: false,
            bake: false,
            write: true,
        })
    }

    fn progress(&self) -> f32 {
        if self.desc.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.desc.duration).clamp(0.0, 1.0)
        }
    }

    fn finish(&mut self, progress: f32) -> AnimationStep {
        self.state = AnimationState::Stopped;
        self.elapsed = 0.0;
        AnimationStep {
            progress,
            finished: true,
            bake: self.desc.end_action == EndAction::Bake,
            write: true,
        }
    }
}
