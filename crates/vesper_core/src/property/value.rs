//! # Property Values
//!
//! The minimal value set the pipeline animates: `f32`, `bool`, [`Vec3`] and
//! [`Vec4`]. Vectors are plain old data so render snapshots can be copied
//! byte-for-byte.

use std::ops::{Add, Mul};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A 3-component vector (position, scale).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// All zeros.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// All ones.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise product.
    #[inline]
    #[must_use]
    pub fn mul_elements(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// A 4-component vector (RGBA color).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Vec4 {
    /// X (red) component.
    pub x: f32,
    /// Y (green) component.
    pub y: f32,
    /// Z (blue) component.
    pub z: f32,
    /// W (alpha) component.
    pub w: f32,
}

impl Vec4 {
    /// All zeros.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    /// Opaque white.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Component-wise product.
    #[inline]
    #[must_use]
    pub fn mul_elements(self, other: Self) -> Self {
        Self::new(
            self.x * other.x,
            self.y * other.y,
            self.z * other.z,
            self.w * other.w,
        )
    }
}

impl Add for Vec4 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }
}

impl Mul<f32> for Vec4 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs, self.w * rhs)
    }
}

/// Linear blending between two values.
pub trait Interpolate: Sized {
    /// Returns the value `t` of the way from `self` to `target`.
    ///
    /// `t` is expected in `[0, 1]` but is not clamped.
    #[must_use]
    fn lerp(self, target: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    #[inline]
    fn lerp(self, target: Self, t: f32) -> Self {
        self + (target - self) * t
    }
}

impl Interpolate for bool {
    /// Steps to `target` at the halfway point.
    #[inline]
    fn lerp(self, target: Self, t: f32) -> Self {
        if t < 0.5 {
            self
        } else {
            target
        }
    }
}

impl Interpolate for Vec3 {
    #[inline]
    fn lerp(self, target: Self, t: f32) -> Self {
        Self::new(
            self.x.lerp(target.x, t),
            self.y.lerp(target.y, t),
            self.z.lerp(target.z, t),
        )
    }
}

impl Interpolate for Vec4 {
    #[inline]
    fn lerp(self, target: Self, t: f32) -> Self {
        Self::new(
            self.x.lerp(target.x, t),
            self.y.lerp(target.y, t),
            self.z.lerp(target.z, t),
            self.w.lerp(target.w, t),
        )
    }
}

/// A dynamically typed property value, as carried by commands, constraints
/// and animators.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean (visibility).
    Bool(bool),
    /// Scalar (opacity).
    Float(f32),
    /// Position or scale.
    Vector3(Vec3),
    /// Color.
    Vector4(Vec4),
}

impl PropertyValue {
    /// Returns the variant name, for logging.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Float(_) => "float",
            Self::Vector3(_) => "vector3",
            Self::Vector4(_) => "vector4",
        }
    }

    /// Returns true if both values hold the same variant.
    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Interpolates between two values of the same variant.
    ///
    /// Returns `None` when the variants differ.
    #[must_use]
    pub fn lerp(self, target: Self, t: f32) -> Option<Self> {
        Some(match (self, target) {
            (Self::Bool(a), Self::Bool(b)) => Self::Bool(a.lerp(b, t)),
            (Self::Float(a), Self::Float(b)) => Self::Float(a.lerp(b, t)),
            (Self::Vector3(a), Self::Vector3(b)) => Self::Vector3(a.lerp(b, t)),
            (Self::Vector4(a), Self::Vector4(b)) => Self::Vector4(a.lerp(b, t)),
            _ => return None,
        })
    }

    /// Returns the scalar, if this is one.
    #[must_use]
    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the 3-vector, if this is one.
    #[must_use]
    pub const fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vector3(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the 4-vector, if this is one.
    #[must_use]
    pub const fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Self::Vector4(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec3> for PropertyValue {
    fn from(value: Vec3) -> Self {
        Self::Vector3(value)
    }
}

impl From<Vec4> for PropertyValue {
    fn from(value: Vec4) -> Self {
        Self::Vector4(value)
    }
}
