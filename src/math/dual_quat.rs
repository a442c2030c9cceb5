use std::ops::{Add, AddAssign, Mul};

use glam::{Quat, Vec3};

use super::Transform;

/// Unit dual quaternion `real + ε dual` encoding a rigid motion.
/// Weighted sums of dual quaternions are not unit, call `normalized` before applying one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    pub const ZERO: Self = Self {
        real: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        let t = Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
        Self {
            real: rotation,
            dual: (t * rotation) * 0.5,
        }
    }

    /// Scale and shear of `t` are dropped
    pub fn from_transform(t: &Transform) -> Self {
        let (_, rotation, translation) = t.to_scale_rotation_translation();
        Self::from_rotation_translation(rotation.normalize(), translation)
    }

    pub fn norm(&self) -> f32 {
        self.real.length()
    }

    /// Divides both parts by the norm of the real part.
    /// A zero real part has no meaningful direction and yields the identity.
    pub fn normalized(&self) -> Self {
        let norm = self.norm();
        if !norm.is_finite() || norm <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let inv = 1.0 / norm;
        Self {
            real: self.real * inv,
            dual: self.dual * inv,
        }
    }

    pub fn rotation(&self) -> Quat {
        self.real
    }

    pub fn translation(&self) -> Vec3 {
        let t = (self.dual * self.real.conjugate()) * 2.0;
        Vec3::new(t.x, t.y, t.z)
    }

    /// Expects a normalized dual quaternion
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.real * p + self.translation()
    }

    /// Expects a normalized dual quaternion
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        self.real * v
    }

    pub fn to_transform(&self) -> Transform {
        Transform::from_rotation_translation(self.real, self.translation())
    }
}

impl Default for DualQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Add for DualQuat {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            real: self.real + rhs.real,
            dual: self.dual + rhs.dual,
        }
    }
}

impl AddAssign for DualQuat {
    fn add_assign(&mut self, rhs: Self) {
        self.real = self.real + rhs.real;
        self.dual = self.dual + rhs.dual;
    }
}

impl Mul<f32> for DualQuat {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self {
            real: self.real * s,
            dual: self.dual * s,
        }
    }
}
