use glam::{Affine3A, Vec3};

pub mod dual_quat;

pub use dual_quat::DualQuat;

/// Affine bone transform (rotation, scale, translation; shear is never produced by the rig)
pub type Transform = Affine3A;

pub const EPSILON: f32 = 1e-5;

/// Sign of `x`, with 0 counted as positive
pub fn sign_nz(x: f32) -> f32 {
    if x < 0.0 { -1.0 } else { 1.0 }
}

/// Two unit vectors completing `n` to an orthonormal frame.
/// Returns None if `n` is (close to) zero.
pub fn orthogonal_vectors(n: Vec3) -> Option<(Vec3, Vec3)> {
    let n = n.try_normalize()?;
    Some(n.any_orthonormal_pair())
}

pub fn approx_eq_vec3(a: Vec3, b: Vec3, eps: f32) -> bool {
    (a - b).abs().max_element() <= eps
}
