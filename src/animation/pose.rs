use crate::math::Transform;

/// Per-bone transforms, index-aligned with the skeleton's bones
pub type Pose = Vec<Transform>;

/// Pose captured at bind time
pub type RefPose = Pose;

pub fn compatible(a: &[Transform], b: &[Transform]) -> bool {
    a.len() == b.len()
}

/// Blends scale and translation linearly and rotation with slerp.
/// `t` is not clamped.
pub fn interpolate(t0: &Transform, t1: &Transform, t: f32) -> Transform {
    let (s0, r0, p0) = t0.to_scale_rotation_translation();
    let (s1, r1, p1) = t1.to_scale_rotation_translation();
    Transform::from_scale_rotation_translation(s0.lerp(s1, t), r0.slerp(r1, t), p0.lerp(p1, t))
}

/// Panics if the poses have different sizes
pub fn interpolate_poses(a: &[Transform], b: &[Transform], t: f32) -> Pose {
    assert!(
        compatible(a, b),
        "interpolating incompatible poses ({} vs {} bones)",
        a.len(),
        b.len()
    );
    a.iter().zip(b).map(|(t0, t1)| interpolate(t0, t1, t)).collect()
}

/// `current[i] * previous[i]^-1` for every bone
pub fn relative_pose(current: &[Transform], previous: &[Transform]) -> Pose {
    assert!(
        compatible(current, previous),
        "relative pose of incompatible poses ({} vs {} bones)",
        current.len(),
        previous.len()
    );
    current.iter().zip(previous).map(|(c, p)| *c * p.inverse()).collect()
}

pub fn are_equal(a: &[Transform], b: &[Transform], eps: f32) -> bool {
    compatible(a, b) && a.iter().zip(b).all(|(x, y)| x.abs_diff_eq(*y, eps))
}

/// Composes a local pose into model space. `order` must list parents before their children.
pub fn to_model_space(local: &[Transform], parents: &[Option<usize>], order: &[usize]) -> Pose {
    let mut model = local.to_vec();
    for &idx in order {
        if let Some(parent) = parents[idx] {
            model[idx] = model[parent] * local[idx];
        }
    }
    model
}
