use glam::{Mat3A, Vec3};
use rayon::prelude::*;

use crate::animation::pose::relative_pose;
use crate::animation::skeleton::project_on_segment;
use crate::animation::{Skeleton, SpaceType};
use crate::math::{sign_nz, DualQuat, Transform};

use super::data::{DeformedMesh, SkinningRefData};
use super::weights::WeightMatrix;

/// Stretch weights: position of each vertex along each bone, in (0, 1]
pub fn compute_stbs_weights(vertices: &[Vec3], skeleton: &Skeleton) -> WeightMatrix {
    let segments: Vec<(Vec3, Vec3)> = (0..skeleton.size())
        .filter_map(|j| skeleton.bone_points(j).ok())
        .map(|(a, b)| (a, b - a))
        .collect();
    let triplets = vertices.iter().enumerate().flat_map(|(i, p)| {
        segments.iter().enumerate().filter_map(move |(j, (a, ab))| {
            let t = project_on_segment(*p, *a, *ab);
            (t > 0.0).then_some((i, j, t))
        })
    });
    // indices come from the inputs' own ranges
    WeightMatrix::from_triplets(vertices.len(), skeleton.size(), triplets).unwrap_or_default()
}

struct BoneStretch {
    /// rest bone start
    a: Vec3,
    /// posed bone start
    a_posed: Vec3,
    /// elongation of the bone, zero for leaves
    stretch: Vec3,
}

fn bone_stretches(rest: &Skeleton, posed: &Skeleton) -> Vec<BoneStretch> {
    (0..rest.size())
        .map(|j| {
            let (a, b) = rest.bone_points(j).unwrap_or_default();
            let (a_posed, b_posed) = posed.bone_points(j).unwrap_or_default();
            let rest_len_sq = (b - a).length_squared();
            let stretch = if rest_len_sq <= f32::EPSILON {
                Vec3::ZERO
            } else {
                (((b_posed - a_posed).length_squared() / rest_len_sq).sqrt() - 1.0) * (b - a)
            };
            BoneStretch { a, a_posed, stretch }
        })
        .collect()
}

/// Linear blend skinning with bones that stretch along their axis
pub fn linear_blend_skinning_stbs(
    ref_data: &SkinningRefData,
    stbs_weights: &WeightMatrix,
    posed: &Skeleton,
) -> DeformedMesh {
    let ref_pose = &ref_data.ref_pose;
    let cur_pose = posed.pose(SpaceType::Model);
    let rel = relative_pose(cur_pose, ref_pose);
    let bones = bone_stretches(&ref_data.skeleton, posed);
    let jacobians = ref_data.skinning_transforms(cur_pose);
    let rest_points: Vec<Transform> = ref_pose.iter().zip(&ref_data.bind_matrices).map(|(r, b)| *r * *b).collect();
    let mesh = &ref_data.mesh;
    let weights = &ref_data.weights;
    let mesh_inv = ref_data.mesh_transform_inverse;

    let skinned: Vec<_> = (0..mesh.vertex_count())
        .into_par_iter()
        .map(|i| {
            let mut position = Vec3::ZERO;
            let mut normal = Vec3::ZERO;
            let mut tangent = Vec3::ZERO;
            let mut bitangent = Vec3::ZERO;
            for (j, w) in weights.row_iter(i) {
                let bone = &bones[j];
                let eis = stbs_weights.get(i, j);
                let rest = rest_points[j].transform_point3(mesh.vertices[i]);
                let local = eis * bone.stretch - bone.a + rest;
                position += w * mesh_inv.transform_point3(bone.a_posed + rel[j].transform_vector3(local));
                let jac = &jacobians[j];
                normal += w * jac.transform_vector3(mesh.normals[i]);
                tangent += w * jac.transform_vector3(mesh.tangents[i]);
                bitangent += w * jac.transform_vector3(mesh.bitangents[i]);
            }
            (
                position,
                normal.normalize_or_zero(),
                tangent.normalize_or_zero(),
                bitangent.normalize_or_zero(),
            )
        })
        .collect();
    skinned.into_iter().collect()
}

/// Dual quaternion skinning with bones that stretch along their axis
pub fn dual_quaternion_skinning_stbs(
    ref_data: &SkinningRefData,
    stbs_weights: &WeightMatrix,
    posed: &Skeleton,
) -> DeformedMesh {
    let rel = relative_pose(posed.pose(SpaceType::Model), &ref_data.ref_pose);
    let bones = bone_stretches(&ref_data.skeleton, posed);
    let rotations: Vec<Mat3A> = rel
        .iter()
        .map(|t| {
            let (_, r, _) = t.to_scale_rotation_translation();
            Mat3A::from_quat(r.normalize())
        })
        .collect();
    let pose_dqs: Vec<DualQuat> = rel.iter().map(DualQuat::from_transform).collect();
    let weights = &ref_data.weights;
    let mesh = &ref_data.mesh;
    let mesh_inv = ref_data.mesh_transform_inverse;
    let mesh_transform = mesh_inv.inverse();

    let skinned: Vec<_> = (0..mesh.vertex_count())
        .into_par_iter()
        .map(|i| {
            let mut acc = DualQuat::ZERO;
            let mut pivot = None;
            for (j, w) in weights.row_iter(i) {
                if w == 0.0 {
                    continue;
                }
                let bone = &bones[j];
                let r = rotations[j];
                let translation = bone.a_posed + r * (stbs_weights.get(i, j) * bone.stretch - bone.a);
                let d = DualQuat::from_transform(&Transform {
                    matrix3: r,
                    translation: translation.into(),
                })
                .normalized();
                let first = *pivot.get_or_insert(pose_dqs[j].real);
                acc += d * (w * sign_nz(pose_dqs[j].real.dot(first)));
            }
            let dq = acc.normalized();
            let dir = |v: Vec3| mesh_inv.transform_vector3(dq.rotate(mesh_transform.transform_vector3(v)));
            (
                mesh_inv.transform_point3(dq.transform_point(mesh_transform.transform_point3(mesh.vertices[i]))),
                dir(mesh.normals[i]),
                dir(mesh.tangents[i]),
                dir(mesh.bitangents[i]),
            )
        })
        .collect();
    skinned.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::math::approx_eq_vec3;
    use crate::skinning::data::TriangleMesh;

    fn two_bone_rig() -> (Skeleton, SkinningRefData) {
        let mut skel = Skeleton::new();
        let root = skel.add_bone(None, Transform::IDENTITY, SpaceType::Local, "upper").unwrap();
        skel.add_bone(Some(root), Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)), SpaceType::Local, "lower")
            .unwrap();
        let mesh = TriangleMesh {
            vertices: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)],
            normals: vec![Vec3::Y; 2],
            ..Default::default()
        };
        let weights = WeightMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0)]).unwrap();
        let ref_data =
            SkinningRefData::new(mesh, skel.clone(), weights, None, Transform::IDENTITY, &EngineConfig::default())
                .unwrap();
        (skel, ref_data)
    }

    #[test]
    fn stretch_weights_follow_projection() {
        let (skel, ref_data) = two_bone_rig();
        let w = compute_stbs_weights(&ref_data.mesh.vertices, &skel);
        assert_eq!(w.get(0, 0), 0.5);
        assert_eq!(w.get(1, 0), 1.0);
        // the leaf bone has no length
        assert_eq!(w.get(1, 1), 0.0);
    }

    #[test]
    fn stretched_bone_moves_midpoint_vertex() {
        let (mut skel, ref_data) = two_bone_rig();
        let w = compute_stbs_weights(&ref_data.mesh.vertices, &skel);
        skel.set_transform(1, Transform::from_translation(Vec3::new(4.0, 0.0, 0.0)), SpaceType::Local)
            .unwrap();

        let lbs = linear_blend_skinning_stbs(&ref_data, &w, &skel);
        assert!(approx_eq_vec3(lbs.positions[0], Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert!(approx_eq_vec3(lbs.positions[1], Vec3::new(5.0, 0.0, 0.0), 1e-5));

        let dqs = dual_quaternion_skinning_stbs(&ref_data, &w, &skel);
        assert!(approx_eq_vec3(dqs.positions[0], Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert!(approx_eq_vec3(dqs.positions[1], Vec3::new(5.0, 0.0, 0.0), 1e-5));
    }
}
