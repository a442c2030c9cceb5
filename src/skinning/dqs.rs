use rayon::prelude::*;

use crate::math::{sign_nz, DualQuat, Transform};

use super::data::{DeformedMesh, SkinningRefData};
use super::weights::WeightMatrix;

/// Per-vertex blend of the bone dual quaternions, normalized.
/// Each contribution is sign-aligned with the vertex's first influencing bone so
/// antipodal quaternions do not cancel. Vertices without influence get the identity.
pub fn compute_dq(bone_dqs: &[DualQuat], weights: &WeightMatrix) -> Vec<DualQuat> {
    (0..weights.rows())
        .into_par_iter()
        .map(|i| {
            let mut acc = DualQuat::ZERO;
            let mut pivot = None;
            for (j, w) in weights.row_iter(i) {
                if w == 0.0 {
                    continue;
                }
                let dq = bone_dqs[j];
                let first = *pivot.get_or_insert(dq.real);
                acc += dq * (w * sign_nz(dq.real.dot(first)));
            }
            acc.normalized()
        })
        .collect()
}

pub fn dual_quaternion_skinning(ref_data: &SkinningRefData, model_pose: &[Transform]) -> DeformedMesh {
    let bone_dqs: Vec<DualQuat> = ref_data
        .skinning_transforms(model_pose)
        .iter()
        .map(DualQuat::from_transform)
        .collect();
    let dqs = compute_dq(&bone_dqs, &ref_data.weights);
    let mesh = &ref_data.mesh;

    let skinned: Vec<_> = dqs
        .par_iter()
        .enumerate()
        .map(|(i, dq)| {
            (
                dq.transform_point(mesh.vertices[i]),
                dq.rotate(mesh.normals[i]),
                dq.rotate(mesh.tangents[i]),
                dq.rotate(mesh.bitangents[i]),
            )
        })
        .collect();
    skinned.into_iter().collect()
}
