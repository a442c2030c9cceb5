use glam::Vec3;
use rayon::prelude::*;

use crate::math::Transform;

use super::data::{DeformedMesh, SkinningRefData};

/// Linear blend skinning.
/// Each vertex gathers its own influences, so vertices are skinned independently.
pub fn linear_blend_skinning(ref_data: &SkinningRefData, model_pose: &[Transform]) -> DeformedMesh {
    let transforms = ref_data.skinning_transforms(model_pose);
    let mesh = &ref_data.mesh;
    let weights = &ref_data.weights;

    let skinned: Vec<_> = (0..mesh.vertex_count())
        .into_par_iter()
        .map(|i| {
            let mut position = Vec3::ZERO;
            let mut normal = Vec3::ZERO;
            let mut tangent = Vec3::ZERO;
            let mut bitangent = Vec3::ZERO;
            for (j, w) in weights.row_iter(i) {
                let t = &transforms[j];
                position += w * t.transform_point3(mesh.vertices[i]);
                normal += w * t.transform_vector3(mesh.normals[i]);
                tangent += w * t.transform_vector3(mesh.tangents[i]);
                bitangent += w * t.transform_vector3(mesh.bitangents[i]);
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
