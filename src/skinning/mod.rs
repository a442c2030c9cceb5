use serde::{Deserialize, Serialize};

use crate::animation::{Skeleton, SpaceType};
use crate::error::{EngineError, Result};
use crate::math::orthogonal_vectors;

pub mod cor;
pub mod data;
pub mod dqs;
pub mod lbs;
pub mod stbs;
pub mod weights;

pub use data::{DeformedMesh, SkinnedVertex, SkinningFrameData, SkinningRefData, TriangleMesh};
pub use weights::WeightMatrix;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkinningMethod {
    #[default]
    Lbs,
    Dqs,
    /// center of rotation
    Cor,
    StbsLbs,
    StbsDqs,
}

/// How the normals of the deformed mesh are obtained
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalSkinning {
    /// skinned like the positions
    #[default]
    Approximate,
    /// recomputed from the deformed triangles
    Geometric,
}

/// Skins the reference mesh to the model pose of `posed`.
/// Method data (centers of rotation, stretch weights) must have been prepared.
pub fn skin(
    method: SkinningMethod,
    normals: NormalSkinning,
    ref_data: &SkinningRefData,
    posed: &Skeleton,
) -> Result<DeformedMesh> {
    let model_pose = posed.pose(SpaceType::Model);
    if model_pose.len() != ref_data.bind_matrices.len() {
        return Err(EngineError::PoseSizeMismatch {
            expected: ref_data.bind_matrices.len(),
            actual: model_pose.len(),
        });
    }

    let mut deformed = match method {
        SkinningMethod::Lbs => lbs::linear_blend_skinning(ref_data, model_pose),
        SkinningMethod::Dqs => dqs::dual_quaternion_skinning(ref_data, model_pose),
        SkinningMethod::Cor => {
            let centers = ref_data
                .centers_of_rotation
                .as_ref()
                .ok_or_else(|| EngineError::InvalidMesh("centers of rotation were not computed".to_string()))?;
            cor::center_of_rotation_skinning(ref_data, centers, model_pose)
        }
        SkinningMethod::StbsLbs | SkinningMethod::StbsDqs => {
            let stbs_weights = ref_data
                .stbs_weights
                .as_ref()
                .ok_or_else(|| EngineError::InvalidMesh("stretch weights were not computed".to_string()))?;
            if method == SkinningMethod::StbsLbs {
                stbs::linear_blend_skinning_stbs(ref_data, stbs_weights, posed)
            } else {
                stbs::dual_quaternion_skinning_stbs(ref_data, stbs_weights, posed)
            }
        }
    };

    if normals == NormalSkinning::Geometric {
        deformed.normals = data::compute_vertex_normals(&deformed.positions, &ref_data.mesh.indices);
        for (i, n) in deformed.normals.iter().enumerate() {
            let (t, b) = orthogonal_vectors(*n).unwrap_or_default();
            deformed.tangents[i] = t;
            deformed.bitangents[i] = b;
        }
    }

    if let Some(vertex) = deformed.first_non_finite() {
        return Err(EngineError::NonFiniteOutput(vertex));
    }
    Ok(deformed)
}
