use std::path::Path;

use glam::{Mat4, Vec3};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::animation::{Animation, Pose, Skeleton};
use crate::config::EngineConfig;
use crate::entity::SkinnedEntity;
use crate::error::{EngineError, Result};
use crate::math::Transform;
use crate::skinning::{SkinningRefData, TriangleMesh, WeightMatrix};

/// column-major
pub type Matrix = [[f32; 4]; 4];

fn to_transform(m: &Matrix) -> Transform {
    Transform::from_mat4(Mat4::from_cols_array_2d(m))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Joint {
    pub name: Option<String>,
    pub children: Vec<usize>,
    /// local transform in the bind pose
    pub transform: Matrix,
    #[serde(default)]
    pub inverse_bind_matrix: Option<Matrix>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Influence {
    pub vertex: usize,
    pub bone: usize,
    pub weight: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    #[serde(default)]
    pub tangents: Vec<[f32; 3]>,
    #[serde(default)]
    pub bitangents: Vec<[f32; 3]>,
    pub indices: Vec<[u32; 3]>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Key {
    pub time: f32,
    pub pose: Vec<Matrix>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Clip {
    pub name: String,
    pub keys: Vec<Key>,
}

/// Skinned rig as exported by the asset pipeline
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RigFile {
    pub joints: Vec<Joint>,
    pub mesh: MeshData,
    pub weights: Vec<Influence>,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub mesh_transform: Option<Matrix>,
}

impl RigFile {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading rig {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn build_skeleton(&self) -> Result<Skeleton> {
        let labels = self
            .joints
            .iter()
            .enumerate()
            .map(|(i, j)| j.name.clone().unwrap_or_else(|| format!("joint_{}", i)))
            .collect();
        let children = self.joints.iter().map(|j| j.children.clone()).collect();
        let local = self.joints.iter().map(|j| to_transform(&j.transform)).collect();
        Skeleton::from_hierarchy(labels, children, local)
    }

    /// None unless every joint carries an inverse bind matrix
    pub fn bind_matrices(&self) -> Option<Vec<Transform>> {
        let bind: Option<Vec<Transform>> = self
            .joints
            .iter()
            .map(|j| j.inverse_bind_matrix.as_ref().map(to_transform))
            .collect();
        if bind.is_none() && self.joints.iter().any(|j| j.inverse_bind_matrix.is_some()) {
            warn!("some joints lack an inverse bind matrix, using the inverse bind pose");
        }
        bind
    }

    pub fn build_mesh(&self) -> TriangleMesh {
        let vec3s = |v: &[[f32; 3]]| v.iter().map(|p| Vec3::from_array(*p)).collect();
        TriangleMesh {
            vertices: vec3s(&self.mesh.positions),
            normals: vec3s(&self.mesh.normals),
            tangents: vec3s(&self.mesh.tangents),
            bitangents: vec3s(&self.mesh.bitangents),
            indices: self.mesh.indices.clone(),
        }
    }

    pub fn build_weights(&self) -> Result<WeightMatrix> {
        WeightMatrix::from_triplets(
            self.mesh.positions.len(),
            self.joints.len(),
            self.weights.iter().map(|w| (w.vertex, w.bone, w.weight)),
        )
    }

    pub fn build_clips(&self) -> Result<Vec<Animation>> {
        self.clips
            .iter()
            .map(|clip| {
                let mut animation = Animation::new(clip.name.clone());
                for key in &clip.keys {
                    if key.pose.len() != self.joints.len() {
                        return Err(EngineError::InvalidRig(format!(
                            "clip '{}' key at {} has {} transforms for {} joints",
                            clip.name,
                            key.time,
                            key.pose.len(),
                            self.joints.len()
                        )));
                    }
                    let pose: Pose = key.pose.iter().map(to_transform).collect();
                    animation.add_key_pose(pose, key.time);
                }
                Ok(animation)
            })
            .collect()
    }

    pub fn into_entity(self, name: impl Into<String>, config: &EngineConfig) -> Result<SkinnedEntity> {
        let skeleton = self.build_skeleton()?;
        let weights = self.build_weights()?;
        let clips = self.build_clips()?;
        let mesh_transform = self.mesh_transform.as_ref().map(to_transform).unwrap_or(Transform::IDENTITY);
        let ref_data = SkinningRefData::new(
            self.build_mesh(),
            skeleton,
            weights,
            self.bind_matrices(),
            mesh_transform,
            config,
        )?;
        SkinnedEntity::new(name, ref_data, clips, config)
    }
}
