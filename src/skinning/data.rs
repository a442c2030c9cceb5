use std::sync::Arc;

use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::animation::pose::{self, Pose, RefPose};
use crate::animation::{Skeleton, SpaceType};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::math::{orthogonal_vectors, Transform};

use super::weights::{self, WeightMatrix};
use super::{cor, stbs, SkinningMethod};

/// Reference mesh as handed over by the asset layer.
/// Tangents and bitangents may be left empty and are completed at bind time.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    #[serde(default)]
    pub tangents: Vec<Vec3>,
    #[serde(default)]
    pub bitangents: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if self.normals.len() != n {
            return Err(EngineError::InvalidMesh(format!(
                "{} normals for {} vertices",
                self.normals.len(),
                n
            )));
        }
        for (name, attr) in [("tangents", &self.tangents), ("bitangents", &self.bitangents)] {
            if !attr.is_empty() && attr.len() != n {
                return Err(EngineError::InvalidMesh(format!("{} {} for {} vertices", attr.len(), name, n)));
            }
        }
        if let Some(face) = self.indices.iter().find(|f| f.iter().any(|&i| i as usize >= n)) {
            return Err(EngineError::InvalidMesh(format!("face {:?} references a missing vertex", face)));
        }
        if self.vertices.iter().chain(&self.normals).any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidMesh("non-finite vertex attribute".to_string()));
        }
        Ok(())
    }

    /// Fills in missing tangents / bitangents from the normals
    pub fn complete_tangent_frame(&mut self) {
        let n = self.vertices.len();
        match (self.tangents.len() == n, self.bitangents.len() == n) {
            (true, true) => {}
            (true, false) => {
                self.bitangents = self.normals.iter().zip(&self.tangents).map(|(n, t)| n.cross(*t)).collect();
            }
            (false, true) => {
                self.tangents = self.bitangents.iter().zip(&self.normals).map(|(b, n)| b.cross(*n)).collect();
            }
            (false, false) => {
                let (tangents, bitangents) = self
                    .normals
                    .iter()
                    .map(|n| orthogonal_vectors(*n).unwrap_or((Vec3::ZERO, Vec3::ZERO)))
                    .unzip();
                self.tangents = tangents;
                self.bitangents = bitangents;
            }
        }
    }
}

/// Area weighted vertex normals of a deformed surface
pub fn compute_vertex_normals(positions: &[Vec3], indices: &[[u32; 3]]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for face in indices {
        let [a, b, c] = face.map(|i| i as usize);
        // cross product length is twice the triangle area
        let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += n;
        normals[b] += n;
        normals[c] += n;
    }
    normals.iter_mut().for_each(|n| *n = n.normalize_or_zero());
    normals
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

/// Skinned attributes, indexed like the reference mesh
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeformedMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
}

impl DeformedMesh {
    pub fn from_reference(mesh: &TriangleMesh) -> Self {
        Self {
            positions: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            tangents: mesh.tangents.clone(),
            bitangents: mesh.bitangents.clone(),
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            positions: Vec::with_capacity(n),
            normals: Vec::with_capacity(n),
            tangents: Vec::with_capacity(n),
            bitangents: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// First vertex carrying a NaN or infinite attribute
    pub fn first_non_finite(&self) -> Option<usize> {
        (0..self.len()).find(|&i| {
            !(self.positions[i].is_finite()
                && self.normals[i].is_finite()
                && self.tangents[i].is_finite()
                && self.bitangents[i].is_finite())
        })
    }

    pub fn to_vertices(&self) -> Vec<SkinnedVertex> {
        (0..self.len())
            .map(|i| SkinnedVertex {
                position: self.positions[i].to_array(),
                normal: self.normals[i].to_array(),
                tangent: self.tangents[i].to_array(),
                bitangent: self.bitangents[i].to_array(),
            })
            .collect()
    }
}

impl FromIterator<(Vec3, Vec3, Vec3, Vec3)> for DeformedMesh {
    fn from_iter<I: IntoIterator<Item = (Vec3, Vec3, Vec3, Vec3)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut mesh = Self::with_capacity(iter.size_hint().0);
        for (p, n, t, b) in iter {
            mesh.positions.push(p);
            mesh.normals.push(n);
            mesh.tangents.push(t);
            mesh.bitangents.push(b);
        }
        mesh
    }
}

/// Bind-time data of a skinned entity. Read-only once the method data is prepared.
#[derive(Clone, Debug)]
pub struct SkinningRefData {
    pub mesh: TriangleMesh,
    pub mesh_transform_inverse: Transform,
    pub bind_matrices: Vec<Transform>,
    pub weights: WeightMatrix,
    /// reference skeleton, its model pose is the ref pose
    pub skeleton: Skeleton,
    pub ref_pose: RefPose,
    pub centers_of_rotation: Option<Vec<Vec3>>,
    pub stbs_weights: Option<WeightMatrix>,
    /// false when the weights failed validation and the entity must not be skinned
    pub weights_valid: bool,
}

impl SkinningRefData {
    /// Binds `mesh` to `skeleton` in its current pose. Bind matrices map mesh space
    /// to bone space; without explicit ones `ref_pose[j]^-1 * mesh_transform` is used.
    pub fn new(
        mut mesh: TriangleMesh,
        skeleton: Skeleton,
        mut weights: WeightMatrix,
        bind_matrices: Option<Vec<Transform>>,
        mesh_transform: Transform,
        config: &EngineConfig,
    ) -> Result<Self> {
        mesh.validate()?;
        if weights.rows() != mesh.vertex_count() || weights.cols() != skeleton.size() {
            return Err(EngineError::WeightShapeMismatch {
                rows: weights.rows(),
                cols: weights.cols(),
                expected_rows: mesh.vertex_count(),
                expected_cols: skeleton.size(),
            });
        }
        mesh.complete_tangent_frame();

        let ref_pose = skeleton.pose(SpaceType::Model).clone();
        let bind_matrices = match bind_matrices {
            Some(bind) => {
                if bind.len() != skeleton.size() {
                    return Err(EngineError::PoseSizeMismatch {
                        expected: skeleton.size(),
                        actual: bind.len(),
                    });
                }
                bind
            }
            None => ref_pose.iter().map(|t| t.inverse() * mesh_transform).collect(),
        };

        let weights_valid = match weights::normalize_weights(&mut weights, config.weight_epsilon, true) {
            Ok(_) => true,
            Err(err) if config.fail_on_invalid_weights => return Err(err),
            Err(err) => {
                warn!("invalid skinning weights, entity will keep its bind pose: {}", err);
                false
            }
        };

        Ok(Self {
            mesh,
            mesh_transform_inverse: mesh_transform.inverse(),
            bind_matrices,
            weights,
            skeleton,
            ref_pose,
            centers_of_rotation: None,
            stbs_weights: None,
            weights_valid,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    /// `mesh_transform^-1 * model[j] * bind[j]` for every bone
    pub fn skinning_transforms(&self, model_pose: &[Transform]) -> Pose {
        model_pose
            .iter()
            .zip(&self.bind_matrices)
            .map(|(m, b)| self.mesh_transform_inverse * *m * *b)
            .collect()
    }

    /// Reference vertices in skeleton model space
    pub fn model_space_vertices(&self) -> Vec<Vec3> {
        let mesh_transform = self.mesh_transform_inverse.inverse();
        self.mesh.vertices.iter().map(|v| mesh_transform.transform_point3(*v)).collect()
    }

    /// Computes the per-method precomputations the first time a method is selected
    pub fn prepare(&mut self, method: SkinningMethod, config: &EngineConfig) {
        match method {
            SkinningMethod::Cor if self.centers_of_rotation.is_none() => {
                info!("precomputing centers of rotation for {} vertices", self.vertex_count());
                self.centers_of_rotation = Some(cor::compute_centers_of_rotation(self, &config.cor));
            }
            SkinningMethod::StbsLbs | SkinningMethod::StbsDqs if self.stbs_weights.is_none() => {
                debug!("computing stretch weights for {} vertices", self.vertex_count());
                let vertices = self.model_space_vertices();
                self.stbs_weights = Some(stbs::compute_stbs_weights(&vertices, &self.skeleton));
            }
            _ => {}
        }
    }
}

/// Per-frame state, exclusively owned by the entity's task
#[derive(Clone, Debug)]
pub struct SkinningFrameData {
    /// animated skeleton
    pub skeleton: Skeleton,
    pub current_pose: Pose,
    pub previous_pose: Pose,
    /// current * previous^-1
    pub relative_pose: Pose,
    pub current: Arc<DeformedMesh>,
    pub previous: Arc<DeformedMesh>,
    pub frame_counter: u64,
    pub do_skinning: bool,
    pub do_reset: bool,
}

impl SkinningFrameData {
    pub fn new(ref_data: &SkinningRefData) -> Self {
        let rest = Arc::new(DeformedMesh::from_reference(&ref_data.mesh));
        Self {
            skeleton: ref_data.skeleton.clone(),
            current_pose: ref_data.ref_pose.clone(),
            previous_pose: ref_data.ref_pose.clone(),
            relative_pose: vec![Transform::IDENTITY; ref_data.ref_pose.len()],
            current: rest.clone(),
            previous: rest,
            frame_counter: 0,
            do_skinning: false,
            do_reset: false,
        }
    }

    /// True if the animated skeleton moved since the last committed frame
    pub fn pose_changed(&self) -> bool {
        !pose::are_equal(self.skeleton.pose(SpaceType::Model), &self.current_pose, 1e-6)
    }

    /// Makes `deformed` the current buffers for the skeleton's current pose
    pub fn commit(&mut self, deformed: DeformedMesh) {
        let pose = self.skeleton.pose(SpaceType::Model).clone();
        self.previous_pose = std::mem::replace(&mut self.current_pose, pose);
        self.relative_pose = pose::relative_pose(&self.current_pose, &self.previous_pose);
        self.previous = std::mem::replace(&mut self.current, Arc::new(deformed));
        self.frame_counter += 1;
        self.do_skinning = false;
    }

    /// Back to the bind pose and the undeformed mesh
    pub fn reset(&mut self, ref_data: &SkinningRefData) {
        self.skeleton.set_pose(ref_data.skeleton.pose(SpaceType::Local), SpaceType::Local);
        let rest = Arc::new(DeformedMesh::from_reference(&ref_data.mesh));
        self.current_pose = ref_data.ref_pose.clone();
        self.previous_pose = ref_data.ref_pose.clone();
        self.relative_pose = vec![Transform::IDENTITY; ref_data.ref_pose.len()];
        self.previous = rest.clone();
        self.current = rest;
        self.frame_counter = 0;
        self.do_reset = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quad() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            normals: vec![Vec3::Z; 4],
            tangents: vec![],
            bitangents: vec![],
            indices: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn tangent_frame_is_completed_from_normals() {
        let mut mesh = quad();
        mesh.complete_tangent_frame();
        assert_eq!(mesh.tangents.len(), 4);
        for i in 0..4 {
            assert!(mesh.tangents[i].dot(mesh.normals[i]).abs() < 1e-6);
            assert!(mesh.bitangents[i].dot(mesh.tangents[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn bitangents_are_derived_from_tangents() {
        let mut mesh = quad();
        mesh.tangents = vec![Vec3::X; 4];
        mesh.complete_tangent_frame();
        assert_eq!(mesh.bitangents, vec![Vec3::Y; 4]);
    }

    #[test]
    fn geometric_normals_of_flat_quad() {
        let mesh = quad();
        assert_eq!(compute_vertex_normals(&mesh.vertices, &mesh.indices), vec![Vec3::Z; 4]);
    }

    #[test]
    fn mesh_validation() {
        let mut mesh = quad();
        assert!(mesh.validate().is_ok());
        mesh.indices.push([0, 1, 9]);
        assert!(matches!(mesh.validate(), Err(EngineError::InvalidMesh(_))));
        let mut mesh = quad();
        mesh.normals.pop();
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn vertices_pack_for_upload() {
        let mut mesh = quad();
        mesh.complete_tangent_frame();
        let vertices = DeformedMesh::from_reference(&mesh).to_vertices();
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[2].position, [1.0, 1.0, 0.0]);
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 4 * 12 * 4);
    }

    #[test]
    fn non_finite_attribute_is_located() {
        let mut mesh = quad();
        mesh.complete_tangent_frame();
        let mut deformed = DeformedMesh::from_reference(&mesh);
        assert_eq!(deformed.first_non_finite(), None);
        deformed.normals[3] = Vec3::NAN;
        assert_eq!(deformed.first_non_finite(), Some(3));
    }
}
