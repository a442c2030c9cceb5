#![allow(dead_code)]

use glam::Vec3;

use skinning_engine::animation::{Animation, Skeleton, SpaceType};
use skinning_engine::math::Transform;
use skinning_engine::skinning::{SkinningRefData, TriangleMesh, WeightMatrix};
use skinning_engine::{EngineConfig, SkinnedEntity};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// root at the origin, child one unit along +X
pub fn chain_skeleton() -> Skeleton {
    let mut skeleton = Skeleton::new();
    let root = skeleton.add_bone(None, Transform::IDENTITY, SpaceType::Local, "root").unwrap();
    skeleton
        .add_bone(Some(root), Transform::from_translation(Vec3::X), SpaceType::Local, "child")
        .unwrap();
    skeleton
}

/// Strip of quads along the chain, blended from the root to the child around x = 1
pub fn strip_mesh() -> (TriangleMesh, WeightMatrix) {
    let mut mesh = TriangleMesh::default();
    let mut triplets = Vec::new();
    for step in 0..=4 {
        let x = step as f32 * 0.5;
        let w = (x - 0.5).clamp(0.0, 1.0);
        for y in [-0.25, 0.25] {
            let v = mesh.vertices.len();
            mesh.vertices.push(Vec3::new(x, y, 0.0));
            mesh.normals.push(Vec3::Z);
            if w < 1.0 {
                triplets.push((v, 0, 1.0 - w));
            }
            if w > 0.0 {
                triplets.push((v, 1, w));
            }
        }
    }
    for step in 0..4u32 {
        let i = step * 2;
        mesh.indices.push([i, i + 2, i + 3]);
        mesh.indices.push([i, i + 3, i + 1]);
    }
    let weights = WeightMatrix::from_triplets(mesh.vertices.len(), 2, triplets).unwrap();
    (mesh, weights)
}

/// Child bends 90 degrees around Z between t = 0 and t = 1
pub fn bend_clip(skeleton: &Skeleton) -> Animation {
    let rest = skeleton.pose(SpaceType::Local).clone();
    let mut bent = rest.clone();
    bent[1] = Transform::from_rotation_translation(glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2), Vec3::X);
    let mut clip = Animation::new("bend");
    clip.add_key_pose(rest, 0.0);
    clip.add_key_pose(bent, 1.0);
    clip
}

pub fn strip_entity(name: &str, config: &EngineConfig) -> SkinnedEntity {
    let skeleton = chain_skeleton();
    let (mesh, weights) = strip_mesh();
    let clip = bend_clip(&skeleton);
    let ref_data = SkinningRefData::new(mesh, skeleton, weights, None, Transform::IDENTITY, config).unwrap();
    SkinnedEntity::new(name, ref_data, vec![clip], config).unwrap()
}

/// Same strip, but the first vertex has lost all its influences
pub fn broken_entity(name: &str, config: &EngineConfig) -> SkinnedEntity {
    let skeleton = chain_skeleton();
    let (mesh, weights) = strip_mesh();
    let triplets: Vec<_> = (0..weights.rows())
        .filter(|&v| v != 0)
        .flat_map(|v| weights.row_iter(v).map(move |(b, w)| (v, b, w)).collect::<Vec<_>>())
        .collect();
    let weights = WeightMatrix::from_triplets(weights.rows(), weights.cols(), triplets).unwrap();
    let clip = bend_clip(&skeleton);
    let ref_data = SkinningRefData::new(mesh, skeleton, weights, None, Transform::IDENTITY, config).unwrap();
    SkinnedEntity::new(name, ref_data, vec![clip], config).unwrap()
}
