use std::f32::consts::FRAC_PI_2;
use std::time::Instant;

use glam::{Quat, Vec3};
use log::{error, info};

use skinning_engine::animation::{Animation, Skeleton, SpaceType};
use skinning_engine::math::Transform;
use skinning_engine::rigfile::RigFile;
use skinning_engine::skinning::{SkinningRefData, TriangleMesh, WeightMatrix};
use skinning_engine::{AnimationSystem, ControlEvent, EngineConfig, Result, SkinnedEntity, SkinningMethod};

const SEGMENTS: usize = 16;
const RINGS: usize = 24;
const LENGTH: f32 = 3.0;
const FRAMES: u32 = 120;
const DT: f32 = 1.0 / 60.0;

/// Tube along +X around a three bone chain, twisted by its only clip
fn twisted_tube(config: &EngineConfig) -> Result<SkinnedEntity> {
    let mut skeleton = Skeleton::new();
    let root = skeleton.add_bone(None, Transform::IDENTITY, SpaceType::Local, "root")?;
    let mid = skeleton.add_bone(Some(root), Transform::from_translation(Vec3::X * 1.5), SpaceType::Local, "mid")?;
    skeleton.add_bone(Some(mid), Transform::from_translation(Vec3::X * 1.5), SpaceType::Local, "tip")?;

    let mut mesh = TriangleMesh::default();
    let mut triplets = Vec::new();
    for ring in 0..=RINGS {
        let x = LENGTH * ring as f32 / RINGS as f32;
        // blend root and mid around the middle joint
        let w = (x - 1.0).clamp(0.0, 1.0);
        for seg in 0..SEGMENTS {
            let a = std::f32::consts::TAU * seg as f32 / SEGMENTS as f32;
            let n = Vec3::new(0.0, a.cos(), a.sin());
            let v = mesh.vertices.len();
            mesh.vertices.push(Vec3::new(x, 0.0, 0.0) + 0.3 * n);
            mesh.normals.push(n);
            triplets.push((v, 0, 1.0 - w));
            triplets.push((v, 1, w));
        }
    }
    for ring in 0..RINGS {
        for seg in 0..SEGMENTS {
            let i = |r: usize, s: usize| (r * SEGMENTS + s % SEGMENTS) as u32;
            mesh.indices.push([i(ring, seg), i(ring + 1, seg), i(ring + 1, seg + 1)]);
            mesh.indices.push([i(ring, seg), i(ring + 1, seg + 1), i(ring, seg + 1)]);
        }
    }
    let weights = WeightMatrix::from_triplets(mesh.vertices.len(), skeleton.size(), triplets)?;

    let rest = skeleton.pose(SpaceType::Local).clone();
    let mut twisted = rest.clone();
    twisted[mid] = Transform::from_rotation_translation(Quat::from_rotation_x(FRAC_PI_2 * 1.8), Vec3::X * 1.5);
    let mut clip = Animation::new("twist");
    clip.add_key_pose(rest, 0.0);
    clip.add_key_pose(twisted, 1.0);

    let ref_data = SkinningRefData::new(mesh, skeleton, weights, None, Transform::IDENTITY, config)?;
    SkinnedEntity::new("tube", ref_data, vec![clip], config)
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match std::env::var("SKINNING_CONFIG") {
        Ok(path) => EngineConfig::load(path)?,
        Err(_) => EngineConfig::default(),
    };

    let mut system = AnimationSystem::new(config.clone());
    let tube = system.add_entity(twisted_tube(&config)?);
    if let Some(path) = args.next() {
        let rig = RigFile::load(&path)?;
        system.add_entity(rig.into_entity(path, &config)?);
    }

    let controls = system.control_sender();
    let methods = [
        SkinningMethod::Lbs,
        SkinningMethod::Dqs,
        SkinningMethod::Cor,
        SkinningMethod::StbsLbs,
        SkinningMethod::StbsDqs,
    ];
    let start = Instant::now();
    for frame in 0..FRAMES {
        if frame % (FRAMES / methods.len() as u32) == 0 {
            let method = methods[(frame / (FRAMES / methods.len() as u32)) as usize % methods.len()];
            info!("switching tube to {:?}", method);
            controls.push(ControlEvent::SetSkinningMethod(tube, method));
        }
        let report = system.run_frame(DT)?;
        for (name, err) in &report.failed {
            error!("{}: {}", name, err);
        }
    }

    let snapshot = system.snapshot();
    for entity in &snapshot.curr.entities {
        let mesh = &entity.mesh;
        let extent = mesh
            .positions
            .iter()
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        info!(
            "{}: {} vertices, skinned {} times, bounds {:?}",
            entity.name,
            mesh.len(),
            entity.frame_counter,
            extent
        );
    }
    info!("{} frames in {:.1} ms", FRAMES, start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        error!("{}", err);
        std::process::exit(1);
    }
}
