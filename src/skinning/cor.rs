use glam::Vec3;
use log::debug;
use rayon::prelude::*;

use crate::config::CorConfig;
use crate::math::{DualQuat, Transform};

use super::data::{DeformedMesh, SkinningRefData};
use super::dqs::compute_dq;

/// Sparse weight vector sorted by bone index
type SparseWeights = Vec<(usize, f32)>;

fn coeff(v: &[(usize, f32)], bone: usize) -> f32 {
    match v.binary_search_by_key(&bone, |(b, _)| *b) {
        Ok(i) => v[i].1,
        Err(_) => 0.0,
    }
}

fn merge(a: &[(usize, f32)], b: &[(usize, f32)], mut f: impl FnMut(f32, f32) -> f32) -> SparseWeights {
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&(ba, wa)), Some(&(bb, wb))) if ba == bb => {
                i += 1;
                j += 1;
                (ba, f(wa, wb))
            }
            (Some(&(ba, wa)), Some(&(bb, _))) if ba < bb => {
                i += 1;
                (ba, f(wa, 0.0))
            }
            (Some(&(ba, wa)), None) => {
                i += 1;
                (ba, f(wa, 0.0))
            }
            (_, Some(&(bb, wb))) => {
                j += 1;
                (bb, f(0.0, wb))
            }
            (None, None) => break,
        };
        out.push(next);
    }
    out
}

fn distance_sq(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    merge(a, b, |x, y| x - y).iter().map(|(_, d)| d * d).sum()
}

/// Gaussian similarity of two weight vectors. Only pairs of distinct bones
/// influencing both vertices contribute, so single-bone vertices score 0.
pub fn weight_similarity(w1: &[(usize, f32)], w2: &[(usize, f32)], sigma: f32) -> f32 {
    let sigma_sq = sigma * sigma;
    let mut result = 0.0;
    for &(j, w1j) in w1 {
        let w2j = coeff(w2, j);
        if w2j <= 0.0 {
            continue;
        }
        for &(k, w2k) in w2 {
            let w1k = coeff(w1, k);
            if j != k && w1k > 0.0 {
                let diff = w1j * w2k - w1k * w2j;
                result += w1j * w1k * w2j * w2k * (-(diff * diff) / sigma_sq).exp();
            }
        }
    }
    result
}

struct SurfaceSample {
    centroid: Vec3,
    area: f32,
    weights: SparseWeights,
}

/// Splits a triangle at its edge midpoints until the weights of its corners are close
fn subdivide(
    p: [Vec3; 3],
    w: [SparseWeights; 3],
    depth: u32,
    config: &CorConfig,
    out: &mut Vec<SurfaceSample>,
) {
    let eps_sq = config.weight_epsilon * config.weight_epsilon;
    let close = (0..3).all(|e| distance_sq(&w[e], &w[(e + 1) % 3]) <= eps_sq);
    if close || depth >= config.max_subdivision_depth {
        let sum = merge(&merge(&w[0], &w[1], |a, b| a + b), &w[2], |a, b| a + b);
        out.push(SurfaceSample {
            centroid: (p[0] + p[1] + p[2]) / 3.0,
            area: 0.5 * (p[1] - p[0]).cross(p[2] - p[0]).length(),
            weights: sum.into_iter().map(|(b, x)| (b, x / 3.0)).collect(),
        });
        return;
    }

    let mid = |a: usize, b: usize| ((p[a] + p[b]) * 0.5, merge(&w[a], &w[b], |x, y| 0.5 * (x + y)));
    let (p01, w01) = mid(0, 1);
    let (p12, w12) = mid(1, 2);
    let (p20, w20) = mid(2, 0);
    let [w0, w1, w2] = w;
    subdivide([p[0], p01, p20], [w0, w01.clone(), w20.clone()], depth + 1, config, out);
    subdivide([p01, p[1], p12], [w01.clone(), w1, w12.clone()], depth + 1, config, out);
    subdivide([p20, p12, p[2]], [w20.clone(), w12.clone(), w2], depth + 1, config, out);
    subdivide([p01, p12, p20], [w01, w12, w20], depth + 1, config, out);
}

/// Optimized center of rotation of every vertex: the similarity-weighted average
/// of the surface, integrated over an adaptively subdivided copy of the mesh.
/// Vertices similar to nothing (e.g. rigidly bound) rotate around themselves.
pub fn compute_centers_of_rotation(ref_data: &SkinningRefData, config: &CorConfig) -> Vec<Vec3> {
    let mesh = &ref_data.mesh;
    let row = |v: usize| -> SparseWeights { ref_data.weights.row_iter(v).filter(|(_, w)| *w > 0.0).collect() };

    let mut samples = Vec::new();
    for face in &mesh.indices {
        let [a, b, c] = face.map(|i| i as usize);
        subdivide(
            [mesh.vertices[a], mesh.vertices[b], mesh.vertices[c]],
            [row(a), row(b), row(c)],
            0,
            config,
            &mut samples,
        );
    }
    debug!(
        "center of rotation integral over {} samples from {} triangles",
        samples.len(),
        mesh.indices.len()
    );

    (0..mesh.vertex_count())
        .into_par_iter()
        .map(|i| {
            let wi = row(i);
            let mut cor = Vec3::ZERO;
            let mut sum_weight = 0.0;
            for sample in &samples {
                let s = weight_similarity(&wi, &sample.weights, config.sigma) * sample.area;
                cor += s * sample.centroid;
                sum_weight += s;
            }
            if sum_weight > 0.0 {
                cor / sum_weight
            } else {
                mesh.vertices[i]
            }
        })
        .collect()
}

/// Linear blend of the centers, rotation of the vertex around its center by the blended dual quaternion
pub fn center_of_rotation_skinning(
    ref_data: &SkinningRefData,
    centers: &[Vec3],
    model_pose: &[Transform],
) -> DeformedMesh {
    let transforms = ref_data.skinning_transforms(model_pose);
    let bone_dqs: Vec<DualQuat> = transforms.iter().map(DualQuat::from_transform).collect();
    let dqs = compute_dq(&bone_dqs, &ref_data.weights);
    let mesh = &ref_data.mesh;
    let weights = &ref_data.weights;

    let skinned: Vec<_> = dqs
        .par_iter()
        .enumerate()
        .map(|(i, dq)| {
            let cor = centers[i];
            let moved_center: Vec3 = weights
                .row_iter(i)
                .map(|(j, w)| w * transforms[j].transform_point3(cor))
                .sum();
            (
                moved_center + dq.rotate(mesh.vertices[i] - cor),
                dq.rotate(mesh.normals[i]),
                dq.rotate(mesh.tangents[i]),
                dq.rotate(mesh.bitangents[i]),
            )
        })
        .collect();
    skinned.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_needs_two_shared_bones() {
        let rigid = vec![(0, 1.0)];
        let blended = vec![(0, 0.5), (1, 0.5)];
        assert_eq!(weight_similarity(&rigid, &blended, 0.1), 0.0);
        assert!(weight_similarity(&blended, &blended, 0.1) > 0.0);
    }

    #[test]
    fn similarity_decreases_with_distance() {
        let a = vec![(0, 0.5), (1, 0.5)];
        let b = vec![(0, 0.6), (1, 0.4)];
        let c = vec![(0, 0.9), (1, 0.1)];
        let sab = weight_similarity(&a, &b, 0.1) / weight_similarity(&a, &a, 0.1);
        let sac = weight_similarity(&a, &c, 0.1) / weight_similarity(&a, &a, 0.1);
        assert!(sab > sac);
    }

    #[test]
    fn merge_handles_disjoint_bones() {
        let a = vec![(0, 1.0), (3, 0.5)];
        let b = vec![(1, 0.25), (3, 0.5)];
        assert_eq!(merge(&a, &b, |x, y| x + y), vec![(0, 1.0), (1, 0.25), (3, 1.0)]);
        assert_eq!(distance_sq(&a, &a), 0.0);
    }

    #[test]
    fn subdivision_stops_when_weights_are_close() {
        let config = CorConfig {
            weight_epsilon: 0.3,
            ..Default::default()
        };
        let mut out = Vec::new();
        let p = [Vec3::ZERO, Vec3::X, Vec3::Y];
        subdivide(p, [vec![(0, 1.0)], vec![(1, 1.0)], vec![(0, 1.0)]], 0, &config, &mut out);
        assert!(out.len() > 1);
        let total: f32 = out.iter().map(|s| s.area).sum();
        assert!((total - 0.5).abs() < 1e-5);
    }
}
