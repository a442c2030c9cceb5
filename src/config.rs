use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::skinning::{NormalSkinning, SkinningMethod};

/// Parameters of the center-of-rotation precomputation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct CorConfig {
    /// Width of the gaussian kernel used to compare weight vectors
    pub sigma: f32,
    /// Triangles are subdivided until the weights of their corners are closer than this
    pub weight_epsilon: f32,
    pub max_subdivision_depth: u32,
}

impl Default for CorConfig {
    fn default() -> Self {
        Self {
            sigma: 0.1,
            weight_epsilon: 0.1,
            max_subdivision_depth: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// None = hardware concurrency - 1, leaving one core to the caller thread
    pub worker_threads: Option<usize>,
    pub default_skinning: SkinningMethod,
    pub normal_skinning: NormalSkinning,
    pub cor: CorConfig,
    /// Tolerance on the row sums of a weight matrix
    pub weight_epsilon: f32,
    /// Frame deltas above this are treated as a stall and dropped
    pub max_frame_dt: f32,
    pub slow_motion_factor: f32,
    pub fail_on_invalid_weights: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            default_skinning: SkinningMethod::Lbs,
            normal_skinning: NormalSkinning::Approximate,
            cor: CorConfig::default(),
            weight_epsilon: 1e-4,
            max_frame_dt: 0.5,
            slow_motion_factor: 0.1,
            fail_on_invalid_weights: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(0)
        })
    }
}
