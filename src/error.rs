use std::io;
use thiserror::Error;

/// Error types for rig setup, animation playback and skinning
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bone index {index} out of range (skeleton has {len} bones)")]
    InvalidBone { index: usize, len: usize },

    #[error("bone hierarchy contains a cycle through bone {0}")]
    CyclicHierarchy(usize),

    #[error("bone {0} is listed as the child of more than one bone")]
    MultipleParents(usize),

    #[error("pose size mismatch: expected {expected} transforms, got {actual}")]
    PoseSizeMismatch { expected: usize, actual: usize },

    #[error("animation has no keyframes")]
    EmptyAnimation,

    #[error("animation index {index} out of range ({len} clips)")]
    InvalidAnimation { index: usize, len: usize },

    #[error("{count} vertices have no bone influence (first is vertex {first})")]
    UnweightedVertices { count: usize, first: usize },

    #[error("non-finite weight at vertex {vertex}, bone {bone}")]
    NonFiniteWeight { vertex: usize, bone: usize },

    #[error("weight matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    WeightShapeMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("invalid skinning weights: {0}")]
    InvalidWeights(String),

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("invalid rig file: {0}")]
    InvalidRig(String),

    #[error("skinning produced a non-finite attribute at vertex {0}")]
    NonFiniteOutput(usize),

    #[error("task graph error: {0}")]
    TaskGraph(String),

    #[error("task '{name}' panicked: {message}")]
    TaskPanicked { name: String, message: String },

    #[error("unknown entity")]
    UnknownEntity,
}

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
