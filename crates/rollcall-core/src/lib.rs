//! rollcall-core: face encoding and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on the CPU, plus the encoding cache and the
//! nearest-neighbour matcher used to recognize known students.

pub mod alignment;
pub mod cache;
pub mod config;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use cache::{CacheError, EncodingCache};
pub use config::RecognitionConfig;
pub use detector::FaceDetector;
pub use pipeline::{EncodedFace, FaceEncoder, FacePipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, FaceEncoding, MatchResult, Matcher, NearestMatcher};

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
