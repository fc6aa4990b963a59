use crate::types::{NearestMatcher, DEFAULT_DISTANCE_THRESHOLD};
use serde::Deserialize;
use std::path::PathBuf;

/// `[recognition]` settings shared by the station and the encoding builder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Directory holding `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Reference images, one file or subdirectory per student.
    pub images_dir: PathBuf,
    /// Precomputed encodings; rebuilt from `images_dir` when absent.
    pub encodings_file: PathBuf,
    /// Maximum Euclidean distance for a match.
    pub threshold: f32,
    /// Runner-up distance gap below which a match is ambiguous.
    pub tie_margin: f32,
    /// Minimum detector score for a face to be considered.
    pub min_confidence: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            images_dir: PathBuf::from("Images"),
            encodings_file: PathBuf::from("EncodeFile.json"),
            threshold: DEFAULT_DISTANCE_THRESHOLD,
            tie_margin: 0.0,
            min_confidence: crate::detector::DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl RecognitionConfig {
    /// Apply `ROLLCALL_MODEL_DIR`, `ROLLCALL_IMAGES_DIR`, `ROLLCALL_ENCODINGS_FILE`,
    /// `ROLLCALL_THRESHOLD`, `ROLLCALL_TIE_MARGIN` and `ROLLCALL_MIN_CONFIDENCE`.
    pub fn with_env(mut self) -> Self {
        if let Ok(v) = std::env::var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_ENCODINGS_FILE") {
            self.encodings_file = PathBuf::from(v);
        }
        self.threshold = env_f32("ROLLCALL_THRESHOLD", self.threshold);
        self.tie_margin = env_f32("ROLLCALL_TIE_MARGIN", self.tie_margin);
        self.min_confidence = env_f32("ROLLCALL_MIN_CONFIDENCE", self.min_confidence);
        self
    }

    pub fn matcher(&self) -> NearestMatcher {
        NearestMatcher {
            threshold: self.threshold,
            tie_margin: self.tie_margin,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
