//! Detection + recognition behind one seam.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One face found in an image, with its embedding.
#[derive(Debug, Clone)]
pub struct EncodedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Turns an RGB image into the embeddings of every face it contains.
pub trait FaceEncoder {
    fn encode(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<EncodedFace>, PipelineError>;
}

/// SCRFD detection followed by ArcFace recognition.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    /// Load both models from `model_dir` (`det_10g.onnx`, `w600k_r50.onnx`).
    pub fn load(model_dir: &Path, min_confidence: f32) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&model_dir.join(crate::DETECTOR_MODEL_FILE))?
            .with_confidence_threshold(min_confidence);
        let recognizer = FaceRecognizer::load(&model_dir.join(crate::RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for FacePipeline {
    fn encode(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<EncodedFace>, PipelineError> {
        let faces = self.detector.detect(rgb, width, height)?;
        let mut out = Vec::with_capacity(faces.len());
        for bbox in faces {
            let embedding = self.recognizer.extract(rgb, width, height, &bbox)?;
            out.push(EncodedFace { bbox, embedding });
        }
        Ok(out)
    }
}
