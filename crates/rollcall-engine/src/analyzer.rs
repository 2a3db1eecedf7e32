//! Frame → faces-with-embeddings.

use crate::config::Config;
use crate::error::EngineError;
use rollcall_core::{
    BoundingBox, DetectorOptions, Embedding, FaceDetector, FaceRecognizer, RecognizerError,
};
use rollcall_hw::Frame;

/// A detected face and its embedding.
#[derive(Debug, Clone)]
pub struct AnalyzedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Finds faces in a frame and embeds each one.
pub trait FaceAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError> {
        (**self).analyze(frame)
    }
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    /// Load both models from the configured model directory.
    pub fn load(config: &Config) -> Result<Self, EngineError> {
        let options = DetectorOptions {
            confidence: config.detector_confidence,
            ..DetectorOptions::default()
        };
        let detector = FaceDetector::load(&config.detector_model_path(), options)?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model_path())?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError> {
        let boxes = self.detector.detect(&frame.data, frame.width, frame.height)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self
                .recognizer
                .extract(&frame.data, frame.width, frame.height, &bbox)
            {
                Ok(embedding) => faces.push(AnalyzedFace { bbox, embedding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(seq = frame.sequence, "face without landmarks skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(faces)
    }
}
