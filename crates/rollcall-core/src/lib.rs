//! rollcall-core — face detection, recognition and gallery matching.
//!
//! SCRFD finds faces, ArcFace turns aligned crops into embeddings, and the
//! matchers scan the enrolled gallery for the nearest identity. Both models
//! run on ONNX Runtime (CPU).

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::{DetectorError, DetectorOptions, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::{
    BoundingBox, CosineMatcher, Embedding, EnrolledFace, EuclideanMatcher, MatchMetric,
    MatchResult, Matcher,
};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}
