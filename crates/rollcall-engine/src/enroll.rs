//! Registration: capture one face embedding and store it with the student.

use crate::analyzer::{AnalyzedFace, FaceAnalyzer};
use crate::error::EngineError;
use rollcall_core::Embedding;
use rollcall_hw::FrameSource;
use rollcall_store::{NewStudent, Store};

/// Attempts per wanted frame before giving up.
const ATTEMPTS_PER_FRAME: usize = 3;

/// Result of a registration capture.
#[derive(Debug, Clone)]
pub struct EnrollCapture {
    pub embedding: Embedding,
    /// Detector confidence of the chosen face.
    pub confidence: f32,
    /// Single-face frames considered.
    pub candidates: usize,
}

/// Read frames until `frames` single-face frames are collected (or the
/// source ends / attempts run out), then keep the most confident face.
pub fn capture_embedding<S, A>(
    source: &mut S,
    analyzer: &mut A,
    frames: usize,
) -> Result<EnrollCapture, EngineError>
where
    S: FrameSource + ?Sized,
    A: FaceAnalyzer + ?Sized,
{
    let wanted = frames.max(1);
    let mut best: Option<AnalyzedFace> = None;
    let mut candidates = 0usize;
    let mut crowded = 0usize;
    let mut dark = 0usize;
    let mut errors = 0usize;
    let mut last_error: Option<EngineError> = None;

    for _ in 0..wanted * ATTEMPTS_PER_FRAME {
        if candidates >= wanted {
            break;
        }
        let Some(frame) = source.next_frame()? else {
            break;
        };
        if frame.is_dark {
            dark += 1;
            continue;
        }

        let mut faces = match analyzer.analyze(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                errors += 1;
                tracing::warn!(seq = frame.sequence, error = %e, "registration frame analysis failed");
                last_error = Some(e);
                continue;
            }
        };
        match faces.len() {
            0 => continue,
            1 => {
                candidates += 1;
                let face = faces.remove(0);
                if best
                    .as_ref()
                    .map_or(true, |b| face.bbox.confidence > b.bbox.confidence)
                {
                    best = Some(face);
                }
            }
            n => {
                crowded += 1;
                tracing::debug!(seq = frame.sequence, faces = n, "registration frame rejected");
            }
        }
    }

    tracing::debug!(candidates, crowded, dark, errors, "registration capture finished");

    match best {
        Some(face) => Ok(EnrollCapture {
            confidence: face.bbox.confidence,
            embedding: face.embedding,
            candidates,
        }),
        None if crowded > 0 => Err(EngineError::MultipleFaces { frames: crowded }),
        None => Err(last_error.unwrap_or(EngineError::NoFaceDetected)),
    }
}

/// Capture an embedding and upsert the student with it.
pub fn register_student<S, A>(
    store: &mut Store,
    source: &mut S,
    analyzer: &mut A,
    student: &NewStudent,
    frames: usize,
) -> Result<EnrollCapture, EngineError>
where
    S: FrameSource + ?Sized,
    A: FaceAnalyzer + ?Sized,
{
    let capture = capture_embedding(source, analyzer, frames)?;
    store.register(student, &capture.embedding)?;
    tracing::info!(
        student_id = %student.student_id,
        confidence = capture.confidence,
        candidates = capture.candidates,
        "face registered"
    );
    Ok(capture)
}
