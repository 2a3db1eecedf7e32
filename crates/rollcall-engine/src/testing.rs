//! Scripted frame sources and analyzers for engine tests.

use crate::analyzer::{AnalyzedFace, FaceAnalyzer};
use crate::error::EngineError;
use rollcall_core::{BoundingBox, Embedding};
use rollcall_hw::{Frame, FrameSource, SourceError};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn frame(sequence: u32, dark: bool) -> Frame {
    let value = if dark { 0 } else { 128 };
    Frame::new(vec![value; 16], 4, 4, sequence)
}

pub fn face(confidence: f32, values: &[f32]) -> AnalyzedFace {
    AnalyzedFace {
        bbox: BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
            confidence,
            landmarks: None,
        },
        embedding: Embedding::new(values.to_vec()),
    }
}

pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    fail_at_end: bool,
}

impl ScriptedSource {
    /// `count` bright frames.
    pub fn new(count: u32) -> Self {
        Self::from_frames((0..count).map(|i| frame(i, false)).collect())
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            fail_at_end: false,
        }
    }

    /// Return an error instead of end-of-stream once the frames run out.
    pub fn failing_at_end(mut self) -> Self {
        self.fail_at_end = true;
        self
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.frames.pop_front() {
            Some(f) => Ok(Some(f)),
            None if self.fail_at_end => Err(SourceError::Empty(PathBuf::from("scripted"))),
            None => Ok(None),
        }
    }
}

/// Returns one scripted face list per call, then nothing.
pub struct ScriptedAnalyzer {
    script: VecDeque<Vec<AnalyzedFace>>,
    calls: usize,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<Vec<AnalyzedFace>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    /// The same faces on every call.
    pub fn repeating(faces: Vec<AnalyzedFace>, calls: usize) -> Self {
        Self::new(vec![faces; calls])
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FaceAnalyzer for ScriptedAnalyzer {
    fn analyze(&mut self, _frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError> {
        self.calls += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

/// Fails the first `failures` calls, then returns the same faces every call.
pub struct FlakyAnalyzer {
    failures: usize,
    faces: Vec<AnalyzedFace>,
    calls: usize,
}

impl FlakyAnalyzer {
    pub fn new(failures: usize, faces: Vec<AnalyzedFace>) -> Self {
        Self {
            failures,
            faces,
            calls: 0,
        }
    }
}

impl FaceAnalyzer for FlakyAnalyzer {
    fn analyze(&mut self, _frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError> {
        self.calls += 1;
        if self.calls <= self.failures {
            return Err(EngineError::NoFaceDetected);
        }
        Ok(self.faces.clone())
    }
}

/// Records the sequence of every frame it sees and takes `delay` per frame.
pub struct RecordingAnalyzer {
    delay: Duration,
    seen: Arc<Mutex<Vec<u32>>>,
}

impl RecordingAnalyzer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            seen: Arc::default(),
        }
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.seen)
    }
}

impl FaceAnalyzer for RecordingAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<AnalyzedFace>, EngineError> {
        self.seen.lock().unwrap().push(frame.sequence);
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }
}
