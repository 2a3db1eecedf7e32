//! rollcall-engine — configuration, registration capture and the live
//! attendance pipeline.

pub mod analyzer;
pub mod config;
pub mod enroll;
pub mod error;
mod queue;
pub mod session;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalyzedFace, FaceAnalyzer, OnnxAnalyzer};
pub use config::{default_config_path, Config, ConfigError};
pub use enroll::{capture_embedding, register_student, EnrollCapture};
pub use error::EngineError;
pub use session::{AttendanceSession, SessionEvent, SessionOptions, SessionSummary, StopHandle};
pub use tracker::{AttendanceTracker, Decision, WriteOutcome};
